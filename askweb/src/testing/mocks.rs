//! Scripted collaborators for tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use crate::errors::{FetchError, LlmError, SearchError, StoreError};
use crate::pipeline::{Embedder, LlmBackend};
use crate::websearch::{
    HttpRequest, HttpResponse, PageFetcher, ProxyProfile, ProxySource, SearchEngine, SearchResultItem, Transport,
};

/// A transport that answers from per-URL response queues.
///
/// Requests are matched on the URL without query parameters. A URL with
/// an empty queue answers 404.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    responses: Mutex<HashMap<String, VecDeque<HttpResponse>>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    /// Creates a transport with no scripted responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a response for the URL.
    pub fn push(&self, url: impl Into<String>, response: HttpResponse) {
        self.responses
            .lock()
            .entry(url.into())
            .or_default()
            .push_back(response);
    }

    /// Every request sent, in order.
    #[must_use]
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().clone()
    }

    /// Requests sent to the URL, in order.
    #[must_use]
    pub fn requests_to(&self, url: &str) -> Vec<HttpRequest> {
        self.requests
            .lock()
            .iter()
            .filter(|request| request.url == url)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, FetchError> {
        let response = self
            .responses
            .lock()
            .get_mut(&request.url)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| HttpResponse::status(404));
        self.requests.lock().push(request);
        Ok(response)
    }
}

/// A proxy source with a fixed list.
#[derive(Debug, Default)]
pub struct StaticProxySource {
    proxies: Vec<ProxyProfile>,
    calls: AtomicUsize,
}

impl StaticProxySource {
    /// Creates a source that always returns `proxies`.
    #[must_use]
    pub fn new(proxies: Vec<ProxyProfile>) -> Self {
        Self {
            proxies,
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of list downloads.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProxySource for StaticProxySource {
    fn name(&self) -> &str {
        "static"
    }

    async fn fetch_proxies(&self, _transport: &dyn Transport) -> Result<Vec<ProxyProfile>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.proxies.is_empty() {
            return Err(FetchError::proxy_list("static list is empty"));
        }
        Ok(self.proxies.clone())
    }
}

/// A search engine with canned results.
#[derive(Debug, Default)]
pub struct MockSearchEngine {
    results: Vec<SearchResultItem>,
    error: Option<SearchError>,
    questions: Mutex<Vec<String>>,
}

impl MockSearchEngine {
    /// Returns `results` for every question.
    #[must_use]
    pub fn new(results: Vec<SearchResultItem>) -> Self {
        Self {
            results,
            ..Self::default()
        }
    }

    /// Fails every query with `error`.
    #[must_use]
    pub fn failing(error: SearchError) -> Self {
        Self {
            error: Some(error),
            ..Self::default()
        }
    }

    /// Number of queries.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.questions.lock().len()
    }

    /// Questions received, in order.
    #[must_use]
    pub fn questions(&self) -> Vec<String> {
        self.questions.lock().clone()
    }
}

#[async_trait]
impl SearchEngine for MockSearchEngine {
    async fn query(&self, question: &str) -> Result<Vec<SearchResultItem>, SearchError> {
        self.questions.lock().push(question.to_string());
        match &self.error {
            Some(error) => Err(error.clone()),
            None => Ok(self.results.clone()),
        }
    }
}

#[derive(Debug, Clone)]
enum PageScript {
    Html(String),
    Slow(String, Duration),
    Fail(FetchError),
}

/// A page fetcher serving HTML by URL. Unknown URLs fail with HTTP 404.
#[derive(Debug, Default)]
pub struct MockPageFetcher {
    pages: HashMap<String, PageScript>,
    fetched: Mutex<Vec<String>>,
}

impl MockPageFetcher {
    /// Creates a fetcher with no pages.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Serves `html` for `url`.
    #[must_use]
    pub fn with_page(mut self, url: impl Into<String>, html: impl Into<String>) -> Self {
        self.pages.insert(url.into(), PageScript::Html(html.into()));
        self
    }

    /// Serves `html` for `url` after `delay`.
    #[must_use]
    pub fn with_slow_page(mut self, url: impl Into<String>, html: impl Into<String>, delay: Duration) -> Self {
        self.pages.insert(url.into(), PageScript::Slow(html.into(), delay));
        self
    }

    /// Fails `url` with `error`.
    #[must_use]
    pub fn with_failure(mut self, url: impl Into<String>, error: FetchError) -> Self {
        self.pages.insert(url.into(), PageScript::Fail(error));
        self
    }

    /// Number of fetches.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.fetched.lock().len()
    }

    /// URLs fetched, in order.
    #[must_use]
    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().clone()
    }
}

#[async_trait]
impl PageFetcher for MockPageFetcher {
    async fn fetch_page(&self, url: &str) -> Result<String, FetchError> {
        self.fetched.lock().push(url.to_string());
        match self.pages.get(url).cloned() {
            Some(PageScript::Html(html)) => Ok(html),
            Some(PageScript::Slow(html, delay)) => {
                tokio::time::sleep(delay).await;
                Ok(html)
            }
            Some(PageScript::Fail(error)) => Err(error),
            None => Err(FetchError::status(url, 404)),
        }
    }
}

/// An LLM backend with a canned answer.
#[derive(Debug)]
pub struct MockLlm {
    name: String,
    answer: String,
    failing: AtomicBool,
    prompts: Mutex<Vec<String>>,
}

impl MockLlm {
    /// A backend that answers `answer` to every prompt.
    #[must_use]
    pub fn answering(name: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            answer: answer.into(),
            failing: AtomicBool::new(false),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// A backend that is always unavailable.
    #[must_use]
    pub fn failing(name: impl Into<String>) -> Self {
        let llm = Self::answering(name, "");
        llm.set_failing(true);
        llm
    }

    /// Switches between answering and failing.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of prompts received.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.prompts.lock().len()
    }

    /// Prompts received, in order.
    #[must_use]
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }
}

#[async_trait]
impl LlmBackend for MockLlm {
    fn name(&self) -> &str {
        &self.name
    }

    async fn ask(&self, prompt: &str) -> Result<String, LlmError> {
        self.prompts.lock().push(prompt.to_string());
        if self.failing.load(Ordering::SeqCst) {
            return Err(LlmError::unavailable(&self.name, "scripted failure"));
        }
        Ok(self.answer.clone())
    }
}

/// Deterministic bag-of-words embedder: each lowercased word adds one to a
/// hashed bucket.
#[derive(Debug)]
pub struct HashEmbedder {
    dimension: usize,
    calls: AtomicUsize,
}

impl HashEmbedder {
    /// Creates an embedder producing `dimension`-sized vectors.
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of texts embedded.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn bucket(&self, word: &str) -> usize {
        let digest = Sha256::digest(word.as_bytes());
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest[..8]);
        #[allow(clippy::cast_possible_truncation)]
        let bucket = (u64::from_le_bytes(bytes) % self.dimension as u64) as usize;
        bucket
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut vector = vec![0.0; self.dimension];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(str::to_lowercase)
        {
            vector[self.bucket(&word)] += 1.0;
        }
        Ok(vector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_scripted_transport_queues_per_url() {
        let transport = ScriptedTransport::new();
        transport.push("https://a.vn", HttpResponse::status(429));
        transport.push("https://a.vn", HttpResponse::html("ok"));

        assert_eq!(transport.send(HttpRequest::get("https://a.vn")).await.unwrap().status, 429);
        assert_eq!(transport.send(HttpRequest::get("https://a.vn")).await.unwrap().body, "ok");
        assert_eq!(transport.send(HttpRequest::get("https://a.vn")).await.unwrap().status, 404);
        assert_eq!(transport.requests_to("https://a.vn").len(), 3);
        assert!(transport.requests_to("https://b.vn").is_empty());
    }

    #[tokio::test]
    async fn test_hash_embedder_is_deterministic() {
        let embedder = HashEmbedder::new(32);
        let a = embedder.embed("Bom nguyên tử").await.unwrap();
        let b = embedder.embed("bom  NGUYÊN tử!").await.unwrap();
        assert_eq!(a, b);
        assert!((a.iter().sum::<f32>() - 3.0).abs() < f32::EPSILON);
        assert_eq!(embedder.calls(), 2);
    }

    #[tokio::test]
    async fn test_page_fetcher_scripts() {
        let fetcher = MockPageFetcher::new()
            .with_page("https://a.vn", "<p>a</p>")
            .with_failure("https://b.vn", FetchError::Timeout { url: "https://b.vn".to_string() });

        assert_eq!(fetcher.fetch_page("https://a.vn").await.unwrap(), "<p>a</p>");
        assert!(matches!(fetcher.fetch_page("https://b.vn").await, Err(FetchError::Timeout { .. })));
        assert_eq!(
            fetcher.fetch_page("https://c.vn").await.unwrap_err(),
            FetchError::status("https://c.vn", 404)
        );
        assert_eq!(fetcher.fetched(), vec!["https://a.vn", "https://b.vn", "https://c.vn"]);
    }
}
