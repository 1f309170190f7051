//! The fetch agent: identity rotation, proxy pool, rate-limit handling and
//! anti-block page strategies.

use async_trait::async_trait;
use parking_lot::RwLock;
use rand::seq::SliceRandom;
use rand::Rng;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use super::config::{FetchConfig, PageStrategy};
use super::models::{FetchBody, HttpRequest, HttpResponse};
use super::protocols::{PageFetcher, ProxySource, Transport};
use super::proxy::{CheckerProxySource, ProxyNovaSource, ProxyPool};
use crate::errors::FetchError;
use crate::pipeline::with_retry_if;

/// Shared proxy state owned by one [`FetchAgent`].
///
/// Readers take a cheap `Arc` snapshot of the current pool. Refreshes are
/// single-flight: the refresh mutex serializes them, and the generation
/// counter lets a caller whose pool was already replaced skip its own.
#[derive(Debug, Default)]
pub struct FetchAgentState {
    pool: RwLock<Arc<ProxyPool>>,
    generation: AtomicU64,
    refresh_lock: tokio::sync::Mutex<()>,
}

impl FetchAgentState {
    /// Creates state with no pool loaded. Generation 0 means "never loaded".
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates state with a preloaded pool.
    #[must_use]
    pub fn with_pool(pool: ProxyPool) -> Self {
        Self {
            pool: RwLock::new(Arc::new(pool)),
            generation: AtomicU64::new(1),
            refresh_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// The current pool and its generation.
    #[must_use]
    pub fn snapshot(&self) -> (Arc<ProxyPool>, u64) {
        let pool = self.pool.read().clone();
        (pool, self.generation.load(Ordering::Acquire))
    }

    /// Number of pools installed so far.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Replaces the pool if it is still at `observed` generation.
    ///
    /// Returns true if this call installed a new pool. Sources are tried in
    /// order; when all fail, an empty pool is installed so requests go out
    /// directly instead of reusing stale proxies.
    pub async fn refresh(
        &self,
        observed: u64,
        sources: &[Arc<dyn ProxySource>],
        transport: &dyn Transport,
        pool_size: usize,
    ) -> bool {
        let _guard = self.refresh_lock.lock().await;
        if self.generation() != observed {
            debug!(observed, current = self.generation(), "pool already refreshed");
            return false;
        }

        let mut pool = ProxyPool::empty();
        for source in sources {
            match source.fetch_proxies(transport).await {
                Ok(candidates) if !candidates.is_empty() => {
                    pool = ProxyPool::from_candidates(candidates, pool_size);
                    info!(source = source.name(), proxies = pool.len(), "proxy pool refreshed");
                    break;
                }
                Ok(_) => warn!(source = source.name(), "proxy source returned no proxies"),
                Err(e) => warn!(source = source.name(), error = %e, "proxy source failed"),
            }
        }
        if pool.is_empty() && !sources.is_empty() {
            warn!("no proxy source produced a pool, sending requests directly");
        }

        *self.pool.write() = Arc::new(pool);
        self.generation.fetch_add(1, Ordering::AcqRel);
        true
    }
}

const CHROME_TEMPLATE: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/{v}.0.{b}.{p} Safari/537.36";

fn generated_user_agent(rng: &mut impl Rng) -> String {
    if rng.gen_bool(0.5) {
        CHROME_TEMPLATE
            .replace("{v}", &rng.gen_range(100..=126).to_string())
            .replace("{b}", &rng.gen_range(4_000..=6_500).to_string())
            .replace("{p}", &rng.gen_range(0..=200).to_string())
    } else {
        let version = rng.gen_range(100..=128);
        format!("Mozilla/5.0 (X11; Linux x86_64; rv:{version}.0) Gecko/20100101 Firefox/{version}.0")
    }
}

/// Issues requests with a rotating identity through a shared proxy pool.
pub struct FetchAgent {
    config: FetchConfig,
    transport: Arc<dyn Transport>,
    sources: Vec<Arc<dyn ProxySource>>,
    state: Arc<FetchAgentState>,
}

impl std::fmt::Debug for FetchAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchAgent")
            .field("config", &self.config)
            .field("sources", &self.sources.iter().map(|s| s.name()).collect::<Vec<_>>())
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl FetchAgent {
    /// Creates an agent with explicit collaborators.
    #[must_use]
    pub fn new(
        config: FetchConfig,
        transport: Arc<dyn Transport>,
        sources: Vec<Arc<dyn ProxySource>>,
    ) -> Self {
        Self {
            config,
            transport,
            sources,
            state: Arc::new(FetchAgentState::new()),
        }
    }

    /// Creates an agent backed by reqwest and the configured proxy lists.
    #[must_use]
    pub fn with_reqwest(config: FetchConfig) -> Self {
        let sources: Vec<Arc<dyn ProxySource>> = vec![
            Arc::new(CheckerProxySource::new(config.checkerproxy_endpoint.clone())),
            Arc::new(ProxyNovaSource::new(
                config.proxynova_endpoint.clone(),
                config.proxynova_countries.clone(),
            )),
        ];
        Self::new(config, Arc::new(super::ReqwestTransport::new()), sources)
    }

    /// Shares an existing state instead of owning a fresh one.
    #[must_use]
    pub fn with_state(mut self, state: Arc<FetchAgentState>) -> Self {
        self.state = state;
        self
    }

    /// The shared proxy state.
    #[must_use]
    pub fn state(&self) -> &Arc<FetchAgentState> {
        &self.state
    }

    /// The configuration.
    #[must_use]
    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    async fn current_pool(&self) -> (Arc<ProxyPool>, u64) {
        if !self.config.use_proxies {
            return (Arc::new(ProxyPool::empty()), 0);
        }
        let (pool, generation) = self.state.snapshot();
        if generation > 0 {
            return (pool, generation);
        }
        self.state
            .refresh(0, &self.sources, self.transport.as_ref(), self.config.proxy_pool_size)
            .await;
        self.state.snapshot()
    }

    fn build_request(&self, url: &str, params: &[(&str, &str)], pool: &ProxyPool) -> HttpRequest {
        let mut rng = rand::thread_rng();

        let listed = self.config.user_agents.choose(&mut rng).cloned();
        let user_agent = match listed {
            Some(ua) if rng.gen_bool(0.5) => ua,
            _ => generated_user_agent(&mut rng),
        };

        let mut request = HttpRequest::get(url)
            .with_header("Accept", "*/*")
            .with_header("Referer", self.config.referer.clone())
            .with_header("User-Agent", user_agent);
        if let Some(cookie) = self.config.cookies.choose(&mut rng) {
            request = request.with_header("Cookie", cookie.clone());
        }
        for (key, value) in params {
            request = request.with_query(*key, *value);
        }

        request.proxy = pool.pick().map(super::ProxyProfile::url);
        request.timeout = pool.request_timeout(
            self.config.proxy_timeout_padding_seconds,
            self.config.timeout(),
        );
        request
    }

    async fn send_with_retry(&self, request: &HttpRequest) -> Result<HttpResponse, FetchError> {
        let transport = &self.transport;
        let url = request.url.as_str();
        with_retry_if(&self.config.retry, url, FetchError::is_retryable, move || async move {
            let response = transport.send(request.clone()).await?;
            if response.status >= 500 {
                return Err(FetchError::status(url, response.status));
            }
            Ok(response)
        })
        .await
    }

    /// Fetches a URL, returning its body as text or parsed JSON.
    ///
    /// Transient failures are retried with backoff. A 429 replaces the proxy
    /// pool and retries, at most `rate_limit_refreshes` times; any other
    /// non-2xx status is returned as [`FetchError::Status`].
    pub async fn fetch(&self, url: &str, params: &[(&str, &str)]) -> Result<FetchBody, FetchError> {
        let mut refreshes = 0;
        loop {
            let (pool, generation) = self.current_pool().await;
            let request = self.build_request(url, params, &pool);
            let response = self.send_with_retry(&request).await?;

            match response.status {
                429 => {
                    if refreshes >= self.config.rate_limit_refreshes {
                        warn!(url, refreshes, "still rate limited after pool refresh");
                        return Err(FetchError::RateLimited {
                            url: url.to_string(),
                            refreshes,
                        });
                    }
                    refreshes += 1;
                    info!(url, attempt = refreshes, "rate limited, refreshing proxy pool");
                    self.state
                        .refresh(generation, &self.sources, self.transport.as_ref(), self.config.proxy_pool_size)
                        .await;
                }
                status if (200..300).contains(&status) => {
                    return Ok(if response.is_json() {
                        match serde_json::from_str(&response.body) {
                            Ok(value) => FetchBody::Json(value),
                            Err(_) => FetchBody::Text(response.body),
                        }
                    } else {
                        FetchBody::Text(response.body)
                    });
                }
                status => return Err(FetchError::status(url, status)),
            }
        }
    }

    /// Fetches a URL as text.
    pub async fn fetch_text(&self, url: &str, params: &[(&str, &str)]) -> Result<String, FetchError> {
        Ok(self.fetch(url, params).await?.into_text())
    }

    fn check_blocked(&self, url: &str, body: &str) -> Result<(), FetchError> {
        if !self.config.block_marker.is_empty() && body.contains(self.config.block_marker.as_str()) {
            return Err(FetchError::Blocked {
                url: url.to_string(),
                marker: self.config.block_marker.clone(),
            });
        }
        Ok(())
    }

    async fn fetch_direct(&self, url: &str) -> Result<String, FetchError> {
        let body = self.fetch_text(url, &[]).await?;
        self.check_blocked(url, &body)?;
        if let Some(marker) = self.config.js_shell_marker(&body) {
            return Err(FetchError::Blocked {
                url: url.to_string(),
                marker: marker.to_string(),
            });
        }
        Ok(body)
    }

    async fn fetch_web_cache(&self, url: &str) -> Result<String, FetchError> {
        let query = format!("cache:{url}");
        let params = [("q", query.as_str()), ("prmd", "ivn"), ("strip", "1"), ("vwsrc", "0")];
        let body = self.fetch_text(&self.config.web_cache_endpoint, &params).await?;
        self.check_blocked(url, &body)?;
        Ok(body)
    }

    async fn fetch_archive(&self, url: &str) -> Result<String, FetchError> {
        let availability = self
            .fetch(&self.config.archive_endpoint, &[("url", url)])
            .await?
            .into_json(url)?;
        let snapshot = availability
            .pointer("/archived_snapshots/closest/url")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| FetchError::NoSnapshot { url: url.to_string() })?;
        debug!(url, snapshot, "using archived snapshot");
        let body = self.fetch_text(snapshot, &[]).await?;
        self.check_blocked(url, &body)?;
        Ok(body)
    }

    /// Tries each configured page strategy in order and returns the first body.
    #[instrument(skip(self), fields(strategies = self.config.page_strategies.len()))]
    pub async fn fetch_with_strategies(&self, url: &str) -> Result<String, FetchError> {
        let mut last_error = None;
        for strategy in &self.config.page_strategies {
            let result = match strategy {
                PageStrategy::Direct => self.fetch_direct(url).await,
                PageStrategy::WebCache => self.fetch_web_cache(url).await,
                PageStrategy::Archive => self.fetch_archive(url).await,
            };
            match result {
                Ok(body) => return Ok(body),
                Err(e) => {
                    debug!(url, ?strategy, error = %e, "page strategy failed");
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| FetchError::NoSnapshot { url: url.to_string() }))
    }
}

#[async_trait]
impl PageFetcher for FetchAgent {
    async fn fetch_page(&self, url: &str) -> Result<String, FetchError> {
        self.fetch_with_strategies(url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::RetryConfig;
    use crate::testing::{ScriptedTransport, StaticProxySource};
    use crate::websearch::ProxyProfile;
    use pretty_assertions::assert_eq;

    const PAGE: &str = "https://vi.wikipedia.org/wiki/Bom_nguyên_tử";

    fn fast_config() -> FetchConfig {
        FetchConfig::default().with_retry(
            RetryConfig::new()
                .with_base_delay_ms(1)
                .with_jitter(crate::pipeline::JitterStrategy::None),
        )
    }

    fn agent(transport: Arc<ScriptedTransport>, config: FetchConfig) -> FetchAgent {
        let source: Arc<dyn ProxySource> = Arc::new(StaticProxySource::new(vec![
            ProxyProfile::new("10.0.0.1:8080", 300),
            ProxyProfile::new("10.0.0.2:8080", 900),
        ]));
        FetchAgent::new(config, transport, vec![source])
    }

    #[tokio::test]
    async fn test_fetch_sets_identity_headers() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push(PAGE, HttpResponse::html("<p>ok</p>"));
        let agent = agent(transport.clone(), fast_config().with_cookie("a=1"));

        let body = agent.fetch_text(PAGE, &[]).await.unwrap();

        assert_eq!(body, "<p>ok</p>");
        let request = &transport.requests_to(PAGE)[0];
        assert_eq!(request.header("Accept"), Some("*/*"));
        assert_eq!(request.header("Referer"), Some("https://www.google.com"));
        assert_eq!(request.header("Cookie"), Some("a=1"));
        assert!(request.header("User-Agent").is_some_and(|ua| ua.starts_with("Mozilla/5.0")));
        assert!(request.proxy.is_some());
        assert_eq!(request.timeout, std::time::Duration::from_secs(6));
    }

    #[tokio::test]
    async fn test_fetch_parses_json_bodies() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push(PAGE, HttpResponse::json(&serde_json::json!({"ok": true})));
        let agent = agent(transport, fast_config().without_proxies());

        let body = agent.fetch(PAGE, &[]).await.unwrap();
        assert_eq!(body, FetchBody::Json(serde_json::json!({"ok": true})));
        assert_eq!(agent.state().generation(), 0);
    }

    #[tokio::test]
    async fn test_rate_limit_refreshes_pool_once() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push(PAGE, HttpResponse::status(429));
        transport.push(PAGE, HttpResponse::html("<p>ok</p>"));
        let agent = agent(transport.clone(), fast_config());

        let body = agent.fetch_text(PAGE, &[]).await.unwrap();

        assert_eq!(body, "<p>ok</p>");
        assert_eq!(agent.state().generation(), 2);
        assert_eq!(transport.requests_to(PAGE).len(), 2);
    }

    #[tokio::test]
    async fn test_repeated_rate_limit_is_page_failure() {
        let transport = Arc::new(ScriptedTransport::new());
        for _ in 0..3 {
            transport.push(PAGE, HttpResponse::status(429));
        }
        let agent = agent(transport.clone(), fast_config());

        let err = agent.fetch_text(PAGE, &[]).await.unwrap_err();

        assert_eq!(
            err,
            FetchError::RateLimited {
                url: PAGE.to_string(),
                refreshes: 1
            }
        );
        assert_eq!(transport.requests_to(PAGE).len(), 2);
    }

    #[tokio::test]
    async fn test_transient_errors_retried_then_status_surfaces() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push(PAGE, HttpResponse::status(503));
        transport.push(PAGE, HttpResponse::status(404));
        let agent = agent(transport.clone(), fast_config().without_proxies());

        let err = agent.fetch_text(PAGE, &[]).await.unwrap_err();

        assert_eq!(err, FetchError::status(PAGE, 404));
        assert_eq!(transport.requests_to(PAGE).len(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_refreshes_are_single_flight() {
        let transport = Arc::new(ScriptedTransport::new());
        let agent = agent(transport, fast_config());
        let (_, generation) = agent.current_pool().await;
        assert_eq!(generation, 1);

        let state = agent.state().clone();
        let sources = agent.sources.clone();
        let transport = agent.transport.clone();
        let refreshes = futures::future::join_all((0..8).map(|_| {
            let state = state.clone();
            let sources = sources.clone();
            let transport = transport.clone();
            async move { state.refresh(generation, &sources, transport.as_ref(), 5).await }
        }))
        .await;

        assert_eq!(refreshes.iter().filter(|installed| **installed).count(), 1);
        assert_eq!(state.generation(), 2);
    }

    #[tokio::test]
    async fn test_fetch_page_falls_back_to_web_cache() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push(PAGE, HttpResponse::html(r#"<div id="root"></div>"#));
        transport.push(
            "http://webcache.googleusercontent.com/search",
            HttpResponse::html("<p>cached</p>"),
        );
        let agent = agent(transport.clone(), fast_config().without_proxies());

        assert_eq!(agent.fetch_page(PAGE).await.unwrap(), "<p>cached</p>");
        let cache_request = &transport.requests_to("http://webcache.googleusercontent.com/search")[0];
        assert!(cache_request
            .query
            .contains(&("q".to_string(), format!("cache:{PAGE}"))));
    }

    #[tokio::test]
    async fn test_fetch_page_uses_archive_when_cache_blocked() {
        let transport = Arc::new(ScriptedTransport::new());
        let config = fast_config().without_proxies();
        transport.push(PAGE, HttpResponse::status(403));
        transport.push(
            "http://webcache.googleusercontent.com/search",
            HttpResponse::html(format!("<p>{}</p>", config.block_marker)),
        );
        transport.push(
            "https://archive.org/wayback/available",
            HttpResponse::json(&serde_json::json!({
                "archived_snapshots": {"closest": {"url": "https://web.archive.org/web/2023/page"}}
            })),
        );
        transport.push("https://web.archive.org/web/2023/page", HttpResponse::html("<p>archived</p>"));
        let agent = agent(transport, config);

        assert_eq!(agent.fetch_page(PAGE).await.unwrap(), "<p>archived</p>");
    }

    #[tokio::test]
    async fn test_fetch_page_exhausted() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push(PAGE, HttpResponse::status(403));
        transport.push(
            "https://archive.org/wayback/available",
            HttpResponse::json(&serde_json::json!({"archived_snapshots": {}})),
        );
        let agent = agent(
            transport,
            fast_config()
                .without_proxies()
                .with_page_strategies(vec![PageStrategy::Direct, PageStrategy::Archive]),
        );

        let err = agent.fetch_page(PAGE).await.unwrap_err();
        assert_eq!(err, FetchError::NoSnapshot { url: PAGE.to_string() });
    }

    #[test]
    fn test_generated_user_agent_shape() {
        let mut rng = rand::thread_rng();
        for _ in 0..20 {
            let ua = generated_user_agent(&mut rng);
            assert!(ua.starts_with("Mozilla/5.0"));
            assert!(ua.contains("Chrome/") || ua.contains("Firefox/"));
        }
    }
}
