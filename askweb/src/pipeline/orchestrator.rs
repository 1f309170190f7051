//! The tiered answer pipeline.
//!
//! A question is answered by the first tier that produces something:
//!
//! 1. the vector store, when it holds enough records and has a close match;
//! 2. a search snippet that already reads as a finished sentence;
//! 3. the crawl: every search result is fetched, extracted and ranked
//!    concurrently, then the per-page rankings are merged;
//! 4. the LLM fallback chain.
//!
//! Failing to answer is a normal outcome ([`AnswerTier::Exhausted`]), not an
//! error.

use futures::FutureExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{timeout_at, Instant};
use tracing::{debug, field, info, instrument, warn, Span};
use uuid::Uuid;

use super::config::{AskConfig, PipelineConfig};
use super::failure_tolerance::{FailureCollector, FailureRecord, FailureSummary, PageStage};
use super::fallback::FallbackChain;
use super::store::{DocumentBatch, Embedder, StoreMatch, VectorStore};
use crate::errors::ConfigError;
use crate::events::{names, EventSink, NoOpEventSink};
use crate::observability::{AnswerSpanAttributes, SpanTimer};
use crate::ranking::{RankOutcome, RankedResult, Ranker};
use crate::websearch::{
    source_domain, ContentExtractor, CrawlProgress, FetchAgent, GoogleSearch, PageFetcher, SearchEngine,
    SearchResultItem,
};

/// The tier that produced an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerTier {
    /// Close matches from the vector store.
    Cache,
    /// A search snippet that was already a complete sentence.
    Snippet,
    /// Sentences ranked from crawled pages.
    Crawl,
    /// An answer from the LLM fallback chain.
    Fallback,
    /// Nothing answered; the results hold the no-match sentinel.
    Exhausted,
}

impl AnswerTier {
    /// Name used in logs and events.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cache => "cache",
            Self::Snippet => "snippet",
            Self::Crawl => "crawl",
            Self::Fallback => "fallback",
            Self::Exhausted => "exhausted",
        }
    }
}

/// Result of one `answer` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerOutcome {
    /// Run id, also recorded on the `answer` span.
    pub run_id: Uuid,
    /// Tier that produced `results`.
    pub tier: AnswerTier,
    /// Ranked results, best first.
    pub results: Vec<RankedResult>,
    /// Page outcomes, when the crawl tier ran.
    pub crawl: Option<FailureSummary>,
    /// Wall time in milliseconds.
    pub duration_ms: f64,
}

impl AnswerOutcome {
    /// Whether any tier answered.
    #[must_use]
    pub fn is_answered(&self) -> bool {
        self.tier != AnswerTier::Exhausted
    }

    /// The best result.
    #[must_use]
    pub fn best(&self) -> Option<&RankedResult> {
        self.results.first()
    }

    /// Span attributes describing this run.
    #[must_use]
    pub fn span_attributes(&self, question: &str) -> AnswerSpanAttributes {
        let mut attributes = AnswerSpanAttributes::new()
            .with_run_id(self.run_id.to_string())
            .with_question(question)
            .with_tier(self.tier.as_str())
            .with_results(self.results.len())
            .with_duration_ms(self.duration_ms);
        if let Some(crawl) = &self.crawl {
            attributes = attributes.with_pages(crawl.total_pages, crawl.failed_pages);
        }
        attributes
    }

    /// Converts to dictionary.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("run_id".to_string(), serde_json::json!(self.run_id.to_string()));
        map.insert("tier".to_string(), serde_json::json!(self.tier.as_str()));
        map.insert(
            "results".to_string(),
            serde_json::json!(self.results.iter().map(RankedResult::to_dict).collect::<Vec<_>>()),
        );
        if let Some(crawl) = &self.crawl {
            map.insert("crawl".to_string(), serde_json::json!(crawl.to_dict()));
        }
        map.insert("duration_ms".to_string(), serde_json::json!(self.duration_ms));
        map
    }
}

/// Whether a search snippet already ends in a finished sentence.
///
/// The text after the last `.` must be shorter than two characters.
/// Snippets cut off with an ellipsis never qualify.
#[must_use]
pub fn snippet_is_complete(snippet: &str) -> bool {
    let snippet = snippet.trim();
    if snippet.ends_with("...") || snippet.ends_with('…') || !snippet.contains('.') {
        return false;
    }
    snippet
        .rsplit('.')
        .next()
        .is_some_and(|tail| tail.chars().count() < 2)
}

/// Prompt sent to the fallback chain: the question, then any context.
#[must_use]
pub fn fallback_prompt(question: &str, context: Option<&str>) -> String {
    let question = question.trim();
    match context.map(str::trim).filter(|c| !c.is_empty()) {
        Some(context) => format!("{}? {context}", question.trim_end_matches('?')),
        None => question.to_string(),
    }
}

struct PageJob {
    index: usize,
    url: String,
    topic: Option<String>,
}

struct PageDone {
    index: usize,
    url: String,
    result: Result<Vec<RankedResult>, FailureRecord>,
}

struct CrawlReport {
    outcome: RankOutcome,
    summary: FailureSummary,
    sentences: Vec<RankedResult>,
}

async fn process_page(
    fetcher: Arc<dyn PageFetcher>,
    extractor: Arc<ContentExtractor>,
    ranker: Arc<Ranker>,
    question: Arc<str>,
    job: &PageJob,
) -> Result<Vec<RankedResult>, FailureRecord> {
    let html = fetcher
        .fetch_page(&job.url)
        .await
        .map_err(|e| FailureRecord::from_fetch(&job.url, &e))?;
    let topic = job.topic.as_deref();
    let candidates = extractor
        .extract(&html, topic, &job.url)
        .map_err(|e| FailureRecord::from_extract(&job.url, &e))?;
    Ok(ranker.rank(&question, topic, &candidates))
}

/// Answers questions from the store, the web, or an LLM, in that order.
pub struct AnswerPipeline {
    config: PipelineConfig,
    search: Arc<dyn SearchEngine>,
    fetcher: Arc<dyn PageFetcher>,
    extractor: Arc<ContentExtractor>,
    ranker: Arc<Ranker>,
    store: Option<Arc<dyn VectorStore>>,
    embedder: Option<Arc<dyn Embedder>>,
    fallback: Option<Arc<FallbackChain>>,
    events: Arc<dyn EventSink>,
    pending_writes: Mutex<Vec<JoinHandle<()>>>,
}

impl fmt::Debug for AnswerPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnswerPipeline")
            .field("config", &self.config)
            .field("has_store", &self.store.is_some())
            .field("fallback", &self.fallback)
            .field("pending_writes", &self.pending_writes.lock().len())
            .finish_non_exhaustive()
    }
}

impl AnswerPipeline {
    /// Creates a pipeline over the given search engine and page fetcher.
    ///
    /// The store and fallback tiers are off until configured.
    pub fn new(
        config: &AskConfig,
        search: Arc<dyn SearchEngine>,
        fetcher: Arc<dyn PageFetcher>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config: config.pipeline.clone(),
            search,
            fetcher,
            extractor: Arc::new(ContentExtractor::new(config.extraction.clone())?),
            ranker: Arc::new(Ranker::new(config.ranking.clone())),
            store: None,
            embedder: None,
            fallback: None,
            events: Arc::new(NoOpEventSink),
            pending_writes: Mutex::new(Vec::new()),
        })
    }

    /// Creates a pipeline that searches Google and fetches over HTTP, sharing
    /// one fetch agent between both.
    pub fn from_config(config: &AskConfig) -> Result<Self, ConfigError> {
        let agent = Arc::new(FetchAgent::with_reqwest(config.fetch.clone()));
        let search = Arc::new(GoogleSearch::new(config.search.clone(), Arc::clone(&agent)));
        Self::new(config, search, agent)
    }

    /// Enables the cache tier and write-back.
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn VectorStore>, embedder: Arc<dyn Embedder>) -> Self {
        self.store = Some(store);
        self.embedder = Some(embedder);
        self
    }

    /// Enables the fallback tier.
    #[must_use]
    pub fn with_fallback(mut self, chain: Arc<FallbackChain>) -> Self {
        self.fallback = Some(chain);
        self
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// The tier policy.
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Answers a question.
    #[instrument(skip(self), fields(run_id = field::Empty, tier = field::Empty))]
    pub async fn answer(&self, question: &str) -> AnswerOutcome {
        let timer = SpanTimer::start("answer");
        let run_id = Uuid::new_v4();
        let span = Span::current();
        span.record("run_id", field::display(run_id));

        let question = question.trim();
        let (tier, results, crawl) = self.run_tiers(question).await;
        span.record("tier", tier.as_str());

        let outcome = AnswerOutcome {
            run_id,
            tier,
            results,
            crawl,
            duration_ms: timer.elapsed_ms(),
        };
        info!(
            tier = tier.as_str(),
            results = outcome.results.len(),
            attributes = ?outcome.span_attributes(question).to_otel_attributes(),
            "answered question"
        );
        outcome
    }

    async fn run_tiers(&self, question: &str) -> (AnswerTier, Vec<RankedResult>, Option<FailureSummary>) {
        if let Some(results) = self.cache_tier(question).await {
            return (AnswerTier::Cache, results, None);
        }

        let items = match self.search.query(question).await {
            Ok(items) => items,
            Err(e) => {
                warn!(error = %e, "search failed");
                Vec::new()
            }
        };

        if self.config.snippet_shortcut {
            if let Some(result) = self.snippet_answer(question, &items) {
                return (AnswerTier::Snippet, vec![result], None);
            }
        }

        let report = self.crawl(question, &items).await;
        if let RankOutcome::Ranked(results) = report.outcome {
            self.persist(report.sentences);
            return (AnswerTier::Crawl, results, Some(report.summary));
        }

        if let Some(result) = self.fallback_tier(question, &items).await {
            return (AnswerTier::Fallback, vec![result], Some(report.summary));
        }

        self.events
            .emit(names::ANSWER_EXHAUSTED, Some(serde_json::json!({"urls": items.len()})))
            .await;
        (AnswerTier::Exhausted, RankOutcome::NoMatch.into_results(), Some(report.summary))
    }

    async fn skip_cache(&self, reason: &str) -> Option<Vec<RankedResult>> {
        debug!(reason, "cache tier skipped");
        self.events
            .emit(names::CACHE_SKIPPED, Some(serde_json::json!({"reason": reason})))
            .await;
        None
    }

    async fn cache_tier(&self, question: &str) -> Option<Vec<RankedResult>> {
        let (Some(store), Some(embedder)) = (&self.store, &self.embedder) else {
            return self.skip_cache("no_store").await;
        };

        match store.count().await {
            Ok(count) if count >= self.config.min_cache_records => {}
            Ok(count) => {
                debug!(count, min = self.config.min_cache_records, "cache is cold");
                return self.skip_cache("cold").await;
            }
            Err(e) => {
                warn!(error = %e, "store count failed");
                return self.skip_cache("store_error").await;
            }
        }

        let vector = match embedder.embed(question).await {
            Ok(vector) => vector,
            Err(e) => {
                warn!(error = %e, "question embedding failed");
                return self.skip_cache("embedding_error").await;
            }
        };
        let matches = match store
            .query(&vector, self.config.cache_threshold, self.config.cache_limit)
            .await
        {
            Ok(matches) => matches,
            Err(e) => {
                warn!(error = %e, "store query failed");
                return self.skip_cache("store_error").await;
            }
        };
        if matches.is_empty() {
            return self.skip_cache("miss").await;
        }

        self.events
            .emit(names::CACHE_HIT, Some(serde_json::json!({"matches": matches.len()})))
            .await;
        Some(matches.into_iter().map(StoreMatch::into_ranked).collect())
    }

    fn snippet_answer(&self, question: &str, items: &[SearchResultItem]) -> Option<RankedResult> {
        let item = items.iter().find(|item| snippet_is_complete(&item.snippet))?;
        let snippet = item.snippet.trim();
        debug!(url = %item.url, "answering from search snippet");
        Some(RankedResult::new(
            snippet,
            source_domain(&item.url),
            self.ranker.score(question, snippet),
        ))
    }

    async fn crawl(&self, question: &str, items: &[SearchResultItem]) -> CrawlReport {
        self.events
            .emit(names::CRAWL_STARTED, Some(serde_json::json!({"urls": items.len()})))
            .await;

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency.max(1)));
        let question: Arc<str> = Arc::from(question);
        let mut set = JoinSet::new();
        for (index, item) in items.iter().enumerate() {
            let job = PageJob {
                index,
                url: item.url.clone(),
                topic: Some(item.snippet.trim().to_string()).filter(|t| !t.is_empty()),
            };
            let fetcher = Arc::clone(&self.fetcher);
            let extractor = Arc::clone(&self.extractor);
            let ranker = Arc::clone(&self.ranker);
            let question = Arc::clone(&question);
            let semaphore = Arc::clone(&semaphore);
            set.spawn(async move {
                let result = match semaphore.acquire_owned().await {
                    Ok(_permit) => AssertUnwindSafe(process_page(fetcher, extractor, ranker, question, &job))
                        .catch_unwind()
                        .await
                        .unwrap_or_else(|_| Err(FailureRecord::new(&job.url, PageStage::Task, "page task panicked"))),
                    Err(_) => Err(FailureRecord::new(&job.url, PageStage::Task, "fan-out closed")),
                };
                PageDone {
                    index: job.index,
                    url: job.url,
                    result,
                }
            });
        }

        let deadline = Instant::now() + self.config.deadline();
        let mut pages: Vec<Option<Vec<RankedResult>>> = vec![None; items.len()];
        let mut collector = FailureCollector::new();
        let mut progress = CrawlProgress::new(items.len());
        let mut timed_out = false;
        loop {
            let next = timeout_at(deadline, set.join_next()).await;
            match next {
                Ok(Some(Ok(done))) => match done.result {
                    Ok(results) => {
                        collector.record_completion(&done.url);
                        progress.record_success(results.len());
                        self.events
                            .emit(
                                names::PAGE_COMPLETED,
                                Some(serde_json::json!({"url": done.url, "sentences": results.len()})),
                            )
                            .await;
                        pages[done.index] = Some(results);
                    }
                    Err(record) => {
                        progress.record_error();
                        self.record_failure(&mut collector, record).await;
                    }
                },
                Ok(Some(Err(e))) => warn!(error = %e, "page task did not complete"),
                Ok(None) => break,
                Err(_) => {
                    timed_out = true;
                    set.abort_all();
                    warn!(deadline_s = self.config.deadline_seconds, "crawl deadline passed");
                    break;
                }
            }
            debug!(percent = progress.percent(), "crawl progress");
        }

        for item in items {
            if !collector.is_settled(&item.url) {
                let (stage, error) = if timed_out {
                    (PageStage::Deadline, "crawl deadline passed")
                } else {
                    (PageStage::Task, "page task did not complete")
                };
                progress.record_error();
                self.record_failure(&mut collector, FailureRecord::new(&item.url, stage, error))
                    .await;
            }
        }

        let summary = collector.summary(items.len());
        let topics_used = items.iter().any(|item| !item.snippet.trim().is_empty());
        let sentences: Vec<RankedResult> = pages.iter().flatten().flatten().cloned().collect();
        let outcome = self.ranker.aggregate(pages.into_iter().flatten().collect(), topics_used);

        info!(
            pages = items.len(),
            failed = summary.failed_pages,
            sentences = progress.sentence_count,
            no_match = outcome.is_no_match(),
            "crawl finished"
        );
        self.events
            .emit(names::CRAWL_COMPLETED, Some(serde_json::json!(summary.to_dict())))
            .await;

        CrawlReport {
            outcome,
            summary,
            sentences,
        }
    }

    async fn record_failure(&self, collector: &mut FailureCollector, record: FailureRecord) {
        debug!(url = %record.url, stage = record.stage.as_str(), error = %record.error, "page failed");
        self.events
            .emit(
                names::PAGE_FAILED,
                Some(serde_json::json!({
                    "url": record.url,
                    "stage": record.stage.as_str(),
                    "error": record.error,
                })),
            )
            .await;
        collector.record_failure(record);
    }

    fn persist(&self, sentences: Vec<RankedResult>) {
        if !self.config.persist_results {
            return;
        }
        let (Some(store), Some(embedder)) = (self.store.clone(), self.embedder.clone()) else {
            return;
        };
        let batch = DocumentBatch::from_ranked(&sentences);
        if batch.is_empty() {
            return;
        }

        let events = Arc::clone(&self.events);
        let handle = tokio::spawn(async move {
            let written = match batch.embed(embedder.as_ref()).await {
                Ok(records) => store.insert(records).await,
                Err(e) => Err(e),
            };
            match written {
                Ok(inserted) => debug!(inserted, "persisted crawl results"),
                Err(e) => {
                    warn!(error = %e, "could not persist crawl results");
                    events
                        .emit(names::STORE_PERSIST_FAILED, Some(serde_json::json!(e.to_dict())))
                        .await;
                }
            }
        });
        let mut pending = self.pending_writes.lock();
        pending.retain(|handle| !handle.is_finished());
        pending.push(handle);
    }

    /// Waits for background store writes started by earlier answers.
    pub async fn flush_writes(&self) {
        let handles = std::mem::take(&mut *self.pending_writes.lock());
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "store write task failed");
            }
        }
    }

    async fn fallback_tier(&self, question: &str, items: &[SearchResultItem]) -> Option<RankedResult> {
        let chain = self.fallback.as_ref()?;
        let context = items.iter().map(|item| item.snippet.as_str()).find(|s| !s.trim().is_empty());
        self.events
            .emit(
                names::FALLBACK_INVOKED,
                Some(serde_json::json!({"backends": chain.backend_names()})),
            )
            .await;
        match chain.answer(&fallback_prompt(question, context)).await {
            Ok(result) => Some(result),
            Err(e) => {
                warn!(error = %e, "fallback chain gave no answer");
                None
            }
        }
    }
}
