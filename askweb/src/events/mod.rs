//! Event emission for the answer pipeline.
//!
//! The orchestrator reports tier transitions and per-page outcomes through an
//! [`EventSink`]. Sinks never fail the pipeline; a sink that cannot deliver an
//! event logs and drops it.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

/// Event type names emitted by the orchestrator.
pub mod names {
    /// The cache tier answered the question.
    pub const CACHE_HIT: &str = "tier.cache.hit";
    /// The cache tier was skipped or produced nothing.
    pub const CACHE_SKIPPED: &str = "tier.cache.skipped";
    /// The crawl tier started.
    pub const CRAWL_STARTED: &str = "tier.crawl.started";
    /// One page produced ranked sentences.
    pub const PAGE_COMPLETED: &str = "page.completed";
    /// One page failed to fetch or extract.
    pub const PAGE_FAILED: &str = "page.failed";
    /// The crawl tier finished.
    pub const CRAWL_COMPLETED: &str = "tier.crawl.completed";
    /// The LLM fallback tier was consulted.
    pub const FALLBACK_INVOKED: &str = "tier.fallback.invoked";
    /// No tier produced an answer.
    pub const ANSWER_EXHAUSTED: &str = "answer.exhausted";
    /// Writing crawl results back to the store failed.
    pub const STORE_PERSIST_FAILED: &str = "store.persist_failed";
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_sinks_behind_trait_object() {
        let collecting = Arc::new(CollectingEventSink::new());
        let sinks: Vec<Arc<dyn EventSink>> = vec![
            Arc::new(NoOpEventSink),
            Arc::new(LoggingEventSink::default()),
            collecting.clone(),
        ];

        for sink in &sinks {
            sink.emit(names::CRAWL_STARTED, Some(serde_json::json!({"urls": 2}))).await;
            sink.try_emit(names::PAGE_FAILED, None);
        }

        assert_eq!(collecting.len(), 2);
        assert_eq!(collecting.count(names::PAGE_FAILED), 1);
    }

    #[test]
    fn test_event_names_are_namespaced() {
        for name in [
            names::CACHE_HIT,
            names::CACHE_SKIPPED,
            names::CRAWL_STARTED,
            names::CRAWL_COMPLETED,
            names::FALLBACK_INVOKED,
        ] {
            assert!(name.starts_with("tier."), "{name}");
        }
        assert!(names::PAGE_COMPLETED.starts_with("page."));
    }
}
