//! The answer pipeline and its collaborators.
//!
//! This module provides:
//! - The tiered orchestrator (cache, crawl, LLM fallback)
//! - Retry with backoff for transient failures
//! - Per-page failure bookkeeping for the crawl fan-out
//! - Vector store and embedding seams, with an in-memory store
//! - The prioritized LLM fallback chain
//! - Pipeline configuration loaded from JSON

mod config;
mod failure_tolerance;
mod fallback;
mod orchestrator;
mod retry;
mod store;

#[cfg(test)]
mod integration_tests;

pub use config::{AskConfig, PipelineConfig};
pub use failure_tolerance::{FailureCollector, FailureRecord, FailureSummary, PageStage};
pub use fallback::{clean_answer, is_refusal, FallbackChain, LlmBackend, DEFAULT_FAILURE_THRESHOLD, REFUSAL_PHRASES};
pub use orchestrator::{fallback_prompt, snippet_is_complete, AnswerOutcome, AnswerPipeline, AnswerTier};
pub use retry::{
    should_retry, with_retry, with_retry_if, BackoffStrategy, JitterStrategy, RetryConfig, RetryDecision,
    RetryState,
};
pub use store::{
    cosine_distance, record_id, BatchEntry, DocumentBatch, Embedder, InMemoryVectorStore, StoreMatch, StoreRecord,
    VectorStore,
};
