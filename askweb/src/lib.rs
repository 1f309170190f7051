//! # Askweb
//!
//! Answers short factual questions, mostly Vietnamese, from the open web.
//!
//! A question goes through a tiered pipeline:
//!
//! - **Cache**: a vector store of previously ranked sentences
//! - **Snippet**: a search snippet that already reads as an answer
//! - **Crawl**: result pages fetched concurrently through a rotating proxy
//!   pool, reduced to their answer area, split into sentences and ranked by
//!   fuzzy token similarity
//! - **Fallback**: a prioritized chain of LLM backends
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use askweb::prelude::*;
//!
//! init_tracing(TracingFormat::Pretty)?;
//! let pipeline = AnswerPipeline::from_config(&AskConfig::from_json_file("askweb.json")?)?;
//! let outcome = pipeline.answer("Ai chế tạo ra bom nguyên tử?").await;
//! for result in &outcome.results {
//!     println!("{:.2} {} ({})", result.score, result.text, result.source_domain);
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod errors;
pub mod events;
pub mod observability;
pub mod ranking;
pub mod text;

#[cfg(feature = "websearch")]
pub mod pipeline;
#[cfg(feature = "websearch")]
pub mod websearch;

#[cfg(feature = "websearch")]
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::errors::{AskError, ConfigError, ExtractError, FetchError, LlmError, SearchError, StoreError};
    pub use crate::events::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::observability::{init_tracing, TracingFormat};
    pub use crate::ranking::{CandidateSentence, RankOutcome, RankedResult, Ranker, RankingConfig};
    pub use crate::text::{segment, SentenceSegmenter};

    #[cfg(feature = "websearch")]
    pub use crate::pipeline::{
        AnswerOutcome, AnswerPipeline, AnswerTier, AskConfig, DocumentBatch, Embedder, FallbackChain,
        InMemoryVectorStore, LlmBackend, PipelineConfig, VectorStore,
    };
    #[cfg(feature = "websearch")]
    pub use crate::websearch::{
        ContentExtractor, FetchAgent, FetchConfig, GoogleSearch, PageFetcher, SearchConfig, SearchEngine,
        SearchResultItem,
    };
}
