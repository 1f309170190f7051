//! Web access and content extraction.
//!
//! This module provides:
//! - A fetch agent with identity rotation, a shared proxy pool and
//!   anti-block page strategies
//! - A search client for the Google result page
//! - Content extraction from arbitrary HTML into candidate sentences
//! - Configuration, data models and protocol traits for pluggable components

mod agent;
mod config;
mod extractor;
mod google;
mod models;
mod normalize;
mod protocols;
mod proxy;
mod run_utils;
mod transport;

pub use agent::{FetchAgent, FetchAgentState};
pub use config::{ExtractionConfig, FetchConfig, PageStrategy, SearchConfig, MAX_WAIT_SECONDS};
pub(crate) use config::seconds_to_duration;
pub use extractor::ContentExtractor;
pub use google::{parse_results, GoogleSearch, ParsedPage};
pub use models::{FetchBody, FetchOutcome, HttpRequest, HttpResponse, ProxyProfile, SearchResultItem};
pub use normalize::{collapse_whitespace, decode_entities, normalize_snippet, normalize_text, strip_citations};
pub use protocols::{PageFetcher, ProxySource, SearchEngine, Transport};
pub use proxy::{parse_checkerproxy, parse_proxynova, CheckerProxySource, ProxyNovaSource, ProxyPool, MAX_POOL_SIZE};
pub use run_utils::{source_domain, unwrap_redirect, CrawlProgress};
pub use transport::ReqwestTransport;
