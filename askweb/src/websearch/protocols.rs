//! Protocol traits for websearch components.
//!
//! These traits define the seams between the network, the proxy lists, the
//! search engine and the orchestrator, so each can be replaced in tests.

use async_trait::async_trait;

use super::models::{HttpRequest, HttpResponse, ProxyProfile, SearchResultItem};
use crate::errors::{FetchError, SearchError};

/// Sends one HTTP request.
///
/// Implementations report transport failures as [`FetchError::Timeout`] or
/// [`FetchError::Connection`] and return every HTTP status, including
/// errors, as a response.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends the request.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, FetchError>;
}

/// A source of candidate proxies.
#[async_trait]
pub trait ProxySource: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Downloads and parses the proxy list.
    async fn fetch_proxies(&self, transport: &dyn Transport) -> Result<Vec<ProxyProfile>, FetchError>;
}

/// Queries a search engine.
#[async_trait]
pub trait SearchEngine: Send + Sync {
    /// Returns filtered results for the question.
    async fn query(&self, question: &str) -> Result<Vec<SearchResultItem>, SearchError>;
}

/// Fetches a page's HTML, using whatever anti-block strategies it has.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Returns the page HTML.
    async fn fetch_page(&self, url: &str) -> Result<String, FetchError>;
}
