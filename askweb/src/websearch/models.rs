//! Data models for search results, proxies and HTTP exchanges.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::errors::FetchError;

/// One search engine result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResultItem {
    /// Result title.
    pub title: String,
    /// Target URL with redirect wrapping removed.
    pub url: String,
    /// Normalized snippet text.
    pub snippet: String,
}

impl SearchResultItem {
    /// Creates a result item.
    #[must_use]
    pub fn new(title: impl Into<String>, url: impl Into<String>, snippet: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            snippet: snippet.into(),
        }
    }

    /// Converts to dictionary.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut dict = HashMap::new();
        dict.insert("title".to_string(), serde_json::json!(self.title));
        dict.insert("url".to_string(), serde_json::json!(self.url));
        dict.insert("snippet".to_string(), serde_json::json!(self.snippet));
        dict
    }
}

/// An outbound proxy and its measured latency.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProxyProfile {
    /// `host:port`.
    pub address: String,
    /// Latency reported by the proxy list.
    pub measured_latency_ms: u64,
}

impl ProxyProfile {
    /// Creates a proxy profile.
    #[must_use]
    pub fn new(address: impl Into<String>, measured_latency_ms: u64) -> Self {
        Self {
            address: address.into(),
            measured_latency_ms,
        }
    }

    /// Proxy URL understood by the HTTP client.
    #[must_use]
    pub fn url(&self) -> String {
        if self.address.contains("://") {
            self.address.clone()
        } else {
            format!("http://{}", self.address)
        }
    }
}

/// A request handed to a [`Transport`](super::Transport).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    /// Target URL without query string parameters from `query`.
    pub url: String,
    /// Query parameters, appended URL-encoded.
    pub query: Vec<(String, String)>,
    /// Request headers.
    pub headers: Vec<(String, String)>,
    /// Proxy URL, or `None` for a direct connection.
    pub proxy: Option<String>,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl HttpRequest {
    /// Creates a GET request with no headers, no proxy and a 10 s timeout.
    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            query: Vec::new(),
            headers: Vec::new(),
            proxy: None,
            timeout: Duration::from_secs(10),
        }
    }

    /// Adds a query parameter.
    #[must_use]
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Adds a header.
    #[must_use]
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    /// Returns the first header with this name, case-insensitively.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// A response returned by a [`Transport`](super::Transport).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Content type header, if any.
    pub content_type: Option<String>,
    /// Response body.
    pub body: String,
}

impl HttpResponse {
    /// A 200 response with an HTML body.
    #[must_use]
    pub fn html(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            content_type: Some("text/html; charset=utf-8".to_string()),
            body: body.into(),
        }
    }

    /// A 200 response with a JSON body.
    #[must_use]
    pub fn json(value: &serde_json::Value) -> Self {
        Self {
            status: 200,
            content_type: Some("application/json".to_string()),
            body: value.to_string(),
        }
    }

    /// An empty response with the given status.
    #[must_use]
    pub fn status(status: u16) -> Self {
        Self {
            status,
            content_type: None,
            body: String::new(),
        }
    }

    /// Whether the status is 2xx.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Whether the content type is JSON.
    #[must_use]
    pub fn is_json(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|ct| ct.contains("json"))
    }
}

/// A decoded response body.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchBody {
    /// Text body (HTML or plain text).
    Text(String),
    /// Parsed JSON body.
    Json(serde_json::Value),
}

impl FetchBody {
    /// Returns the text, serializing JSON bodies.
    #[must_use]
    pub fn into_text(self) -> String {
        match self {
            Self::Text(text) => text,
            Self::Json(value) => value.to_string(),
        }
    }

    /// Returns the JSON value, parsing text bodies.
    pub fn into_json(self, url: &str) -> Result<serde_json::Value, FetchError> {
        match self {
            Self::Json(value) => Ok(value),
            Self::Text(text) => {
                serde_json::from_str(&text).map_err(|e| FetchError::decode(url, e.to_string()))
            }
        }
    }
}

/// Outcome of fetching one candidate URL. Failures are values, never panics.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    /// The requested URL.
    pub url: String,
    /// The page HTML, or why none could be obtained.
    pub html: Result<String, FetchError>,
}

impl FetchOutcome {
    /// Whether a body was obtained.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.html.is_ok()
    }
}
