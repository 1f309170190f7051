//! Error types for the askweb pipeline.
//!
//! Every failure below the orchestrator boundary is represented by one of the
//! typed errors in this module. Most of them are recovered locally (a page that
//! cannot be fetched simply contributes no sentences); only configuration
//! problems are meant to reach the caller.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// The crate-level error type.
#[derive(Debug, Error)]
pub enum AskError {
    /// A fetch failed.
    #[error("{0}")]
    Fetch(#[from] FetchError),

    /// The search engine query failed.
    #[error("{0}")]
    Search(#[from] SearchError),

    /// Content extraction failed for a page.
    #[error("{0}")]
    Extract(#[from] ExtractError),

    /// The external store failed.
    #[error("{0}")]
    Store(#[from] StoreError),

    /// The LLM fallback failed.
    #[error("{0}")]
    Llm(#[from] LlmError),

    /// Configuration is invalid.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// A background task could not be joined.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AskError {
    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        match self {
            Self::Fetch(e) => e.to_dict(),
            Self::Search(e) => e.to_dict(),
            Self::Extract(e) => e.to_dict(),
            Self::Store(e) => e.to_dict(),
            Self::Llm(e) => e.to_dict(),
            Self::Config(e) => e.to_dict(),
            Self::Internal(message) => {
                let mut map = HashMap::new();
                map.insert("type".to_string(), serde_json::json!("Internal"));
                map.insert("message".to_string(), serde_json::json!(message));
                map
            }
        }
    }
}

/// Failure of a single outbound request made by the fetch agent.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    /// The request timed out.
    #[error("Timeout fetching {url}")]
    Timeout {
        /// The requested URL.
        url: String,
    },

    /// The connection failed (refused, reset, proxy unreachable).
    #[error("Connection error fetching {url}: {message}")]
    Connection {
        /// The requested URL.
        url: String,
        /// Transport message.
        message: String,
    },

    /// The server answered with a non-success status.
    #[error("HTTP {code} from {url}")]
    Status {
        /// The requested URL.
        url: String,
        /// The HTTP status code.
        code: u16,
    },

    /// The server kept answering 429 after the allowed pool refreshes.
    #[error("Rate limited by {url} after {refreshes} proxy refresh(es)")]
    RateLimited {
        /// The requested URL.
        url: String,
        /// Number of pool refreshes already spent on this request.
        refreshes: usize,
    },

    /// The body is a block or challenge page.
    #[error("Blocked page from {url} (marker: {marker})")]
    Blocked {
        /// The requested URL.
        url: String,
        /// The marker string that was found.
        marker: String,
    },

    /// The archive has no snapshot for the URL.
    #[error("No archived snapshot for {url}")]
    NoSnapshot {
        /// The requested URL.
        url: String,
    },

    /// The body could not be decoded.
    #[error("Could not decode body from {url}: {message}")]
    Decode {
        /// The requested URL.
        url: String,
        /// Decoder message.
        message: String,
    },

    /// No proxy source produced a usable list.
    #[error("Proxy list unavailable: {message}")]
    ProxyList {
        /// Why the list could not be built.
        message: String,
    },
}

impl FetchError {
    /// Creates a connection error.
    #[must_use]
    pub fn connection(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Connection {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Creates a status error.
    #[must_use]
    pub fn status(url: impl Into<String>, code: u16) -> Self {
        Self::Status {
            url: url.into(),
            code,
        }
    }

    /// Creates a decode error.
    #[must_use]
    pub fn decode(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Creates a proxy list error.
    #[must_use]
    pub fn proxy_list(message: impl Into<String>) -> Self {
        Self::ProxyList {
            message: message.into(),
        }
    }

    /// Whether the failure is transient and worth another attempt.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::Connection { .. } => true,
            Self::Status { code, .. } => *code >= 500,
            _ => false,
        }
    }

    /// Short type name used in diagnostics and events.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => "Timeout",
            Self::Connection { .. } => "Connection",
            Self::Status { .. } => "Status",
            Self::RateLimited { .. } => "RateLimited",
            Self::Blocked { .. } => "Blocked",
            Self::NoSnapshot { .. } => "NoSnapshot",
            Self::Decode { .. } => "Decode",
            Self::ProxyList { .. } => "ProxyList",
        }
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("type".to_string(), serde_json::json!(self.kind()));

        match self {
            Self::Timeout { url } | Self::NoSnapshot { url } => {
                map.insert("url".to_string(), serde_json::json!(url));
            }
            Self::Connection { url, message } | Self::Decode { url, message } => {
                map.insert("url".to_string(), serde_json::json!(url));
                map.insert("detail".to_string(), serde_json::json!(message));
            }
            Self::Status { url, code } => {
                map.insert("url".to_string(), serde_json::json!(url));
                map.insert("status".to_string(), serde_json::json!(code));
            }
            Self::RateLimited { url, refreshes } => {
                map.insert("url".to_string(), serde_json::json!(url));
                map.insert("refreshes".to_string(), serde_json::json!(refreshes));
            }
            Self::Blocked { url, marker } => {
                map.insert("url".to_string(), serde_json::json!(url));
                map.insert("marker".to_string(), serde_json::json!(marker));
            }
            Self::ProxyList { message } => {
                map.insert("detail".to_string(), serde_json::json!(message));
            }
        }

        map.insert("retryable".to_string(), serde_json::json!(self.is_retryable()));
        map.insert("message".to_string(), serde_json::json!(self.to_string()));
        map
    }
}

/// Failure of a search engine query.
#[derive(Debug, Clone, Error)]
pub enum SearchError {
    /// The result page could not be fetched.
    #[error("Search request failed: {0}")]
    Fetch(#[from] FetchError),

    /// The engine answered with something that is not a result page.
    #[error("Unexpected search response: {0}")]
    UnexpectedBody(String),
}

impl SearchError {
    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = match self {
            Self::Fetch(inner) => {
                let mut map = HashMap::new();
                let inner: serde_json::Map<String, serde_json::Value> =
                    inner.to_dict().into_iter().collect();
                map.insert("cause".to_string(), serde_json::Value::Object(inner));
                map
            }
            Self::UnexpectedBody(detail) => {
                let mut map = HashMap::new();
                map.insert("detail".to_string(), serde_json::json!(detail));
                map
            }
        };
        map.insert("type".to_string(), serde_json::json!("SearchError"));
        map.insert("message".to_string(), serde_json::json!(self.to_string()));
        map
    }
}

/// The per-page extraction state machine.
///
/// A page only ever moves forward through these states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionStage {
    /// Raw HTML is available.
    Fetched,
    /// A focus area was chosen.
    FocusAreaSelected,
    /// The focus area text was normalized.
    Normalized,
    /// The text was split into sentences.
    Segmented,
}

impl fmt::Display for ExtractionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Fetched => "fetched",
            Self::FocusAreaSelected => "focus_area_selected",
            Self::Normalized => "normalized",
            Self::Segmented => "segmented",
        };
        f.write_str(name)
    }
}

/// Failure to produce candidate sentences from a page.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Extraction stopped after '{stage}': {reason}")]
pub struct ExtractError {
    /// The last state the page reached.
    pub stage: ExtractionStage,
    /// Why extraction stopped.
    pub reason: String,
}

impl ExtractError {
    /// Creates a new extraction error.
    #[must_use]
    pub fn new(stage: ExtractionStage, reason: impl Into<String>) -> Self {
        Self {
            stage,
            reason: reason.into(),
        }
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("type".to_string(), serde_json::json!("ExtractError"));
        map.insert("stage".to_string(), serde_json::json!(self.stage));
        map.insert("reason".to_string(), serde_json::json!(self.reason));
        map
    }
}

/// Failure of the external store or the embedding capability.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StoreError {
    /// The store could not be reached.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A vector did not have the store's dimension.
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimension the store holds.
        expected: usize,
        /// Dimension that was supplied.
        actual: usize,
    },

    /// A caller row could not be turned into a record.
    #[error("Row {index} is invalid: {reason}")]
    InvalidRow {
        /// Position of the row in the batch.
        index: usize,
        /// What is wrong with it.
        reason: String,
    },

    /// The embedding capability failed.
    #[error("Embedding failed: {0}")]
    Embedding(String),
}

impl StoreError {
    /// Creates an invalid row error.
    #[must_use]
    pub fn invalid_row(index: usize, reason: impl Into<String>) -> Self {
        Self::InvalidRow {
            index,
            reason: reason.into(),
        }
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        let kind = match self {
            Self::Unavailable(_) => "StoreUnavailable",
            Self::DimensionMismatch { expected, actual } => {
                map.insert("expected".to_string(), serde_json::json!(expected));
                map.insert("actual".to_string(), serde_json::json!(actual));
                "DimensionMismatch"
            }
            Self::InvalidRow { index, .. } => {
                map.insert("index".to_string(), serde_json::json!(index));
                "InvalidRow"
            }
            Self::Embedding(_) => "EmbeddingFailed",
        };
        map.insert("type".to_string(), serde_json::json!(kind));
        map.insert("message".to_string(), serde_json::json!(self.to_string()));
        map
    }
}

/// Failure of the LLM fallback capability.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LlmError {
    /// The backend could not be reached or errored.
    #[error("LLM backend '{backend}' unavailable: {message}")]
    Unavailable {
        /// Backend name.
        backend: String,
        /// Backend message.
        message: String,
    },

    /// The backend answered with refusal or "did not understand" boilerplate.
    #[error("LLM backend '{backend}' refused to answer")]
    Refused {
        /// Backend name.
        backend: String,
    },

    /// The backend returned nothing usable.
    #[error("LLM backend '{backend}' returned an empty answer")]
    Empty {
        /// Backend name.
        backend: String,
    },

    /// The preferred backend failed and the chain is still below its reset threshold.
    #[error("Preferred LLM backend failed ({failures} consecutive failure(s))")]
    CoolingDown {
        /// Consecutive failures of the preferred backend.
        failures: u32,
    },

    /// Every backend in the chain failed.
    #[error("All {attempted} LLM backend(s) failed")]
    Exhausted {
        /// Number of backends tried.
        attempted: usize,
    },

    /// The chain has no backends.
    #[error("No LLM backends configured")]
    NoBackends,
}

impl LlmError {
    /// Creates an unavailable error.
    #[must_use]
    pub fn unavailable(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Unavailable {
            backend: backend.into(),
            message: message.into(),
        }
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        let kind = match self {
            Self::Unavailable { backend, .. } => {
                map.insert("backend".to_string(), serde_json::json!(backend));
                "LlmUnavailable"
            }
            Self::Refused { backend } => {
                map.insert("backend".to_string(), serde_json::json!(backend));
                "LlmRefused"
            }
            Self::Empty { backend } => {
                map.insert("backend".to_string(), serde_json::json!(backend));
                "LlmEmpty"
            }
            Self::CoolingDown { failures } => {
                map.insert("failures".to_string(), serde_json::json!(failures));
                "LlmCoolingDown"
            }
            Self::Exhausted { attempted } => {
                map.insert("attempted".to_string(), serde_json::json!(attempted));
                "LlmExhausted"
            }
            Self::NoBackends => "LlmNoBackends",
        };
        map.insert("type".to_string(), serde_json::json!(kind));
        map.insert("message".to_string(), serde_json::json!(self.to_string()));
        map
    }
}

/// Invalid or unreadable configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A field holds an unusable value.
    #[error("Invalid configuration for '{field}': {message}")]
    Invalid {
        /// Dotted field path.
        field: String,
        /// What is wrong.
        message: String,
    },

    /// The JSON could not be parsed.
    #[error("Could not parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    /// The file could not be read.
    #[error("Could not read configuration: {0}")]
    Io(#[from] std::io::Error),
}

impl ConfigError {
    /// Creates an invalid field error.
    #[must_use]
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        let kind = match self {
            Self::Invalid { field, .. } => {
                map.insert("field".to_string(), serde_json::json!(field));
                "InvalidConfig"
            }
            Self::Parse(_) => "ConfigParse",
            Self::Io(_) => "ConfigIo",
        };
        map.insert("type".to_string(), serde_json::json!(kind));
        map.insert("message".to_string(), serde_json::json!(self.to_string()));
        map
    }
}
