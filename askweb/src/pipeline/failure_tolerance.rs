//! Per-page failure bookkeeping for the crawl fan-out.
//!
//! A page that cannot be fetched or yields no sentences is recorded and
//! skipped; the other pages carry on.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::errors::{ExtractError, FetchError};

/// Where in the per-page pipeline a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageStage {
    /// Fetching the page.
    Fetch,
    /// Extracting sentences.
    Extract,
    /// The question deadline passed before the page finished.
    Deadline,
    /// The page task panicked or was cancelled.
    Task,
}

impl PageStage {
    /// Name used in logs and events.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fetch => "fetch",
            Self::Extract => "extract",
            Self::Deadline => "deadline",
            Self::Task => "task",
        }
    }
}

/// Record of one page failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureRecord {
    /// Page URL.
    pub url: String,
    /// Stage that failed.
    pub stage: PageStage,
    /// Error message.
    pub error: String,
    /// Error type name.
    pub error_type: String,
    /// Whether retrying later could succeed.
    pub recoverable: bool,
    /// Unix timestamp of the failure.
    pub timestamp: f64,
    /// Additional context.
    pub context: HashMap<String, serde_json::Value>,
}

impl FailureRecord {
    /// Creates a new failure record.
    #[must_use]
    pub fn new(url: impl Into<String>, stage: PageStage, error: impl Into<String>) -> Self {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);

        Self {
            url: url.into(),
            stage,
            error: error.into(),
            error_type: "Error".to_string(),
            recoverable: false,
            timestamp: now,
            context: HashMap::new(),
        }
    }

    /// Records a fetch failure.
    #[must_use]
    pub fn from_fetch(url: impl Into<String>, error: &FetchError) -> Self {
        let mut record = Self::new(url, PageStage::Fetch, error.to_string()).with_error_type(error.kind());
        record.recoverable = error.is_retryable() || matches!(error, FetchError::RateLimited { .. });
        record
    }

    /// Records an extraction failure.
    #[must_use]
    pub fn from_extract(url: impl Into<String>, error: &ExtractError) -> Self {
        Self::new(url, PageStage::Extract, error.reason.clone())
            .with_error_type("ExtractError")
            .with_context("stage_reached", serde_json::json!(error.stage))
    }

    /// Sets the error type.
    #[must_use]
    pub fn with_error_type(mut self, error_type: impl Into<String>) -> Self {
        self.error_type = error_type.into();
        self
    }

    /// Marks as recoverable.
    #[must_use]
    pub fn recoverable(mut self) -> Self {
        self.recoverable = true;
        self
    }

    /// Adds context.
    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.context.insert(key.into(), value);
        self
    }
}

/// Summary of one crawl fan-out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureSummary {
    /// Pages scheduled.
    pub total_pages: usize,
    /// Pages that produced sentences.
    pub completed_pages: usize,
    /// Pages that failed.
    pub failed_pages: usize,
    /// Failure records in the order they were observed.
    pub failures: Vec<FailureRecord>,
}

impl FailureSummary {
    /// Creates an empty summary.
    #[must_use]
    pub fn new(total_pages: usize) -> Self {
        Self {
            total_pages,
            completed_pages: 0,
            failed_pages: 0,
            failures: Vec::new(),
        }
    }

    /// Share of scheduled pages that produced sentences.
    #[must_use]
    pub fn success_rate(&self) -> f64 {
        if self.total_pages == 0 {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let rate = self.completed_pages as f64 / self.total_pages as f64;
        rate
    }

    /// Returns true if any failures occurred.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    /// Returns true if pages were scheduled and none succeeded.
    #[must_use]
    pub fn all_failed(&self) -> bool {
        self.total_pages > 0 && self.completed_pages == 0
    }

    /// Converts to dictionary.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("total_pages".to_string(), serde_json::json!(self.total_pages));
        map.insert("completed_pages".to_string(), serde_json::json!(self.completed_pages));
        map.insert("failed_pages".to_string(), serde_json::json!(self.failed_pages));
        map.insert("success_rate".to_string(), serde_json::json!(self.success_rate()));
        map.insert(
            "failures".to_string(),
            serde_json::json!(self
                .failures
                .iter()
                .map(|f| {
                    serde_json::json!({
                        "url": f.url,
                        "stage": f.stage.as_str(),
                        "error": f.error,
                        "error_type": f.error_type,
                        "recoverable": f.recoverable,
                    })
                })
                .collect::<Vec<_>>()),
        );
        map
    }
}

/// Collects page outcomes during a fan-out.
#[derive(Debug, Default)]
pub struct FailureCollector {
    failures: Vec<FailureRecord>,
    failed_pages: HashSet<String>,
    completed_pages: HashSet<String>,
}

impl FailureCollector {
    /// Creates an empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a page failure.
    pub fn record_failure(&mut self, record: FailureRecord) {
        self.failed_pages.insert(record.url.clone());
        self.failures.push(record);
    }

    /// Records a page that produced sentences.
    pub fn record_completion(&mut self, url: &str) {
        self.completed_pages.insert(url.to_string());
    }

    /// Returns true if the page has failed.
    #[must_use]
    pub fn has_failed(&self, url: &str) -> bool {
        self.failed_pages.contains(url)
    }

    /// Returns true if the page was recorded either way.
    #[must_use]
    pub fn is_settled(&self, url: &str) -> bool {
        self.failed_pages.contains(url) || self.completed_pages.contains(url)
    }

    /// Creates a summary of the fan-out.
    #[must_use]
    pub fn summary(&self, total_pages: usize) -> FailureSummary {
        FailureSummary {
            total_pages,
            completed_pages: self.completed_pages.len(),
            failed_pages: self.failed_pages.len(),
            failures: self.failures.clone(),
        }
    }

    /// Returns all failures.
    #[must_use]
    pub fn failures(&self) -> &[FailureRecord] {
        &self.failures
    }
}
