//! Subscriber setup and span attributes for answer runs.
//!
//! Spans themselves come from `#[instrument]` on the pipeline entry points;
//! this module installs the subscriber and turns a finished run into
//! OpenTelemetry-style attribute maps.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "askweb=info";

static INSTALLED: AtomicBool = AtomicBool::new(false);

/// Log line format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TracingFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

/// Installs the global subscriber, honoring `RUST_LOG`.
///
/// Returns `Ok(false)` when this function already installed one.
pub fn init_tracing(format: TracingFormat) -> anyhow::Result<bool> {
    if INSTALLED.swap(true, Ordering::SeqCst) {
        return Ok(false);
    }
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(DEFAULT_FILTER))?;
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);
    let installed = match format {
        TracingFormat::Pretty => builder.try_init(),
        TracingFormat::Json => builder.json().try_init(),
    };
    if let Err(e) = installed {
        INSTALLED.store(false, Ordering::SeqCst);
        return Err(anyhow::anyhow!("could not install tracing subscriber: {e}"));
    }
    Ok(true)
}

/// Short stable hash of a question, safe to put in logs.
#[must_use]
pub fn question_hash(question: &str) -> String {
    let digest = hex::encode(Sha256::digest(question.trim().as_bytes()));
    digest[..16].to_string()
}

/// Span attributes for one `answer` call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnswerSpanAttributes {
    /// Run id.
    pub run_id: Option<String>,
    /// Hash of the question text.
    pub question_hash: Option<String>,
    /// Tier that produced the answer.
    pub tier: Option<String>,
    /// Pages scheduled by the crawl tier.
    pub pages_total: Option<usize>,
    /// Pages that failed.
    pub pages_failed: Option<usize>,
    /// Results returned.
    pub results: Option<usize>,
    /// Duration in milliseconds.
    pub duration_ms: Option<f64>,
}

impl AnswerSpanAttributes {
    /// Creates empty attributes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the run id.
    #[must_use]
    pub fn with_run_id(mut self, id: impl Into<String>) -> Self {
        self.run_id = Some(id.into());
        self
    }

    /// Sets the question hash from the question text.
    #[must_use]
    pub fn with_question(mut self, question: &str) -> Self {
        self.question_hash = Some(question_hash(question));
        self
    }

    /// Sets the answering tier.
    #[must_use]
    pub fn with_tier(mut self, tier: impl Into<String>) -> Self {
        self.tier = Some(tier.into());
        self
    }

    /// Sets the crawl page counts.
    #[must_use]
    pub fn with_pages(mut self, total: usize, failed: usize) -> Self {
        self.pages_total = Some(total);
        self.pages_failed = Some(failed);
        self
    }

    /// Sets the result count.
    #[must_use]
    pub fn with_results(mut self, results: usize) -> Self {
        self.results = Some(results);
        self
    }

    /// Sets the duration.
    #[must_use]
    pub fn with_duration_ms(mut self, duration_ms: f64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    /// Converts to OpenTelemetry attributes.
    #[must_use]
    pub fn to_otel_attributes(&self) -> HashMap<String, String> {
        let mut attrs = HashMap::new();

        if let Some(ref v) = self.run_id {
            attrs.insert("answer.run_id".to_string(), v.clone());
        }
        if let Some(ref v) = self.question_hash {
            attrs.insert("answer.question_hash".to_string(), v.clone());
        }
        if let Some(ref v) = self.tier {
            attrs.insert("answer.tier".to_string(), v.clone());
        }
        if let Some(v) = self.pages_total {
            attrs.insert("crawl.pages_total".to_string(), v.to_string());
        }
        if let Some(v) = self.pages_failed {
            attrs.insert("crawl.pages_failed".to_string(), v.to_string());
        }
        if let Some(v) = self.results {
            attrs.insert("answer.results".to_string(), v.to_string());
        }
        if let Some(v) = self.duration_ms {
            attrs.insert("answer.duration_ms".to_string(), format!("{v:.1}"));
        }

        attrs
    }
}

/// Simple span timing helper.
#[derive(Debug)]
pub struct SpanTimer {
    start: Instant,
    name: String,
}

impl SpanTimer {
    /// Starts a new span timer.
    #[must_use]
    pub fn start(name: impl Into<String>) -> Self {
        Self {
            start: Instant::now(),
            name: name.into(),
        }
    }

    /// Returns the elapsed time in milliseconds.
    #[must_use]
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }

    /// Returns the span name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_question_hash_is_stable() {
        assert_eq!(question_hash("Ai chế tạo ra bom nguyên tử?"), question_hash(" Ai chế tạo ra bom nguyên tử? "));
        assert_eq!(question_hash("a").len(), 16);
    }

    #[test]
    fn test_answer_attributes() {
        let attrs = AnswerSpanAttributes::new()
            .with_run_id("run-1")
            .with_question("Ai chế tạo ra bom nguyên tử?")
            .with_tier("crawl")
            .with_pages(3, 1)
            .with_results(2)
            .with_duration_ms(12.34)
            .to_otel_attributes();

        assert_eq!(attrs["answer.tier"], "crawl");
        assert_eq!(attrs["crawl.pages_failed"], "1");
        assert_eq!(attrs["answer.duration_ms"], "12.3");
        assert_eq!(attrs.len(), 7);
        assert!(AnswerSpanAttributes::new().to_otel_attributes().is_empty());
    }

    #[test]
    fn test_span_timer() {
        let timer = SpanTimer::start("answer");
        assert_eq!(timer.name(), "answer");
        assert!(timer.elapsed_ms() >= 0.0);
    }

    #[test]
    fn test_init_tracing_is_idempotent() {
        // Another harness may own the global subscriber already.
        if let Ok(installed) = init_tracing(TracingFormat::Pretty) {
            assert!(installed);
            assert!(!init_tracing(TracingFormat::Json).unwrap());
        }
    }
}
