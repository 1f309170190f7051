//! Configuration of the answer pipeline and the bundle loaded from JSON.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::errors::ConfigError;
use crate::ranking::RankingConfig;
use crate::websearch::{
    seconds_to_duration, ContentExtractor, ExtractionConfig, FetchConfig, SearchConfig, MAX_POOL_SIZE, MAX_WAIT_SECONDS,
};

fn default_max_concurrency() -> usize {
    4
}

fn default_deadline_seconds() -> f64 {
    30.0
}

fn default_min_cache_records() -> usize {
    20
}

fn default_cache_threshold() -> f32 {
    0.35
}

fn default_cache_limit() -> usize {
    10
}

fn default_true() -> bool {
    true
}

/// Tier policy and fan-out limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Pages fetched and extracted at the same time.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Crawl budget for one question, in seconds.
    #[serde(default = "default_deadline_seconds")]
    pub deadline_seconds: f64,
    /// Below this many stored records the cache tier is skipped.
    #[serde(default = "default_min_cache_records")]
    pub min_cache_records: usize,
    /// Cache matches must be closer than this cosine distance.
    #[serde(default = "default_cache_threshold")]
    pub cache_threshold: f32,
    /// Cache matches returned at most.
    #[serde(default = "default_cache_limit")]
    pub cache_limit: usize,
    /// Answer directly from a search snippet that ends in a full sentence.
    #[serde(default = "default_true")]
    pub snippet_shortcut: bool,
    /// Write crawl results back to the store.
    #[serde(default = "default_true")]
    pub persist_results: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            deadline_seconds: default_deadline_seconds(),
            min_cache_records: default_min_cache_records(),
            cache_threshold: default_cache_threshold(),
            cache_limit: default_cache_limit(),
            snippet_shortcut: true,
            persist_results: true,
        }
    }
}

impl PipelineConfig {
    /// Creates the default pipeline config.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the fan-out limit.
    #[must_use]
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    /// Sets the crawl deadline.
    #[must_use]
    pub fn with_deadline_seconds(mut self, seconds: f64) -> Self {
        self.deadline_seconds = seconds;
        self
    }

    /// Sets the warm-cache record count.
    #[must_use]
    pub fn with_min_cache_records(mut self, records: usize) -> Self {
        self.min_cache_records = records;
        self
    }

    /// Enables or disables the snippet shortcut.
    #[must_use]
    pub fn with_snippet_shortcut(mut self, enabled: bool) -> Self {
        self.snippet_shortcut = enabled;
        self
    }

    /// Enables or disables write-back.
    #[must_use]
    pub fn with_persist_results(mut self, enabled: bool) -> Self {
        self.persist_results = enabled;
        self
    }

    /// The crawl deadline as a duration.
    #[must_use]
    pub fn deadline(&self) -> Duration {
        seconds_to_duration(self.deadline_seconds, default_deadline_seconds())
    }
}

/// Every configurable part of the pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AskConfig {
    /// Fetch agent settings.
    #[serde(default)]
    pub fetch: FetchConfig,
    /// Search client settings.
    #[serde(default)]
    pub search: SearchConfig,
    /// Content extraction settings.
    #[serde(default)]
    pub extraction: ExtractionConfig,
    /// Ranking settings.
    #[serde(default)]
    pub ranking: RankingConfig,
    /// Tier policy.
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

impl AskConfig {
    /// Parses and validates a JSON document. Missing fields take defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Checks values the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pipeline.max_concurrency == 0 {
            return Err(ConfigError::invalid("pipeline.max_concurrency", "must be greater than 0"));
        }
        check_wait_seconds("pipeline.deadline_seconds", self.pipeline.deadline_seconds)?;
        check_wait_seconds("fetch.timeout_seconds", self.fetch.timeout_seconds)?;
        if !(0.0..=1.0).contains(&self.ranking.threshold) {
            return Err(ConfigError::invalid("ranking.threshold", "must be within [0, 1]"));
        }
        if self.fetch.user_agents.is_empty() {
            return Err(ConfigError::invalid("fetch.user_agents", "at least one user agent is required"));
        }
        if self.fetch.proxy_pool_size > MAX_POOL_SIZE {
            return Err(ConfigError::invalid(
                "fetch.proxy_pool_size",
                format!("must be at most {MAX_POOL_SIZE}"),
            ));
        }
        if self.search.result_count == 0 {
            return Err(ConfigError::invalid("search.result_count", "must be greater than 0"));
        }
        ContentExtractor::new(self.extraction.clone()).map_err(|e| match e {
            ConfigError::Invalid { field, message } => ConfigError::invalid(format!("extraction.{field}"), message),
            other => other,
        })?;
        Ok(())
    }
}

fn check_wait_seconds(field: &str, seconds: f64) -> Result<(), ConfigError> {
    if seconds.is_finite() && seconds > 0.0 && seconds <= MAX_WAIT_SECONDS {
        Ok(())
    } else {
        Err(ConfigError::invalid(
            field,
            format!("must be a positive number of seconds, at most {MAX_WAIT_SECONDS}"),
        ))
    }
}
