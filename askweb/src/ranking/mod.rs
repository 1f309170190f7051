//! Relevance ranking of candidate sentences against a question.
//!
//! Each candidate is scored by blending its token-set similarity to the
//! question with its length, so a sentence must be both relevant and
//! substantive to rank high. Per-page rankings are then merged across pages
//! into one block per source domain.

mod fuzz;
mod ranker;

pub use fuzz::{ratio, token_set_ratio};
pub use ranker::{blend_score, Ranker};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Text returned when nothing survives ranking.
pub const NO_MATCH_TEXT: &str = "Không tìm thấy kết quả phù hợp";

fn default_threshold() -> f64 {
    0.4
}

fn default_top_k() -> usize {
    20
}

/// Ranking parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingConfig {
    /// Minimum blended score a sentence needs to survive.
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    /// Sentences kept per source domain during aggregation.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            top_k: default_top_k(),
        }
    }
}

impl RankingConfig {
    /// Creates the default ranking config.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the score threshold.
    #[must_use]
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    /// Sets the per-domain sentence limit.
    #[must_use]
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }
}

/// A unit of extracted text prior to relevance scoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateSentence {
    /// Post-processed sentence text.
    pub text: String,
    /// Domain of the page the sentence came from, without a leading `www.`.
    pub source_domain: String,
    /// Text before post-processing, kept for citation.
    pub doc: String,
    /// Score assigned by the ranker, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

impl CandidateSentence {
    /// Creates an unscored candidate whose citation text is the sentence itself.
    #[must_use]
    pub fn new(text: impl Into<String>, source_domain: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            doc: text.clone(),
            text,
            source_domain: source_domain.into(),
            score: None,
        }
    }

    /// Sets the citation text.
    #[must_use]
    pub fn with_doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = doc.into();
        self
    }
}

/// A scored, deduplicated sentence or domain block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedResult {
    /// Sentence or joined block text.
    pub text: String,
    /// Source domain, `bot:<name>` for fallback answers, or empty.
    #[serde(rename = "source")]
    pub source_domain: String,
    /// Blended relevance score.
    pub score: f64,
}

impl RankedResult {
    /// Creates a result.
    #[must_use]
    pub fn new(text: impl Into<String>, source_domain: impl Into<String>, score: f64) -> Self {
        Self {
            text: text.into(),
            source_domain: source_domain.into(),
            score,
        }
    }

    /// The "no matching result" sentinel.
    #[must_use]
    pub fn no_match() -> Self {
        Self::new(NO_MATCH_TEXT, "", 0.0)
    }

    /// Wraps an answer from a fallback backend.
    #[must_use]
    pub fn from_bot(answer: impl Into<String>, backend: &str) -> Self {
        Self::new(answer, format!("bot:{backend}"), 1.0)
    }

    /// Returns true for the sentinel.
    #[must_use]
    pub fn is_no_match(&self) -> bool {
        self.text == NO_MATCH_TEXT && self.source_domain.is_empty()
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("text".to_string(), serde_json::json!(self.text));
        map.insert("source".to_string(), serde_json::json!(self.source_domain));
        map.insert("score".to_string(), serde_json::json!(self.score));
        map
    }
}

/// Result of cross-page aggregation.
#[derive(Debug, Clone, PartialEq)]
pub enum RankOutcome {
    /// At least one domain block survived, best first.
    Ranked(Vec<RankedResult>),
    /// Nothing survived filtering.
    NoMatch,
}

impl RankOutcome {
    /// Returns true when nothing survived.
    #[must_use]
    pub fn is_no_match(&self) -> bool {
        matches!(self, Self::NoMatch)
    }

    /// The ranked blocks, or the single sentinel.
    #[must_use]
    pub fn into_results(self) -> Vec<RankedResult> {
        match self {
            Self::Ranked(results) => results,
            Self::NoMatch => vec![RankedResult::no_match()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_ranking_config_defaults() {
        let config: RankingConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, RankingConfig::default());
        assert!((config.threshold - 0.4).abs() < f64::EPSILON);
        assert_eq!(config.top_k, 20);
    }

    #[test]
    fn test_sentinel() {
        let sentinel = RankedResult::no_match();
        assert!(sentinel.is_no_match());
        assert_eq!(RankOutcome::NoMatch.into_results(), vec![sentinel]);
        assert!(!RankedResult::from_bot("Oppenheimer", "primary").is_no_match());
    }

    #[test]
    fn test_ranked_result_serializes_source() {
        let result = RankedResult::new("Câu trả lời.", "vi.wikipedia.org", 0.5);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["source"], "vi.wikipedia.org");
        assert_eq!(result.to_dict()["text"], "Câu trả lời.");
    }

    #[test]
    fn test_candidate_doc_defaults_to_text() {
        let candidate = CandidateSentence::new("Một câu.", "example.vn");
        assert_eq!(candidate.doc, "Một câu.");
        assert_eq!(candidate.with_doc("Một câu gốc.").doc, "Một câu gốc.");
    }
}
