use std::collections::{HashMap, HashSet};

use super::fuzz::token_set_ratio;
use super::{CandidateSentence, RankOutcome, RankedResult, RankingConfig};

/// Blends similarity and length: `exp(ln a + ln b - ln(a + b))`.
///
/// Equivalent to `ab / (a + b)`, so it is symmetric and never exceeds
/// `min(a, b)`. Returns 0 when either input is not strictly positive or the
/// result is not finite.
#[must_use]
pub fn blend_score(a: f64, b: f64) -> f64 {
    if !(a > 0.0 && b > 0.0) {
        return 0.0;
    }
    let score = (a.ln() + b.ln() - (a + b).ln()).exp();
    if score.is_finite() {
        score
    } else {
        0.0
    }
}

/// Scores candidate sentences and merges them across pages.
#[derive(Debug, Clone, Default)]
pub struct Ranker {
    config: RankingConfig,
}

impl Ranker {
    /// Creates a ranker.
    #[must_use]
    pub fn new(config: RankingConfig) -> Self {
        Self { config }
    }

    /// Returns the ranking config.
    #[must_use]
    pub fn config(&self) -> &RankingConfig {
        &self.config
    }

    /// Scores one sentence against a query.
    #[must_use]
    pub fn score(&self, query: &str, text: &str) -> f64 {
        let similarity = f64::from(token_set_ratio(query, text)) / 100.0;
        #[allow(clippy::cast_precision_loss)]
        let length = text.chars().count() as f64;
        blend_score(similarity, length)
    }

    fn score_all(&self, query: &str, candidates: &[CandidateSentence]) -> Vec<(usize, RankedResult)> {
        candidates
            .iter()
            .enumerate()
            .filter_map(|(index, candidate)| {
                let text = candidate.text.trim();
                if text.is_empty() {
                    return None;
                }
                let score = self.score(query, text);
                Some((index, RankedResult::new(text, candidate.source_domain.clone(), score)))
            })
            .collect()
    }

    /// Ranks one page's candidates against the question.
    ///
    /// With a topic description, candidates are scored both against
    /// `question + " " + topic` and against the question alone; the two lists
    /// are merged. The result is sorted by descending score (ties keep
    /// candidate order), deduplicated by trimmed text keeping the best
    /// score, and filtered to `score >= threshold`.
    #[must_use]
    pub fn rank(
        &self,
        question: &str,
        topic: Option<&str>,
        candidates: &[CandidateSentence],
    ) -> Vec<RankedResult> {
        let mut scored = match topic.map(str::trim).filter(|t| !t.is_empty()) {
            Some(topic) => {
                let mut with_topic = self.score_all(&format!("{question} {topic}"), candidates);
                with_topic.extend(self.score_all(question, candidates));
                with_topic
            }
            None => self.score_all(question, candidates),
        };

        scored.sort_by(|(ia, a), (ib, b)| b.score.total_cmp(&a.score).then(ia.cmp(ib)));

        let mut seen = HashSet::new();
        scored
            .into_iter()
            .map(|(_, result)| result)
            .filter(|result| seen.insert(result.text.clone()))
            .filter(|result| result.score >= self.config.threshold)
            .collect()
    }

    /// Merges per-page rankings into one block per source domain.
    ///
    /// Sentences are pooled in page order, sorted, deduplicated, and grouped
    /// by domain. Each domain keeps its `top_k` best sentences, joined with
    /// spaces and scored by their mean. When topic descriptions were used the
    /// blocks are filtered by threshold again.
    #[must_use]
    pub fn aggregate(&self, pages: Vec<Vec<RankedResult>>, topics_used: bool) -> RankOutcome {
        let mut pooled: Vec<(usize, RankedResult)> = pages.into_iter().flatten().enumerate().collect();
        pooled.sort_by(|(ia, a), (ib, b)| b.score.total_cmp(&a.score).then(ia.cmp(ib)));

        let mut seen = HashSet::new();
        let mut order: HashMap<String, usize> = HashMap::new();
        let mut groups: Vec<(String, Vec<RankedResult>)> = Vec::new();

        for (_, result) in pooled {
            if result.score < self.config.threshold || !seen.insert(result.text.clone()) {
                continue;
            }
            let slot = *order.entry(result.source_domain.clone()).or_insert_with(|| {
                groups.push((result.source_domain.clone(), Vec::new()));
                groups.len() - 1
            });
            let group = &mut groups[slot].1;
            if group.len() < self.config.top_k {
                group.push(result);
            }
        }

        let mut blocks: Vec<RankedResult> = groups
            .into_iter()
            .filter(|(_, sentences)| !sentences.is_empty())
            .map(|(domain, sentences)| {
                #[allow(clippy::cast_precision_loss)]
                let mean = sentences.iter().map(|s| s.score).sum::<f64>() / sentences.len() as f64;
                let text = sentences
                    .iter()
                    .map(|s| s.text.as_str())
                    .collect::<Vec<_>>()
                    .join(" ");
                RankedResult::new(text, domain, mean)
            })
            .filter(|block| !topics_used || block.score >= self.config.threshold)
            .collect();

        blocks.sort_by(|a, b| b.score.total_cmp(&a.score));

        if blocks.is_empty() {
            tracing::debug!("no sentence survived aggregation");
            RankOutcome::NoMatch
        } else {
            RankOutcome::Ranked(blocks)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const QUESTION: &str = "Ai chế tạo ra bom nguyên tử?";

    fn candidates(domain: &str, texts: &[&str]) -> Vec<CandidateSentence> {
        texts.iter().map(|t| CandidateSentence::new(*t, domain)).collect()
    }

    #[test]
    fn test_blend_score_zero_and_domain_errors() {
        for x in [0.0, 0.5, 1.0, 80.0] {
            assert_eq!(blend_score(0.0, x), 0.0);
            assert_eq!(blend_score(x, 0.0), 0.0);
        }
        assert_eq!(blend_score(-1.0, 5.0), 0.0);
        assert_eq!(blend_score(f64::NAN, 5.0), 0.0);
        assert_eq!(blend_score(f64::INFINITY, f64::INFINITY), 0.0);
    }

    #[test]
    fn test_blend_score_symmetric_and_bounded() {
        for (a, b) in [(0.3, 42.0), (1.0, 1.0), (0.75, 120.0), (2.5, 0.01)] {
            let ab = blend_score(a, b);
            assert_eq!(ab, blend_score(b, a));
            assert!(ab > 0.0);
            assert!(ab <= a.min(b) + 1e-12);
            assert!((ab - a * b / (a + b)).abs() < 1e-9);
        }
    }

    #[test]
    fn test_rank_filters_sorts_and_dedups() {
        let ranker = Ranker::default();
        let page = candidates(
            "vi.wikipedia.org",
            &[
                "Xin chào.",
                "J. Robert Oppenheimer là người chế tạo ra bom nguyên tử.",
                "   ",
                "J. Robert Oppenheimer là người chế tạo ra bom nguyên tử.",
                "Bom nguyên tử được chế tạo trong dự án Manhattan.",
            ],
        );

        let ranked = ranker.rank(QUESTION, None, &page);

        assert!(!ranked.is_empty());
        assert!(ranked.iter().all(|r| r.score >= ranker.config().threshold));
        assert!(ranked.windows(2).all(|w| w[0].score >= w[1].score));
        let texts: HashSet<&str> = ranked.iter().map(|r| r.text.as_str()).collect();
        assert_eq!(texts.len(), ranked.len());
        assert!(!texts.contains("Xin chào."));
        assert!(ranked.iter().all(|r| r.source_domain == "vi.wikipedia.org"));
    }

    #[test]
    fn test_rank_with_topic_merges_both_rankings() {
        let ranker = Ranker::new(RankingConfig::new().with_threshold(0.0));
        let page = candidates("example.vn", &["Dự án Manhattan.", "Oppenheimer chế tạo bom nguyên tử."]);

        let ranked = ranker.rank(QUESTION, Some("Dự án Manhattan"), &page);

        assert_eq!(ranked.len(), 2);
        let manhattan = ranked.iter().find(|r| r.text == "Dự án Manhattan.").unwrap();
        let expected = ranker
            .score(&format!("{QUESTION} Dự án Manhattan"), "Dự án Manhattan.")
            .max(ranker.score(QUESTION, "Dự án Manhattan."));
        assert_eq!(manhattan.score, expected);
    }

    #[test]
    fn test_rank_empty_topic_is_ignored() {
        let ranker = Ranker::default();
        let page = candidates("example.vn", &["Oppenheimer chế tạo ra bom nguyên tử."]);
        assert_eq!(ranker.rank(QUESTION, Some("  "), &page), ranker.rank(QUESTION, None, &page));
    }

    #[test]
    fn test_aggregate_groups_by_domain() {
        let ranker = Ranker::new(RankingConfig::new().with_top_k(2));
        let pages = vec![
            vec![
                RankedResult::new("A1.", "a.vn", 0.875),
                RankedResult::new("A2.", "a.vn", 0.625),
                RankedResult::new("A3.", "a.vn", 0.5),
            ],
            vec![
                RankedResult::new("B1.", "b.vn", 0.9375),
                RankedResult::new("A1.", "a.vn", 0.875),
            ],
            vec![RankedResult::new("C1.", "c.vn", 0.1)],
        ];

        let RankOutcome::Ranked(blocks) = ranker.aggregate(pages, true) else {
            panic!("expected ranked blocks");
        };

        assert_eq!(
            blocks,
            vec![
                RankedResult::new("B1.", "b.vn", 0.9375),
                RankedResult::new("A1. A2.", "a.vn", 0.75),
            ]
        );
    }

    #[test]
    fn test_aggregate_nothing_survives() {
        let ranker = Ranker::default();
        assert!(ranker.aggregate(Vec::new(), false).is_no_match());
        let weak = vec![vec![RankedResult::new("x", "a.vn", 0.1)]];
        assert_eq!(ranker.aggregate(weak, false), RankOutcome::NoMatch);
    }
}
