//! Small helpers shared by the search client and the crawl tier.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use url::form_urlencoded;

/// Progress of one crawl fan-out.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrawlProgress {
    /// Pages that finished, successfully or not.
    pub completed: usize,
    /// Pages scheduled.
    pub total: usize,
    /// Pages that produced candidate sentences.
    pub success_count: usize,
    /// Pages that failed to fetch or extract.
    pub error_count: usize,
    /// Candidate sentences gathered so far.
    pub sentence_count: usize,
}

impl CrawlProgress {
    /// Creates a tracker for `total` pages.
    #[must_use]
    pub fn new(total: usize) -> Self {
        Self {
            total,
            ..Default::default()
        }
    }

    /// Completion percentage.
    #[must_use]
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            #[allow(clippy::cast_precision_loss)]
            let ratio = self.completed as f64 / self.total as f64;
            ratio * 100.0
        }
    }

    /// Records a page that yielded `sentences` candidates.
    pub fn record_success(&mut self, sentences: usize) {
        self.completed += 1;
        self.success_count += 1;
        self.sentence_count += sentences;
    }

    /// Records a failed page.
    pub fn record_error(&mut self) {
        self.completed += 1;
        self.error_count += 1;
    }

    /// Converts to dictionary.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut dict = HashMap::new();
        dict.insert("completed".to_string(), serde_json::json!(self.completed));
        dict.insert("total".to_string(), serde_json::json!(self.total));
        dict.insert("success_count".to_string(), serde_json::json!(self.success_count));
        dict.insert("error_count".to_string(), serde_json::json!(self.error_count));
        dict.insert("sentence_count".to_string(), serde_json::json!(self.sentence_count));
        dict
    }
}

/// Host of a URL without a leading `www.`, used as a result's source.
///
/// Falls back to the raw string when the URL does not parse, so a result
/// always carries some source.
#[must_use]
pub fn source_domain(url: &str) -> String {
    match url::Url::parse(url) {
        Ok(parsed) => parsed
            .host_str()
            .map(|host| host.strip_prefix("www.").unwrap_or(host).to_string())
            .unwrap_or_default(),
        Err(_) => url.to_string(),
    }
}

/// Unwraps a search engine redirect link (`/url?q=<target>&sa=...`).
///
/// Links that are not redirects are returned unchanged.
#[must_use]
pub fn unwrap_redirect(href: &str) -> String {
    let Some(query) = href.strip_prefix("/url?") else {
        return href.to_string();
    };
    let params: Vec<(String, String)> = form_urlencoded::parse(query.as_bytes()).into_owned().collect();
    ["url", "q"]
        .iter()
        .find_map(|key| params.iter().find(|(name, _)| name == key))
        .map_or_else(|| href.to_string(), |(_, target)| target.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_crawl_progress() {
        let mut progress = CrawlProgress::new(4);
        assert_eq!(progress.percent(), 0.0);

        progress.record_success(12);
        progress.record_error();
        assert_eq!(progress.completed, 2);
        assert_eq!(progress.sentence_count, 12);
        assert_eq!(progress.percent(), 50.0);
        assert_eq!(progress.to_dict()["error_count"], 1);
    }

    #[test]
    fn test_crawl_progress_empty() {
        assert_eq!(CrawlProgress::new(0).percent(), 0.0);
    }

    #[test]
    fn test_source_domain() {
        assert_eq!(source_domain("https://www.hoc247.net/bai-1"), "hoc247.net");
        assert_eq!(source_domain("https://vi.wikipedia.org/wiki/Bom"), "vi.wikipedia.org");
        assert_eq!(source_domain("not a url"), "not a url");
    }

    #[test]
    fn test_unwrap_redirect() {
        assert_eq!(
            unwrap_redirect("/url?q=https://vi.wikipedia.org/wiki/Bom_nguy%C3%AAn_t%E1%BB%AD&sa=U&ved=2"),
            "https://vi.wikipedia.org/wiki/Bom_nguyên_tử"
        );
        assert_eq!(
            unwrap_redirect("/url?esrc=s&url=https://loigiaihay.com/a&usg=x"),
            "https://loigiaihay.com/a"
        );
        assert_eq!(unwrap_redirect("https://a.vn/b"), "https://a.vn/b");
    }

    #[test]
    fn test_unwrap_redirect_matches_whole_parameter_names() {
        assert_eq!(
            unwrap_redirect("/url?q=https://a.vn/?redirect_url%3Dx&sa=U"),
            "https://a.vn/?redirect_url=x"
        );
        assert_eq!(
            unwrap_redirect("/url?q=https://a.vn/?redirect_url=x&sa=U"),
            "https://a.vn/?redirect_url=x"
        );
        assert_eq!(unwrap_redirect("/url?sa=U&faq=1"), "/url?sa=U&faq=1");
    }
}
