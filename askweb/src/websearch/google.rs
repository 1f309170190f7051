//! Search client for the Google result page.

use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use std::sync::{Arc, LazyLock};
use tracing::{debug, instrument, warn};

use super::agent::FetchAgent;
use super::config::SearchConfig;
use super::models::SearchResultItem;
use super::normalize::normalize_snippet;
use super::protocols::SearchEngine;
use super::run_utils::unwrap_redirect;
use crate::errors::{FetchError, SearchError};

static LINK_SELECTOR: LazyLock<Option<Selector>> = LazyLock::new(|| Selector::parse("a[href]").ok());

static TITLE_SELECTOR: LazyLock<Option<Selector>> = LazyLock::new(|| Selector::parse("h3").ok());

fn selector(source: &str) -> Result<Selector, SearchError> {
    Selector::parse(source)
        .map_err(|e| SearchError::UnexpectedBody(format!("invalid selector '{source}': {e}")))
}

fn element_text(element: &ElementRef<'_>) -> String {
    element.text().collect::<Vec<_>>().join(" ")
}

/// Results parsed from one result page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedPage {
    /// Result blocks found, before filtering.
    pub blocks: usize,
    /// Surviving results in page order.
    pub items: Vec<SearchResultItem>,
}

/// Parses a result page.
///
/// Result blocks are located by the primary class, or by the fallback class
/// when the page carries the fallback markup marker. Internal search links
/// and blocked domains are dropped.
pub fn parse_results(html: &str, config: &SearchConfig) -> Result<ParsedPage, SearchError> {
    let (class, snippet_source) = if html.contains(config.fallback_marker.as_str()) {
        (&config.fallback_class, &config.fallback_snippet_selector)
    } else {
        (&config.primary_class, &config.primary_snippet_selector)
    };
    let block_selector = selector(&format!("div.{class}"))?;
    let snippet_selector = selector(snippet_source)?;
    let (Some(link_selector), Some(title_selector)) = (LINK_SELECTOR.as_ref(), TITLE_SELECTOR.as_ref())
    else {
        return Err(SearchError::UnexpectedBody("static selectors failed to compile".to_string()));
    };

    let document = Html::parse_document(html);
    let mut page = ParsedPage::default();
    for block in document.select(&block_selector) {
        page.blocks += 1;

        let Some(href) = block
            .select(link_selector)
            .next()
            .and_then(|a| a.value().attr("href"))
        else {
            continue;
        };
        if href.starts_with("/search") {
            continue;
        }
        let url = unwrap_redirect(href);
        if !url.starts_with("http") || config.is_blocked(&url) {
            debug!(%url, "skipping search result");
            continue;
        }

        let title = block
            .select(title_selector)
            .next()
            .map(|h| element_text(&h).trim().to_string())
            .unwrap_or_default();
        let snippet = block
            .select(&snippet_selector)
            .next()
            .map(|s| normalize_snippet(&element_text(&s)))
            .unwrap_or_default();

        page.items.push(SearchResultItem::new(title, url, snippet));
    }
    Ok(page)
}

/// Queries the Google result page through a [`FetchAgent`].
#[derive(Debug)]
pub struct GoogleSearch {
    config: SearchConfig,
    agent: Arc<FetchAgent>,
}

impl GoogleSearch {
    /// Creates a client that fetches through `agent`.
    #[must_use]
    pub fn new(config: SearchConfig, agent: Arc<FetchAgent>) -> Self {
        Self { config, agent }
    }

    /// The configuration.
    #[must_use]
    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Runs the query, paginating with `start` until enough results were
    /// collected or `max_pages` pages were read.
    #[instrument(skip(self), fields(result_count = self.config.result_count))]
    pub async fn search(&self, question: &str) -> Result<Vec<SearchResultItem>, SearchError> {
        let mut results: Vec<SearchResultItem> = Vec::new();
        let mut seen = HashSet::new();
        let mut start = 0;
        let mut pages = 0;

        while start < self.config.result_count && pages < self.config.max_pages {
            pages += 1;
            let num = (self.config.result_count - start).to_string();
            let offset = start.to_string();
            let params = [
                ("q", question),
                ("num", num.as_str()),
                ("hl", self.config.language.as_str()),
                ("start", offset.as_str()),
            ];
            let body = self.agent.fetch_text(&self.config.endpoint, &params).await?;
            let marker = &self.agent.config().block_marker;
            if !marker.is_empty() && body.contains(marker.as_str()) {
                warn!("search engine served a block page");
                return Err(FetchError::Blocked {
                    url: self.config.endpoint.clone(),
                    marker: marker.clone(),
                }
                .into());
            }

            let page = parse_results(&body, &self.config)?;
            debug!(page = pages, blocks = page.blocks, kept = page.items.len(), "parsed result page");
            start += page.items.len().max(1);
            for item in page.items {
                if seen.insert(item.url.clone()) {
                    results.push(item);
                }
            }
        }

        if self.config.minimal {
            results.truncate(1);
        }
        Ok(results)
    }
}

#[async_trait]
impl SearchEngine for GoogleSearch {
    async fn query(&self, question: &str) -> Result<Vec<SearchResultItem>, SearchError> {
        self.search(question).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fixtures, ScriptedTransport};
    use crate::websearch::{FetchConfig, HttpResponse};
    use pretty_assertions::assert_eq;

    const ENDPOINT: &str = "https://www.google.com/search";

    fn client(transport: Arc<ScriptedTransport>, config: SearchConfig) -> GoogleSearch {
        let agent = FetchAgent::new(FetchConfig::default().without_proxies(), transport, Vec::new());
        GoogleSearch::new(config, Arc::new(agent))
    }

    #[test]
    fn test_parse_primary_markup() {
        let page = parse_results(fixtures::GOOGLE_RESULTS_PAGE, &SearchConfig::default()).unwrap();
        assert_eq!(page.blocks, 4);
        assert_eq!(
            page.items,
            vec![
                SearchResultItem::new(
                    "Bom nguyên tử – Wikipedia tiếng Việt",
                    "https://vi.wikipedia.org/wiki/Bom_nguyên_tử",
                    "Bom nguyên tử là loại vũ khí hạt nhân, nhà vật lý Robert Oppenheimer"
                ),
                SearchResultItem::new(
                    "Ai là cha đẻ của bom nguyên tử?",
                    "https://hoc247.net/hoi-dap/cha-de-bom-nguyen-tu",
                    "Robert Oppenheimer được coi là cha đẻ của bom nguyên tử"
                ),
            ]
        );
    }

    #[test]
    fn test_parse_fallback_markup() {
        let page = parse_results(fixtures::GOOGLE_RESULTS_PAGE_LITE, &SearchConfig::default()).unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].url, "https://loigiaihay.com/bom-nguyen-tu");
        assert_eq!(page.items[0].snippet, "Bom nguyên tử được chế tạo lần đầu năm 1945.");
    }

    #[test]
    fn test_parse_empty_page() {
        let page = parse_results("<html><body></body></html>", &SearchConfig::default()).unwrap();
        assert_eq!(page, ParsedPage::default());
    }

    #[tokio::test]
    async fn test_minimal_mode_keeps_top_result() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push(ENDPOINT, HttpResponse::html(fixtures::GOOGLE_RESULTS_PAGE));
        let search = client(transport.clone(), SearchConfig::default());

        let results = search.query("Ai chế tạo ra bom nguyên tử").await.unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].url, "https://vi.wikipedia.org/wiki/Bom_nguyên_tử");
        let request = &transport.requests_to(ENDPOINT)[0];
        assert!(request.query.contains(&("num".to_string(), "2".to_string())));
        assert!(request.query.contains(&("hl".to_string(), "vi".to_string())));
        assert!(request.query.contains(&("start".to_string(), "0".to_string())));
    }

    #[tokio::test]
    async fn test_paginates_until_count_satisfied() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push(ENDPOINT, HttpResponse::html(fixtures::GOOGLE_RESULTS_PAGE_LITE));
        transport.push(ENDPOINT, HttpResponse::html(fixtures::GOOGLE_RESULTS_PAGE));
        let search = client(
            transport.clone(),
            SearchConfig::default().with_minimal(false).with_result_count(3),
        );

        let results = search.query("bom nguyên tử").await.unwrap();

        assert_eq!(results.len(), 3);
        let requests = transport.requests_to(ENDPOINT);
        assert_eq!(requests.len(), 2);
        assert!(requests[1].query.contains(&("start".to_string(), "1".to_string())));
        assert!(requests[1].query.contains(&("num".to_string(), "2".to_string())));
    }

    #[tokio::test]
    async fn test_block_page_is_error() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push(
            ENDPOINT,
            HttpResponse::html("<p>Our systems have detected unusual traffic from your computer</p>"),
        );
        let search = client(transport, SearchConfig::default());

        let err = search.query("bom").await.unwrap_err();
        assert!(matches!(err, SearchError::Fetch(FetchError::Blocked { .. })));
    }
}
