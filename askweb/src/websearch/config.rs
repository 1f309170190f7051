//! Configuration types for fetching, searching and extraction.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::pipeline::RetryConfig;

/// How a page body is obtained, in the order the agent tries them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageStrategy {
    /// Fetch the URL itself.
    Direct,
    /// Fetch the search engine's cached copy.
    WebCache,
    /// Fetch the closest snapshot from the web archive.
    Archive,
}

/// Configuration for the fetch agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Request timeout in seconds when no proxy is in use.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: f64,
    /// Seconds added to the slowest proxy's latency to get the proxied timeout.
    #[serde(default = "default_proxy_timeout_padding")]
    pub proxy_timeout_padding_seconds: f64,
    /// User agents picked at random for each request.
    #[serde(default = "default_user_agents")]
    pub user_agents: Vec<String>,
    /// Referer header value.
    #[serde(default = "default_referer")]
    pub referer: String,
    /// Cookie headers picked at random; none sent when empty.
    #[serde(default)]
    pub cookies: Vec<String>,
    /// Whether requests go through the proxy pool.
    #[serde(default = "default_true")]
    pub use_proxies: bool,
    /// Number of proxies kept in the pool, at most 5.
    #[serde(default = "default_proxy_pool_size")]
    pub proxy_pool_size: usize,
    /// Primary proxy list endpoint; the current date is appended as a path segment.
    #[serde(default = "default_checkerproxy_endpoint")]
    pub checkerproxy_endpoint: String,
    /// Fallback proxy list page; `country-<code>/` is appended.
    #[serde(default = "default_proxynova_endpoint")]
    pub proxynova_endpoint: String,
    /// Country codes the fallback list is scraped for.
    #[serde(default = "default_proxynova_countries")]
    pub proxynova_countries: Vec<String>,
    /// Retry policy for transient failures.
    #[serde(default)]
    pub retry: RetryConfig,
    /// Pool refreshes allowed per request when rate limited.
    #[serde(default = "default_rate_limit_refreshes")]
    pub rate_limit_refreshes: usize,
    /// Substring that identifies a search-engine block page.
    #[serde(default = "default_block_marker")]
    pub block_marker: String,
    /// Substrings that identify a client-rendered shell with no content.
    #[serde(default = "default_js_shell_markers")]
    pub js_shell_markers: Vec<String>,
    /// Web cache search endpoint.
    #[serde(default = "default_web_cache_endpoint")]
    pub web_cache_endpoint: String,
    /// Web archive availability endpoint.
    #[serde(default = "default_archive_endpoint")]
    pub archive_endpoint: String,
    /// Page fetch strategies, tried in order.
    #[serde(default = "default_page_strategies")]
    pub page_strategies: Vec<PageStrategy>,
}

/// Longest accepted request timeout or crawl deadline, in seconds.
pub const MAX_WAIT_SECONDS: f64 = 86_400.0;

/// Converts configured seconds to a duration clamped to `[0, MAX_WAIT_SECONDS]`.
/// NaN takes `fallback`.
pub(crate) fn seconds_to_duration(seconds: f64, fallback: f64) -> Duration {
    let seconds = if seconds.is_nan() { fallback } else { seconds };
    Duration::from_secs_f64(seconds.clamp(0.0, MAX_WAIT_SECONDS))
}

fn default_timeout() -> f64 {
    10.0
}

fn default_proxy_timeout_padding() -> f64 {
    5.0
}

fn default_true() -> bool {
    true
}

fn default_user_agents() -> Vec<String> {
    [
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:66.0) Gecko/20100101 Firefox/66.0",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/111.0.0.0 Safari/537.36",
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/111.0.0.0 Safari/537.36",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/109.0.0.0 Safari/537.36",
        "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/111.0.0.0 Safari/537.36",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/111.0.0.0 Safari/537.36 Edg/111.0.1661.62",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:109.0) Gecko/20100101 Firefox/111.0",
        "Mozilla/5.0 (X11; Ubuntu; Linux x86_64; rv:109.0) Gecko/20100101 Firefox/114.0",
        "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/114.0.0.0 Safari/537.36 Edg/114.0.0.0",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_referer() -> String {
    "https://www.google.com".to_string()
}

fn default_proxy_pool_size() -> usize {
    5
}

fn default_checkerproxy_endpoint() -> String {
    "https://checkerproxy.net/api/archive".to_string()
}

fn default_proxynova_endpoint() -> String {
    "https://www.proxynova.com/proxy-server-list".to_string()
}

fn default_proxynova_countries() -> Vec<String> {
    ["vn", "us", "fr", "de", "jp", "cn", "ru", "gb", "ca", "au"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_rate_limit_refreshes() -> usize {
    1
}

fn default_block_marker() -> String {
    "Our systems have detected unusual traffic from your computer".to_string()
}

fn default_js_shell_markers() -> Vec<String> {
    vec!["<div id=\"root\">".to_string(), "JavaScript to run".to_string()]
}

fn default_web_cache_endpoint() -> String {
    "http://webcache.googleusercontent.com/search".to_string()
}

fn default_archive_endpoint() -> String {
    "https://archive.org/wayback/available".to_string()
}

fn default_page_strategies() -> Vec<PageStrategy> {
    vec![PageStrategy::Direct, PageStrategy::WebCache, PageStrategy::Archive]
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_timeout(),
            proxy_timeout_padding_seconds: default_proxy_timeout_padding(),
            user_agents: default_user_agents(),
            referer: default_referer(),
            cookies: Vec::new(),
            use_proxies: true,
            proxy_pool_size: default_proxy_pool_size(),
            checkerproxy_endpoint: default_checkerproxy_endpoint(),
            proxynova_endpoint: default_proxynova_endpoint(),
            proxynova_countries: default_proxynova_countries(),
            retry: RetryConfig::default(),
            rate_limit_refreshes: default_rate_limit_refreshes(),
            block_marker: default_block_marker(),
            js_shell_markers: default_js_shell_markers(),
            web_cache_endpoint: default_web_cache_endpoint(),
            archive_endpoint: default_archive_endpoint(),
            page_strategies: default_page_strategies(),
        }
    }
}

impl FetchConfig {
    /// Creates a new fetch configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the direct timeout.
    #[must_use]
    pub fn with_timeout(mut self, seconds: f64) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    /// Replaces the user agent list.
    #[must_use]
    pub fn with_user_agents<I, S>(mut self, user_agents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.user_agents = user_agents.into_iter().map(Into::into).collect();
        self
    }

    /// Adds a cookie header candidate.
    #[must_use]
    pub fn with_cookie(mut self, cookie: impl Into<String>) -> Self {
        self.cookies.push(cookie.into());
        self
    }

    /// Sends requests directly instead of through proxies.
    #[must_use]
    pub fn without_proxies(mut self) -> Self {
        self.use_proxies = false;
        self
    }

    /// Sets the proxy pool size.
    #[must_use]
    pub fn with_proxy_pool_size(mut self, size: usize) -> Self {
        self.proxy_pool_size = size;
        self
    }

    /// Sets the retry policy for transient failures.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the rate-limit refresh budget.
    #[must_use]
    pub fn with_rate_limit_refreshes(mut self, refreshes: usize) -> Self {
        self.rate_limit_refreshes = refreshes;
        self
    }

    /// Sets the page strategies.
    #[must_use]
    pub fn with_page_strategies(mut self, strategies: Vec<PageStrategy>) -> Self {
        self.page_strategies = strategies;
        self
    }

    /// Gets the direct timeout as a Duration.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        seconds_to_duration(self.timeout_seconds, default_timeout())
    }

    /// Returns the first JS-shell marker present in the body.
    #[must_use]
    pub fn js_shell_marker<'a>(&'a self, body: &str) -> Option<&'a str> {
        self.js_shell_markers
            .iter()
            .find(|marker| body.contains(marker.as_str()))
            .map(String::as_str)
    }
}

/// Configuration for the search client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Search endpoint.
    #[serde(default = "default_search_endpoint")]
    pub endpoint: String,
    /// Number of results requested.
    #[serde(default = "default_result_count")]
    pub result_count: usize,
    /// Interface language (`hl` parameter).
    #[serde(default = "default_language")]
    pub language: String,
    /// Return only the top result.
    #[serde(default = "default_true")]
    pub minimal: bool,
    /// Result container class of the usual markup.
    #[serde(default = "default_primary_class")]
    pub primary_class: String,
    /// Result container class of the alternate markup.
    #[serde(default = "default_fallback_class")]
    pub fallback_class: String,
    /// Raw-HTML marker that identifies the alternate markup.
    #[serde(default = "default_fallback_marker")]
    pub fallback_marker: String,
    /// Snippet selector inside a primary result block.
    #[serde(default = "default_primary_snippet_selector")]
    pub primary_snippet_selector: String,
    /// Snippet selector inside an alternate result block.
    #[serde(default = "default_fallback_snippet_selector")]
    pub fallback_snippet_selector: String,
    /// Substrings of URLs that are never returned.
    #[serde(default = "default_blocked_domains")]
    pub blocked_domains: Vec<String>,
    /// Upper bound on result pages requested for one query.
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,
}

fn default_search_endpoint() -> String {
    "https://www.google.com/search".to_string()
}

fn default_result_count() -> usize {
    2
}

fn default_language() -> String {
    "vi".to_string()
}

fn default_primary_class() -> String {
    "g".to_string()
}

fn default_fallback_class() -> String {
    "AS66f".to_string()
}

fn default_fallback_marker() -> String {
    "ezO2md".to_string()
}

fn default_primary_snippet_selector() -> String {
    r#"div[style="-webkit-line-clamp:2"]"#.to_string()
}

fn default_fallback_snippet_selector() -> String {
    "span.fYyStc".to_string()
}

fn default_blocked_domains() -> Vec<String> {
    [
        "xn--t-in-1ua7276b5ha.com",
        "từ-điển.com",
        "tratu.coviet.vn",
        "simonhoadalat.com",
        "hotcourses.vn",
        "tudienso.com",
        "dictionary.cambridge.org",
        "tenkhaisinh.com",
        "vi.wiktionary.org",
        "vtudien.com",
        "truyenhinhcapsongthu.net",
        "chunom.net",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_max_pages() -> usize {
    3
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            endpoint: default_search_endpoint(),
            result_count: default_result_count(),
            language: default_language(),
            minimal: true,
            primary_class: default_primary_class(),
            fallback_class: default_fallback_class(),
            fallback_marker: default_fallback_marker(),
            primary_snippet_selector: default_primary_snippet_selector(),
            fallback_snippet_selector: default_fallback_snippet_selector(),
            blocked_domains: default_blocked_domains(),
            max_pages: default_max_pages(),
        }
    }
}

impl SearchConfig {
    /// Creates a new search configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the endpoint.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Sets the requested result count.
    #[must_use]
    pub fn with_result_count(mut self, count: usize) -> Self {
        self.result_count = count;
        self
    }

    /// Sets minimal mode.
    #[must_use]
    pub fn with_minimal(mut self, minimal: bool) -> Self {
        self.minimal = minimal;
        self
    }

    /// Adds a blocked domain.
    #[must_use]
    pub fn with_blocked_domain(mut self, domain: impl Into<String>) -> Self {
        self.blocked_domains.push(domain.into());
        self
    }

    /// Whether the URL belongs to a blocked domain.
    #[must_use]
    pub fn is_blocked(&self, url: &str) -> bool {
        self.blocked_domains.iter().any(|domain| url.contains(domain.as_str()))
    }
}

/// Configuration for content extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Classes of answer-like containers, searched first. An entry with a
    /// space must equal the whole class attribute.
    #[serde(default = "default_answer_classes")]
    pub answer_classes: Vec<String>,
    /// Tags removed before choosing a fallback focus area.
    #[serde(default = "default_noise_tags")]
    pub noise_tags: Vec<String>,
    /// Classes removed before choosing a fallback focus area.
    #[serde(default = "default_noise_classes")]
    pub noise_classes: Vec<String>,
    /// Direct children of `body` considered as fallback focus areas.
    #[serde(default = "default_candidate_tags")]
    pub candidate_tags: Vec<String>,
    /// Tags whose boundaries become line breaks in extracted text.
    #[serde(default = "default_block_tags")]
    pub block_tags: Vec<String>,
    /// Phrases that introduce the answer when followed by a colon.
    #[serde(default = "default_answer_markers")]
    pub answer_markers: Vec<String>,
    /// Advertising boilerplate, removed once per document.
    #[serde(default = "default_ad_pattern")]
    pub ad_pattern: String,
    /// Call-to-action sentences, removed once per document.
    #[serde(default = "default_command_pattern")]
    pub command_pattern: String,
    /// Sentences must be strictly longer than this many characters.
    #[serde(default = "default_min_sentence_length")]
    pub min_sentence_length: usize,
    /// Sentences starting with any of these are navigation, not prose.
    #[serde(default = "default_navigation_prefixes")]
    pub navigation_prefixes: Vec<String>,
    /// Sentences containing any of these are discarded.
    #[serde(default = "default_reject_substrings")]
    pub reject_substrings: Vec<String>,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

fn default_answer_classes() -> Vec<String> {
    strings(&[
        "uitleg",
        "mw-parser-output",
        "loigiai",
        "answer",
        "accordion-detail",
        "answer-container",
        "anwsers-correct",
        "card-comment-content",
        "content_box",
        "box_content",
        "question-reason",
        "solution-item",
        "box-mes ipading",
        "main-container",
        "content-solution",
        "comment-author-kiemthecao",
    ])
}

fn default_noise_tags() -> Vec<String> {
    strings(&[
        "script", "style", "noscript", "iframe", "svg", "nav", "header", "footer", "aside", "form",
        "button", "select", "input", "figure", "link", "meta",
    ])
}

fn default_noise_classes() -> Vec<String> {
    strings(&[
        "ads",
        "advertisement",
        "banner",
        "breadcrumb",
        "menu",
        "navbar",
        "sidebar",
        "related",
        "share",
        "social",
        "comment-form",
        "footer",
        "header",
    ])
}

fn default_candidate_tags() -> Vec<String> {
    strings(&["div", "main", "article", "section", "p", "ul", "ol", "table"])
}

fn default_block_tags() -> Vec<String> {
    strings(&[
        "p", "div", "br", "li", "ul", "ol", "h1", "h2", "h3", "h4", "h5", "h6", "tr", "table",
        "section", "article", "main", "blockquote", "pre", "dd", "dt",
    ])
}

fn default_answer_markers() -> Vec<String> {
    strings(&[
        "Chứng minh",
        "Lời giải",
        "Hướng dẫn trả lời",
        "Giải thích",
        "Trả lời",
        "Bài giải",
        "Kết quả",
        "Giải chi tiết",
        "Bài làm",
        "Answer",
        "Solution",
    ])
}

fn default_ad_pattern() -> String {
    r"(?is)(Dành cho).*?(miễn phí)".to_string()
}

fn default_command_pattern() -> String {
    r"(?s)(Nếu bạn có nhu cầu đặt lịch|Trên đây|Hãy|Mời|Nêu|Vui lòng|Xem thêm|Xin|Làm ơn|Lấy từ|Please|Cảm ơn|Tra cứu|Thanks|Tạm biệt|Goodbye).*?[.?!:»]"
        .to_string()
}

fn default_min_sentence_length() -> usize {
    20
}

fn default_navigation_prefixes() -> Vec<String> {
    strings(&["^", "Xem", "Đọc thêm", "Read more", "See more"])
}

fn default_reject_substrings() -> Vec<String> {
    strings(&["[", "]", "|", ">>", "Wayback Machine"])
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            answer_classes: default_answer_classes(),
            noise_tags: default_noise_tags(),
            noise_classes: default_noise_classes(),
            candidate_tags: default_candidate_tags(),
            block_tags: default_block_tags(),
            answer_markers: default_answer_markers(),
            ad_pattern: default_ad_pattern(),
            command_pattern: default_command_pattern(),
            min_sentence_length: default_min_sentence_length(),
            navigation_prefixes: default_navigation_prefixes(),
            reject_substrings: default_reject_substrings(),
        }
    }
}

impl ExtractionConfig {
    /// Creates a new extraction configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an answer-like class.
    #[must_use]
    pub fn with_answer_class(mut self, class: impl Into<String>) -> Self {
        self.answer_classes.push(class.into());
        self
    }

    /// Adds an answer marker phrase.
    #[must_use]
    pub fn with_answer_marker(mut self, marker: impl Into<String>) -> Self {
        self.answer_markers.push(marker.into());
        self
    }

    /// Sets the minimum sentence length.
    #[must_use]
    pub fn with_min_sentence_length(mut self, length: usize) -> Self {
        self.min_sentence_length = length;
        self
    }
}
