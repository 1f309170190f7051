//! Proxy pool and the proxy list sources that fill it.

use async_trait::async_trait;
use rand::seq::SliceRandom;
use scraper::{Html, Selector};
use std::collections::HashSet;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::debug;

use super::models::{HttpRequest, ProxyProfile};
use super::protocols::{ProxySource, Transport};
use crate::errors::FetchError;

/// Largest pool the agent keeps.
pub const MAX_POOL_SIZE: usize = 5;

/// An immutable set of proxies, fastest first.
///
/// The agent never mutates a pool; a refresh installs a new one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProxyPool {
    proxies: Vec<ProxyProfile>,
}

impl ProxyPool {
    /// A pool with no proxies; requests go out directly.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Keeps the `size` lowest-latency distinct proxies, capped at
    /// [`MAX_POOL_SIZE`].
    #[must_use]
    pub fn from_candidates(mut candidates: Vec<ProxyProfile>, size: usize) -> Self {
        candidates.sort_by_key(|p| p.measured_latency_ms);
        let mut seen = HashSet::new();
        candidates.retain(|p| !p.address.trim().is_empty() && seen.insert(p.address.clone()));
        candidates.truncate(size.min(MAX_POOL_SIZE));
        Self { proxies: candidates }
    }

    /// The proxies, fastest first.
    #[must_use]
    pub fn proxies(&self) -> &[ProxyProfile] {
        &self.proxies
    }

    /// Number of proxies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.proxies.len()
    }

    /// Whether the pool is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.proxies.is_empty()
    }

    /// Picks a proxy at random.
    #[must_use]
    pub fn pick(&self) -> Option<&ProxyProfile> {
        self.proxies.choose(&mut rand::thread_rng())
    }

    /// Timeout for proxied requests: the slowest kept proxy's latency,
    /// rounded to whole seconds, plus `padding_seconds`. Returns `direct`
    /// when the pool is empty.
    #[must_use]
    pub fn request_timeout(&self, padding_seconds: f64, direct: Duration) -> Duration {
        self.proxies
            .iter()
            .map(|p| p.measured_latency_ms)
            .max()
            .map_or(direct, |slowest_ms| {
                #[allow(clippy::cast_precision_loss)]
                let seconds = (slowest_ms as f64 / 1000.0).round() + padding_seconds;
                Duration::from_secs_f64(seconds.max(0.0))
            })
    }
}

/// Parses a JSON proxy archive: `[{"addr": "host:port", "timeout": ms}, ...]`.
pub fn parse_checkerproxy(body: &serde_json::Value) -> Result<Vec<ProxyProfile>, FetchError> {
    let entries = body
        .as_array()
        .ok_or_else(|| FetchError::proxy_list("proxy archive is not a JSON array"))?;

    Ok(entries
        .iter()
        .filter_map(|entry| {
            let address = entry.get("addr")?.as_str()?;
            let timeout = entry.get("timeout")?;
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let latency = timeout
                .as_u64()
                .or_else(|| timeout.as_f64().filter(|t| *t >= 0.0).map(|t| t.round() as u64))?;
            Some(ProxyProfile::new(address, latency))
        })
        .collect())
}

static ROW_SELECTOR: LazyLock<Option<Selector>> =
    LazyLock::new(|| Selector::parse("table#tbl_proxy_list tbody tr").ok());

static CELL_SELECTOR: LazyLock<Option<Selector>> = LazyLock::new(|| Selector::parse("td").ok());

fn leading_number(text: &str) -> Option<u64> {
    let digits: String = text
        .trim()
        .chars()
        .take_while(char::is_ascii_digit)
        .collect();
    digits.parse().ok()
}

/// Parses a scraped proxy table: address, port, and latency (`"NNN ms"`) in
/// the first, second and fourth cells.
pub fn parse_proxynova(html: &str) -> Result<Vec<ProxyProfile>, FetchError> {
    let (Some(rows), Some(cells)) = (ROW_SELECTOR.as_ref(), CELL_SELECTOR.as_ref()) else {
        return Err(FetchError::proxy_list("proxy table selectors failed to compile"));
    };

    let document = Html::parse_document(html);
    Ok(document
        .select(rows)
        .filter_map(|row| {
            let texts: Vec<String> = row
                .select(cells)
                .map(|cell| cell.text().collect::<String>().trim().to_string())
                .collect();
            let host = texts.first().filter(|h| !h.is_empty())?;
            let port = leading_number(texts.get(1)?)?;
            let latency = leading_number(texts.get(3)?)?;
            Some(ProxyProfile::new(format!("{host}:{port}"), latency))
        })
        .collect())
}

/// The primary proxy list: a dated JSON archive.
#[derive(Debug, Clone)]
pub struct CheckerProxySource {
    endpoint: String,
}

impl CheckerProxySource {
    /// Creates the source for an archive endpoint.
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
        }
    }

    /// Archive URL for today's list.
    #[must_use]
    pub fn url_for_today(&self) -> String {
        let date = chrono::Utc::now().format("%Y-%m-%d");
        format!("{}/{date}", self.endpoint.trim_end_matches('/'))
    }
}

#[async_trait]
impl ProxySource for CheckerProxySource {
    fn name(&self) -> &str {
        "checkerproxy"
    }

    async fn fetch_proxies(&self, transport: &dyn Transport) -> Result<Vec<ProxyProfile>, FetchError> {
        let url = self.url_for_today();
        let response = transport.send(HttpRequest::get(&url)).await?;
        if !response.is_success() {
            return Err(FetchError::status(url, response.status));
        }
        let body: serde_json::Value = serde_json::from_str(&response.body)
            .map_err(|e| FetchError::decode(&url, e.to_string()))?;
        parse_checkerproxy(&body)
    }
}

/// The fallback proxy list: a scraped per-country HTML table.
#[derive(Debug, Clone)]
pub struct ProxyNovaSource {
    endpoint: String,
    countries: Vec<String>,
}

impl ProxyNovaSource {
    /// Creates the source for a list endpoint and candidate countries.
    #[must_use]
    pub fn new(endpoint: impl Into<String>, countries: Vec<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            countries,
        }
    }

    /// List URL for a randomly chosen country.
    #[must_use]
    pub fn random_country_url(&self) -> String {
        let country = self
            .countries
            .choose(&mut rand::thread_rng())
            .map_or("vn", String::as_str);
        format!("{}/country-{country}/", self.endpoint.trim_end_matches('/'))
    }
}

#[async_trait]
impl ProxySource for ProxyNovaSource {
    fn name(&self) -> &str {
        "proxynova"
    }

    async fn fetch_proxies(&self, transport: &dyn Transport) -> Result<Vec<ProxyProfile>, FetchError> {
        let url = self.random_country_url();
        let response = transport.send(HttpRequest::get(&url)).await?;
        if !response.is_success() {
            return Err(FetchError::status(url, response.status));
        }
        let proxies = parse_proxynova(&response.body)?;
        debug!(source = "proxynova", %url, count = proxies.len(), "parsed proxy table");
        Ok(proxies)
    }
}
