//! reqwest-backed [`Transport`].

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::trace;

use super::models::{HttpRequest, HttpResponse};
use super::protocols::Transport;
use crate::errors::FetchError;

const DIRECT: &str = "";

/// Clients kept before every proxy client is dropped from the cache.
pub const MAX_CACHED_CLIENTS: usize = 64;

/// Sends requests with reqwest, keeping one client per proxy.
#[derive(Debug, Default)]
pub struct ReqwestTransport {
    clients: DashMap<String, reqwest::Client>,
}

impl ReqwestTransport {
    /// Creates a transport with an empty client cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn client(&self, url: &str, proxy: Option<&str>) -> Result<reqwest::Client, FetchError> {
        let key = proxy.unwrap_or(DIRECT);
        if let Some(client) = self.clients.get(key) {
            return Ok(client.clone());
        }

        let mut builder = reqwest::Client::builder().redirect(reqwest::redirect::Policy::limited(10));
        if let Some(proxy) = proxy {
            let proxy = reqwest::Proxy::all(proxy)
                .map_err(|e| FetchError::connection(url, format!("invalid proxy {proxy}: {e}")))?;
            builder = builder.proxy(proxy);
        }
        let client = builder
            .build()
            .map_err(|e| FetchError::connection(url, format!("client error: {e}")))?;

        if self.clients.len() >= MAX_CACHED_CLIENTS {
            self.clients.retain(|key, _| key == DIRECT);
            trace!("cleared proxy client cache");
        }
        self.clients.insert(key.to_string(), client.clone());
        Ok(client)
    }

    /// Number of cached clients.
    #[must_use]
    pub fn cached_clients(&self) -> usize {
        self.clients.len()
    }
}

fn map_error(url: &str, error: &reqwest::Error) -> FetchError {
    if error.is_timeout() {
        FetchError::Timeout { url: url.to_string() }
    } else {
        FetchError::connection(url, error.to_string())
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, FetchError> {
        let client = self.client(&request.url, request.proxy.as_deref())?;

        let mut builder = client.get(&request.url).timeout(request.timeout);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        for (key, value) in &request.headers {
            builder = builder.header(key.as_str(), value.as_str());
        }

        trace!(url = %request.url, proxy = ?request.proxy, "sending request");
        let response = builder.send().await.map_err(|e| map_error(&request.url, &e))?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(String::from);
        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout { url: request.url.clone() }
            } else {
                FetchError::decode(&request.url, e.to_string())
            }
        })?;

        Ok(HttpResponse {
            status,
            content_type,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clients_cached_per_proxy() {
        let transport = ReqwestTransport::new();
        transport.client("https://a.vn", None).unwrap();
        transport.client("https://a.vn", None).unwrap();
        transport.client("https://a.vn", Some("http://127.0.0.1:3128")).unwrap();
        assert_eq!(transport.cached_clients(), 2);
    }

    #[test]
    fn test_proxy_clients_are_bounded() {
        let transport = ReqwestTransport::new();
        transport.client("https://a.vn", None).unwrap();
        for port in 0..MAX_CACHED_CLIENTS + 5 {
            let proxy = format!("http://127.0.0.1:{}", 3000 + port);
            transport.client("https://a.vn", Some(&proxy)).unwrap();
            assert!(transport.cached_clients() <= MAX_CACHED_CLIENTS);
        }
        assert!(transport.clients.contains_key(DIRECT));
    }

    #[test]
    fn test_invalid_proxy_is_connection_error() {
        let transport = ReqwestTransport::new();
        let err = transport.client("https://a.vn", Some("ftp://127.0.0.1:21")).unwrap_err();
        assert_eq!(err.kind(), "Connection");
    }
}
