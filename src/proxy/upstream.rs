//! Upstream fetching with mirror-origin fallback
//!
//! [`Upstream::fetch`] walks the configured origins in order. An origin that
//! answers 401/403, or cannot be reached at all, hands over to the next one.
//! The first other answer wins. When every origin rejects, the last rejection
//! is returned so the caller can pass it through.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header};
use bytes::Bytes;
use reqwest::Client;
use tracing::{debug, warn};

use super::policy::is_auth_rejection;
use crate::config::UpstreamConfig;
use crate::{Error, Result};

/// A fully buffered upstream response
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    /// Status code
    pub status: StatusCode,
    /// Forwardable headers, one value per name
    pub headers: HashMap<HeaderName, HeaderValue>,
    /// Payload bytes
    pub body: Bytes,
}

/// Issues a single GET against an absolute URL
#[async_trait]
pub trait UpstreamClient: Send + Sync {
    /// Fetch `url` and buffer the whole response
    async fn get(&self, url: &str) -> Result<UpstreamResponse>;
}

/// `reqwest`-backed client that impersonates the SofaScore web app
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    /// Build a client with the configured browser headers and per-attempt timeout
    pub fn new(config: &UpstreamConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        for (name, value) in &config.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| Error::Config(format!("Invalid upstream header name {name}: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| Error::Config(format!("Invalid value for header {name}: {e}")))?;
            headers.insert(name, value);
        }

        let mut builder = Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(5));
        if !config.system_proxy {
            builder = builder.no_proxy();
        }

        let client = builder
            .build()
            .map_err(|e| Error::Internal(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl UpstreamClient for HttpClient {
    async fn get(&self, url: &str) -> Result<UpstreamResponse> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::from_upstream(url, &e))?;

        let status = response.status();
        let headers = forwardable_headers(response.headers());
        let body = response
            .bytes()
            .await
            .map_err(|e| Error::from_upstream(url, &e))?;

        Ok(UpstreamResponse {
            status,
            headers,
            body,
        })
    }
}

/// Collapse upstream headers into a flat map, last value wins.
///
/// Hop-by-hop headers are dropped, as are `content-encoding` and
/// `content-length`: the client decodes compressed bodies, so both would
/// describe bytes we no longer hold.
pub fn forwardable_headers(headers: &HeaderMap) -> HashMap<HeaderName, HeaderValue> {
    headers
        .iter()
        .filter(|(name, _)| !is_hop_by_hop(name))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

fn is_hop_by_hop(name: &HeaderName) -> bool {
    *name == header::CONNECTION
        || *name == header::TRANSFER_ENCODING
        || *name == header::UPGRADE
        || *name == header::TE
        || *name == header::TRAILER
        || *name == header::PROXY_AUTHENTICATE
        || *name == header::PROXY_AUTHORIZATION
        || *name == header::CONTENT_ENCODING
        || *name == header::CONTENT_LENGTH
        || name.as_str() == "keep-alive"
}

/// Ordered origin list plus the client used to reach it
pub struct Upstream {
    client: Arc<dyn UpstreamClient>,
    origins: Vec<String>,
}

impl Upstream {
    /// Create an upstream over `origins`, tried in the given order
    #[must_use]
    pub fn new(client: Arc<dyn UpstreamClient>, origins: Vec<String>) -> Self {
        let origins = origins
            .into_iter()
            .map(|o| o.trim_end_matches('/').to_string())
            .collect();
        Self { client, origins }
    }

    /// Configured origins, in fallback order
    pub fn origins(&self) -> &[String] {
        &self.origins
    }

    /// GET `path` (path plus query) from each origin until one does not reject us
    pub async fn fetch(&self, path: &str) -> Result<UpstreamResponse> {
        let mut last_response = None;
        let mut last_error = None;

        for origin in &self.origins {
            let url = format!("{origin}{path}");
            match self.client.get(&url).await {
                Ok(response) if is_auth_rejection(response.status) => {
                    debug!(url = %url, status = %response.status, "Origin rejected request, trying next");
                    last_response = Some(response);
                }
                Ok(response) => {
                    debug!(url = %url, status = %response.status, "Upstream responded");
                    return Ok(response);
                }
                Err(e) => {
                    warn!(url = %url, error = %e, "Upstream request failed, trying next");
                    last_error = Some(e);
                }
            }
        }

        if let Some(response) = last_response {
            return Ok(response);
        }
        Err(last_error
            .unwrap_or_else(|| Error::Config("No upstream origins configured".to_string())))
    }
}
