//! Request pipeline: cache lookup, upstream fallback, TTL decision, cache write

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use tracing::{debug, info};

use super::policy::{TtlPolicy, apply_cors};
use super::upstream::Upstream;
use crate::Result;
use crate::cache::{CacheEntry, ResponseCache, now_millis};

/// Path prefix handled by the proxy; stripped before forwarding upstream
pub const PROXY_PREFIX: &str = "/sofa";

/// Response ready to be written back to the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyResponse {
    /// Status code
    pub status: StatusCode,
    /// Upstream headers plus CORS/cache-control
    pub headers: HeaderMap,
    /// Payload
    pub body: Bytes,
}

impl ProxyResponse {
    fn from_entry(entry: &CacheEntry, ttl: Duration) -> Self {
        let mut headers = HeaderMap::with_capacity(entry.headers.len() + 4);
        for (name, value) in &entry.headers {
            headers.insert(name.clone(), value.clone());
        }
        apply_cors(&mut headers, ttl);

        Self {
            status: entry.status,
            headers,
            body: entry.body.clone(),
        }
    }
}

impl IntoResponse for ProxyResponse {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

/// Strip [`PROXY_PREFIX`] from an inbound request-target
///
/// Targets without the prefix are returned unchanged; the router only sends
/// prefixed targets here.
#[must_use]
pub fn upstream_path(target: &str) -> &str {
    target.strip_prefix(PROXY_PREFIX).unwrap_or(target)
}

/// Converts one inbound request-target into one response
pub struct ProxyHandler {
    cache: Arc<ResponseCache>,
    upstream: Upstream,
    policy: TtlPolicy,
}

impl ProxyHandler {
    /// Create a handler over a shared cache
    #[must_use]
    pub fn new(cache: Arc<ResponseCache>, upstream: Upstream, policy: TtlPolicy) -> Self {
        Self {
            cache,
            upstream,
            policy,
        }
    }

    /// Shared cache this handler reads and populates
    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.cache
    }

    /// Serve `target` (path plus raw query, `/sofa` prefix included)
    ///
    /// The full target is the cache key. A fresh entry is served without
    /// touching upstream. Otherwise the origins are tried in order, the TTL is
    /// finalized from the upstream status and the result is cached.
    ///
    /// # Errors
    ///
    /// Fails when no origin produced a response at all; nothing is cached then.
    pub async fn handle(&self, target: &str) -> Result<ProxyResponse> {
        let query = target.split_once('?').map(|(_, q)| q);
        let ttl = self.policy.initial(query);

        if let Some(entry) = self.cache.get_fresh(target, now_millis()) {
            debug!(key = %target, status = %entry.status, "Cache hit");
            return Ok(ProxyResponse::from_entry(&entry, ttl));
        }
        debug!(key = %target, "Cache miss");

        let fetched = self.upstream.fetch(upstream_path(target)).await?;
        let ttl = self.policy.finalize(ttl, fetched.status);

        let entry = CacheEntry::new(
            fetched.status,
            fetched.headers,
            fetched.body,
            now_millis(),
            ttl,
        );
        let response = ProxyResponse::from_entry(&entry, ttl);

        info!(
            key = %target,
            status = %entry.status,
            ttl_secs = ttl.as_secs(),
            bytes = entry.body.len(),
            "Fetched from upstream"
        );
        self.cache.put(target, entry);

        Ok(response)
    }

    /// Empty 204 answer to a CORS preflight, independent of cache state
    #[must_use]
    pub fn preflight(&self) -> ProxyResponse {
        let mut headers = HeaderMap::new();
        apply_cors(&mut headers, self.policy.preflight());
        ProxyResponse {
            status: StatusCode::NO_CONTENT,
            headers,
            body: Bytes::new(),
        }
    }
}
