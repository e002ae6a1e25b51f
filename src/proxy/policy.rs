//! TTL selection and CORS/cache-control headers

use std::time::Duration;

use axum::http::{HeaderMap, HeaderValue, StatusCode, header};

use crate::config::CacheConfig;

/// Decides how long a response may be cached
#[derive(Debug, Clone)]
pub struct TtlPolicy {
    default_ttl: Duration,
    fast_ttl: Duration,
    auth_failure_ttl: Duration,
    preflight_ttl: Duration,
}

impl TtlPolicy {
    /// Build the policy from cache configuration
    #[must_use]
    pub fn from_config(config: &CacheConfig) -> Self {
        Self {
            default_ttl: config.default_ttl,
            fast_ttl: config.fast_ttl,
            auth_failure_ttl: config.auth_failure_ttl,
            preflight_ttl: config.preflight_ttl,
        }
    }

    /// TTL chosen before any upstream call, from the request's query string
    #[must_use]
    pub fn initial(&self, query: Option<&str>) -> Duration {
        if has_fast_flag(query) {
            self.fast_ttl
        } else {
            self.default_ttl
        }
    }

    /// TTL after the upstream answered with `status`
    #[must_use]
    pub fn finalize(&self, initial: Duration, status: StatusCode) -> Duration {
        if is_auth_rejection(status) {
            self.auth_failure_ttl
        } else {
            initial
        }
    }

    /// TTL advertised on preflight responses
    #[must_use]
    pub fn preflight(&self) -> Duration {
        self.preflight_ttl
    }
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self::from_config(&CacheConfig::default())
    }
}

/// Statuses that trigger origin fallback and the auth-failure TTL
#[must_use]
pub fn is_auth_rejection(status: StatusCode) -> bool {
    matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN)
}

/// Whether the query string carries a `fast` parameter with a non-empty value
///
/// `fast=1`, `fast=0` and `fast=true` all count; a bare `fast` or `fast=`
/// does not.
#[must_use]
pub fn has_fast_flag(query: Option<&str>) -> bool {
    query.is_some_and(|q| {
        url::form_urlencoded::parse(q.as_bytes()).any(|(k, v)| k == "fast" && !v.is_empty())
    })
}

/// Set the CORS and `Cache-Control` headers on an outgoing response
///
/// Existing values for these names are replaced.
pub fn apply_cors(headers: &mut HeaderMap, ttl: Duration) {
    apply_cors_only(headers);
    headers.insert(header::CACHE_CONTROL, cache_control_value(ttl));
}

/// Set the CORS headers without advertising any cache lifetime
pub fn apply_cors_only(headers: &mut HeaderMap) {
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET,OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type"),
    );
}

fn cache_control_value(ttl: Duration) -> HeaderValue {
    let value = format!(
        "public, max-age={}, stale-while-revalidate=30",
        ttl.as_secs()
    );
    HeaderValue::from_str(&value).unwrap_or_else(|_| HeaderValue::from_static("no-store"))
}
