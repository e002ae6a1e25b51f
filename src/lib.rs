//! SofaScore CORS Proxy Library
//!
//! Single-endpoint reverse proxy that forwards browser requests under
//! `/sofa/` to the SofaScore API, adding CORS headers and caching responses
//! for a few seconds.
//!
//! # Features
//!
//! - **Mirror fallback**: `api.sofascore.com` first, `www.sofascore.com` when
//!   the primary answers 401/403
//! - **Short-lived cache**: 15s by default, 3s with `?fast=1`, 30s for
//!   rejected requests
//! - **Browser impersonation**: fixed navigation headers on every upstream call
//! - **Background sweep**: stale entries are purged periodically

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod proxy;

pub use error::{Error, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        Some("json") => subscriber
            .with(fmt::layer().json())
            .try_init()
            .map_err(|e| Error::Internal(format!("Failed to install subscriber: {e}")))?,
        _ => subscriber
            .with(fmt::layer())
            .try_init()
            .map_err(|e| Error::Internal(format!("Failed to install subscriber: {e}")))?,
    }

    Ok(())
}
