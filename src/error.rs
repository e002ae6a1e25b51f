//! Error types for the proxy

use std::io;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// Result type alias for the proxy
pub type Result<T> = std::result::Result<T, Error>;

/// Proxy errors
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Upstream origin did not answer within the per-attempt timeout
    #[error("Upstream timeout: {0}")]
    UpstreamTimeout(String),

    /// Upstream origin could not be reached
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Classify a transport failure from the HTTP client.
    ///
    /// Timeouts become [`Error::UpstreamTimeout`], everything else that kept
    /// us from getting a response becomes [`Error::UpstreamUnavailable`].
    #[must_use]
    pub fn from_upstream(url: &str, err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::UpstreamTimeout(format!("{url}: {err}"))
        } else {
            Self::UpstreamUnavailable(format!("{url}: {err}"))
        }
    }

    /// HTTP status returned to the caller for this error
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::UpstreamTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Self::UpstreamUnavailable(_) => StatusCode::BAD_GATEWAY,
            Self::Config(_) | Self::Io(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
