//! REST error types
//!
//! Server-side rejections mapped from HTTP status codes. Local admission
//! control never shows up here; it is always resolved by waiting.

use std::time::Duration;

/// REST call error
#[derive(Debug, thiserror::Error)]
pub enum RestError {
    /// HTTP 429 with the server-declared retry delay
    #[error("Rate limited by server, retry after {retry_after:?}")]
    RateLimited {
        retry_after: Duration,
        global: bool,
        bucket: Option<String>,
    },

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Any other 4xx
    #[error("Request rejected ({status}): {message}")]
    Client { status: u16, message: String },

    /// 5xx
    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid response body: {0}")]
    Decode(#[from] serde_json::Error),
}

impl RestError {
    /// Map a non-success, non-429 status and its message to an error
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            400 => Self::BadRequest(message),
            401 => Self::Unauthorized(message),
            403 => Self::Forbidden(message),
            404 => Self::NotFound(message),
            400..=499 => Self::Client { status, message },
            _ => Self::Server { status, message },
        }
    }

    /// HTTP status code behind this error, 0 for transport and decode failures
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::RateLimited { .. } => 429,
            Self::BadRequest(_) => 400,
            Self::Unauthorized(_) => 401,
            Self::Forbidden(_) => 403,
            Self::NotFound(_) => 404,
            Self::Client { status, .. } | Self::Server { status, .. } => *status,
            Self::Http(e) => e.status().map_or(0, |s| s.as_u16()),
            Self::Decode(_) => 0,
        }
    }

    /// Stable error code
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::RateLimited { .. } => "RATE_LIMITED",
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Client { .. } => "CLIENT_ERROR",
            Self::Server { .. } => "SERVER_ERROR",
            Self::Http(_) => "HTTP_ERROR",
            Self::Decode(_) => "DECODE_ERROR",
        }
    }

    /// Check if this is a client error (4xx)
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        let status = self.status_code();
        (400..500).contains(&status)
    }

    /// Check if this is a server error (5xx)
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        let status = self.status_code();
        (500..600).contains(&status)
    }

    /// Server-declared retry delay, only for 429 responses
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => Some(*retry_after),
            _ => None,
        }
    }
}
