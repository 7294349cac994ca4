//! Error types for span_relay operations.

use thiserror::Error;

/// Invalid relay configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// `batch_size` must be at least 1.
    #[error("batch_size must be at least 1")]
    ZeroBatchSize,

    /// A duration setting was zero.
    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),

    /// The API base URL could not be parsed.
    #[error("invalid api url {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    /// A credential contains characters not allowed in an HTTP header.
    #[error("{0} is not a valid header value")]
    InvalidHeader(&'static str),
}

/// Errors surfaced while constructing a [`RelayService`](crate::RelayService).
///
/// Once the service is running nothing it does returns an error to the caller.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// The background runtime could not be built.
    #[error("failed to start worker runtime: {0}")]
    Runtime(#[from] std::io::Error),

    /// The HTTP client could not be built.
    #[error("failed to build http client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// A failed delivery attempt.
///
/// These never leave the delivery client; they are logged and counted.
#[derive(Debug, Clone, Error)]
pub enum DeliveryError {
    /// Connection-level failure (DNS, refused, reset, TLS).
    #[error("transport error: {0}")]
    Transport(String),

    /// The request did not complete within the configured timeout.
    #[error("request timed out")]
    Timeout,

    /// The remote service answered with something other than 200.
    #[error("HTTP {status} - {body}")]
    Status { status: u16, body: String },

    /// The batch could not be encoded at all.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl DeliveryError {
    /// Returns `true` if the request timed out.
    #[inline]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }
}

impl From<reqwest::Error> for DeliveryError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else {
            Self::Transport(e.to_string())
        }
    }
}
