//! Common error types for cross-service calls.

use thiserror::Error;

/// Result type alias using the shared error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for calls between services.
#[derive(Debug, Error)]
pub enum Error {
    /// Response body could not be decoded
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Peer answered with something we do not understand
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Resource not found
    #[error("not found: {0}")]
    NotFound(String),

    /// Resource already exists
    #[error("duplicate: {0}")]
    Duplicate(String),

    /// Operation timed out
    #[error("timeout: {0}")]
    Timeout(String),

    /// Peer could not be reached
    #[error("unreachable: {0}")]
    Unreachable(String),

    /// Peer answered with a non-success status
    #[error("rejected with status {status}: {message}")]
    Rejected { status: u16, message: String },
}

impl Error {
    /// Create a config error from any displayable type.
    pub fn config(msg: impl std::fmt::Display) -> Self {
        Self::Config(msg.to_string())
    }

    /// Create a not found error from any displayable type.
    pub fn not_found(msg: impl std::fmt::Display) -> Self {
        Self::NotFound(msg.to_string())
    }

    /// Create a timeout error from any displayable type.
    pub fn timeout(msg: impl std::fmt::Display) -> Self {
        Self::Timeout(msg.to_string())
    }

    /// Whether retrying with a freshly built onion could help.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Unreachable(_))
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else if err.is_connect() {
            Self::Unreachable(err.to_string())
        } else if err.is_decode() {
            Self::Serialization(err.to_string())
        } else {
            Self::Protocol(err.to_string())
        }
    }
}
