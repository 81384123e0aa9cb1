//! Error types

use std::time::Duration;

/// Network security errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Local fixed-window limit hit; no request was sent
    #[error("Rate limit exceeded for {endpoint}; retry in {}s", retry_after.as_secs())]
    RateLimitExceeded {
        /// Endpoint key (last path segment)
        endpoint: String,
        /// Time until the window resets
        retry_after: Duration,
    },

    /// HTTP 401
    #[error("Authentication required")]
    AuthenticationRequired,

    /// HTTP 403
    #[error("Access forbidden")]
    AccessForbidden,

    /// HTTP 404
    #[error("Resource not found")]
    NotFound,

    /// HTTP 429 from the server
    #[error("Server rate limit reached")]
    RateLimited,

    /// HTTP 5xx
    #[error("Server error (HTTP {status})")]
    ServerError {
        /// Status code
        status: u16,
    },

    /// Any other non-success status
    #[error("Unexpected HTTP status {status}")]
    Http {
        /// Status code
        status: u16,
    },

    /// No response received
    #[error("Network failure: {0}")]
    NetworkFailure(String),

    /// Request timed out
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// Presented certificate is not pinned for this domain
    #[error("Certificate verification failed for {domain}: possible interception")]
    CertificateVerificationFailed {
        /// Domain whose certificate mismatched
        domain: String,
    },

    /// Malformed pin record
    #[error("Invalid certificate pin: {0}")]
    InvalidPin(String),

    /// Request could not be built
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Transport encryption failure
    #[error("Crypto error: {0}")]
    Crypto(#[from] scamshield_storage::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Whether a caller-driven retry can succeed
    ///
    /// Certificate failures, local rate limiting and client errors are never
    /// retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::NetworkFailure(_) | Self::Timeout(_) | Self::RateLimited | Self::ServerError { .. }
        )
    }

    /// Map a non-success HTTP status onto the error taxonomy
    pub fn from_status(status: u16) -> Self {
        match status {
            401 => Self::AuthenticationRequired,
            403 => Self::AccessForbidden,
            404 => Self::NotFound,
            429 => Self::RateLimited,
            500..=599 => Self::ServerError { status },
            _ => Self::Http { status },
        }
    }
}

/// Result type
pub type Result<T> = std::result::Result<T, Error>;
