//! Network security layer
//!
//! Provides SSL certificate pinning, per-endpoint rate limiting and the
//! secure API client with optional transport encryption.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod certificate;
pub mod client;
pub mod debug_log;
pub mod error;
pub mod pinned_fetch;
pub mod pinning;
pub mod rate_limit;
pub mod retry;
pub mod transport;

// Re-export main types
pub use certificate::{CertificateValidator, PinningStatus, ValidationOutcome, SUPPORTED_PLATFORMS};
pub use client::{ApiResponse, ClientConfig, SecureTransportClient};
pub use debug_log::{DebugLog, DebugLogEntry};
pub use error::{Error, Result};
pub use pinned_fetch::{FetchError, NativeTlsPinnedFetch, PinnedFetch, PinnedRequest, PinnedResponse};
pub use pinning::{certificate_fingerprint, CertificatePin, PinningConfig, PinningPolicy};
pub use rate_limit::{endpoint_key, RateLimiter, RATE_LIMIT_WINDOW};
pub use retry::retry_with_backoff;
pub use transport::{
    PinnedTransport, PreparedRequest, RawResponse, StandardTransport, Transport, TransportKind,
};

pub use http::Method;
