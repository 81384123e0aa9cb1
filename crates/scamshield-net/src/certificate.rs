//! SSL certificate validation
//!
//! Pinning is opt-in per domain: a domain with no pin record validates as
//! [`ValidationOutcome::Valid`] without any network traffic. Pinned domains
//! are probed with a HEAD request through a [`PinnedFetch`] that only
//! accepts the domain's allowed fingerprints.

use crate::debug_log::{DebugLog, DebugLogEntry};
use crate::pinned_fetch::{FetchError, NativeTlsPinnedFetch, PinnedFetch, PinnedRequest};
use crate::pinning::PinningConfig;
use crate::{Error, Result};
use http::Method;
use scamshield_storage::Platform;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Platforms with a native TLS backend for pinned fetches
pub const SUPPORTED_PLATFORMS: [Platform; 5] = [
    Platform::Android,
    Platform::Ios,
    Platform::MacOs,
    Platform::Windows,
    Platform::Linux,
];

/// Result of validating one domain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationOutcome {
    /// Pinned certificate matched, or the domain is not pinned
    Valid,
    /// Server presented an unpinned certificate
    InvalidFingerprint,
    /// Every attempt timed out
    Timeout,
    /// Every attempt failed for another reason
    NetworkError,
}

impl ValidationOutcome {
    /// Whether the connection may proceed
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }

    fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout | Self::NetworkError)
    }
}

impl std::fmt::Display for ValidationOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Valid => "VALID",
            Self::InvalidFingerprint => "INVALID_FINGERPRINT",
            Self::Timeout => "TIMEOUT",
            Self::NetworkError => "NETWORK_ERROR",
        };
        f.write_str(name)
    }
}

/// Snapshot of validator state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PinningStatus {
    /// Pinning enforced
    pub enabled: bool,
    /// `initialize` has run
    pub initialized: bool,
    /// Domains with a pin record
    pub pinned_domains: Vec<String>,
    /// Backup fingerprints accepted
    pub allow_backup_certs: bool,
    /// Extra attempts for transient failures
    pub max_retries: u32,
    /// Per-attempt timeout
    pub timeout_ms: u64,
    /// Platforms with pinned-fetch support
    pub supported_platforms: Vec<Platform>,
}

/// Validates domains against pinned certificate fingerprints
pub struct CertificateValidator {
    config: PinningConfig,
    fetch: Arc<dyn PinnedFetch>,
    initialized: AtomicBool,
    debug_log: DebugLog,
}

impl CertificateValidator {
    /// Create validator; rejects malformed pins
    pub fn new(config: PinningConfig, fetch: Arc<dyn PinnedFetch>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            fetch,
            initialized: AtomicBool::new(false),
            debug_log: DebugLog::default(),
        })
    }

    /// Create validator backed by [`NativeTlsPinnedFetch`]
    pub fn with_native_tls(config: PinningConfig) -> Result<Self> {
        let fetch = NativeTlsPinnedFetch::new().map_err(|e| Error::NetworkFailure(e.to_string()))?;
        Self::new(config, Arc::new(fetch))
    }

    /// Mark the validator ready; idempotent
    pub fn initialize(&self) {
        if self.initialized.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(
            "Certificate pinning initialized (enabled={}, {} pinned domains)",
            self.config.enabled,
            self.config.pins.len()
        );
        self.debug_log.record(
            "certificate.rs:initialize",
            "pinning_initialized",
            format!(
                "enabled={} domains={}",
                self.config.enabled,
                self.config.domains().join(",")
            ),
        );
    }

    /// Validate a domain's certificate against its pins
    pub async fn validate_certificate(&self, domain: &str) -> ValidationOutcome {
        let host = host_of(domain);

        if !self.config.enabled {
            debug!("Pinning disabled; {} not checked", host);
            return ValidationOutcome::Valid;
        }

        let allowed = match self.allowed_fingerprints(&host) {
            Some(allowed) => allowed,
            None => {
                self.debug_log.record(
                    "certificate.rs:validate_certificate",
                    "unpinned_domain",
                    format!("domain={} outcome=VALID policy=fail-open", host),
                );
                debug!("No pin for {}; allowing", host);
                return ValidationOutcome::Valid;
            }
        };

        let attempts = self.config.policy.max_retries.saturating_add(1);
        let mut outcome = ValidationOutcome::NetworkError;

        for attempt in 1..=attempts {
            let request = PinnedRequest::new(
                Method::HEAD,
                format!("https://{}/", host),
                self.config.policy.timeout(),
            );

            outcome = match self.fetch.fetch(request, &allowed).await {
                Ok(response) => {
                    debug!("Pinned HEAD to {} returned {}", host, response.status);
                    ValidationOutcome::Valid
                }
                Err(FetchError::CertificateMismatch { presented, .. }) => {
                    warn!(
                        "Certificate for {} does not match any pin: possible interception",
                        host
                    );
                    self.debug_log.record(
                        "certificate.rs:validate_certificate",
                        "fingerprint_mismatch",
                        format!("domain={} presented={}", host, presented),
                    );
                    ValidationOutcome::InvalidFingerprint
                }
                Err(FetchError::CertificateRejected { reason, .. }) => {
                    warn!("TLS handshake with {} rejected its certificate: {}", host, reason);
                    self.debug_log.record(
                        "certificate.rs:validate_certificate",
                        "certificate_rejected",
                        format!("domain={} reason={}", host, reason),
                    );
                    ValidationOutcome::InvalidFingerprint
                }
                Err(FetchError::Timeout) => ValidationOutcome::Timeout,
                Err(FetchError::Network(e)) => {
                    debug!("Pinned fetch to {} failed: {}", host, e);
                    ValidationOutcome::NetworkError
                }
            };

            self.debug_log.record(
                "certificate.rs:validate_certificate",
                "validation_attempt",
                format!("domain={} attempt={}/{} outcome={}", host, attempt, attempts, outcome),
            );

            if !outcome.is_transient() {
                break;
            }
        }

        outcome
    }

    /// Allowed fingerprint set for a pinned domain; `None` when unpinned or
    /// when pinning is disabled
    pub fn allowed_fingerprints(&self, domain: &str) -> Option<BTreeSet<String>> {
        if !self.config.enabled {
            return None;
        }
        self.config
            .pin_for(domain)
            .map(|pin| pin.allowed_fingerprints(self.config.policy.allow_backup_certs))
    }

    /// Pinning enforced
    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// `initialize` has run
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// Platforms with pinned-fetch support
    pub fn supported_platforms(&self) -> &'static [Platform] {
        &SUPPORTED_PLATFORMS
    }

    /// Debug log snapshot, oldest first
    pub fn debug_log(&self) -> Vec<DebugLogEntry> {
        self.debug_log.snapshot()
    }

    /// Drop all debug log entries
    pub fn clear_debug_log(&self) {
        self.debug_log.clear();
    }

    /// Pin configuration
    pub fn config(&self) -> &PinningConfig {
        &self.config
    }

    pub(crate) fn fetcher(&self) -> Arc<dyn PinnedFetch> {
        Arc::clone(&self.fetch)
    }

    /// Status snapshot
    pub fn status(&self) -> PinningStatus {
        PinningStatus {
            enabled: self.config.enabled,
            initialized: self.is_initialized(),
            pinned_domains: self
                .config
                .domains()
                .into_iter()
                .map(str::to_string)
                .collect(),
            allow_backup_certs: self.config.policy.allow_backup_certs,
            max_retries: self.config.policy.max_retries,
            timeout_ms: self.config.policy.timeout_ms,
            supported_platforms: SUPPORTED_PLATFORMS.to_vec(),
        }
    }
}

/// Host part of a bare domain or URL, lowercased
pub(crate) fn host_of(domain_or_url: &str) -> String {
    let trimmed = domain_or_url.trim();
    let without_scheme = trimmed
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(trimmed);
    let authority = without_scheme
        .split(['/', '?', '#'])
        .next()
        .unwrap_or(without_scheme);
    let host = authority.rsplit_once('@').map(|(_, h)| h).unwrap_or(authority);
    let host = match host.rsplit_once(':') {
        Some((h, port)) if port.chars().all(|c| c.is_ascii_digit()) => h,
        _ => host,
    };
    host.to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pinned_fetch::PinnedResponse;
    use crate::pinning::{certificate_fingerprint, CertificatePin};
    use async_trait::async_trait;
    use parking_lot::Mutex;

    /// Fetch double that presents a fixed certificate and replays scripted failures
    struct FakeFetch {
        presented: String,
        failures: Mutex<Vec<FetchError>>,
        calls: Mutex<u32>,
    }

    impl FakeFetch {
        fn presenting(cert: &[u8]) -> Self {
            Self {
                presented: certificate_fingerprint(cert),
                failures: Mutex::new(Vec::new()),
                calls: Mutex::new(0),
            }
        }

        fn failing_first(self, failures: Vec<FetchError>) -> Self {
            *self.failures.lock() = failures;
            self
        }

        fn calls(&self) -> u32 {
            *self.calls.lock()
        }
    }

    #[async_trait]
    impl PinnedFetch for FakeFetch {
        async fn fetch(
            &self,
            _request: PinnedRequest,
            allowed: &BTreeSet<String>,
        ) -> std::result::Result<PinnedResponse, FetchError> {
            *self.calls.lock() += 1;
            {
                let mut failures = self.failures.lock();
                if !failures.is_empty() {
                    return Err(failures.remove(0));
                }
            }
            if !allowed.is_empty() && !allowed.contains(&self.presented) {
                return Err(FetchError::CertificateMismatch {
                    domain: "test".to_string(),
                    presented: self.presented.clone(),
                });
            }
            Ok(PinnedResponse {
                status: 200,
                headers: Vec::new(),
                body: Vec::new(),
            })
        }
    }

    fn config_with(pin: CertificatePin) -> PinningConfig {
        PinningConfig {
            pins: vec![pin],
            ..Default::default()
        }
    }

    #[test]
    fn test_host_of() {
        assert_eq!(host_of("api.example.com"), "api.example.com");
        assert_eq!(host_of("https://API.example.com:8443/v1?x=1"), "api.example.com");
        assert_eq!(host_of("user@api.example.com/path"), "api.example.com");
    }

    #[test]
    fn test_rejects_invalid_pin() {
        let fetch = Arc::new(FakeFetch::presenting(b"cert"));
        let config = config_with(CertificatePin::new("api.example.com", "short"));
        assert!(matches!(
            CertificateValidator::new(config, fetch),
            Err(Error::InvalidPin(_))
        ));
    }

    #[tokio::test]
    async fn test_unpinned_domain_fails_open_without_io() {
        let fetch = Arc::new(FakeFetch::presenting(b"cert"));
        let validator = CertificateValidator::new(PinningConfig::default(), fetch.clone()).unwrap();

        assert_eq!(
            validator.validate_certificate("unknown.example.com").await,
            ValidationOutcome::Valid
        );
        assert_eq!(fetch.calls(), 0);
        assert!(validator
            .debug_log()
            .iter()
            .any(|e| e.message == "unpinned_domain"));
    }

    #[tokio::test]
    async fn test_backup_fingerprint_policy() {
        let pin = CertificatePin::new("api.example.com", certificate_fingerprint(b"primary"))
            .with_backup(certificate_fingerprint(b"backup"));

        let fetch = Arc::new(FakeFetch::presenting(b"backup"));
        let validator = CertificateValidator::new(config_with(pin.clone()), fetch).unwrap();
        assert_eq!(
            validator.validate_certificate("api.example.com").await,
            ValidationOutcome::Valid
        );

        let mut strict = config_with(pin);
        strict.policy.allow_backup_certs = false;
        let fetch = Arc::new(FakeFetch::presenting(b"backup"));
        let validator = CertificateValidator::new(strict, fetch).unwrap();
        assert_eq!(
            validator.validate_certificate("api.example.com").await,
            ValidationOutcome::InvalidFingerprint
        );
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let pin = CertificatePin::new("api.example.com", certificate_fingerprint(b"cert"));
        let fetch = Arc::new(
            FakeFetch::presenting(b"cert")
                .failing_first(vec![FetchError::Timeout, FetchError::Network("reset".into())]),
        );
        let validator = CertificateValidator::new(config_with(pin), fetch.clone()).unwrap();

        assert_eq!(
            validator.validate_certificate("api.example.com").await,
            ValidationOutcome::Valid
        );
        assert_eq!(fetch.calls(), 3);
    }

    #[tokio::test]
    async fn test_retries_exhausted_reports_last_outcome() {
        let pin = CertificatePin::new("api.example.com", certificate_fingerprint(b"cert"));
        let mut config = config_with(pin);
        config.policy.max_retries = 1;
        let fetch = Arc::new(
            FakeFetch::presenting(b"cert")
                .failing_first(vec![FetchError::Network("dns".into()), FetchError::Timeout]),
        );
        let validator = CertificateValidator::new(config, fetch.clone()).unwrap();

        assert_eq!(
            validator.validate_certificate("api.example.com").await,
            ValidationOutcome::Timeout
        );
        assert_eq!(fetch.calls(), 2);
    }

    #[tokio::test]
    async fn test_mismatch_is_never_retried() {
        let pin = CertificatePin::new("api.example.com", certificate_fingerprint(b"pinned"));
        let fetch = Arc::new(FakeFetch::presenting(b"attacker"));
        let validator = CertificateValidator::new(config_with(pin), fetch.clone()).unwrap();

        assert_eq!(
            validator.validate_certificate("api.example.com").await,
            ValidationOutcome::InvalidFingerprint
        );
        assert_eq!(fetch.calls(), 1);
    }

    #[tokio::test]
    async fn test_rejected_handshake_is_not_retried() {
        let pin = CertificatePin::new("api.example.com", certificate_fingerprint(b"cert"));
        let fetch = Arc::new(FakeFetch::presenting(b"cert").failing_first(vec![
            FetchError::CertificateRejected {
                domain: "api.example.com".to_string(),
                reason: "self signed certificate in certificate chain".to_string(),
            },
        ]));
        let validator = CertificateValidator::new(config_with(pin), fetch.clone()).unwrap();

        assert_eq!(
            validator.validate_certificate("api.example.com").await,
            ValidationOutcome::InvalidFingerprint
        );
        assert_eq!(fetch.calls(), 1);
        assert!(validator
            .debug_log()
            .iter()
            .any(|e| e.message == "certificate_rejected"));
    }

    #[tokio::test]
    async fn test_disabled_pinning_skips_checks() {
        let pin = CertificatePin::new("api.example.com", certificate_fingerprint(b"pinned"));
        let mut config = config_with(pin);
        config.enabled = false;
        let fetch = Arc::new(FakeFetch::presenting(b"attacker"));
        let validator = CertificateValidator::new(config, fetch.clone()).unwrap();

        assert!(!validator.is_enabled());
        assert_eq!(
            validator.validate_certificate("api.example.com").await,
            ValidationOutcome::Valid
        );
        assert_eq!(fetch.calls(), 0);
    }

    #[test]
    fn test_initialize_and_status() {
        let pin = CertificatePin::new("api.example.com", certificate_fingerprint(b"cert"));
        let validator =
            CertificateValidator::new(config_with(pin), Arc::new(FakeFetch::presenting(b"cert")))
                .unwrap();
        assert!(!validator.is_initialized());

        validator.initialize();
        validator.initialize();

        let status = validator.status();
        assert!(status.initialized);
        assert_eq!(status.pinned_domains, vec!["api.example.com".to_string()]);
        assert_eq!(status.timeout_ms, 10_000);
        assert_eq!(validator.supported_platforms().len(), 5);
        assert_eq!(
            validator
                .debug_log()
                .iter()
                .filter(|e| e.message == "pinning_initialized")
                .count(),
            1
        );

        validator.clear_debug_log();
        assert!(validator.debug_log().is_empty());
    }
}
