//! Certificate pin configuration
//!
//! A pin is the Base64 SHA-256 fingerprint of a domain's leaf certificate
//! (DER). Each domain has a primary and an optional backup fingerprint.

use crate::{Error, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::info;

/// Optional fingerprint prefix accepted in config
pub const FINGERPRINT_PREFIX: &str = "sha256/";
/// Length of a Base64-encoded SHA-256 digest
const FINGERPRINT_B64_LEN: usize = 44;

fn default_max_cert_age_days() -> u32 {
    365
}

/// Pinned fingerprints for one domain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificatePin {
    /// Domain this pin applies to (exact host match)
    pub domain: String,
    /// Current certificate fingerprint
    pub primary_fingerprint: String,
    /// Next certificate fingerprint, used during rotation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_fingerprint: Option<String>,
    /// Oldest acceptable certificate age
    #[serde(default = "default_max_cert_age_days")]
    pub max_cert_age_days: u32,
}

impl CertificatePin {
    /// Create pin with a primary fingerprint
    pub fn new(domain: impl Into<String>, primary_fingerprint: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            primary_fingerprint: primary_fingerprint.into(),
            backup_fingerprint: None,
            max_cert_age_days: default_max_cert_age_days(),
        }
    }

    /// Add a backup fingerprint
    pub fn with_backup(mut self, backup_fingerprint: impl Into<String>) -> Self {
        self.backup_fingerprint = Some(backup_fingerprint.into());
        self
    }

    /// Validate domain and fingerprint format
    pub fn validate(&self) -> Result<()> {
        if self.domain.trim().is_empty() {
            return Err(Error::InvalidPin("empty domain".to_string()));
        }
        validate_fingerprint(&self.primary_fingerprint)
            .map_err(|e| Error::InvalidPin(format!("{} primary: {}", self.domain, e)))?;
        if let Some(backup) = &self.backup_fingerprint {
            validate_fingerprint(backup)
                .map_err(|e| Error::InvalidPin(format!("{} backup: {}", self.domain, e)))?;
        }
        if self.max_cert_age_days == 0 {
            return Err(Error::InvalidPin(format!(
                "{}: max_cert_age_days must be positive",
                self.domain
            )));
        }
        Ok(())
    }

    /// Normalized fingerprints a connection may present
    pub fn allowed_fingerprints(&self, allow_backup: bool) -> BTreeSet<String> {
        let mut allowed = BTreeSet::new();
        allowed.insert(normalize_fingerprint(&self.primary_fingerprint).to_string());
        if allow_backup {
            if let Some(backup) = &self.backup_fingerprint {
                allowed.insert(normalize_fingerprint(backup).to_string());
            }
        }
        allowed
    }
}

/// Global validation policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PinningPolicy {
    /// Accept backup fingerprints
    pub allow_backup_certs: bool,
    /// Default certificate age bound
    pub max_cert_age_days: u32,
    /// Extra attempts after a timeout or network error
    pub max_retries: u32,
    /// Per-attempt timeout
    pub timeout_ms: u64,
}

impl PinningPolicy {
    /// Per-attempt timeout as a duration
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for PinningPolicy {
    fn default() -> Self {
        Self {
            allow_backup_certs: true,
            max_cert_age_days: default_max_cert_age_days(),
            max_retries: 2,
            timeout_ms: 10_000,
        }
    }
}

/// SSL pinning configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PinningConfig {
    /// Whether pinning is enforced at all
    pub enabled: bool,
    /// Per-domain pins
    pub pins: Vec<CertificatePin>,
    /// Validation policy
    pub policy: PinningPolicy,
}

impl Default for PinningConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            pins: Vec::new(),
            policy: PinningPolicy::default(),
        }
    }
}

impl PinningConfig {
    /// Validate every pin and reject duplicate domains
    pub fn validate(&self) -> Result<()> {
        let mut seen = BTreeSet::new();
        for pin in &self.pins {
            pin.validate()?;
            if !seen.insert(pin.domain.to_ascii_lowercase()) {
                return Err(Error::InvalidPin(format!("duplicate domain {}", pin.domain)));
            }
        }
        if self.policy.timeout_ms == 0 {
            return Err(Error::InvalidPin("timeout_ms must be positive".to_string()));
        }
        Ok(())
    }

    /// Pin record for a domain (case-insensitive)
    pub fn pin_for(&self, domain: &str) -> Option<&CertificatePin> {
        self.pins
            .iter()
            .find(|pin| pin.domain.eq_ignore_ascii_case(domain))
    }

    /// Pinned domains
    pub fn domains(&self) -> Vec<&str> {
        self.pins.iter().map(|pin| pin.domain.as_str()).collect()
    }

    /// Export pins as JSON
    pub fn export(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.pins)?)
    }

    /// Import pins from JSON, replacing any existing pin for the same domain
    pub fn import(&mut self, json: &str) -> Result<()> {
        let pins: Vec<CertificatePin> = serde_json::from_str(json)?;
        for pin in pins {
            pin.validate()?;
            info!("Importing certificate pin for {}", pin.domain);
            self.pins
                .retain(|existing| !existing.domain.eq_ignore_ascii_case(&pin.domain));
            self.pins.push(pin);
        }
        Ok(())
    }
}

/// Strip the optional `sha256/` prefix
pub fn normalize_fingerprint(fingerprint: &str) -> &str {
    let trimmed = fingerprint.trim();
    trimmed.strip_prefix(FINGERPRINT_PREFIX).unwrap_or(trimmed)
}

/// Fingerprint of a DER certificate: Base64(SHA-256(der))
pub fn certificate_fingerprint(der: &[u8]) -> String {
    STANDARD.encode(Sha256::digest(der))
}

fn validate_fingerprint(fingerprint: &str) -> std::result::Result<(), String> {
    let fingerprint = normalize_fingerprint(fingerprint);
    if fingerprint.len() != FINGERPRINT_B64_LEN {
        return Err(format!(
            "expected {} chars, got {}",
            FINGERPRINT_B64_LEN,
            fingerprint.len()
        ));
    }
    match STANDARD.decode(fingerprint) {
        Ok(bytes) if bytes.len() == 32 => Ok(()),
        Ok(bytes) => Err(format!("expected 32-byte digest, got {}", bytes.len())),
        Err(e) => Err(format!("not Base64: {}", e)),
    }
}
