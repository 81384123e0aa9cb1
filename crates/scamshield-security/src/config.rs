//! Security configuration
//!
//! Loaded from JSON; every section and field has a default, so a partial
//! file only overrides what it names.

use crate::{Error, Result};
use scamshield_net::{ClientConfig, PinningConfig};
use scamshield_storage::{EncryptionAlgorithm, Platform};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

/// Environment variable overriding `transport_encryption.shared_secret`
pub const SHARED_SECRET_ENV: &str = "SCAMSHIELD_SHARED_SECRET";

/// Build flavour; decides whether violations abort initialization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildMode {
    /// Violations are logged as warnings
    Development,
    /// Violations fail initialization
    Production,
}

impl BuildMode {
    /// Whether violations are fatal
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

impl Default for BuildMode {
    fn default() -> Self {
        if cfg!(debug_assertions) {
            Self::Development
        } else {
            Self::Production
        }
    }
}

/// Device-local encryption
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncryptionSettings {
    /// Encrypt at-rest data
    pub enabled: bool,
    /// Cipher for new ciphertexts
    pub algorithm: EncryptionAlgorithm,
    /// Declared key size, audited against the algorithm
    pub key_size_bits: u32,
}

impl Default for EncryptionSettings {
    fn default() -> Self {
        let algorithm = EncryptionAlgorithm::default();
        Self {
            enabled: true,
            algorithm,
            key_size_bits: algorithm.key_size_bits(),
        }
    }
}

/// Transport-level request/response encryption
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportEncryptionSettings {
    /// Encrypt request bodies
    pub enabled: bool,
    /// Secret shared with the server
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shared_secret: Option<String>,
}

impl std::fmt::Debug for TransportEncryptionSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportEncryptionSettings")
            .field("enabled", &self.enabled)
            .field(
                "shared_secret",
                &self.shared_secret.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

/// Per-endpoint rate limiting
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
    /// Apply the limiter
    pub enabled: bool,
    /// Calls per endpoint per minute
    pub requests_per_minute: u32,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            requests_per_minute: 60,
        }
    }
}

/// Root/jailbreak detection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RootDetectionSettings {
    /// Run the root probe
    pub enabled: bool,
}

impl Default for RootDetectionSettings {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Permissions the app is allowed to request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PermissionSettings {
    /// Short permission names (`INTERNET`, `CAMERA`, ...)
    pub allowed: Vec<String>,
}

impl Default for PermissionSettings {
    fn default() -> Self {
        Self {
            allowed: vec!["INTERNET".to_string(), "ACCESS_NETWORK_STATE".to_string()],
        }
    }
}

/// Backend API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
    /// Prefix for relative request URLs
    pub base_url: String,
    /// Sent as `X-App-Version`
    pub app_version: String,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.scamshield.app/v1".to_string(),
            app_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Full security configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Device-local encryption
    pub encryption: EncryptionSettings,
    /// Transport encryption
    pub transport_encryption: TransportEncryptionSettings,
    /// Rate limiting
    pub rate_limiting: RateLimitSettings,
    /// SSL pinning
    pub ssl_pinning: PinningConfig,
    /// Root detection
    pub root_detection: RootDetectionSettings,
    /// Permission allow-list
    pub permissions: PermissionSettings,
    /// Backend API
    pub api: ApiSettings,
    /// Build flavour
    pub build_mode: BuildMode,
}

impl SecurityConfig {
    /// Parse and validate JSON
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| Error::Config(format!("Invalid security config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load, validate and apply environment overrides
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading security config from {}", path.display());
        let contents = std::fs::read_to_string(path)?;
        let mut config = Self::from_json_str(&contents)?;
        config.apply_env_overrides();
        info!("Loaded security config from {}", path.display());
        Ok(config)
    }

    /// Apply `SCAMSHIELD_SHARED_SECRET`
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(secret) = lookup(SHARED_SECRET_ENV).filter(|s| !s.is_empty()) {
            debug!("Transport shared secret taken from {}", SHARED_SECRET_ENV);
            self.transport_encryption.shared_secret = Some(secret);
        }
    }

    /// Reject configurations the subsystem cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.rate_limiting.enabled && self.rate_limiting.requests_per_minute == 0 {
            return Err(Error::Config(
                "rate_limiting.requests_per_minute must be positive".to_string(),
            ));
        }
        self.ssl_pinning
            .validate()
            .map_err(|e| Error::Config(e.to_string()))?;
        Ok(())
    }

    /// Settings for the API client
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            base_url: self.api.base_url.clone(),
            app_version: self.api.app_version.clone(),
            platform: Platform::current(),
            rate_limiting_enabled: self.rate_limiting.enabled,
            requests_per_minute: self.rate_limiting.requests_per_minute,
            transport_encryption_enabled: self.transport_encryption.enabled,
            shared_secret: self.transport_encryption.shared_secret.clone(),
            timeout: self.ssl_pinning.policy.timeout(),
        }
    }
}
