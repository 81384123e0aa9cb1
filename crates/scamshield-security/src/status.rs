//! Aggregate status reporting

use crate::config::BuildMode;
use crate::integrity::SecurityCheckResult;
use chrono::{DateTime, Utc};
use scamshield_net::PinningStatus;
use scamshield_storage::{AppSecurityFlags, EncryptionAlgorithm, Platform};
use serde::{Deserialize, Serialize};

/// Combined device, app-setting, encryption and pinning status
///
/// `is_secure` holds iff `violations` is empty. Violations are exactly the
/// device threats; configuration gaps go to `warnings`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityStatus {
    /// No violations
    pub is_secure: bool,
    /// Device integrity check result
    pub device_security: SecurityCheckResult,
    /// App-level protection flags
    pub app_security: AppSecurityFlags,
    /// Local encryption active
    pub encryption_enabled: bool,
    /// SSL pinning status
    pub ssl_pinning: PinningStatus,
    /// Device threats
    pub violations: Vec<String>,
    /// Non-fatal configuration gaps
    pub warnings: Vec<String>,
    /// When the check ran
    pub checked_at: DateTime<Utc>,
}

impl SecurityStatus {
    /// Assemble status; violations mirror the device threats
    pub fn assemble(
        device_security: SecurityCheckResult,
        app_security: AppSecurityFlags,
        encryption_enabled: bool,
        ssl_pinning: PinningStatus,
    ) -> Self {
        let violations = device_security.threats.clone();

        let mut warnings: Vec<String> = app_security
            .disabled()
            .into_iter()
            .map(|setting| format!("App protection off: {}", setting.description()))
            .collect();
        if !encryption_enabled {
            warnings.push("Local data encryption is disabled".to_string());
        }
        if !ssl_pinning.enabled {
            warnings.push("SSL certificate pinning is disabled".to_string());
        }

        Self {
            is_secure: violations.is_empty(),
            device_security,
            app_security,
            encryption_enabled,
            ssl_pinning,
            violations,
            warnings,
            checked_at: Utc::now(),
        }
    }
}

/// Static facts about the running device and build
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    /// Detected platform
    pub platform: Platform,
    /// `std::env::consts::OS`
    pub os: String,
    /// `std::env::consts::ARCH`
    pub arch: String,
    /// Android or iOS
    pub is_mobile: bool,
    /// Compiled with debug assertions
    pub debug_build: bool,
    /// Configured build flavour
    pub build_mode: BuildMode,
    /// App version sent to the API
    pub app_version: String,
    /// Pinning supported on this platform
    pub ssl_pinning_supported: bool,
    /// Local encryption algorithm
    pub encryption_algorithm: EncryptionAlgorithm,
}
