//! App-level security settings
//!
//! Boolean protections the host application enforces on its screens:
//! - Copy/paste blocking on sensitive fields
//! - Screenshot blocking (FLAG_SECURE on Android, secure text field on iOS)
//! - Backup exclusion
//! - Screen-recording blocking
//! - Keyboard autocomplete/learning off on sensitive fields
//!
//! Each flag is persisted in the key store as the string `"true"` when
//! enabled. Anything else, including a missing entry, reads as disabled.

use crate::keystore::KeyStore;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// Individual protection flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AppSecuritySetting {
    /// Copy/paste disabled on sensitive fields
    CopyPasteDisabled,
    /// Screenshots blocked
    ScreenshotDisabled,
    /// App data excluded from OS backups
    BackupDisabled,
    /// Screen recording blocked
    ScreenRecordingDisabled,
    /// Keyboard autocomplete disabled on sensitive fields
    KeyboardAutocompleteDisabled,
}

impl AppSecuritySetting {
    /// Every flag, in baseline order
    pub const ALL: [AppSecuritySetting; 5] = [
        Self::CopyPasteDisabled,
        Self::ScreenshotDisabled,
        Self::BackupDisabled,
        Self::ScreenRecordingDisabled,
        Self::KeyboardAutocompleteDisabled,
    ];

    /// Key store entry name
    pub fn key(&self) -> &'static str {
        match self {
            Self::CopyPasteDisabled => "security_copy_paste_disabled",
            Self::ScreenshotDisabled => "security_screenshot_disabled",
            Self::BackupDisabled => "security_backup_disabled",
            Self::ScreenRecordingDisabled => "security_screen_recording_disabled",
            Self::KeyboardAutocompleteDisabled => "security_keyboard_autocomplete_disabled",
        }
    }

    /// Human-readable description, used in status warnings
    pub fn description(&self) -> &'static str {
        match self {
            Self::CopyPasteDisabled => "Copy/paste protection",
            Self::ScreenshotDisabled => "Screenshot protection",
            Self::BackupDisabled => "Backup exclusion",
            Self::ScreenRecordingDisabled => "Screen-recording protection",
            Self::KeyboardAutocompleteDisabled => "Keyboard autocomplete protection",
        }
    }
}

/// Snapshot of all flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppSecurityFlags {
    /// Copy/paste disabled
    pub copy_paste_disabled: bool,
    /// Screenshots disabled
    pub screenshot_disabled: bool,
    /// Backups disabled
    pub backup_disabled: bool,
    /// Screen recording disabled
    pub screen_recording_disabled: bool,
    /// Keyboard autocomplete disabled
    pub keyboard_autocomplete_disabled: bool,
}

impl AppSecurityFlags {
    /// Value of a single flag
    pub fn get(&self, setting: AppSecuritySetting) -> bool {
        match setting {
            AppSecuritySetting::CopyPasteDisabled => self.copy_paste_disabled,
            AppSecuritySetting::ScreenshotDisabled => self.screenshot_disabled,
            AppSecuritySetting::BackupDisabled => self.backup_disabled,
            AppSecuritySetting::ScreenRecordingDisabled => self.screen_recording_disabled,
            AppSecuritySetting::KeyboardAutocompleteDisabled => {
                self.keyboard_autocomplete_disabled
            }
        }
    }

    /// Flags that are currently off
    pub fn disabled(&self) -> Vec<AppSecuritySetting> {
        AppSecuritySetting::ALL
            .into_iter()
            .filter(|s| !self.get(*s))
            .collect()
    }
}

/// Settings store backed by a [`KeyStore`]
pub struct SecuritySettings {
    store: Arc<dyn KeyStore>,
}

impl SecuritySettings {
    /// Create settings store
    pub fn new(store: Arc<dyn KeyStore>) -> Self {
        Self { store }
    }

    /// Read a flag
    pub async fn is_enabled(&self, setting: AppSecuritySetting) -> Result<bool> {
        Ok(self.store.get(setting.key()).await?.as_deref() == Some("true"))
    }

    /// Write a flag
    pub async fn set(&self, setting: AppSecuritySetting, enabled: bool) -> Result<()> {
        debug!("Setting {} = {}", setting.key(), enabled);
        self.store
            .set(setting.key(), if enabled { "true" } else { "false" })
            .await
    }

    /// Enable every protection
    pub async fn apply_baseline(&self) -> Result<()> {
        for setting in AppSecuritySetting::ALL {
            self.set(setting, true).await?;
        }
        info!("Applied baseline app security settings");
        Ok(())
    }

    /// Read all flags
    pub async fn snapshot(&self) -> Result<AppSecurityFlags> {
        Ok(AppSecurityFlags {
            copy_paste_disabled: self.is_enabled(AppSecuritySetting::CopyPasteDisabled).await?,
            screenshot_disabled: self.is_enabled(AppSecuritySetting::ScreenshotDisabled).await?,
            backup_disabled: self.is_enabled(AppSecuritySetting::BackupDisabled).await?,
            screen_recording_disabled: self
                .is_enabled(AppSecuritySetting::ScreenRecordingDisabled)
                .await?,
            keyboard_autocomplete_disabled: self
                .is_enabled(AppSecuritySetting::KeyboardAutocompleteDisabled)
                .await?,
        })
    }
}
