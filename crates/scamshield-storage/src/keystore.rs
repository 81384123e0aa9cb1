//! Secure key-value persistence
//!
//! Unified string key-value interface over platform-specific secure storage:
//! - Android: EncryptedSharedPreferences backed by the Android Keystore
//! - iOS/macOS: Keychain (`kSecAttrAccessibleWhenUnlockedThisDeviceOnly`)
//! - Windows: DPAPI-protected credential store
//! - Linux: libsecret (GNOME Keyring / KDE Wallet)
//!
//! Native implementations live with the host application and are handed to
//! the services as `Arc<dyn KeyStore>`.

use crate::Result;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Supported platforms
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// Android
    Android,
    /// iOS
    Ios,
    /// macOS
    MacOs,
    /// Windows
    Windows,
    /// Linux
    Linux,
    /// Unknown platform
    Unknown,
}

impl Platform {
    /// Detect current platform at compile time
    pub fn current() -> Self {
        #[cfg(target_os = "android")]
        return Platform::Android;

        #[cfg(target_os = "ios")]
        return Platform::Ios;

        #[cfg(target_os = "macos")]
        return Platform::MacOs;

        #[cfg(target_os = "windows")]
        return Platform::Windows;

        #[cfg(target_os = "linux")]
        return Platform::Linux;

        #[cfg(not(any(
            target_os = "android",
            target_os = "ios",
            target_os = "macos",
            target_os = "windows",
            target_os = "linux"
        )))]
        return Platform::Unknown;
    }

    /// Header/wire name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Android => "android",
            Self::Ios => "ios",
            Self::MacOs => "macos",
            Self::Windows => "windows",
            Self::Linux => "linux",
            Self::Unknown => "unknown",
        }
    }

    /// Mobile platforms carry root/jailbreak and emulator heuristics
    pub fn is_mobile(&self) -> bool {
        matches!(self, Self::Android | Self::Ios)
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Secure, persistent string key-value store.
///
/// Every call is a suspension point: native stores hop to a platform thread.
#[async_trait]
pub trait KeyStore: Send + Sync {
    /// Read a value; `None` when the entry does not exist
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write a value, replacing any previous entry
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Delete an entry; deleting a missing entry is not an error
    async fn delete(&self, key: &str) -> Result<()>;
}

/// In-memory key store for tests and platforms without native integration
#[derive(Debug, Default)]
pub struct MemoryKeyStore {
    entries: RwLock<HashMap<String, String>>,
    writes: AtomicUsize,
}

impl MemoryKeyStore {
    /// Create empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create pre-populated store
    pub fn with_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            entries: RwLock::new(
                entries
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
            writes: AtomicUsize::new(0),
        }
    }

    /// Number of `set` calls served so far
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Whether an entry exists
    pub fn contains(&self, key: &str) -> bool {
        self.entries.read().contains_key(key)
    }

    /// Raw synchronous read (test helper)
    pub fn peek(&self, key: &str) -> Option<String> {
        self.entries.read().get(key).cloned()
    }
}

#[async_trait]
impl KeyStore for MemoryKeyStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.read().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.entries
            .write()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.write().remove(key);
        Ok(())
    }
}
