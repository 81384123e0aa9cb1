//! Key persistence and local cryptography for ScamShield
//!
//! ## Security Features
//!
//! - **Key Store**: string key-value interface over the platform secure store
//! - **Device-local encryption**: AES-256-CBC (or opt-in AES-256-GCM) with
//!   key material generated on-device and never exported
//! - **Transport encryption**: AES-256-CBC keyed by SHA-256 of a pre-shared secret
//! - **App settings**: persisted copy/paste, screenshot, backup,
//!   screen-recording and autocomplete protections

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod encryption;
pub mod error;
pub mod keystore;
pub mod security;
pub mod settings;
pub mod transport_cipher;

pub use encryption::{EncryptionService, KeyMaterial, ENCRYPTION_IV_ENTRY, ENCRYPTION_KEY_ENTRY};
pub use error::{Error, Result};
pub use keystore::{KeyStore, MemoryKeyStore, Platform};
pub use security::{hash_sha256, hash_sha256_hex, random_bytes, EncryptionAlgorithm};
pub use settings::{AppSecurityFlags, AppSecuritySetting, SecuritySettings};
pub use transport_cipher::{TransportCipher, TransportPayload};
