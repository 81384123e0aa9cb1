//! Error types

/// Storage and encryption errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Key store backend failed
    #[error("Key store error: {0}")]
    KeyStore(String),

    /// Key material was expected but is not present
    #[error("Key material missing: {0}")]
    KeyMaterialMissing(String),

    /// Encryption error
    #[error("Encryption error: {0}")]
    Encryption(String),

    /// Decryption error (malformed payload, wrong key, bad padding)
    #[error("Decryption error: {0}")]
    Decryption(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type
pub type Result<T> = std::result::Result<T, Error>;
