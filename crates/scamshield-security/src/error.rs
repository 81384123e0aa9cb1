//! Error types

/// Security subsystem errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Initialization failed (fatal in production builds)
    #[error("Initialization error: {0}")]
    Initialization(String),

    /// Operation needs `initialize()` first
    #[error("Security manager not initialized")]
    NotInitialized,

    /// Invalid or unusable configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Key store or encryption error
    #[error("Storage error: {0}")]
    Storage(#[from] scamshield_storage::Error),

    /// Network security error
    #[error("Network error: {0}")]
    Net(#[from] scamshield_net::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type
pub type Result<T> = std::result::Result<T, Error>;
