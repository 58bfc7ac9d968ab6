//! Error types for credential-cache

use thiserror::Error;

/// Result type alias for cache operations
pub type Result<T> = std::result::Result<T, CacheError>;

/// Cache error types
#[derive(Error, Debug)]
pub enum CacheError {
    /// Key generation failed. The epoch was left uninitialized, so the next
    /// call retries from scratch.
    #[error("Cache initialization failed: {0}")]
    InitializationError(String),

    #[error("Encryption failed: {0}")]
    EncryptionError(String),

    /// A stored entry could not be decrypted. The entry has already been
    /// removed from the cache.
    #[error("Decryption failed: {0}")]
    DecryptionError(String),

    #[error("Random source failed: {0}")]
    RandomSourceError(String),

    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl CacheError {
    /// Whether the caller should fall back to prompting the user rather than
    /// treating the failure as fatal.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            CacheError::InitializationError(_)
                | CacheError::DecryptionError(_)
                | CacheError::EncryptionError(_)
                | CacheError::RandomSourceError(_)
        )
    }
}
