use thiserror::Error;

/// Errors raised by the alias store.
///
/// Every variant leaves the in-memory table untouched: a mutation is only
/// installed after its write reached disk.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Reading or writing the alias file failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The table could not be encoded or the file could not be decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Specialized result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;
