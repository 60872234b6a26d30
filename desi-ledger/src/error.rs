//! Error types for the ledger.

use thiserror::Error;

/// Result type for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Errors that can occur in ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error (file system).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Details could not be encrypted.
    #[error("encryption error: {0}")]
    Encryption(#[from] desi_crypto::CryptoError),

    /// A stored row could not be decoded.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// The background writer has stopped.
    #[error("ledger writer is not running")]
    WriterStopped,

    /// A lock holder panicked.
    #[error("ledger lock poisoned")]
    Poisoned,
}
