//! Error types for report export and import.

use thiserror::Error;

/// Result type for report operations.
pub type ReportResult<T> = Result<T, ReportError>;

#[derive(Debug, Error)]
pub enum ReportError {
    /// None of the candidate keys opened the blob.
    #[error("no candidate key decrypts this report ({tried} tried)")]
    NoMatchingKey { tried: usize },

    /// The blob was written without encryption and degraded input was not allowed.
    #[error("report was exported in degraded (unencrypted) mode")]
    Degraded,

    /// Decrypted content is not a usable report.
    #[error("invalid report: {0}")]
    InvalidReport(String),

    #[error("crypto error: {0}")]
    Crypto(#[from] desi_crypto::CryptoError),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("registry lock poisoned")]
    Poisoned,
}
