//! Error types for the tracker.

use thiserror::Error;

/// Result type for tracker operations.
pub type TrackerResult<T> = Result<T, TrackerError>;

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("ledger error: {0}")]
    Ledger(#[from] desi_ledger::LedgerError),

    #[error("report error: {0}")]
    Report(#[from] desi_report::ReportError),

    #[error("crypto error: {0}")]
    Crypto(#[from] desi_crypto::CryptoError),

    #[error("license error: {0}")]
    License(#[from] desi_license::LicenseError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("tracker lock poisoned")]
    Poisoned,
}
