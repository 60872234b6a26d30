//! Error types for the licensing module.

use thiserror::Error;

/// Licensing-specific errors.
#[derive(Debug, Error)]
pub enum LicenseError {
    /// Invalid license key format.
    #[error("invalid license key format: {0}")]
    InvalidKeyFormat(String),

    /// License has expired.
    #[error("license expired on {0}")]
    Expired(String),
}

/// Result type for license operations.
pub type LicenseResult<T> = Result<T, LicenseError>;
