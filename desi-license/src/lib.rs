//! Licensing for DESI.
//!
//! This module handles:
//! - License key generation and format validation (`DESI-XXXXXXXX-YYYYYYYY-CCCC`)
//! - Machine identity for key derivation and audit correlation
//! - Expiry arithmetic, reminder levels and feature restriction
//!
//! A well-formed key is not proof of issuance. Anyone can produce one; the
//! key's real job is to seed the report encryption key.

mod device;
mod error;
mod key;
mod status;

pub use device::{MachineIdentity, MachineInfo};
pub use error::{LicenseError, LicenseResult};
pub use key::{LicenseKey, KEY_PREFIX};
pub use status::{
    check_license, days_left, should_restrict_features, LicenseCheck, LicenseInfo, ReminderLevel,
    FEATURE_RESTRICTED_MESSAGE, RESTRICTED_FEATURES,
};
