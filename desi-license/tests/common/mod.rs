//! Shared test helpers for license tests.

#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use desi_license::{LicenseInfo, LicenseKey};

/// A fixed "now" so day arithmetic never straddles midnight mid-test.
pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
}

/// Installed license info for `key` expiring `days` days after [`fixed_now`].
pub fn info_expiring_in(key: &LicenseKey, days: i64) -> LicenseInfo {
    let now = fixed_now();
    LicenseInfo {
        license_key: key.to_string(),
        activated_at: now - Duration::days(365),
        expires_at: Some(now + Duration::days(days)),
        last_validated: None,
    }
}
