//! Expiry arithmetic and reminder policy.

use crate::key::LicenseKey;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The locally installed license.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicenseInfo {
    pub license_key: String,
    pub activated_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub last_validated: Option<DateTime<Utc>>,
}

/// Whole days until `expires_at`, floored. Negative as soon as the expiry
/// has passed.
#[must_use]
pub fn days_left(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let remaining = expires_at - now;
    let days = remaining.num_days();
    // num_days truncates toward zero; one hour past expiry is day -1.
    if remaining < chrono::Duration::zero() && remaining != chrono::Duration::days(days) {
        days - 1
    } else {
        days
    }
}

/// Only an expired license restricts features.
#[must_use]
pub fn should_restrict_features(days_left: i64) -> bool {
    days_left < 0
}

/// Features switched off once a license has expired. Browsing history and
/// exporting the usage report stay available.
pub const RESTRICTED_FEATURES: &[&str] = &[
    "load_sample",
    "export_data",
    "split_metabolites",
    "generate_report",
    "roi_analysis",
    "metabolite_search",
];

/// Shown when a restricted feature is requested under an expired license.
pub const FEATURE_RESTRICTED_MESSAGE: &str = "This feature is restricted.\n\n\
Your license has expired and this feature is no longer available.\n\
Contact your administrator to renew and restore all features.\n\n\
You can still:\n\
• view historical data\n\
• export usage reports";

/// How loudly to remind the user about an upcoming expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReminderLevel {
    None,
    Info,
    Warning,
    Urgent,
    Expired,
}

impl ReminderLevel {
    #[must_use]
    pub fn from_days_left(days_left: i64) -> Self {
        match days_left {
            d if d < 0 => Self::Expired,
            d if d <= 14 => Self::Urgent,
            d if d <= 30 => Self::Warning,
            d if d <= 60 => Self::Info,
            _ => Self::None,
        }
    }

    #[must_use]
    pub fn should_show(&self) -> bool {
        *self != Self::None
    }

    /// User-facing reminder text, or `None` when nothing should be shown.
    #[must_use]
    pub fn message(&self, days_left: i64, customer: &str) -> Option<String> {
        match self {
            Self::None => None,
            Self::Expired => Some(format!(
                "[Expired] {customer}'s license has expired. Renew to restore full functionality."
            )),
            Self::Urgent => Some(format!(
                "[Urgent] {customer}'s license expires in {days_left} days. Please renew soon."
            )),
            Self::Warning => Some(format!(
                "[Reminder] {customer}'s license expires in {days_left} days. Please plan a renewal."
            )),
            Self::Info => Some(format!(
                "[Info] {customer}'s license expires in {days_left} days."
            )),
        }
    }
}

/// Outcome of [`check_license`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicenseCheck {
    /// Well-formed and not expired.
    pub valid: bool,
    pub format_valid: bool,
    pub expired: bool,
    /// `None` when no expiry is known.
    pub days_left: Option<i64>,
    pub reminder: ReminderLevel,
}

impl LicenseCheck {
    #[must_use]
    pub fn restrict_features(&self) -> bool {
        self.days_left.is_some_and(should_restrict_features)
    }

    /// The features this license currently blocks. Empty unless expired.
    #[must_use]
    pub fn restricted_features(&self) -> &'static [&'static str] {
        if self.restrict_features() {
            RESTRICTED_FEATURES
        } else {
            &[]
        }
    }

    #[must_use]
    pub fn is_feature_allowed(&self, feature: &str) -> bool {
        !self.restricted_features().contains(&feature)
    }

    /// Why `feature` is blocked, or `None` when it is allowed.
    #[must_use]
    pub fn restriction_message(&self, feature: &str) -> Option<&'static str> {
        (!self.is_feature_allowed(feature)).then_some(FEATURE_RESTRICTED_MESSAGE)
    }
}

/// Checks `key` for format and, when `info` describes the same key with an
/// expiry, for expiry relative to `now`.
#[must_use]
pub fn check_license(key: &str, info: Option<&LicenseInfo>, now: DateTime<Utc>) -> LicenseCheck {
    let parsed = LicenseKey::parse(key).ok();
    let Some(parsed) = parsed else {
        return LicenseCheck {
            valid: false,
            format_valid: false,
            expired: false,
            days_left: None,
            reminder: ReminderLevel::None,
        };
    };

    let days = info
        .filter(|i| i.license_key.trim() == parsed.to_string())
        .and_then(|i| i.expires_at)
        .map(|expires_at| days_left(expires_at, now));

    let expired = days.is_some_and(|d| d < 0);
    LicenseCheck {
        valid: !expired,
        format_valid: true,
        expired,
        days_left: days,
        reminder: days.map_or(ReminderLevel::None, ReminderLevel::from_days_left),
    }
}
