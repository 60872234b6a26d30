mod common;

use chrono::Duration;
use common::{fixed_now, info_expiring_in};
use desi_license::{
    check_license, days_left, should_restrict_features, LicenseKey, ReminderLevel,
    FEATURE_RESTRICTED_MESSAGE, RESTRICTED_FEATURES,
};

#[test]
fn days_left_counts_whole_days() {
    let now = fixed_now();
    assert_eq!(days_left(now + Duration::days(10), now), 10);
    assert_eq!(days_left(now + Duration::hours(36), now), 1);
    assert_eq!(days_left(now, now), 0);
}

#[test]
fn days_left_goes_negative_immediately_after_expiry() {
    let now = fixed_now();
    assert_eq!(days_left(now - Duration::hours(1), now), -1);
    assert_eq!(days_left(now - Duration::days(1), now), -1);
    assert_eq!(days_left(now - Duration::hours(25), now), -2);
}

#[test]
fn reminder_levels() {
    assert_eq!(ReminderLevel::from_days_left(-1), ReminderLevel::Expired);
    assert_eq!(ReminderLevel::from_days_left(0), ReminderLevel::Urgent);
    assert_eq!(ReminderLevel::from_days_left(10), ReminderLevel::Urgent);
    assert_eq!(ReminderLevel::from_days_left(14), ReminderLevel::Urgent);
    assert_eq!(ReminderLevel::from_days_left(15), ReminderLevel::Warning);
    assert_eq!(ReminderLevel::from_days_left(30), ReminderLevel::Warning);
    assert_eq!(ReminderLevel::from_days_left(31), ReminderLevel::Info);
    assert_eq!(ReminderLevel::from_days_left(60), ReminderLevel::Info);
    assert_eq!(ReminderLevel::from_days_left(61), ReminderLevel::None);
    assert!(!ReminderLevel::None.should_show());
    assert!(ReminderLevel::Info.should_show());
}

#[test]
fn reminder_messages() {
    assert!(ReminderLevel::None.message(90, "Lab").is_none());
    let urgent = ReminderLevel::Urgent.message(3, "Lab").unwrap();
    assert!(urgent.contains("Lab"));
    assert!(urgent.contains('3'));
}

#[test]
fn only_expired_restricts_features() {
    assert!(should_restrict_features(-1));
    assert!(!should_restrict_features(0));
    assert!(!should_restrict_features(10));
}

#[test]
fn expired_license_is_restricted() {
    let key = LicenseKey::generate();
    let info = info_expiring_in(&key, -1);
    let check = check_license(&key.to_string(), Some(&info), fixed_now());
    assert!(check.format_valid);
    assert!(check.expired);
    assert!(!check.valid);
    assert_eq!(check.days_left, Some(-1));
    assert_eq!(check.reminder, ReminderLevel::Expired);
    assert!(check.restrict_features());
}

#[test]
fn license_ten_days_out_is_urgent_but_usable() {
    let key = LicenseKey::generate();
    let info = info_expiring_in(&key, 10);
    let check = check_license(&key.to_string(), Some(&info), fixed_now());
    assert!(check.valid);
    assert_eq!(check.days_left, Some(10));
    assert_eq!(check.reminder, ReminderLevel::Urgent);
    assert!(!check.restrict_features());

    let info = info_expiring_in(&key, 20);
    let check = check_license(&key.to_string(), Some(&info), fixed_now());
    assert_eq!(check.reminder, ReminderLevel::Warning);
}

#[test]
fn malformed_key_reports_format_invalid() {
    let check = check_license("INVALID-KEY", None, fixed_now());
    assert!(!check.format_valid);
    assert!(!check.valid);
    assert_eq!(check.days_left, None);
}

#[test]
fn well_formed_key_without_info_is_valid() {
    let key = LicenseKey::generate();
    let check = check_license(&key.to_string(), None, fixed_now());
    assert!(check.valid);
    assert!(check.format_valid);
    assert_eq!(check.days_left, None);
    assert_eq!(check.reminder, ReminderLevel::None);
}

#[test]
fn info_for_another_key_is_ignored() {
    let installed = LicenseKey::generate();
    let other = LicenseKey::generate();
    let info = info_expiring_in(&installed, -5);
    let check = check_license(&other.to_string(), Some(&info), fixed_now());
    assert!(check.valid);
    assert_eq!(check.days_left, None);
}

#[test]
fn expired_license_blocks_analysis_features_only() {
    let key = LicenseKey::generate();
    let info = info_expiring_in(&key, -3);
    let check = check_license(&key.to_string(), Some(&info), fixed_now());

    assert_eq!(check.restricted_features(), RESTRICTED_FEATURES);
    assert!(!check.is_feature_allowed("load_sample"));
    assert!(!check.is_feature_allowed("metabolite_search"));
    assert!(check.is_feature_allowed("view_history"));
    assert_eq!(
        check.restriction_message("export_data"),
        Some(FEATURE_RESTRICTED_MESSAGE)
    );
    assert_eq!(check.restriction_message("view_history"), None);
}

#[test]
fn active_or_unknown_expiry_allows_everything() {
    let key = LicenseKey::generate();
    let info = info_expiring_in(&key, 5);
    let check = check_license(&key.to_string(), Some(&info), fixed_now());
    assert!(check.restricted_features().is_empty());
    assert!(check.is_feature_allowed("load_sample"));
    assert!(check.restriction_message("load_sample").is_none());

    let check = check_license(&key.to_string(), None, fixed_now());
    assert!(check.is_feature_allowed("split_metabolites"));
}
