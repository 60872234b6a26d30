mod common;

use chrono::{Duration, Utc};
use common::{config_in, TestTracker, MACHINE_ID};
use desi_crypto::KdfParams;
use desi_license::{
    LicenseError, LicenseKey, ReminderLevel, FEATURE_RESTRICTED_MESSAGE, RESTRICTED_FEATURES,
};
use desi_report::{import_file, ImportOptions, KeyRing, SeedKind};
use desi_tracker::{TrackerError, UsageTracker, LICENSE_FILE};
use desi_types::{format_timestamp, ActionType, ReportPeriod};
use pretty_assertions::assert_eq;
use serde_json::json;
use tempfile::TempDir;

#[test]
fn hundred_loads_show_up_in_stats_and_verify_clean() {
    let t = TestTracker::open();
    for i in 0..100 {
        t.tracker
            .record_usage("load_sample", &format!("sample_{i}"), None)
            .unwrap();
    }

    let stats = t.tracker.get_usage_stats(&ReportPeriod::last_days(30)).unwrap();
    assert_eq!(stats.total_records, 100);
    assert_eq!(stats.total_loads, 100);
    assert_eq!(stats.unique_samples, 100);

    let check = t.tracker.verify_integrity().unwrap();
    assert_eq!(check.total, 100);
    assert_eq!(check.invalid, 0);
    assert!(check.integrity_ok);
}

#[test]
fn convenience_recorders_map_to_actions() {
    let t = TestTracker::open();
    t.tracker.record_sample_load("a", 1, 1).unwrap();
    t.tracker.record_data_export("a", "csv", 12).unwrap();
    t.tracker.record_metabolite_split("a", 40).unwrap();
    t.tracker
        .record_usage("open_project", "a", Some(json!({"project": "p1"})))
        .unwrap();

    let stats = t.tracker.get_usage_stats(&ReportPeriod::last_days(1)).unwrap();
    assert_eq!(stats.total_records, 4);
    assert_eq!(stats.total_loads, 1);
    assert_eq!(stats.total_exports, 1);
    assert_eq!(stats.total_splits, 1);
    assert_eq!(stats.unique_samples, 1);

    let conn = rusqlite::Connection::open(t.tracker.ledger_path()).unwrap();
    let other: String = conn
        .query_row(
            "SELECT action_type FROM usage_records WHERE action_type NOT IN
             ('load_sample', 'export_data', 'split_metabolites')",
            [],
            |r| r.get(0),
        )
        .unwrap();
    assert_eq!(ActionType::from(other.as_str()), ActionType::Other("open_project".into()));
}

#[test]
fn exported_report_imports_with_license_key() {
    let t = TestTracker::open();
    for i in 0..5 {
        t.tracker.record_sample_load(&format!("s{i}"), 10, 10).unwrap();
    }
    let path = t.dir.path().join("usage_report.enc");
    let period = ReportPeriod::last_days(30);
    let exported = t.tracker.export_report(&path, &period).unwrap();
    assert_eq!(exported.usage_stats.total_loads, 5);
    assert!(exported.integrity.integrity_ok);

    let license = t.tracker.license_key().unwrap();
    let keyring = KeyRing::new(
        ["DESI-00000000-00000000-0000".to_string(), license.clone()],
        [MACHINE_ID.to_string()],
        &KdfParams::with_iterations(1_000),
    );
    let decrypted = import_file(&path, &keyring, ImportOptions::default()).unwrap();
    assert_eq!(decrypted.seed.as_deref(), Some(license.as_str()));
    assert_eq!(decrypted.seed_kind, Some(SeedKind::LicenseKey));
    assert!(!decrypted.degraded);
    assert_eq!(decrypted.report.machine_id, MACHINE_ID);
    assert_eq!(decrypted.report.usage_stats.total_loads, 5);
    assert_eq!(decrypted.report.ledger_fingerprint, exported.ledger_fingerprint);
}

#[test]
fn tampered_record_is_flagged() {
    let t = TestTracker::open();
    let ids: Vec<_> = (0..10)
        .map(|i| t.tracker.record_sample_load(&format!("s{i}"), 1, 1).unwrap())
        .collect();
    t.tracker.flush().unwrap();

    let conn = rusqlite::Connection::open(t.tracker.ledger_path()).unwrap();
    conn.execute(
        "UPDATE usage_records SET checksum = ?1 WHERE record_id = ?2",
        rusqlite::params!["f".repeat(64), ids[3].to_string()],
    )
    .unwrap();

    let check = t.tracker.verify_integrity().unwrap();
    assert_eq!(check.valid, 9);
    assert_eq!(check.invalid, 1);
    assert_eq!(check.suspicious_ids, vec![ids[3].to_string()]);

    let report = t.tracker.integrity_report(None).unwrap();
    assert_eq!(report.suspicious.len(), 1);
    assert!(!report.summary.integrity_ok);

    assert!(t.tracker.clear_suspicious(&ids[3].to_string()).unwrap());
}

#[test]
fn first_open_generates_and_persists_license() {
    let dir = TempDir::new().unwrap();
    let key = {
        let tracker = UsageTracker::open(config_in(&dir)).unwrap();
        let key = tracker.license_key().unwrap();
        tracker.shutdown().unwrap();
        key
    };
    assert!(LicenseKey::validate(&key));
    let on_disk = std::fs::read_to_string(dir.path().join(LICENSE_FILE)).unwrap();
    assert_eq!(on_disk.trim(), key);

    let reopened = UsageTracker::open(config_in(&dir)).unwrap();
    assert_eq!(reopened.license_key().unwrap(), key);
}

#[test]
fn malformed_key_fails_format_check() {
    let t = TestTracker::open();
    let check = t.tracker.check_license("DESI-NOT-A-KEY").unwrap();
    assert!(!check.format_valid);
    assert!(!check.valid);
}

#[test]
fn installed_license_drives_expiry_policy() {
    let t = TestTracker::open();
    let key = LicenseKey::generate().to_string();

    let info = t
        .tracker
        .install_license(&key, Some(Utc::now() + Duration::days(10) + Duration::hours(1)))
        .unwrap();
    assert_eq!(info.license_key, key);
    assert_eq!(t.tracker.license_key().unwrap(), key);

    let check = t.tracker.check_license(&key).unwrap();
    assert!(check.valid);
    assert_eq!(check.days_left, Some(10));
    assert_eq!(check.reminder, ReminderLevel::Urgent);
    assert!(!check.restrict_features());

    expire_installed_license(&t.tracker);
    let check = t.tracker.check_license(&key).unwrap();
    assert!(check.expired);
    assert!(check.restrict_features());
}

/// Moves the stored expiry into the past, as a server sync would.
fn expire_installed_license(tracker: &UsageTracker) {
    let conn = rusqlite::Connection::open(tracker.ledger_path()).unwrap();
    conn.execute(
        "UPDATE license_info SET expires_at = ?1 WHERE id = 1",
        [format_timestamp(&(Utc::now() - Duration::days(1)))],
    )
    .unwrap();
}

#[test]
fn install_refuses_already_expired_license() {
    let t = TestTracker::open();
    let before = t.tracker.license_key().unwrap();
    let key = LicenseKey::generate().to_string();

    let err = t
        .tracker
        .install_license(&key, Some(Utc::now() - Duration::days(1)))
        .unwrap_err();
    assert!(matches!(err, TrackerError::License(LicenseError::Expired(_))));
    assert_eq!(t.tracker.license_key().unwrap(), before);
}

#[test]
fn expired_license_gates_analysis_features() {
    let t = TestTracker::open();
    let key = LicenseKey::generate().to_string();
    t.tracker
        .install_license(&key, Some(Utc::now() + Duration::days(30)))
        .unwrap();
    assert!(t.tracker.is_feature_allowed("load_sample").unwrap());
    assert!(t.tracker.restricted_features().unwrap().is_empty());
    assert_eq!(t.tracker.feature_restriction_message("load_sample").unwrap(), None);

    expire_installed_license(&t.tracker);
    assert!(!t.tracker.is_feature_allowed("load_sample").unwrap());
    assert!(!t.tracker.is_feature_allowed("split_metabolites").unwrap());
    assert!(t.tracker.is_feature_allowed("view_history").unwrap());
    assert_eq!(t.tracker.restricted_features().unwrap(), RESTRICTED_FEATURES);
    assert_eq!(
        t.tracker.feature_restriction_message("export_data").unwrap(),
        Some(FEATURE_RESTRICTED_MESSAGE)
    );
}

#[test]
fn install_rejects_malformed_key() {
    let t = TestTracker::open();
    let err = t.tracker.install_license("DESI-1234", None).unwrap_err();
    assert!(matches!(err, TrackerError::License(_)));
}

#[test]
fn shutdown_flushes_and_is_idempotent() {
    let t = TestTracker::open();
    t.tracker.record_sample_load("x", 1, 1).unwrap();
    t.tracker.record_sample_load("y", 1, 1).unwrap();
    assert_eq!(t.tracker.shutdown().unwrap(), 2);
    assert_eq!(t.tracker.shutdown().unwrap(), 0);
    assert!(t.tracker.record_sample_load("z", 1, 1).is_err());

    let conn = rusqlite::Connection::open(t.tracker.ledger_path()).unwrap();
    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM usage_records", [], |r| r.get(0))
        .unwrap();
    assert_eq!(count, 2);
}

#[test]
fn corrupt_ledger_is_replaced_on_open() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir);
    std::fs::write(config.ledger_path(), b"not a ledger ".repeat(400)).unwrap();

    let tracker = UsageTracker::open(config).unwrap();
    let archived = tracker.recovered_from().unwrap().to_path_buf();
    assert!(archived.exists());
    tracker.record_sample_load("fresh", 1, 1).unwrap();
    assert_eq!(
        tracker.get_usage_stats(&ReportPeriod::last_days(1)).unwrap().total_records,
        1
    );
}
