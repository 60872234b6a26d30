mod common;

use common::{fast_params, report_for};
use desi_crypto::{AeadCipher, PlainEncoding};
use desi_license::LicenseKey;
use desi_report::{
    export, export_to_file, export_with, import, import_file, ImportOptions, KeyRing,
    ReportError, SeedKind, SCHEMA_TAG,
};
use pretty_assertions::assert_eq;

#[test]
fn export_then_import_with_license_key() {
    let license = LicenseKey::generate().to_string();
    let report = report_for(&license, "machine-001");
    let blob = export(&report, &license, &fast_params()).unwrap();

    let ring = KeyRing::new([license.as_str()], Vec::<String>::new(), &fast_params());
    let opened = import(&blob, &ring, ImportOptions::default()).unwrap();
    assert_eq!(opened.report, report);
    assert_eq!(opened.seed.as_deref(), Some(license.as_str()));
    assert_eq!(opened.seed_kind, Some(SeedKind::LicenseKey));
    assert!(!opened.degraded);
    assert_eq!(opened.candidates_tried, 1);
}

#[test]
fn blob_is_not_plaintext() {
    let license = LicenseKey::generate().to_string();
    let blob = export(&report_for(&license, "m"), &license, &fast_params()).unwrap();
    assert!(!blob.contains(SCHEMA_TAG));
    assert!(!blob.contains(&license));
}

#[test]
fn legacy_report_opens_with_machine_id() {
    let license = LicenseKey::generate().to_string();
    let report = report_for(&license, "machine-legacy");
    let cipher = AeadCipher::from_seed("machine-legacy", &fast_params()).unwrap();
    let blob = export_with(&report, &cipher).unwrap();

    let ring = KeyRing::new(
        [LicenseKey::generate().to_string()],
        ["machine-other", "machine-legacy"],
        &fast_params(),
    );
    let opened = import(&blob, &ring, ImportOptions::default()).unwrap();
    assert_eq!(opened.seed_kind, Some(SeedKind::MachineId));
    assert_eq!(opened.candidates_tried, 3);
}

#[test]
fn unknown_key_reports_how_many_were_tried() {
    let license = LicenseKey::generate().to_string();
    let blob = export(&report_for(&license, "m"), &license, &fast_params()).unwrap();
    let ring = KeyRing::new(
        [LicenseKey::generate().to_string(), LicenseKey::generate().to_string()],
        ["machine-x"],
        &fast_params(),
    );
    match import(&blob, &ring, ImportOptions::default()) {
        Err(ReportError::NoMatchingKey { tried }) => assert_eq!(tried, 3),
        other => panic!("expected NoMatchingKey, got {other:?}"),
    }
}

#[test]
fn empty_keyring_fails_cleanly() {
    let license = LicenseKey::generate().to_string();
    let blob = export(&report_for(&license, "m"), &license, &fast_params()).unwrap();
    let ring = KeyRing::new(Vec::<String>::new(), Vec::<String>::new(), &fast_params());
    assert!(ring.is_empty());
    assert!(matches!(
        import(&blob, &ring, ImportOptions::default()),
        Err(ReportError::NoMatchingKey { tried: 0 })
    ));
}

#[test]
fn keyring_dedups_and_orders_license_keys_first() {
    let ring = KeyRing::new(
        ["DESI-A", "DESI-B", "DESI-A", "  "],
        ["m1", "DESI-B", "m2"],
        &fast_params(),
    );
    let seeds: Vec<_> = ring.seeds().collect();
    assert_eq!(
        seeds,
        vec![
            ("DESI-A", SeedKind::LicenseKey),
            ("DESI-B", SeedKind::LicenseKey),
            ("m1", SeedKind::MachineId),
            ("m2", SeedKind::MachineId),
        ]
    );
    assert_eq!(ring.len(), 4);
}

#[test]
fn degraded_blob_is_refused_by_default() {
    let report = report_for("DESI-A", "m");
    let blob = export_with(&report, &PlainEncoding::new()).unwrap();
    let ring = KeyRing::new(["DESI-A"], Vec::<String>::new(), &fast_params());
    assert!(matches!(
        import(&blob, &ring, ImportOptions::default()),
        Err(ReportError::Degraded)
    ));

    let opened = import(&blob, &ring, ImportOptions { allow_degraded: true }).unwrap();
    assert!(opened.degraded);
    assert_eq!(opened.seed, None);
    assert_eq!(opened.report, report);
}

#[test]
fn invalid_report_is_not_exported() {
    let mut report = report_for("DESI-A", "m");
    report.machine_id = String::new();
    assert!(matches!(
        export(&report, "DESI-A", &fast_params()),
        Err(ReportError::InvalidReport(_))
    ));
}

#[test]
fn file_roundtrip() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("reports").join("usage_report.enc");
    let license = LicenseKey::generate().to_string();
    let report = report_for(&license, "m");
    let cipher = AeadCipher::from_seed(&license, &fast_params()).unwrap();
    export_to_file(&report, &cipher, &path).unwrap();

    let ring = KeyRing::new([license], Vec::<String>::new(), &fast_params());
    let opened = import_file(&path, &ring, ImportOptions::default()).unwrap();
    assert_eq!(opened.report.usage_stats.total_records, 15);
}

#[test]
fn report_keeps_schema_first() {
    let report = report_for("DESI-A", "m");
    let json = serde_json::to_string(&report).unwrap();
    assert!(json.starts_with(&format!(r#"{{"schema":"{SCHEMA_TAG}""#)));
}
