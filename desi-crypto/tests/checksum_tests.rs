use desi_crypto::{sha256_hex, ChecksumEngine};
use serde_json::json;

fn fields() -> serde_json::Value {
    json!({
        "record_id": "0190a4c2-0000-7000-8000-000000000001",
        "timestamp": "2025-03-01T10:00:00.000000Z",
        "action_type": "load_sample",
        "subject_hash": sha256_hex("sample_001"),
    })
}

#[test]
fn compute_is_deterministic_hex() {
    let engine = ChecksumEngine::new("machine-001");
    let a = engine.compute(&fields());
    let b = engine.compute(&fields());
    assert_eq!(a, b);
    assert_eq!(a.len(), 64);
    assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
}

#[test]
fn key_order_does_not_matter() {
    let engine = ChecksumEngine::new("machine-001");
    let reordered: serde_json::Value = serde_json::from_str(
        r#"{"subject_hash":"x","action_type":"load_sample","timestamp":"t","record_id":"r"}"#,
    )
    .unwrap();
    let sorted = json!({"record_id":"r","timestamp":"t","action_type":"load_sample","subject_hash":"x"});
    assert_eq!(engine.compute(&reordered), engine.compute(&sorted));
}

#[test]
fn checksum_is_bound_to_machine() {
    let a = ChecksumEngine::new("machine-001").compute(&fields());
    let b = ChecksumEngine::new("machine-002").compute(&fields());
    assert_ne!(a, b);
    assert!(!ChecksumEngine::new("machine-002").verify(&fields(), &a));
}

#[test]
fn verify_accepts_own_checksum() {
    let engine = ChecksumEngine::new("machine-001");
    let checksum = engine.compute(&fields());
    assert!(engine.verify(&fields(), &checksum));
}

#[test]
fn verify_detects_field_change() {
    let engine = ChecksumEngine::new("machine-001");
    let checksum = engine.compute(&fields());
    let mut changed = fields();
    changed["action_type"] = json!("export_data");
    assert!(!engine.verify(&changed, &checksum));
}

#[test]
fn verify_rejects_non_hex() {
    let engine = ChecksumEngine::new("machine-001");
    assert!(!engine.verify(&fields(), "zz-not-hex"));
    assert!(!engine.verify(&fields(), ""));
}

#[test]
fn sign_bytes_roundtrip() {
    let engine = ChecksumEngine::new("machine-001");
    let sig = engine.sign_bytes(b"[1,2,3]");
    assert!(engine.verify_bytes(b"[1,2,3]", &sig));
    assert!(!engine.verify_bytes(b"[1,2,4]", &sig));
}

#[test]
fn empty_fingerprint_hashes_literal() {
    let empty: Vec<String> = Vec::new();
    assert_eq!(ChecksumEngine::fingerprint(empty), sha256_hex("empty"));
}

#[test]
fn fingerprint_joins_with_pipe() {
    assert_eq!(ChecksumEngine::fingerprint(["a", "b"]), sha256_hex("a|b"));
    assert_eq!(ChecksumEngine::fingerprint(["only"]), sha256_hex("only"));
}

#[test]
fn fingerprint_depends_on_order() {
    assert_ne!(
        ChecksumEngine::fingerprint(["a", "b"]),
        ChecksumEngine::fingerprint(["b", "a"])
    );
}
