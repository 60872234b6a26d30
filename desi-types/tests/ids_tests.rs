use desi_types::RecordId;
use std::collections::HashSet;
use std::str::FromStr;

#[test]
fn record_id_new_is_unique() {
    let a = RecordId::new();
    let b = RecordId::new();
    assert_ne!(a, b);
}

#[test]
fn record_id_from_uuid_roundtrip() {
    let uuid = uuid::Uuid::now_v7();
    let id = RecordId::from_uuid(uuid);
    assert_eq!(id.as_uuid(), uuid);
}

#[test]
fn record_id_display_and_parse() {
    let id = RecordId::new();
    let parsed = RecordId::parse(&id.to_string()).unwrap();
    assert_eq!(id, parsed);
}

#[test]
fn record_id_from_str() {
    let id = RecordId::new();
    let parsed = RecordId::from_str(&id.to_string()).unwrap();
    assert_eq!(id, parsed);
}

#[test]
fn record_id_parse_invalid() {
    assert!(RecordId::parse("not-a-uuid").is_err());
    assert!(RecordId::from_str("garbage").is_err());
}

#[test]
fn record_id_default_is_unique() {
    assert_ne!(RecordId::default(), RecordId::default());
}

#[test]
fn record_id_hash_and_eq() {
    let id = RecordId::new();
    let mut set = HashSet::new();
    set.insert(id);
    set.insert(id);
    assert_eq!(set.len(), 1);
}

#[test]
fn record_ids_sort_in_creation_order() {
    let ids: Vec<RecordId> = (0..50).map(|_| RecordId::new()).collect();
    let mut sorted = ids.clone();
    sorted.sort();
    assert_eq!(ids, sorted);
}

#[test]
fn record_id_serde_is_transparent() {
    let id = RecordId::new();
    let json = serde_json::to_string(&id).unwrap();
    assert_eq!(json, format!("\"{id}\""));
    let parsed: RecordId = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, id);
}
