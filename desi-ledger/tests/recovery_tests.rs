use desi_ledger::LedgerStore;
use tempfile::TempDir;

#[test]
fn garbage_file_is_archived_and_replaced() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("usage.db");
    let garbage = b"not a ledger ".repeat(400);
    std::fs::write(&path, &garbage).unwrap();

    let store = LedgerStore::open(&path).unwrap();
    let archived = store.recovered_from().expect("recovery should be reported");
    assert!(archived.exists());
    assert!(archived
        .file_name()
        .unwrap()
        .to_string_lossy()
        .starts_with("usage.db.corrupt-"));
    assert_eq!(std::fs::read(archived).unwrap(), garbage);
    assert_eq!(store.count().unwrap(), 0);
}

#[test]
fn healthy_file_is_not_archived() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("usage.db");
    drop(LedgerStore::open(&path).unwrap());
    let store = LedgerStore::open(&path).unwrap();
    assert!(store.recovered_from().is_none());
    let archives = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(Result::ok)
        .filter(|e| e.file_name().to_string_lossy().contains("corrupt"))
        .count();
    assert_eq!(archives, 0);
}

#[test]
fn missing_parent_directory_is_created() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("usage.db");
    let store = LedgerStore::open(&path).unwrap();
    assert_eq!(store.path(), Some(path.as_path()));
    assert!(path.exists());
}
