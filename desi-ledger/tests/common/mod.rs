//! Shared test helpers for ledger tests.

#![allow(dead_code)]

use desi_crypto::{AeadCipher, ChecksumEngine, KdfParams, SymmetricCipher};
use desi_ledger::{LedgerStore, RecordHandoff, UsageLedger, WriterConfig};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

pub const MACHINE_ID: &str = "machine-001";

pub fn cipher() -> Arc<dyn SymmetricCipher> {
    Arc::new(AeadCipher::from_seed(MACHINE_ID, &KdfParams::with_iterations(1_000)).unwrap())
}

pub fn checksums() -> ChecksumEngine {
    ChecksumEngine::new(MACHINE_ID)
}

/// A writer that never flushes on its own; tests flush explicitly.
pub fn manual_config() -> WriterConfig {
    WriterConfig {
        batch_size: usize::MAX,
        flush_interval: Duration::from_secs(3600),
    }
}

/// An on-disk ledger in a fresh temp dir.
pub struct TestLedger {
    pub dir: TempDir,
    pub path: PathBuf,
    pub ledger: UsageLedger,
}

impl TestLedger {
    pub fn start(config: WriterConfig) -> Self {
        Self::start_with_handoff(config, None)
    }

    pub fn start_with_handoff(config: WriterConfig, handoff: Option<RecordHandoff>) -> Self {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("usage.db");
        let store = Arc::new(LedgerStore::open(&path).unwrap());
        let ledger = UsageLedger::start(store, config, checksums(), cipher(), handoff).unwrap();
        Self { dir, path, ledger }
    }

    pub fn store(&self) -> &LedgerStore {
        self.ledger.store()
    }
}

/// Overwrites the stored checksum of one record behind the ledger's back.
pub fn corrupt_checksum(path: &std::path::Path, record_id: &str) {
    let conn = rusqlite::Connection::open(path).unwrap();
    let changed = conn
        .execute(
            "UPDATE usage_records SET checksum = ?1 WHERE record_id = ?2",
            rusqlite::params!["0".repeat(64), record_id],
        )
        .unwrap();
    assert_eq!(changed, 1);
}
