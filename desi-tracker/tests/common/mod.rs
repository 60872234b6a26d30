//! Shared test helpers for tracker tests.

#![allow(dead_code)]

use desi_tracker::{TrackerConfig, UsageTracker};
use tempfile::TempDir;

pub const MACHINE_ID: &str = "machine-001";

/// A config rooted in `dir` with cheap key derivation and a manual flush.
pub fn config_in(dir: &TempDir) -> TrackerConfig {
    let mut config = TrackerConfig::with_data_dir(dir.path());
    config.kdf_iterations = 1_000;
    config.machine_id = Some(MACHINE_ID.to_string());
    config.batch_size = 10_000;
    config.flush_interval_secs = 3600;
    config
}

pub struct TestTracker {
    pub dir: TempDir,
    pub tracker: UsageTracker,
}

impl TestTracker {
    pub fn open() -> Self {
        let dir = TempDir::new().unwrap();
        let tracker = UsageTracker::open(config_in(&dir)).unwrap();
        Self { dir, tracker }
    }
}
