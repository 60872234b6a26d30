//! Tracker configuration.

use desi_crypto::{CipherMode, KdfParams, DEFAULT_ITERATIONS};
use desi_ledger::WriterConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Ledger file name inside the data directory.
pub const LEDGER_FILE: &str = "usage_data.db";

/// License key file name inside the data directory.
pub const LICENSE_FILE: &str = "license.key";

/// Background push settings. Pushing is off unless `endpoint` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReporterConfig {
    pub endpoint: Option<String>,
    pub startup_delay_secs: u64,
    pub interval_secs: u64,
    /// Records per pushed batch.
    pub batch_limit: usize,
    pub request_timeout_secs: u64,
}

impl Default for ReporterConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            startup_delay_secs: 30,
            interval_secs: 300,
            batch_limit: 100,
            request_timeout_secs: 30,
        }
    }
}

impl ReporterConfig {
    pub fn startup_delay(&self) -> Duration {
        Duration::from_secs(self.startup_delay_secs)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// License server polling. Off unless `endpoint` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LicenseSyncConfig {
    /// Base URL of the license server; requests go to `<endpoint>/check`.
    pub endpoint: Option<String>,
    pub startup_delay_secs: u64,
    pub interval_secs: u64,
    pub request_timeout_secs: u64,
}

impl Default for LicenseSyncConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            startup_delay_secs: 60,
            interval_secs: 24 * 3600,
            request_timeout_secs: 10,
        }
    }
}

impl LicenseSyncConfig {
    pub fn startup_delay(&self) -> Duration {
        Duration::from_secs(self.startup_delay_secs)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Everything [`crate::UsageTracker::open`] needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub data_dir: PathBuf,
    /// Flush once this many records are buffered.
    pub batch_size: usize,
    pub flush_interval_secs: u64,
    /// PBKDF2 iterations for local and report keys.
    pub kdf_iterations: u32,
    pub cipher_mode: CipherMode,
    /// Use this license key instead of `<data_dir>/license.key`.
    pub license_key: Option<String>,
    /// Use this machine identity instead of the one computed for the host.
    pub machine_id: Option<String>,
    pub reporter: ReporterConfig,
    pub license_sync: LicenseSyncConfig,
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".desi_analytics")
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            batch_size: 10,
            flush_interval_secs: 60,
            kdf_iterations: DEFAULT_ITERATIONS,
            cipher_mode: CipherMode::Authenticated,
            license_key: None,
            machine_id: None,
            reporter: ReporterConfig::default(),
            license_sync: LicenseSyncConfig::default(),
        }
    }
}

impl TrackerConfig {
    /// Defaults rooted at `data_dir`.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    /// Loads a JSON config file. A missing or unreadable file yields the
    /// defaults.
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            info!(path = %path.display(), "no tracker config found, using defaults");
            return Self::default();
        }
        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<Self>(&contents) {
                Ok(config) => {
                    info!(path = %path.display(), "loaded tracker config");
                    config
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to parse tracker config, using defaults");
                    Self::default()
                }
            },
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to read tracker config, using defaults");
                Self::default()
            }
        }
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.data_dir.join(LEDGER_FILE)
    }

    pub fn license_path(&self) -> PathBuf {
        self.data_dir.join(LICENSE_FILE)
    }

    pub fn kdf_params(&self) -> KdfParams {
        KdfParams::with_iterations(self.kdf_iterations)
    }

    /// Writer settings. A zero batch size or interval is raised to one.
    pub fn writer_config(&self) -> WriterConfig {
        WriterConfig {
            batch_size: self.batch_size.max(1),
            flush_interval: Duration::from_secs(self.flush_interval_secs.max(1)),
        }
    }
}
