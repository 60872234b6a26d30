//! Usage tracking for the DESI desktop application.
//!
//! [`UsageTracker`] is the one object the host builds at startup. It owns
//! the ledger writer, the integrity auditor, the installed license and,
//! when endpoints are configured, the [`BackgroundReporter`] and the
//! periodic [`BackgroundLicenseSync`].
//!
//! ```no_run
//! use desi_tracker::{TrackerConfig, UsageTracker};
//!
//! let tracker = UsageTracker::open(TrackerConfig::default())?;
//! tracker.record_sample_load("liver_slice_03", 1200, 48_000)?;
//! tracker.shutdown()?;
//! # Ok::<(), desi_tracker::TrackerError>(())
//! ```

mod config;
mod error;
mod reporter;
mod sync;
mod task;
mod tracker;

pub use config::{LicenseSyncConfig, ReporterConfig, TrackerConfig, LEDGER_FILE, LICENSE_FILE};
pub use error::{TrackerError, TrackerResult};
pub use reporter::{sign_batch, BackgroundReporter, ReporterContext};
pub use sync::{BackgroundLicenseSync, LicenseSync, ServerLicense, SyncOutcome};
pub use tracker::UsageTracker;
