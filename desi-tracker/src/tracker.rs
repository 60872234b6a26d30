//! The tracker context the host application holds for its lifetime.

use crate::config::TrackerConfig;
use crate::error::{TrackerError, TrackerResult};
use crate::reporter::{BackgroundReporter, ReporterContext};
use crate::sync::{BackgroundLicenseSync, LicenseSync, SyncOutcome};
use chrono::{DateTime, Utc};
use desi_crypto::{ChecksumEngine, SymmetricCipher};
use desi_ledger::{
    IntegrityAuditor, IntegrityCheckResult, IntegrityReport, LedgerStore, UsageEvent, UsageLedger,
};
use desi_license::{LicenseCheck, LicenseError, LicenseInfo, LicenseKey, MachineIdentity};
use desi_report::{ReportIntegrity, UsageReport};
use desi_types::{ActionType, RecordId, ReportPeriod, UsageStats};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tracing::{info, warn};

/// Owns the ledger writer, the auditor, the installed license and the
/// optional background reporter and license sync.
pub struct UsageTracker {
    config: TrackerConfig,
    machine_id: String,
    license_key: Arc<RwLock<String>>,
    ledger: UsageLedger,
    auditor: IntegrityAuditor,
    reporter: Option<BackgroundReporter>,
    license_sync: Option<Arc<LicenseSync>>,
    background_sync: Option<BackgroundLicenseSync>,
}

impl UsageTracker {
    /// Opens (or creates) the data directory and starts the writer.
    ///
    /// The reporter and the periodic license sync only start when their
    /// endpoint is configured and the caller is inside a tokio runtime.
    pub fn open(config: TrackerConfig) -> TrackerResult<Self> {
        std::fs::create_dir_all(&config.data_dir)?;

        let machine_id = match &config.machine_id {
            Some(id) => id.clone(),
            None => MachineIdentity::current().as_str().to_string(),
        };
        let license_key = resolve_license(&config)?;

        let store = Arc::new(LedgerStore::open(&config.ledger_path())?);
        if let Some(archived) = store.recovered_from() {
            warn!(archived = %archived.display(), "usage ledger was corrupt and has been recreated");
        }

        let params = config.kdf_params();
        let cipher: Arc<dyn SymmetricCipher> =
            Arc::from(config.cipher_mode.build(&machine_id, &params)?);

        let (handoff, reporter) = match config.reporter.endpoint.clone() {
            Some(endpoint) => match tokio::runtime::Handle::try_current() {
                Ok(runtime) => {
                    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
                    let context = ReporterContext {
                        store: Arc::clone(&store),
                        license_key: license_key.clone(),
                        machine_id: machine_id.clone(),
                    };
                    let reporter = BackgroundReporter::start(
                        config.reporter.clone(),
                        endpoint,
                        context,
                        rx,
                        &runtime,
                    )?;
                    (Some(tx), Some(reporter))
                }
                Err(_) => {
                    warn!("reporter endpoint configured but no tokio runtime is running; pushing disabled");
                    (None, None)
                }
            },
            None => (None, None),
        };

        let license_key = Arc::new(RwLock::new(license_key));
        let license_sync = match &config.license_sync.endpoint {
            Some(endpoint) => Some(Arc::new(LicenseSync::new(
                &config.license_sync,
                endpoint,
                Arc::clone(&store),
            )?)),
            None => None,
        };
        let background_sync = match (&license_sync, tokio::runtime::Handle::try_current()) {
            (Some(sync), Ok(runtime)) => Some(BackgroundLicenseSync::start(
                &config.license_sync,
                Arc::clone(sync),
                Arc::clone(&license_key),
                &runtime,
            )),
            (Some(_), Err(_)) => {
                warn!("license sync endpoint configured but no tokio runtime is running; periodic sync disabled");
                None
            }
            (None, _) => None,
        };

        let ledger = UsageLedger::start(
            store,
            config.writer_config(),
            ChecksumEngine::new(machine_id.clone()),
            cipher,
            handoff,
        )?;
        let auditor =
            IntegrityAuditor::open(&config.ledger_path(), ChecksumEngine::new(machine_id.clone()))?;

        info!(
            data_dir = %config.data_dir.display(),
            mode = ?config.cipher_mode,
            reporting = reporter.is_some(),
            license_sync = license_sync.is_some(),
            "usage tracker opened"
        );
        Ok(Self {
            config,
            machine_id,
            license_key,
            ledger,
            auditor,
            reporter,
            license_sync,
            background_sync,
        })
    }

    pub fn machine_id(&self) -> &str {
        &self.machine_id
    }

    pub fn license_key(&self) -> TrackerResult<String> {
        Ok(self
            .license_key
            .read()
            .map_err(|_| TrackerError::Poisoned)?
            .clone())
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Where a corrupt ledger was archived on open, if that happened.
    pub fn recovered_from(&self) -> Option<&Path> {
        self.ledger.store().recovered_from()
    }

    pub fn reporter(&self) -> Option<&BackgroundReporter> {
        self.reporter.as_ref()
    }

    pub fn background_sync(&self) -> Option<&BackgroundLicenseSync> {
        self.background_sync.as_ref()
    }

    /// Appends one usage record. It reaches disk on the next flush.
    pub fn record_usage(
        &self,
        action_type: impl Into<ActionType>,
        subject_name: &str,
        details: Option<serde_json::Value>,
    ) -> TrackerResult<RecordId> {
        let mut event = UsageEvent::new(action_type, subject_name);
        if let Some(details) = details {
            event = event.with_details(details);
        }
        Ok(self.ledger.append(event)?)
    }

    pub fn record_sample_load(
        &self,
        sample_name: &str,
        n_scans: u64,
        n_mz: u64,
    ) -> TrackerResult<RecordId> {
        self.record_usage(
            ActionType::LoadSample,
            sample_name,
            Some(json!({ "n_scans": n_scans, "n_mz": n_mz })),
        )
    }

    pub fn record_data_export(
        &self,
        sample_name: &str,
        export_type: &str,
        n_items: u64,
    ) -> TrackerResult<RecordId> {
        self.record_usage(
            ActionType::ExportData,
            sample_name,
            Some(json!({ "export_type": export_type, "n_items": n_items })),
        )
    }

    pub fn record_metabolite_split(
        &self,
        sample_name: &str,
        n_metabolites: u64,
    ) -> TrackerResult<RecordId> {
        self.record_usage(
            ActionType::SplitMetabolites,
            sample_name,
            Some(json!({ "n_metabolites": n_metabolites })),
        )
    }

    /// Flushes buffered records, then aggregates the period.
    pub fn get_usage_stats(&self, period: &ReportPeriod) -> TrackerResult<UsageStats> {
        self.ledger.flush()?;
        Ok(self.ledger.store().aggregate(period)?)
    }

    /// Writes an encrypted usage report for `period` to `path`.
    ///
    /// The report is sealed under the installed license key and carries
    /// the result of a fresh, non-marking integrity pass.
    pub fn export_report(&self, path: &Path, period: &ReportPeriod) -> TrackerResult<UsageReport> {
        let stats = self.get_usage_stats(period)?;
        let check = self.auditor.verify_all(false)?;
        let license_key = self.license_key()?;

        let report = UsageReport::from_stats(
            &license_key,
            &self.machine_id,
            &stats,
            ReportIntegrity {
                total: check.total,
                valid: check.valid,
                invalid: check.invalid,
                integrity_ok: check.integrity_ok,
            },
            &check.fingerprint,
        );
        let cipher = self
            .config
            .cipher_mode
            .build(&license_key, &self.config.kdf_params())?;
        desi_report::export_to_file(&report, cipher.as_ref(), path)?;
        info!(
            path = %path.display(),
            records = stats.total_records,
            integrity_ok = check.integrity_ok,
            "usage report written"
        );
        Ok(report)
    }

    /// Full verification pass. Failing records are flagged suspicious.
    pub fn verify_integrity(&self) -> TrackerResult<IntegrityCheckResult> {
        self.ledger.flush()?;
        Ok(self.auditor.verify_all(true)?)
    }

    pub fn integrity_report(&self, output: Option<&Path>) -> TrackerResult<IntegrityReport> {
        self.ledger.flush()?;
        Ok(self.auditor.generate_report(output)?)
    }

    pub fn clear_suspicious(&self, record_id: &str) -> TrackerResult<bool> {
        Ok(self.auditor.clear_suspicious(record_id)?)
    }

    /// Checks `key` against the installed license.
    ///
    /// A well-formed key matching the installed one refreshes its
    /// `last_validated` stamp.
    pub fn check_license(&self, key: &str) -> TrackerResult<LicenseCheck> {
        let now = Utc::now();
        let store = self.ledger.store();
        let installed = store.load_license_info()?;
        let check = desi_license::check_license(key, installed.as_ref(), now);

        if let Some(mut info) = installed {
            if check.format_valid && info.license_key.trim() == key.trim() {
                info.last_validated = Some(now);
                store.save_license_info(&info)?;
            }
        }
        if check.reminder.should_show() {
            if let Some(days) = check.days_left {
                warn!(days_left = days, reminder = ?check.reminder, "license expiry approaching");
            }
        }
        Ok(check)
    }

    /// The installed key checked against its stored expiry, without
    /// touching `last_validated`.
    pub fn license_status(&self) -> TrackerResult<LicenseCheck> {
        let key = self.license_key()?;
        let installed = self.ledger.store().load_license_info()?;
        Ok(desi_license::check_license(&key, installed.as_ref(), Utc::now()))
    }

    /// Features the installed license currently blocks.
    pub fn restricted_features(&self) -> TrackerResult<&'static [&'static str]> {
        Ok(self.license_status()?.restricted_features())
    }

    pub fn is_feature_allowed(&self, feature: &str) -> TrackerResult<bool> {
        Ok(self.license_status()?.is_feature_allowed(feature))
    }

    /// The message to show when `feature` is blocked, if it is.
    pub fn feature_restriction_message(&self, feature: &str) -> TrackerResult<Option<&'static str>> {
        Ok(self.license_status()?.restriction_message(feature))
    }

    /// Checks the installed key with the license server now. `None` when
    /// no license server is configured.
    pub async fn sync_license(&self) -> TrackerResult<Option<SyncOutcome>> {
        let Some(sync) = &self.license_sync else {
            return Ok(None);
        };
        let key = self.license_key()?;
        Ok(Some(sync.sync_once(&key).await?))
    }

    /// Installs `key` as this machine's license and writes the key file.
    ///
    /// A license whose expiry has already passed is refused.
    pub fn install_license(
        &self,
        key: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> TrackerResult<LicenseInfo> {
        let key = LicenseKey::parse(key)?.to_string();
        let now = Utc::now();
        if let Some(expired) = expires_at.filter(|at| *at <= now) {
            return Err(LicenseError::Expired(expired.format("%Y-%m-%d").to_string()).into());
        }
        let info = LicenseInfo {
            license_key: key.clone(),
            activated_at: now,
            expires_at,
            last_validated: Some(now),
        };
        self.ledger.store().save_license_info(&info)?;
        std::fs::write(self.config.license_path(), &key)?;
        *self.license_key.write().map_err(|_| TrackerError::Poisoned)? = key;
        info!(expires_at = ?expires_at, "license installed");
        Ok(info)
    }

    /// Writes buffered records now. Returns how many were written.
    pub fn flush(&self) -> TrackerResult<usize> {
        Ok(self.ledger.flush()?)
    }

    /// Stops the background tasks between cycles, then flushes and stops
    /// the writer. Safe to call more than once.
    pub fn shutdown(&self) -> TrackerResult<usize> {
        if let Some(reporter) = &self.reporter {
            reporter.stop();
        }
        if let Some(sync) = &self.background_sync {
            sync.stop();
        }
        let flushed = self.ledger.shutdown()?;
        info!(flushed, "usage tracker shut down");
        Ok(flushed)
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.config.ledger_path()
    }
}

/// Config override, else the key file, else a fresh key written to the
/// key file.
fn resolve_license(config: &TrackerConfig) -> TrackerResult<String> {
    if let Some(key) = &config.license_key {
        return Ok(key.trim().to_string());
    }
    let path = config.license_path();
    if path.exists() {
        let key = std::fs::read_to_string(&path)?.trim().to_string();
        if !key.is_empty() {
            if !LicenseKey::validate(&key) {
                warn!(path = %path.display(), "license key file holds a malformed key");
            }
            return Ok(key);
        }
    }
    let key = LicenseKey::generate().to_string();
    std::fs::write(&path, &key)?;
    info!(path = %path.display(), "generated new license key");
    Ok(key)
}
