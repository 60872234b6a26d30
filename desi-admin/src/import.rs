//! Decrypting and registering customer report files.

use crate::error::AdminResult;
use desi_crypto::KdfParams;
use desi_report::{DecryptedReport, ImportOptions, ImportOutcome, ImportRegistry, KeyRing};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// The seed file handed to `desi-admin import`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CandidateSeeds {
    pub license_keys: Vec<String>,
    pub machine_ids: Vec<String>,
}

impl CandidateSeeds {
    pub fn load(path: &Path) -> AdminResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// License keys first, then the listed machine ids, then `extra`.
    pub fn keyring(&self, extra_machine_ids: &[String], params: &KdfParams) -> KeyRing {
        KeyRing::new(
            self.license_keys.iter().cloned(),
            self.machine_ids
                .iter()
                .chain(extra_machine_ids)
                .cloned(),
            params,
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportSummary {
    pub decrypted: DecryptedReport,
    pub outcome: ImportOutcome,
}

/// Decrypts `report_path` and commits it to `registry`.
///
/// Machine ids already present in the registry are tried after the ones
/// in `seeds`.
pub fn import_report(
    report_path: &Path,
    seeds: &CandidateSeeds,
    registry: &ImportRegistry,
    options: ImportOptions,
    params: &KdfParams,
) -> AdminResult<ImportSummary> {
    let known = registry.known_machine_ids()?;
    let keyring = seeds.keyring(&known, params);
    let decrypted = desi_report::import_file(report_path, &keyring, options)?;
    let source = report_path.to_string_lossy();
    let outcome = registry.commit(&decrypted.report, Some(&source))?;
    info!(
        path = %report_path.display(),
        duplicate = outcome.is_duplicate(),
        degraded = decrypted.degraded,
        "report import finished"
    );
    Ok(ImportSummary { decrypted, outcome })
}
