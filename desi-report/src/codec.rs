//! Report export and multi-key import.

use crate::error::{ReportError, ReportResult};
use crate::report::{UsageReport, SCHEMA_TAG};
use desi_crypto::{
    decrypt_string, derive_key, is_degraded_blob, AeadCipher, DerivedKey, KdfParams,
    PlainEncoding, SymmetricCipher,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info, warn};

/// Serializes `report` and encrypts it under the key derived from
/// `license_key`.
pub fn export(report: &UsageReport, license_key: &str, params: &KdfParams) -> ReportResult<String> {
    export_with(report, &AeadCipher::from_seed(license_key, params)?)
}

/// Serializes `report` and seals it with an already-built cipher. A
/// degraded cipher yields a `plain:` blob that importers flag.
pub fn export_with(report: &UsageReport, cipher: &dyn SymmetricCipher) -> ReportResult<String> {
    report.validate()?;
    let body = serde_json::to_string(report)?;
    Ok(cipher.encrypt(&body)?)
}

/// [`export_with`] and write the blob to `path`.
pub fn export_to_file(
    report: &UsageReport,
    cipher: &dyn SymmetricCipher,
    path: &Path,
) -> ReportResult<()> {
    let blob = export_with(report, cipher)?;
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, blob)?;
    info!(path = %path.display(), "usage report exported");
    Ok(())
}

/// Where a candidate seed came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeedKind {
    LicenseKey,
    MachineId,
}

struct Candidate {
    seed: String,
    kind: SeedKind,
    key: DerivedKey,
}

/// Candidate keys, derived once up front.
///
/// License keys are tried first since current clients export under them;
/// machine identities cover reports from older clients.
pub struct KeyRing {
    candidates: Vec<Candidate>,
}

impl KeyRing {
    pub fn new<L, M>(license_keys: L, machine_ids: M, params: &KdfParams) -> Self
    where
        L: IntoIterator,
        L::Item: AsRef<str>,
        M: IntoIterator,
        M::Item: AsRef<str>,
    {
        let mut seen = HashSet::new();
        let mut candidates = Vec::new();
        let seeds = license_keys
            .into_iter()
            .map(|s| (s.as_ref().trim().to_string(), SeedKind::LicenseKey))
            .chain(
                machine_ids
                    .into_iter()
                    .map(|s| (s.as_ref().trim().to_string(), SeedKind::MachineId)),
            );
        for (seed, kind) in seeds {
            if seed.is_empty() || !seen.insert(seed.clone()) {
                continue;
            }
            match derive_key(&seed, params) {
                Ok(key) => candidates.push(Candidate { seed, kind, key }),
                Err(e) => warn!(error = %e, "skipping unusable report key seed"),
            }
        }
        debug!(count = candidates.len(), "report key ring built");
        Self { candidates }
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Seeds in trial order.
    pub fn seeds(&self) -> impl Iterator<Item = (&str, SeedKind)> {
        self.candidates.iter().map(|c| (c.seed.as_str(), c.kind))
    }
}

/// Import switches.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImportOptions {
    /// Accept `plain:` blobs from clients running the degraded cipher.
    pub allow_degraded: bool,
}

/// A successfully opened report.
#[derive(Debug, Clone, PartialEq)]
pub struct DecryptedReport {
    pub report: UsageReport,
    /// Seed whose key opened the blob; `None` for degraded blobs.
    pub seed: Option<String>,
    pub seed_kind: Option<SeedKind>,
    pub degraded: bool,
    /// Candidates attempted, including the match.
    pub candidates_tried: usize,
}

fn schema_prefix() -> String {
    format!(r#"{{"schema":"{SCHEMA_TAG}""#)
}

fn parse_report(body: &str) -> ReportResult<UsageReport> {
    let report: UsageReport = serde_json::from_str(body)
        .map_err(|e| ReportError::InvalidReport(format!("malformed report: {e}")))?;
    report.validate()?;
    Ok(report)
}

/// Opens `blob` with the first candidate key that decrypts it to a report.
pub fn import(blob: &str, keyring: &KeyRing, options: ImportOptions) -> ReportResult<DecryptedReport> {
    let blob = blob.trim();

    if is_degraded_blob(blob) {
        if !options.allow_degraded {
            warn!("refusing degraded (unencrypted) report");
            return Err(ReportError::Degraded);
        }
        warn!("importing degraded (unencrypted) report");
        let body = PlainEncoding::new().decrypt(blob)?;
        return Ok(DecryptedReport {
            report: parse_report(&body)?,
            seed: None,
            seed_kind: None,
            degraded: true,
            candidates_tried: 0,
        });
    }

    info!(candidates = keyring.len(), "trying report keys");
    let prefix = schema_prefix();
    for (index, candidate) in keyring.candidates.iter().enumerate() {
        let Ok(body) = decrypt_string(&candidate.key, blob) else {
            continue;
        };
        if !body.starts_with(&prefix) {
            debug!(index, "candidate decrypted to something other than a report");
            continue;
        }
        let report = parse_report(&body)?;
        info!(tried = index + 1, kind = ?candidate.kind, "report key matched");
        return Ok(DecryptedReport {
            report,
            seed: Some(candidate.seed.clone()),
            seed_kind: Some(candidate.kind),
            degraded: false,
            candidates_tried: index + 1,
        });
    }

    warn!(tried = keyring.len(), "no candidate key opened the report");
    Err(ReportError::NoMatchingKey {
        tried: keyring.len(),
    })
}

/// [`import`] on the contents of `path`.
pub fn import_file(
    path: &Path,
    keyring: &KeyRing,
    options: ImportOptions,
) -> ReportResult<DecryptedReport> {
    let blob = std::fs::read_to_string(path)?;
    import(&blob, keyring, options)
}
