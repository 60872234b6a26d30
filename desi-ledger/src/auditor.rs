//! Integrity verification of the stored ledger.
//!
//! The auditor recomputes every record checksum from the row exactly as it
//! sits on disk and compares it with the stored value. It runs on its own
//! connection so a pass never blocks the writer for longer than SQLite's
//! own WAL snapshot requires.

use crate::error::{LedgerError, LedgerResult};
use crate::store::{parse_time, RawRecord, RECORD_COLUMNS};
use chrono::{DateTime, Utc};
use desi_crypto::ChecksumEngine;
use desi_types::{checksum_fields, format_timestamp, IntegrityCheckRecord, UsageRecord};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::{info, warn};

const REASON_MISMATCH: &str = "checksum mismatch";
const REASON_MISSING: &str = "missing checksum";

/// Outcome of one verification pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityCheckResult {
    pub total: u64,
    pub valid: u64,
    pub invalid: u64,
    /// Record ids that failed verification, in append order.
    pub suspicious_ids: Vec<String>,
    pub integrity_ok: bool,
    pub check_time: DateTime<Utc>,
    /// Fingerprint over all stored checksums in append order.
    pub fingerprint: String,
}

/// A flagged record with what was stored and what was expected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuspiciousRecord {
    pub record_id: String,
    pub timestamp: String,
    pub action_type: String,
    pub stored_checksum: String,
    pub expected_checksum: String,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegritySummary {
    pub total_records: u64,
    pub valid_records: u64,
    pub invalid_records: u64,
    /// Percentage of valid records; 100 for an empty ledger.
    pub integrity_rate: f64,
    pub integrity_ok: bool,
}

/// Everything an operator needs to judge the ledger's state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrityReport {
    pub generated_at: DateTime<Utc>,
    pub latest: IntegrityCheckResult,
    pub suspicious: Vec<SuspiciousRecord>,
    pub history: Vec<IntegrityCheckRecord>,
    pub summary: IntegritySummary,
}

/// Verifies stored records against their checksums.
pub struct IntegrityAuditor {
    conn: Mutex<Connection>,
    checksums: ChecksumEngine,
}

impl IntegrityAuditor {
    /// Opens a separate connection to the ledger at `path`.
    pub fn open(path: &Path, checksums: ChecksumEngine) -> LedgerResult<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Ok(Self {
            conn: Mutex::new(conn),
            checksums,
        })
    }

    fn conn(&self) -> LedgerResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| LedgerError::Poisoned)
    }

    /// Checks a single record.
    pub fn verify_record(&self, record: &UsageRecord) -> (bool, Option<String>) {
        self.verify_fields(&record.checksum_fields(), &record.checksum)
    }

    fn verify_fields(&self, fields: &serde_json::Value, stored: &str) -> (bool, Option<String>) {
        if stored.trim().is_empty() {
            return (false, Some(REASON_MISSING.to_string()));
        }
        if self.checksums.verify(fields, stored) {
            (true, None)
        } else {
            (false, Some(REASON_MISMATCH.to_string()))
        }
    }

    fn verify_raw(&self, raw: &RawRecord) -> (bool, Option<String>) {
        let fields = raw_fields(raw);
        self.verify_fields(&fields, &raw.checksum)
    }

    /// Verifies every stored record and appends the outcome to the audit
    /// trail. With `mark_suspicious`, failing records are flagged.
    pub fn verify_all(&self, mark_suspicious: bool) -> LedgerResult<IntegrityCheckResult> {
        let mut conn = self.conn()?;

        // Read from one snapshot, then write marks and the audit entry in a
        // short second transaction.
        let raws = {
            let tx = conn.transaction()?;
            let raws = {
                let mut stmt = tx.prepare(&format!(
                    "SELECT {RECORD_COLUMNS} FROM usage_records ORDER BY id"
                ))?;
                stmt.query_map([], RawRecord::from_row)?
                    .collect::<Result<Vec<_>, _>>()?
            };
            tx.commit()?;
            raws
        };

        let mut valid = 0u64;
        let mut failures = Vec::new();
        for raw in &raws {
            match self.verify_raw(raw) {
                (true, _) => valid += 1,
                (false, reason) => failures.push((raw.record_id.clone(), reason)),
            }
        }

        let total = raws.len() as u64;
        let invalid = total - valid;
        let fingerprint = ChecksumEngine::fingerprint(raws.iter().map(|r| r.checksum.as_str()));
        let check_time = Utc::now();

        let tx = conn.transaction()?;
        if mark_suspicious {
            let mut mark = tx.prepare_cached(
                "UPDATE usage_records SET suspicious_flag = 1, suspicious_reason = ?1
                 WHERE record_id = ?2",
            )?;
            for (record_id, reason) in &failures {
                mark.execute(params![reason, record_id])?;
            }
        }
        tx.execute(
            "INSERT INTO integrity_checks (check_time, total_records, valid_records, invalid_records, overall_checksum)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                format_timestamp(&check_time),
                total as i64,
                valid as i64,
                invalid as i64,
                fingerprint,
            ],
        )?;
        tx.commit()?;

        let suspicious_ids = failures.into_iter().map(|(id, _)| id).collect();

        if invalid > 0 {
            warn!(total, invalid, "ledger integrity check found suspicious records");
        } else {
            info!(total, "ledger integrity check passed");
        }

        Ok(IntegrityCheckResult {
            total,
            valid,
            invalid,
            suspicious_ids,
            integrity_ok: invalid == 0,
            check_time,
            fingerprint,
        })
    }

    /// Flagged records with their stored and expected checksums.
    pub fn suspicious_records(&self) -> LedgerResult<Vec<SuspiciousRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {RECORD_COLUMNS} FROM usage_records WHERE suspicious_flag = 1 ORDER BY id"
        ))?;
        let raws = stmt
            .query_map([], RawRecord::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(raws
            .into_iter()
            .map(|raw| SuspiciousRecord {
                expected_checksum: self.checksums.compute(&raw_fields(&raw)),
                record_id: raw.record_id,
                timestamp: raw.timestamp,
                action_type: raw.action_type,
                stored_checksum: raw.checksum,
                reason: raw.suspicious_reason,
            })
            .collect())
    }

    /// Clears the suspicious flag of a record. Returns false if no such
    /// record exists; clearing an unflagged record is a no-op.
    pub fn clear_suspicious(&self, record_id: &str) -> LedgerResult<bool> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE usage_records SET suspicious_flag = 0, suspicious_reason = NULL
             WHERE record_id = ?1",
            params![record_id],
        )?;
        if changed > 0 {
            info!(record_id, "suspicious flag cleared");
        }
        Ok(changed > 0)
    }

    /// The latest `limit` audit entries, newest first.
    pub fn history(&self, limit: usize) -> LedgerResult<Vec<IntegrityCheckRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT check_time, total_records, valid_records, invalid_records, overall_checksum
             FROM integrity_checks ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(params![i64::try_from(limit).unwrap_or(i64::MAX)], |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, i64>(1)?,
                    r.get::<_, i64>(2)?,
                    r.get::<_, i64>(3)?,
                    r.get::<_, String>(4)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter()
            .map(|(check_time, total, valid, invalid, fingerprint)| {
                Ok(IntegrityCheckRecord {
                    check_time: parse_time(&check_time)?,
                    total: total.max(0) as u64,
                    valid: valid.max(0) as u64,
                    invalid: invalid.max(0) as u64,
                    ledger_fingerprint: fingerprint,
                })
            })
            .collect()
    }

    /// Runs a non-marking pass and assembles the full report. When `output`
    /// is given the report is also written there as pretty JSON.
    pub fn generate_report(&self, output: Option<&Path>) -> LedgerResult<IntegrityReport> {
        let latest = self.verify_all(false)?;
        let suspicious = self.suspicious_records()?;
        let history = self.history(10)?;

        let integrity_rate = if latest.total == 0 {
            100.0
        } else {
            latest.valid as f64 / latest.total as f64 * 100.0
        };
        let summary = IntegritySummary {
            total_records: latest.total,
            valid_records: latest.valid,
            invalid_records: latest.invalid,
            integrity_rate,
            integrity_ok: latest.integrity_ok,
        };
        let report = IntegrityReport {
            generated_at: Utc::now(),
            latest,
            suspicious,
            history,
            summary,
        };

        if let Some(path) = output {
            std::fs::write(path, serde_json::to_string_pretty(&report)?)?;
            info!(path = %path.display(), "integrity report written");
        }
        Ok(report)
    }
}

fn raw_fields(raw: &RawRecord) -> serde_json::Value {
    checksum_fields(
        &raw.record_id,
        &raw.timestamp,
        &raw.action_type,
        &raw.subject_hash,
    )
}
