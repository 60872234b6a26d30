//! Admin-side record of imported reports.

use crate::error::{ReportError, ReportResult};
use crate::report::UsageReport;
use chrono::{DateTime, NaiveDate, Utc};
use desi_types::format_timestamp;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::info;

const COLUMNS: &str = "license_key, machine_id, period_start, period_end, report_date, \
     ledger_fingerprint, total_records, unique_samples, total_loads, total_exports, total_splits, \
     integrity_ok, imported_at, source_file";

/// One committed report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportedReport {
    pub license_key: String,
    pub machine_id: String,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub report_date: NaiveDate,
    pub ledger_fingerprint: String,
    pub total_records: u64,
    pub unique_samples: u64,
    pub total_loads: u64,
    pub total_exports: u64,
    pub total_splits: u64,
    pub integrity_ok: bool,
    pub imported_at: DateTime<Utc>,
    pub source_file: Option<String>,
}

impl ImportedReport {
    fn from_report(report: &UsageReport, source: Option<&str>, imported_at: DateTime<Utc>) -> Self {
        let totals = report.usage_stats;
        Self {
            license_key: report.license_key.clone(),
            machine_id: report.machine_id.clone(),
            period_start: report.period.start,
            period_end: report.period.end,
            report_date: report.report_date,
            ledger_fingerprint: report.ledger_fingerprint.clone(),
            total_records: totals.total_records,
            unique_samples: totals.unique_samples,
            total_loads: totals.total_loads,
            total_exports: totals.total_exports,
            total_splits: totals.total_splits,
            integrity_ok: report.integrity.integrity_ok,
            imported_at,
            source_file: source.map(str::to_string),
        }
    }
}

/// What [`ImportRegistry::commit`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportOutcome {
    Imported(ImportedReport),
    /// Same license, machine and period as an earlier import; nothing stored.
    Duplicate {
        first_imported_at: DateTime<Utc>,
        existing: ImportedReport,
        incoming: ImportedReport,
    },
}

impl ImportOutcome {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate { .. })
    }
}

struct RawImported {
    license_key: String,
    machine_id: String,
    period_start: String,
    period_end: String,
    report_date: String,
    ledger_fingerprint: String,
    totals: [i64; 5],
    integrity_ok: bool,
    imported_at: String,
    source_file: Option<String>,
}

impl RawImported {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            license_key: row.get(0)?,
            machine_id: row.get(1)?,
            period_start: row.get(2)?,
            period_end: row.get(3)?,
            report_date: row.get(4)?,
            ledger_fingerprint: row.get(5)?,
            totals: [row.get(6)?, row.get(7)?, row.get(8)?, row.get(9)?, row.get(10)?],
            integrity_ok: row.get::<_, i64>(11)? != 0,
            imported_at: row.get(12)?,
            source_file: row.get(13)?,
        })
    }

    fn into_imported(self) -> ReportResult<ImportedReport> {
        let date = |s: &str| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .map_err(|e| ReportError::InvalidReport(format!("stored date {s:?}: {e}")))
        };
        let count = |n: i64| u64::try_from(n).unwrap_or(0);
        let imported_at = DateTime::parse_from_rfc3339(&self.imported_at)
            .map_err(|e| ReportError::InvalidReport(format!("stored timestamp: {e}")))?
            .with_timezone(&Utc);
        Ok(ImportedReport {
            period_start: date(&self.period_start)?,
            period_end: date(&self.period_end)?,
            report_date: date(&self.report_date)?,
            license_key: self.license_key,
            machine_id: self.machine_id,
            ledger_fingerprint: self.ledger_fingerprint,
            total_records: count(self.totals[0]),
            unique_samples: count(self.totals[1]),
            total_loads: count(self.totals[2]),
            total_exports: count(self.totals[3]),
            total_splits: count(self.totals[4]),
            integrity_ok: self.integrity_ok,
            imported_at,
            source_file: self.source_file,
        })
    }
}

fn to_i64(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

/// SQLite-backed list of imported reports, unique per
/// (license key, machine, period).
pub struct ImportRegistry {
    conn: Mutex<Connection>,
}

impl ImportRegistry {
    pub fn open(path: &Path) -> ReportResult<Self> {
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// Opens an in-memory registry (for testing).
    pub fn open_in_memory() -> ReportResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> ReportResult<Self> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS imported_reports (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                license_key TEXT NOT NULL,
                machine_id TEXT NOT NULL,
                period_start TEXT NOT NULL,
                period_end TEXT NOT NULL,
                report_date TEXT NOT NULL,
                ledger_fingerprint TEXT NOT NULL,
                total_records INTEGER NOT NULL,
                unique_samples INTEGER NOT NULL,
                total_loads INTEGER NOT NULL,
                total_exports INTEGER NOT NULL,
                total_splits INTEGER NOT NULL,
                integrity_ok INTEGER NOT NULL,
                imported_at TEXT NOT NULL,
                source_file TEXT,
                UNIQUE(license_key, machine_id, period_start, period_end)
            );
            ",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> ReportResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| ReportError::Poisoned)
    }

    /// Stores `report` unless the same report was imported before.
    pub fn commit(&self, report: &UsageReport, source: Option<&str>) -> ReportResult<ImportOutcome> {
        // Stored timestamps keep microseconds; match that in memory.
        let now = Utc::now();
        let now = DateTime::from_timestamp_micros(now.timestamp_micros()).unwrap_or(now);
        let incoming = ImportedReport::from_report(report, source, now);
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let existing = tx
            .query_row(
                &format!(
                    "SELECT {COLUMNS} FROM imported_reports
                     WHERE license_key = ?1 AND machine_id = ?2 AND period_start = ?3 AND period_end = ?4"
                ),
                params![
                    incoming.license_key,
                    incoming.machine_id,
                    incoming.period_start.to_string(),
                    incoming.period_end.to_string(),
                ],
                RawImported::from_row,
            )
            .optional()?;

        if let Some(raw) = existing {
            let existing = raw.into_imported()?;
            info!(
                machine_id = %incoming.machine_id,
                period_start = %incoming.period_start,
                "duplicate report skipped"
            );
            return Ok(ImportOutcome::Duplicate {
                first_imported_at: existing.imported_at,
                existing,
                incoming,
            });
        }

        tx.execute(
            &format!(
                "INSERT INTO imported_reports ({COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)"
            ),
            params![
                incoming.license_key,
                incoming.machine_id,
                incoming.period_start.to_string(),
                incoming.period_end.to_string(),
                incoming.report_date.to_string(),
                incoming.ledger_fingerprint,
                to_i64(incoming.total_records),
                to_i64(incoming.unique_samples),
                to_i64(incoming.total_loads),
                to_i64(incoming.total_exports),
                to_i64(incoming.total_splits),
                i64::from(incoming.integrity_ok),
                format_timestamp(&incoming.imported_at),
                incoming.source_file,
            ],
        )?;
        tx.commit()?;
        info!(machine_id = %incoming.machine_id, "report imported");
        Ok(ImportOutcome::Imported(incoming))
    }

    /// Distinct machine identities seen in imported reports.
    pub fn known_machine_ids(&self) -> ReportResult<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT DISTINCT machine_id FROM imported_reports ORDER BY machine_id")?;
        let ids = stmt
            .query_map([], |r| r.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(ids)
    }

    /// Most recent imports first.
    pub fn imported(&self, limit: usize) -> ReportResult<Vec<ImportedReport>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM imported_reports ORDER BY id DESC LIMIT ?1"
        ))?;
        let raws = stmt
            .query_map(
                params![i64::try_from(limit).unwrap_or(i64::MAX)],
                RawImported::from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        raws.into_iter().map(RawImported::into_imported).collect()
    }

    /// Sum of `total_records` across all imports for `license_key`.
    pub fn total_records_for(&self, license_key: &str) -> ReportResult<u64> {
        let conn = self.conn()?;
        let total: i64 = conn.query_row(
            "SELECT COALESCE(SUM(total_records), 0) FROM imported_reports WHERE license_key = ?1",
            params![license_key],
            |r| r.get(0),
        )?;
        Ok(u64::try_from(total).unwrap_or(0))
    }
}
