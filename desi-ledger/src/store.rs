//! Durable storage for usage records, daily aggregates and license state.

use crate::error::{LedgerError, LedgerResult};
use crate::schema::init_schema;
use chrono::{DateTime, NaiveDate, Utc};
use desi_license::LicenseInfo;
use desi_types::{
    format_timestamp, ActionType, DailyAggregate, RecordId, ReportPeriod, UsageRecord, UsageStats,
};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

pub(crate) const RECORD_COLUMNS: &str = "record_id, timestamp, action_type, subject_hash, \
     details_encrypted, checksum, reported, report_time, suspicious_flag, suspicious_reason";

/// A `usage_records` row exactly as stored.
#[derive(Debug, Clone)]
pub(crate) struct RawRecord {
    pub record_id: String,
    pub timestamp: String,
    pub action_type: String,
    pub subject_hash: String,
    pub details_encrypted: String,
    pub checksum: String,
    pub reported: bool,
    pub report_time: Option<String>,
    pub suspicious: bool,
    pub suspicious_reason: Option<String>,
}

impl RawRecord {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            record_id: row.get(0)?,
            timestamp: row.get(1)?,
            action_type: row.get(2)?,
            subject_hash: row.get(3)?,
            details_encrypted: row.get(4)?,
            checksum: row.get(5)?,
            reported: row.get::<_, i64>(6)? != 0,
            report_time: row.get(7)?,
            suspicious: row.get::<_, i64>(8)? != 0,
            suspicious_reason: row.get(9)?,
        })
    }

    pub(crate) fn into_record(self) -> LedgerResult<UsageRecord> {
        Ok(UsageRecord {
            record_id: RecordId::parse(&self.record_id)
                .map_err(|e| LedgerError::InvalidData(format!("record_id: {e}")))?,
            timestamp: parse_time(&self.timestamp)?,
            action_type: ActionType::from(self.action_type),
            subject_hash: self.subject_hash,
            encrypted_details: self.details_encrypted,
            checksum: self.checksum,
            reported: self.reported,
            report_time: self.report_time.as_deref().map(parse_time).transpose()?,
            suspicious: self.suspicious,
            suspicious_reason: self.suspicious_reason,
        })
    }
}

pub(crate) fn parse_time(text: &str) -> LedgerResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| LedgerError::InvalidData(format!("timestamp {text:?}: {e}")))
}

fn to_i64(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

fn to_u64(n: i64) -> u64 {
    u64::try_from(n).unwrap_or(0)
}

/// The usage ledger database.
///
/// One connection guarded by a mutex, shared between the writer thread and
/// foreground readers. Audits run on their own connection.
pub struct LedgerStore {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
    recovered_from: Option<PathBuf>,
}

impl LedgerStore {
    /// Opens (or creates) the ledger at `path`, recovering from corruption.
    pub fn open(path: &Path) -> LedgerResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let (conn, recovered_from) = crate::open_with_recovery(path)?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: Some(path.to_path_buf()),
            recovered_from,
        })
    }

    /// Opens an in-memory ledger (for testing).
    pub fn open_in_memory() -> LedgerResult<Self> {
        let conn = Connection::open_in_memory()?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: None,
            recovered_from: None,
        })
    }

    /// On-disk location, `None` for in-memory ledgers.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Where the damaged file was archived, if startup had to recover.
    pub fn recovered_from(&self) -> Option<&Path> {
        self.recovered_from.as_deref()
    }

    fn conn(&self) -> LedgerResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| LedgerError::Poisoned)
    }

    // ── Writes ───────────────────────────────────────────────────

    /// Inserts `records` in order and folds them into the daily aggregates,
    /// all in one transaction.
    pub fn insert_batch(&self, records: &[UsageRecord]) -> LedgerResult<()> {
        if records.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let mut daily: BTreeMap<NaiveDate, DailyAggregate> = BTreeMap::new();
        {
            let mut insert = tx.prepare_cached(
                "INSERT INTO usage_records (record_id, timestamp, action_type, subject_hash,
                     details_encrypted, checksum, reported, report_time, suspicious_flag, suspicious_reason)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            )?;
            for record in records {
                insert.execute(params![
                    record.record_id.to_string(),
                    record.timestamp_text(),
                    record.action_type.as_str(),
                    record.subject_hash,
                    record.encrypted_details,
                    record.checksum,
                    i64::from(record.reported),
                    record.report_time.as_ref().map(format_timestamp),
                    i64::from(record.suspicious),
                    record.suspicious_reason,
                ])?;
                let date = record.timestamp.date_naive();
                daily
                    .entry(date)
                    .or_insert_with(|| DailyAggregate::new(date))
                    .count(&record.action_type);
            }

            let mut upsert = tx.prepare_cached(
                "INSERT INTO usage_stats (date, samples_loaded, samples_exported, samples_split, total_operations)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(date) DO UPDATE SET
                     samples_loaded = samples_loaded + excluded.samples_loaded,
                     samples_exported = samples_exported + excluded.samples_exported,
                     samples_split = samples_split + excluded.samples_split,
                     total_operations = total_operations + excluded.total_operations",
            )?;
            for agg in daily.values() {
                upsert.execute(params![
                    agg.date.format("%Y-%m-%d").to_string(),
                    to_i64(agg.samples_loaded),
                    to_i64(agg.samples_exported),
                    to_i64(agg.samples_split),
                    to_i64(agg.total_operations),
                ])?;
            }
        }
        tx.commit()?;
        debug!(count = records.len(), "flushed usage records");
        Ok(())
    }

    // ── Reads ────────────────────────────────────────────────────

    /// Number of stored records.
    pub fn count(&self) -> LedgerResult<u64> {
        let conn = self.conn()?;
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM usage_records", [], |r| r.get(0))?;
        Ok(to_u64(n))
    }

    /// Fetches one record by id.
    pub fn record(&self, id: &RecordId) -> LedgerResult<Option<UsageRecord>> {
        let conn = self.conn()?;
        let raw = conn
            .query_row(
                &format!("SELECT {RECORD_COLUMNS} FROM usage_records WHERE record_id = ?1"),
                params![id.to_string()],
                RawRecord::from_row,
            )
            .optional()?;
        raw.map(RawRecord::into_record).transpose()
    }

    /// All records in append order.
    pub fn records(&self) -> LedgerResult<Vec<UsageRecord>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare(&format!("SELECT {RECORD_COLUMNS} FROM usage_records ORDER BY id"))?;
        let raws = stmt
            .query_map([], RawRecord::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        raws.into_iter().map(RawRecord::into_record).collect()
    }

    /// Totals, distinct subjects and the per-day breakdown for `period`.
    pub fn aggregate(&self, period: &ReportPeriod) -> LedgerResult<UsageStats> {
        let conn = self.conn()?;
        let (total, unique, loads, exports, splits): (i64, i64, i64, i64, i64) = conn.query_row(
            "SELECT COUNT(*),
                    COUNT(DISTINCT subject_hash),
                    COALESCE(SUM(action_type = 'load_sample'), 0),
                    COALESCE(SUM(action_type = 'export_data'), 0),
                    COALESCE(SUM(action_type = 'split_metabolites'), 0)
             FROM usage_records
             WHERE timestamp >= ?1 AND timestamp < ?2",
            params![period.lower_bound(), period.upper_bound()],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?)),
        )?;

        let mut stmt = conn.prepare(
            "SELECT date, samples_loaded, samples_exported, samples_split, total_operations
             FROM usage_stats
             WHERE date >= ?1 AND date < ?2
             ORDER BY date DESC",
        )?;
        let rows = stmt
            .query_map(params![period.lower_bound(), period.upper_bound()], |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, i64>(1)?,
                    r.get::<_, i64>(2)?,
                    r.get::<_, i64>(3)?,
                    r.get::<_, i64>(4)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let daily = rows
            .into_iter()
            .map(|(date, loaded, exported, split, total)| {
                let date = NaiveDate::parse_from_str(&date, "%Y-%m-%d")
                    .map_err(|e| LedgerError::InvalidData(format!("date {date:?}: {e}")))?;
                Ok(DailyAggregate {
                    date,
                    samples_loaded: to_u64(loaded),
                    samples_exported: to_u64(exported),
                    samples_split: to_u64(split),
                    total_operations: to_u64(total),
                })
            })
            .collect::<LedgerResult<Vec<_>>>()?;

        Ok(UsageStats {
            period: *period,
            total_records: to_u64(total),
            unique_samples: to_u64(unique),
            total_loads: to_u64(loads),
            total_exports: to_u64(exports),
            total_splits: to_u64(splits),
            daily,
        })
    }

    // ── Reporter support ─────────────────────────────────────────

    /// Up to `limit` records not yet pushed, oldest first.
    pub fn unreported(&self, limit: usize) -> LedgerResult<Vec<UsageRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {RECORD_COLUMNS} FROM usage_records WHERE reported = 0 ORDER BY id LIMIT ?1"
        ))?;
        let raws = stmt
            .query_map(params![i64::try_from(limit).unwrap_or(i64::MAX)], RawRecord::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        raws.into_iter().map(RawRecord::into_record).collect()
    }

    /// Flags `ids` as reported at `at`. Returns how many rows changed.
    pub fn mark_reported(&self, ids: &[RecordId], at: DateTime<Utc>) -> LedgerResult<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let mut changed = 0;
        {
            let mut stmt = tx.prepare_cached(
                "UPDATE usage_records SET reported = 1, report_time = ?1
                 WHERE record_id = ?2 AND reported = 0",
            )?;
            let at = format_timestamp(&at);
            for id in ids {
                changed += stmt.execute(params![at, id.to_string()])?;
            }
        }
        tx.commit()?;
        Ok(changed)
    }

    // ── License ──────────────────────────────────────────────────

    /// Stores the installed license, replacing any previous one.
    pub fn save_license_info(&self, info: &LicenseInfo) -> LedgerResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO license_info (id, license_key, activated_at, expires_at, last_validated)
             VALUES (1, ?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET
                 license_key = excluded.license_key,
                 activated_at = excluded.activated_at,
                 expires_at = excluded.expires_at,
                 last_validated = excluded.last_validated",
            params![
                info.license_key,
                format_timestamp(&info.activated_at),
                info.expires_at.as_ref().map(format_timestamp),
                info.last_validated.as_ref().map(format_timestamp),
            ],
        )?;
        Ok(())
    }

    pub fn load_license_info(&self) -> LedgerResult<Option<LicenseInfo>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT license_key, activated_at, expires_at, last_validated
                 FROM license_info WHERE id = 1",
                [],
                |r| {
                    Ok((
                        r.get::<_, String>(0)?,
                        r.get::<_, String>(1)?,
                        r.get::<_, Option<String>>(2)?,
                        r.get::<_, Option<String>>(3)?,
                    ))
                },
            )
            .optional()?;
        let Some((license_key, activated_at, expires_at, last_validated)) = row else {
            return Ok(None);
        };
        Ok(Some(LicenseInfo {
            license_key,
            activated_at: parse_time(&activated_at)?,
            expires_at: expires_at.as_deref().map(parse_time).transpose()?,
            last_validated: last_validated.as_deref().map(parse_time).transpose()?,
        }))
    }
}
