//! Ledger schema.

use crate::error::LedgerResult;
use rusqlite::Connection;

pub(crate) fn init_schema(conn: &Connection) -> LedgerResult<()> {
    conn.execute_batch(
        "
        PRAGMA synchronous = NORMAL;

        CREATE TABLE IF NOT EXISTS usage_records (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            record_id TEXT NOT NULL UNIQUE,
            timestamp TEXT NOT NULL,
            action_type TEXT NOT NULL,
            subject_hash TEXT NOT NULL,
            details_encrypted TEXT NOT NULL,
            reported INTEGER NOT NULL DEFAULT 0,
            report_time TEXT,
            checksum TEXT NOT NULL,
            suspicious_flag INTEGER NOT NULL DEFAULT 0,
            suspicious_reason TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_usage_records_timestamp
            ON usage_records(timestamp);
        CREATE INDEX IF NOT EXISTS idx_usage_records_reported
            ON usage_records(reported);

        CREATE TABLE IF NOT EXISTS usage_stats (
            date TEXT PRIMARY KEY,
            samples_loaded INTEGER NOT NULL DEFAULT 0,
            samples_exported INTEGER NOT NULL DEFAULT 0,
            samples_split INTEGER NOT NULL DEFAULT 0,
            total_operations INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS integrity_checks (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            check_time TEXT NOT NULL,
            total_records INTEGER NOT NULL,
            valid_records INTEGER NOT NULL,
            invalid_records INTEGER NOT NULL,
            overall_checksum TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS license_info (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            license_key TEXT NOT NULL,
            activated_at TEXT NOT NULL,
            expires_at TEXT,
            last_validated TEXT
        );
        ",
    )?;
    Ok(())
}
