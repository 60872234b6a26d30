//! SQLite usage ledger for DESI.
//!
//! - [`LedgerStore`]: schema, batched inserts, aggregates, reporter support
//!   and license persistence over one SQLite file in WAL mode
//! - [`UsageLedger`]: builds records synchronously and hands them to a
//!   dedicated writer thread that flushes in batches
//! - [`IntegrityAuditor`]: re-verifies every stored checksum on its own
//!   connection and keeps the audit trail
//!
//! A damaged ledger file never stops the host: it is archived next to the
//! original and a fresh ledger takes its place.

mod auditor;
mod error;
mod schema;
mod store;
mod writer;

pub use auditor::{
    IntegrityAuditor, IntegrityCheckResult, IntegrityReport, IntegritySummary, SuspiciousRecord,
};
pub use error::{LedgerError, LedgerResult};
pub use store::LedgerStore;
pub use writer::{RecordHandoff, MIN_FLUSH_INTERVAL, UsageEvent, UsageLedger, WriterConfig};

use chrono::Utc;
use rusqlite::{Connection, ErrorCode};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Opens a ledger database, replacing it with a fresh one if it is damaged.
///
/// The file is opened, switched to WAL mode and checked with
/// `PRAGMA integrity_check`. If any of that fails on an existing file, the
/// file is renamed to `<name>.corrupt-<timestamp>`, stale WAL sidecars are
/// removed and an empty database is opened in its place. The archive path
/// is returned so callers can surface the recovery.
pub fn open_with_recovery(path: &Path) -> LedgerResult<(Connection, Option<PathBuf>)> {
    match open_checked(path) {
        Ok(conn) => Ok((conn, None)),
        Err(first_err) => {
            if !path.exists() || !is_damage(&first_err) {
                return Err(first_err);
            }
            let archived = archive_path(path);
            warn!(
                path = %path.display(),
                archived = %archived.display(),
                error = %first_err,
                "ledger failed its startup check; archiving and starting fresh"
            );
            std::fs::rename(path, &archived)?;
            for sidecar in ["-wal", "-shm"] {
                let mut name = path.as_os_str().to_owned();
                name.push(sidecar);
                let _ = std::fs::remove_file(PathBuf::from(name));
            }
            let conn = open_checked(path)?;
            Ok((conn, Some(archived)))
        }
    }
}

fn open_checked(path: &Path) -> LedgerResult<Connection> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get::<_, String>(0))?;
    let verdict: String = conn.query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
    if verdict != "ok" {
        return Err(LedgerError::InvalidData(format!(
            "integrity_check reported: {verdict}"
        )));
    }
    Ok(conn)
}

/// Only file damage triggers archiving; a locked or unreadable file does not.
fn is_damage(err: &LedgerError) -> bool {
    match err {
        LedgerError::InvalidData(_) => true,
        LedgerError::Database(rusqlite::Error::SqliteFailure(e, _)) => matches!(
            e.code,
            ErrorCode::DatabaseCorrupt | ErrorCode::NotADatabase
        ),
        _ => false,
    }
}

fn archive_path(path: &Path) -> PathBuf {
    let stamp = Utc::now().format("%Y%m%dT%H%M%S");
    let mut name = path.as_os_str().to_owned();
    name.push(format!(".corrupt-{stamp}"));
    PathBuf::from(name)
}
