//! HTTP collector for pushed usage batches.

use crate::error::{AdminError, AdminResult};
use axum::{
    body::Bytes,
    extract::State,
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::Utc;
use desi_crypto::ChecksumEngine;
use desi_types::{format_timestamp, PushBatch};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS pushed_records (
    record_id TEXT PRIMARY KEY,
    license_key TEXT NOT NULL,
    machine_id TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    action_type TEXT NOT NULL,
    subject_hash TEXT NOT NULL,
    checksum TEXT NOT NULL,
    received_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_pushed_license ON pushed_records(license_key);
";

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct PushAck {
    pub accepted: usize,
    pub duplicates: usize,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct HealthResponse {
    pub status: String,
}

/// Records received from reporters, keyed by record id.
pub struct CollectorStore {
    conn: Mutex<Connection>,
}

impl CollectorStore {
    pub fn open(path: &Path) -> AdminResult<Self> {
        let conn = Connection::open(path)?;
        conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get::<_, String>(0))?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> AdminResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> AdminResult<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Stores every record of `batch`. Records already seen are counted as
    /// duplicates, so a retried push is harmless.
    pub fn store_batch(&self, batch: &PushBatch) -> AdminResult<PushAck> {
        let mut conn = self.conn.lock().map_err(|_| AdminError::Poisoned)?;
        let tx = conn.transaction()?;
        let received_at = format_timestamp(&Utc::now());
        let mut accepted = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO pushed_records
                 (record_id, license_key, machine_id, timestamp, action_type,
                  subject_hash, checksum, received_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )?;
            for record in &batch.records {
                accepted += stmt.execute(params![
                    record.record_id,
                    batch.license_key,
                    batch.machine_id,
                    record.timestamp,
                    record.action_type,
                    record.subject_hash,
                    record.checksum,
                    received_at,
                ])?;
            }
        }
        tx.commit()?;
        Ok(PushAck {
            accepted,
            duplicates: batch.records.len() - accepted,
        })
    }

    pub fn count(&self) -> AdminResult<u64> {
        let conn = self.conn.lock().map_err(|_| AdminError::Poisoned)?;
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM pushed_records", [], |r| r.get(0))?;
        Ok(to_u64(n))
    }

    pub fn count_for_license(&self, license_key: &str) -> AdminResult<u64> {
        let conn = self.conn.lock().map_err(|_| AdminError::Poisoned)?;
        let n: i64 = conn.query_row(
            "SELECT COUNT(*) FROM pushed_records WHERE license_key = ?1",
            [license_key],
            |r| r.get(0),
        )?;
        Ok(to_u64(n))
    }
}

fn to_u64(n: i64) -> u64 {
    u64::try_from(n).unwrap_or(0)
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

async fn push_handler(
    State(store): State<Arc<CollectorStore>>,
    body: Bytes,
) -> AdminResult<Json<PushAck>> {
    let batch: PushBatch =
        serde_json::from_slice(&body).map_err(|e| AdminError::MalformedBatch(e.to_string()))?;

    let engine = ChecksumEngine::new(batch.machine_id.clone());
    if !engine.verify_bytes(batch.signing_payload().as_bytes(), &batch.signature) {
        warn!(machine_id = %batch.machine_id, "rejected batch with bad signature");
        return Err(AdminError::BadSignature(batch.machine_id));
    }

    let ack = tokio::task::spawn_blocking(move || {
        let ack = store.store_batch(&batch)?;
        debug!(machine_id = %batch.machine_id, records = batch.records.len(), "batch stored");
        Ok::<_, AdminError>(ack)
    })
    .await
    .map_err(|e| AdminError::Task(e.to_string()))??;

    info!(accepted = ack.accepted, duplicates = ack.duplicates, "usage batch received");
    Ok(Json(ack))
}

/// Build the collector router over `store`.
pub fn build_router(store: Arc<CollectorStore>) -> Router {
    Router::new()
        .route("/api/v1/health", get(health_handler))
        .route("/api/v1/usage", post(push_handler))
        .with_state(store)
}
