//! Shared helpers for collector and import tests.

#![allow(dead_code)]

use chrono::Utc;
use desi_admin::{build_router, CollectorStore};
use desi_crypto::{sha256_hex, ChecksumEngine};
use desi_types::{ActionType, RecordId, UsageRecord};
use std::sync::Arc;

pub const MACHINE_ID: &str = "machine-001";
pub const LICENSE_KEY: &str = "DESI-00000000-00000000-0000";

pub fn record(subject: &str) -> UsageRecord {
    let mut record = UsageRecord {
        record_id: RecordId::new(),
        timestamp: Utc::now(),
        action_type: ActionType::LoadSample,
        subject_hash: sha256_hex(subject),
        encrypted_details: String::new(),
        checksum: String::new(),
        reported: false,
        report_time: None,
        suspicious: false,
        suspicious_reason: None,
    };
    record.checksum = ChecksumEngine::new(MACHINE_ID).compute(&record.checksum_fields());
    record
}

/// Spin up the collector on an OS-assigned port, returning the base URL.
pub async fn spawn_collector(store: Arc<CollectorStore>) -> String {
    let app = build_router(store);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://127.0.0.1:{}", port)
}
