//! Wire format for record batches pushed to the collector.

use crate::UsageRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

/// The non-secret part of a usage record sent over the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushedRecord {
    pub record_id: String,
    pub timestamp: String,
    pub action_type: String,
    pub subject_hash: String,
    pub checksum: String,
}

impl From<&UsageRecord> for PushedRecord {
    fn from(record: &UsageRecord) -> Self {
        Self {
            record_id: record.record_id.to_string(),
            timestamp: record.timestamp_text(),
            action_type: record.action_type.as_str().to_string(),
            subject_hash: record.subject_hash.clone(),
            checksum: record.checksum.clone(),
        }
    }
}

/// A signed batch of records from one machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushBatch {
    pub license_key: String,
    pub machine_id: String,
    pub sent_at: DateTime<Utc>,
    pub records: Vec<PushedRecord>,
    /// Hex signature over [`PushBatch::signing_payload`].
    #[serde(default)]
    pub signature: String,
}

impl PushBatch {
    pub fn new(license_key: &str, machine_id: &str, records: &[UsageRecord]) -> Self {
        Self {
            license_key: license_key.to_string(),
            machine_id: machine_id.to_string(),
            sent_at: Utc::now(),
            records: records.iter().map(PushedRecord::from).collect(),
            signature: String::new(),
        }
    }

    /// Canonical (key-sorted, compact) JSON of everything but the signature.
    #[must_use]
    pub fn signing_payload(&self) -> String {
        json!({
            "license_key": self.license_key,
            "machine_id": self.machine_id,
            "sent_at": crate::format_timestamp(&self.sent_at),
            "records": self.records,
        })
        .to_string()
    }
}
