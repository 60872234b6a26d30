//! Usage records and the aggregates derived from them.

use crate::{ActionType, RecordId, ReportPeriod};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Formats a timestamp the way it is stored and checksummed.
///
/// Microsecond precision with a `Z` suffix, so a parse/format cycle
/// reproduces the exact same text.
#[must_use]
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Builds the checksummed field set of a usage record.
///
/// Takes the stored textual forms so that the auditor can verify rows
/// exactly as they sit on disk.
#[must_use]
pub fn checksum_fields(
    record_id: &str,
    timestamp: &str,
    action_type: &str,
    subject_hash: &str,
) -> serde_json::Value {
    json!({
        "record_id": record_id,
        "timestamp": timestamp,
        "action_type": action_type,
        "subject_hash": subject_hash,
    })
}

/// A single metered event.
///
/// Created at event time and appended once. The checksum is never
/// rewritten; only the `reported` and `suspicious` flags change later.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    /// Unique record identifier.
    pub record_id: RecordId,
    /// When the event happened.
    pub timestamp: DateTime<Utc>,
    /// What happened.
    pub action_type: ActionType,
    /// One-way hash of the subject (sample) name.
    pub subject_hash: String,
    /// Encrypted JSON blob with the raw subject name and host details.
    pub encrypted_details: String,
    /// Machine-bound checksum over the identifying fields.
    pub checksum: String,
    /// Whether the record has been pushed to the collector.
    #[serde(default)]
    pub reported: bool,
    /// When the record was pushed.
    #[serde(default)]
    pub report_time: Option<DateTime<Utc>>,
    /// Set by the auditor when the checksum no longer matches.
    #[serde(default)]
    pub suspicious: bool,
    /// Why the record was flagged.
    #[serde(default)]
    pub suspicious_reason: Option<String>,
}

impl UsageRecord {
    /// Returns the stored textual timestamp.
    #[must_use]
    pub fn timestamp_text(&self) -> String {
        format_timestamp(&self.timestamp)
    }

    /// Returns the field set the checksum covers.
    #[must_use]
    pub fn checksum_fields(&self) -> serde_json::Value {
        checksum_fields(
            &self.record_id.to_string(),
            &self.timestamp_text(),
            self.action_type.as_str(),
            &self.subject_hash,
        )
    }
}

/// Per-day counters, upserted on every flushed batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyAggregate {
    pub date: NaiveDate,
    pub samples_loaded: u64,
    pub samples_exported: u64,
    pub samples_split: u64,
    pub total_operations: u64,
}

impl DailyAggregate {
    /// Creates an empty aggregate for `date`.
    #[must_use]
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            ..Self::default()
        }
    }

    /// Counts one action into this aggregate.
    pub fn count(&mut self, action: &ActionType) {
        match action {
            ActionType::LoadSample => self.samples_loaded += 1,
            ActionType::ExportData => self.samples_exported += 1,
            ActionType::SplitMetabolites => self.samples_split += 1,
            ActionType::Other(_) => {}
        }
        self.total_operations += 1;
    }
}

/// Aggregated usage over a reporting period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageStats {
    pub period: ReportPeriod,
    pub total_records: u64,
    /// Distinct subject hashes seen in the period.
    pub unique_samples: u64,
    pub total_loads: u64,
    pub total_exports: u64,
    pub total_splits: u64,
    /// Per-day breakdown, newest first.
    pub daily: Vec<DailyAggregate>,
}

/// One entry of the append-only integrity audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityCheckRecord {
    pub check_time: DateTime<Utc>,
    pub total: u64,
    pub valid: u64,
    pub invalid: u64,
    pub ledger_fingerprint: String,
}
