//! The report document.

use crate::error::{ReportError, ReportResult};
use chrono::{DateTime, NaiveDate, Utc};
use desi_types::{DailyAggregate, ReportPeriod, UsageStats};
use serde::{Deserialize, Serialize};

/// Schema tag. Always the first field of the serialized report, so a
/// decrypted plaintext can be recognized from its first bytes.
pub const SCHEMA_TAG: &str = "desi-usage-report/1";

/// Period totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportTotals {
    pub total_records: u64,
    pub unique_samples: u64,
    pub total_loads: u64,
    pub total_exports: u64,
    pub total_splits: u64,
    pub period_days: u32,
}

/// Outcome of the integrity pass run just before export.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportIntegrity {
    pub total: u64,
    pub valid: u64,
    pub invalid: u64,
    pub integrity_ok: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageReport {
    pub schema: String,
    pub license_key: String,
    pub machine_id: String,
    pub report_date: NaiveDate,
    pub period: ReportPeriod,
    pub usage_stats: ReportTotals,
    #[serde(default)]
    pub daily_stats: Vec<DailyAggregate>,
    pub ledger_fingerprint: String,
    pub integrity: ReportIntegrity,
    pub generated_at: DateTime<Utc>,
}

impl UsageReport {
    /// Builds a report from a stats snapshot and the latest integrity pass.
    pub fn from_stats(
        license_key: impl Into<String>,
        machine_id: impl Into<String>,
        stats: &UsageStats,
        integrity: ReportIntegrity,
        ledger_fingerprint: impl Into<String>,
    ) -> Self {
        Self {
            schema: SCHEMA_TAG.to_string(),
            license_key: license_key.into(),
            machine_id: machine_id.into(),
            report_date: stats.period.end,
            period: stats.period,
            usage_stats: ReportTotals {
                total_records: stats.total_records,
                unique_samples: stats.unique_samples,
                total_loads: stats.total_loads,
                total_exports: stats.total_exports,
                total_splits: stats.total_splits,
                period_days: stats.period.days,
            },
            daily_stats: stats.daily.clone(),
            ledger_fingerprint: ledger_fingerprint.into(),
            integrity,
            generated_at: Utc::now(),
        }
    }

    /// Checks the fields an import relies on.
    pub fn validate(&self) -> ReportResult<()> {
        if self.schema != SCHEMA_TAG {
            return Err(ReportError::InvalidReport(format!(
                "unsupported schema {:?}",
                self.schema
            )));
        }
        if self.license_key.trim().is_empty() {
            return Err(ReportError::InvalidReport("missing license_key".into()));
        }
        if self.machine_id.trim().is_empty() {
            return Err(ReportError::InvalidReport("missing machine_id".into()));
        }
        if self.period.end < self.period.start {
            return Err(ReportError::InvalidReport("period ends before it starts".into()));
        }
        Ok(())
    }
}
