//! Shared test helpers for report tests.

#![allow(dead_code)]

use chrono::NaiveDate;
use desi_crypto::KdfParams;
use desi_report::{ReportIntegrity, UsageReport};
use desi_types::{DailyAggregate, ReportPeriod, UsageStats};

/// Cheap KDF so key rings of hundreds of candidates stay fast.
pub fn fast_params() -> KdfParams {
    KdfParams::with_iterations(10)
}

pub fn period() -> ReportPeriod {
    ReportPeriod::ending_on(NaiveDate::from_ymd_opt(2025, 6, 30).unwrap(), 30)
}

pub fn stats() -> UsageStats {
    let mut today = DailyAggregate::new(NaiveDate::from_ymd_opt(2025, 6, 30).unwrap());
    today.samples_loaded = 12;
    today.samples_exported = 3;
    today.total_operations = 15;
    UsageStats {
        period: period(),
        total_records: 15,
        unique_samples: 9,
        total_loads: 12,
        total_exports: 3,
        total_splits: 0,
        daily: vec![today],
    }
}

pub fn report_for(license_key: &str, machine_id: &str) -> UsageReport {
    UsageReport::from_stats(
        license_key,
        machine_id,
        &stats(),
        ReportIntegrity {
            total: 15,
            valid: 15,
            invalid: 0,
            integrity_ok: true,
        },
        "ab".repeat(32),
    )
}
