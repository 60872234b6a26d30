//! Reporting periods.

use crate::Error;
use chrono::{Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// An inclusive range of UTC calendar days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReportPeriod {
    /// First day of the period.
    pub start: NaiveDate,
    /// Last day of the period (inclusive).
    pub end: NaiveDate,
    /// Number of days the period was requested for.
    pub days: u32,
}

impl ReportPeriod {
    /// The `days` days leading up to and including `end`.
    #[must_use]
    pub fn ending_on(end: NaiveDate, days: u32) -> Self {
        let start = end - Duration::days(i64::from(days));
        Self { start, end, days }
    }

    /// The `days` days leading up to and including today (UTC).
    #[must_use]
    pub fn last_days(days: u32) -> Self {
        Self::ending_on(Utc::now().date_naive(), days)
    }

    /// Creates a period from explicit bounds.
    pub fn between(start: NaiveDate, end: NaiveDate) -> crate::Result<Self> {
        if end < start {
            return Err(Error::InvalidPeriod(format!("{end} is before {start}")));
        }
        let days = u32::try_from((end - start).num_days())
            .map_err(|_| Error::InvalidPeriod("period too long".to_string()))?;
        Ok(Self { start, end, days })
    }

    /// Returns true if `date` falls inside the period.
    #[must_use]
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }

    /// Lower timestamp bound (inclusive) in stored text form.
    #[must_use]
    pub fn lower_bound(&self) -> String {
        self.start.format("%Y-%m-%d").to_string()
    }

    /// Upper timestamp bound (exclusive) in stored text form.
    #[must_use]
    pub fn upper_bound(&self) -> String {
        (self.end + Duration::days(1)).format("%Y-%m-%d").to_string()
    }
}
