//! Core type definitions for DESI usage metering.
//!
//! This crate defines the plain data shared by every layer of the
//! usage-integrity engine:
//! - Record identifiers (UUID v7)
//! - Action types recorded by the host application
//! - Usage records, daily aggregates and integrity-check history
//! - Reporting periods
//! - The signed batch format pushed to the collector
//!
//! Nothing in here touches storage or cryptography; those live in
//! `desi-ledger` and `desi-crypto`.

mod action;
mod ids;
mod period;
mod push;
mod record;

pub use action::ActionType;
pub use ids::RecordId;
pub use period::ReportPeriod;
pub use push::{PushBatch, PushedRecord};
pub use record::{
    checksum_fields, format_timestamp, DailyAggregate, IntegrityCheckRecord, UsageRecord,
    UsageStats,
};

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid period: {0}")]
    InvalidPeriod(String),
}
