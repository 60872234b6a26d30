//! Server-side tooling for DESI usage data.
//!
//! - [`build_router`]: the HTTP collector that accepts signed record
//!   batches from the background reporter
//! - [`CandidateSeeds`] and [`import_report`]: decrypting customer report
//!   files against every known license key and machine identity

mod collector;
mod error;
mod import;

pub use collector::{build_router, CollectorStore, HealthResponse, PushAck};
pub use error::{AdminError, AdminResult};
pub use import::{import_report, CandidateSeeds, ImportSummary};
