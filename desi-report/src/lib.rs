//! Usage reports for DESI.
//!
//! Clients export a [`UsageReport`] encrypted under a key derived from
//! their license key and hand the file to an administrator. The admin side
//! builds a [`KeyRing`] from every license key and machine identity it
//! knows, finds the key that opens the blob, and records the result in an
//! [`ImportRegistry`] that refuses to count the same report twice.

mod codec;
mod error;
mod registry;
mod report;

pub use codec::{
    export, export_to_file, export_with, import, import_file, DecryptedReport, ImportOptions,
    KeyRing, SeedKind,
};
pub use error::{ReportError, ReportResult};
pub use registry::{ImportOutcome, ImportRegistry, ImportedReport};
pub use report::{ReportIntegrity, ReportTotals, UsageReport, SCHEMA_TAG};
