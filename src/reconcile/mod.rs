//! Cross-store reconciliation
//!
//! Finds records the authoritative source knows about that the record store
//! lacks, and checks whether each one is still queued in the delivery log.

mod checker;
mod errors;
mod report;
mod scan;
mod window;

pub use checker::{CheckOptions, ReconciliationChecker, DEFAULT_COLLECTIONS, DEFAULT_STREAMS};
pub use errors::{ReconcileError, ReconcileResult};
pub use report::{
    CollectionCounts, ConfirmedRecord, ReconciliationReport, StreamSummary, UnconfirmedRecord,
};
pub use scan::{scan_streams, ScanBudget, ScanOutcome, SearchSet};
pub use window::TimeWindow;
