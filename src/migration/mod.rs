//! Batch migration
//!
//! Walks the record store in key order, repairs each candidate record and
//! commits repaired bodies in bounded atomic batches. Runs are resumable
//! from a persisted cursor and can be rehearsed in dry-run mode.

mod cursor;
mod driver;
mod errors;
mod stats;

pub use cursor::ResumeCursor;
pub use driver::{
    MigrationDriver, MigrationOptions, MigrationState, MigrationSummary, RecordFix,
    DEFAULT_BATCH_SIZE,
};
pub use errors::{MigrationError, MigrationResult};
pub use stats::{MigrationMode, MigrationTotals};
