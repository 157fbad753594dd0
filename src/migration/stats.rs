//! Run mode and running totals

use std::fmt;

use serde::{Deserialize, Serialize};

/// Whether repairs are persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationMode {
    /// Repair in memory and report; persist nothing
    DryRun,
    Live,
}

impl MigrationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            MigrationMode::DryRun => "dry_run",
            MigrationMode::Live => "live",
        }
    }

    pub fn is_live(&self) -> bool {
        *self == MigrationMode::Live
    }
}

impl fmt::Display for MigrationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Running totals of a migration run
///
/// In dry-run mode `records_fixed` and `identifiers_fixed` count what would
/// have been written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationTotals {
    pub records_processed: u64,
    pub records_fixed: u64,
    pub identifiers_fixed: u64,
    /// Records whose body could not be parsed
    pub records_skipped: u64,
    /// References with a malformed header, left as they were
    pub references_skipped: u64,
    /// Completed fetch/fix/commit cycles
    pub batches_committed: u64,
}

impl MigrationTotals {
    /// `(name, value)` pairs for log lines.
    pub fn fields(&self) -> [(&'static str, String); 6] {
        [
            ("records_processed", self.records_processed.to_string()),
            ("records_fixed", self.records_fixed.to_string()),
            ("identifiers_fixed", self.identifiers_fixed.to_string()),
            ("records_skipped", self.records_skipped.to_string()),
            ("references_skipped", self.references_skipped.to_string()),
            ("batches_committed", self.batches_committed.to_string()),
        ]
    }
}
