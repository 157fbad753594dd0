//! Observable events
//!
//! Every log line carries one of these names. Events are explicit and typed.

use std::fmt;

/// Observable events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Configuration
    /// Configuration loaded
    ConfigLoaded,

    // Record store
    /// Record store opened and index rebuilt
    StoreOpened,
    /// Uncommitted trailing entries discarded on open
    StoreTailDiscarded,
    /// Batch commit marker fsynced
    StoreBatchCommitted,
    /// Records imported from a dump
    StoreImported,

    // Migration
    /// Aggregate count of candidate records
    MigrationCounted,
    /// Page of candidates fetched
    MigrationBatchFetched,
    /// Batch persisted (live) or evaluated (dry run)
    MigrationBatchCommitted,
    /// Record would be or was repaired
    MigrationRecordFixed,
    /// Record could not be repaired and was skipped
    MigrationRecordSkipped,
    /// Resume cursor persisted
    MigrationCursorSaved,
    /// Run stopped at the requested limit
    MigrationLimitReached,
    /// Run stopped on request between batches
    MigrationStopped,

    // Authoritative source
    /// Export entry for another identity ignored
    SourceForeignRecordSkipped,

    // Repair
    /// Corrupted reference left untouched
    RepairReferenceSkipped,

    // Reconciliation
    /// Authoritative listing for a collection fetched
    ReconcileCollectionFetched,
    /// Authoritative listing for a collection failed
    ReconcileCollectionFailed,
    /// Rate-limited response, sleeping before retry
    ReconcileRetry,
    /// Indexed records for the identity loaded
    ReconcileIndexLoaded,
    /// Missing record found queued in the delivery log
    ReconcileRecordConfirmed,
    /// Missing record not found within the scan budget
    ReconcileRecordUnconfirmed,
    /// Delivery log stream scanned
    ReconcileStreamScanned,
    /// Delivery log stream could not be scanned
    ReconcileStreamFailed,
}

impl Event {
    /// Returns the string representation of the event
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::ConfigLoaded => "CONFIG_LOADED",

            Event::StoreOpened => "STORE_OPENED",
            Event::StoreTailDiscarded => "STORE_TAIL_DISCARDED",
            Event::StoreBatchCommitted => "STORE_BATCH_COMMITTED",
            Event::StoreImported => "STORE_IMPORTED",

            Event::MigrationCounted => "MIGRATION_COUNTED",
            Event::MigrationBatchFetched => "MIGRATION_BATCH_FETCHED",
            Event::MigrationBatchCommitted => "MIGRATION_BATCH_COMMITTED",
            Event::MigrationRecordFixed => "MIGRATION_RECORD_FIXED",
            Event::MigrationRecordSkipped => "MIGRATION_RECORD_SKIPPED",
            Event::MigrationCursorSaved => "MIGRATION_CURSOR_SAVED",
            Event::MigrationLimitReached => "MIGRATION_LIMIT_REACHED",
            Event::MigrationStopped => "MIGRATION_STOPPED",

            Event::SourceForeignRecordSkipped => "SOURCE_FOREIGN_RECORD_SKIPPED",

            Event::RepairReferenceSkipped => "REPAIR_REFERENCE_SKIPPED",

            Event::ReconcileCollectionFetched => "RECONCILE_COLLECTION_FETCHED",
            Event::ReconcileCollectionFailed => "RECONCILE_COLLECTION_FAILED",
            Event::ReconcileRetry => "RECONCILE_RETRY",
            Event::ReconcileIndexLoaded => "RECONCILE_INDEX_LOADED",
            Event::ReconcileRecordConfirmed => "RECONCILE_RECORD_CONFIRMED",
            Event::ReconcileRecordUnconfirmed => "RECONCILE_RECORD_UNCONFIRMED",
            Event::ReconcileStreamScanned => "RECONCILE_STREAM_SCANNED",
            Event::ReconcileStreamFailed => "RECONCILE_STREAM_FAILED",
        }
    }

    /// Returns true for events that describe something an operator must audit
    pub fn is_warning(&self) -> bool {
        matches!(
            self,
            Event::StoreTailDiscarded
                | Event::MigrationRecordSkipped
                | Event::SourceForeignRecordSkipped
                | Event::RepairReferenceSkipped
                | Event::ReconcileCollectionFailed
                | Event::ReconcileRecordUnconfirmed
                | Event::ReconcileStreamFailed
        )
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_events_uppercase() {
        let events = [
            Event::ConfigLoaded,
            Event::StoreOpened,
            Event::StoreTailDiscarded,
            Event::StoreBatchCommitted,
            Event::StoreImported,
            Event::MigrationCounted,
            Event::MigrationBatchFetched,
            Event::MigrationBatchCommitted,
            Event::MigrationRecordFixed,
            Event::MigrationRecordSkipped,
            Event::MigrationCursorSaved,
            Event::MigrationLimitReached,
            Event::MigrationStopped,
            Event::SourceForeignRecordSkipped,
            Event::RepairReferenceSkipped,
            Event::ReconcileCollectionFetched,
            Event::ReconcileCollectionFailed,
            Event::ReconcileRetry,
            Event::ReconcileIndexLoaded,
            Event::ReconcileRecordConfirmed,
            Event::ReconcileRecordUnconfirmed,
            Event::ReconcileStreamScanned,
            Event::ReconcileStreamFailed,
        ];

        for event in events {
            let s = event.as_str();
            assert!(!s.is_empty());
            assert!(s.chars().all(|c| c.is_uppercase() || c == '_'));
        }
    }

    #[test]
    fn test_warning_events() {
        assert!(Event::MigrationRecordSkipped.is_warning());
        assert!(Event::ReconcileRecordUnconfirmed.is_warning());
        assert!(!Event::MigrationBatchCommitted.is_warning());
    }
}
