//! Migration resumability tests
//!
//! - Stopping after N batches and resuming from the saved cursor gives the
//!   same totals and the same store contents as one uninterrupted run
//! - A failed commit leaves the cursor where it was

use std::io;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use cidmend::cid::ContentIdentifier;
use cidmend::migration::{
    MigrationDriver, MigrationMode, MigrationOptions, MigrationState, ResumeCursor,
};
use cidmend::storage::{
    record_now, FileRecordStore, RecordFilter, RecordStore, RecordUpdate, StorageError,
    StorageResult, StoredRecord,
};
use serde_json::json;
use tempfile::TempDir;

// =============================================================================
// Test Utilities
// =============================================================================

fn corrupted_body(seed: u8) -> String {
    let cid = ContentIdentifier::from_digest([seed; 32]);
    json!({
        "text": format!("post {}", seed),
        "embed": {"images": [
            {"image": {"ref": cid.to_bytes().to_vec()}},
            {"image": {"ref": cid.to_bytes().to_vec()}}
        ]}
    })
    .to_string()
}

/// 23 corrupted records, 7 clean ones and 2 with unparseable bodies.
fn seed(dir: &TempDir) {
    let mut store = FileRecordStore::open(dir.path()).unwrap();
    let mut records: Vec<StoredRecord> = (0..23u8)
        .map(|i| record_now(format!("at://did:plc:a/app.bsky.feed.post/c{:02}", i), corrupted_body(i)))
        .collect();
    for i in 0..7 {
        records.push(record_now(
            format!("at://did:plc:a/app.bsky.feed.post/k{:02}", i),
            r#"{"text":"clean"}"#,
        ));
    }
    for i in 0..2 {
        records.push(record_now(
            format!("at://did:plc:a/app.bsky.feed.post/x{:02}", i),
            r#"{"ref":[1,2,"#,
        ));
    }
    store.insert_records(&records).unwrap();
}

fn live_options(dir: &TempDir, batch_size: usize) -> MigrationOptions {
    let mut options = MigrationOptions::new(MigrationMode::Live);
    options.batch_size = batch_size;
    options.cursor_dir = Some(dir.path().to_path_buf());
    options
}

fn bodies(dir: &TempDir) -> Vec<String> {
    let store = FileRecordStore::open(dir.path()).unwrap();
    store
        .list_records_after(None, usize::MAX, RecordFilter::All)
        .unwrap()
        .into_iter()
        .map(|r| r.body)
        .collect()
}

/// Delegates to a file store but fails every commit after the first `allowed`.
struct FlakyStore {
    inner: FileRecordStore,
    allowed: usize,
}

impl RecordStore for FlakyStore {
    fn list_records_after(
        &self,
        after: Option<&str>,
        limit: usize,
        filter: RecordFilter,
    ) -> StorageResult<Vec<StoredRecord>> {
        self.inner.list_records_after(after, limit, filter)
    }

    fn commit_batch(&mut self, updates: &[RecordUpdate]) -> StorageResult<()> {
        if self.allowed == 0 {
            return Err(StorageError::persistence_failed(
                "injected commit failure",
                io::Error::new(io::ErrorKind::Other, "disk full"),
            ));
        }
        self.allowed -= 1;
        self.inner.commit_batch(updates)
    }

    fn count_records(&self, filter: RecordFilter) -> StorageResult<u64> {
        self.inner.count_records(filter)
    }

    fn query_records_by_origin(&self, identity: &str) -> StorageResult<Vec<StoredRecord>> {
        self.inner.query_records_by_origin(identity)
    }

    fn get_record(&self, uri: &str) -> StorageResult<Option<StoredRecord>> {
        self.inner.get_record(uri)
    }
}

// =============================================================================
// Resume equivalence
// =============================================================================

#[test]
fn test_interrupted_run_matches_uninterrupted_run() {
    let straight = TempDir::new().unwrap();
    seed(&straight);
    let expected = {
        let mut store = FileRecordStore::open(straight.path()).unwrap();
        MigrationDriver::new(&mut store, live_options(&straight, 4))
            .run()
            .unwrap()
    };
    assert_eq!(expected.totals.records_processed, 25);
    assert_eq!(expected.totals.records_fixed, 23);
    assert_eq!(expected.totals.identifiers_fixed, 46);
    assert_eq!(expected.totals.records_skipped, 2);

    for interrupt_after in 1..=6 {
        let dir = TempDir::new().unwrap();
        seed(&dir);

        {
            let mut store = FileRecordStore::open(dir.path()).unwrap();
            let mut driver = MigrationDriver::new(&mut store, live_options(&dir, 4));
            for _ in 0..interrupt_after {
                if driver.step().unwrap() == MigrationState::Done {
                    break;
                }
            }
        }

        let cursor = ResumeCursor::load(dir.path()).unwrap().unwrap();
        let resumed = {
            let mut store = FileRecordStore::open(dir.path()).unwrap();
            MigrationDriver::resume(&mut store, live_options(&dir, 4), cursor)
                .run()
                .unwrap()
        };

        assert_eq!(resumed.totals, expected.totals, "interrupted after {}", interrupt_after);
        assert_eq!(bodies(&dir), bodies(&straight));
    }
}

#[test]
fn test_stop_flag_then_resume() {
    let dir = TempDir::new().unwrap();
    seed(&dir);
    let stop = Arc::new(AtomicBool::new(true));

    let stopped = {
        let mut store = FileRecordStore::open(dir.path()).unwrap();
        MigrationDriver::new(&mut store, live_options(&dir, 5))
            .with_stop_flag(stop)
            .run()
            .unwrap()
    };
    assert!(stopped.stopped);
    assert_eq!(stopped.totals.records_processed, 0);

    // Nothing was committed, so there is no cursor and a fresh run does it all
    assert!(ResumeCursor::load(dir.path()).unwrap().is_none());
    let mut store = FileRecordStore::open(dir.path()).unwrap();
    let summary = MigrationDriver::new(&mut store, live_options(&dir, 5)).run().unwrap();
    assert_eq!(summary.totals.records_fixed, 23);
    assert_eq!(store.count_records(RecordFilter::ContainsRawReference).unwrap(), 2);
}

// =============================================================================
// Commit failures
// =============================================================================

#[test]
fn test_failed_commit_does_not_advance_cursor() {
    let dir = TempDir::new().unwrap();
    seed(&dir);

    let mut store = FlakyStore {
        inner: FileRecordStore::open(dir.path()).unwrap(),
        allowed: 2,
    };
    let err = MigrationDriver::new(&mut store, live_options(&dir, 4))
        .run()
        .unwrap_err();
    assert_eq!(err.code(), "MEND_STORAGE_PERSISTENCE_FAILED");

    let cursor = ResumeCursor::load(dir.path()).unwrap().unwrap();
    assert_eq!(cursor.totals.batches_committed, 2);
    assert_eq!(cursor.totals.records_fixed, 8);
    assert_eq!(cursor.last_key.as_deref(), Some("at://did:plc:a/app.bsky.feed.post/c07"));

    // The rest of the work is still there for the resumed run
    drop(store);
    let mut store = FileRecordStore::open(dir.path()).unwrap();
    let summary = MigrationDriver::resume(&mut store, live_options(&dir, 4), cursor)
        .run()
        .unwrap();
    assert_eq!(summary.totals.records_fixed, 23);
    assert_eq!(store.count_records(RecordFilter::ContainsRawReference).unwrap(), 2);
}
