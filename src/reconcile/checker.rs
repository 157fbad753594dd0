//! Reconciliation checker
//!
//! Diffs the authoritative source's view of one identity against the record
//! store, then looks for the missing records in the delivery log.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};

use super::errors::ReconcileResult;
use super::report::{CollectionCounts, ReconciliationReport, UnconfirmedRecord};
use super::scan::{scan_streams, ScanBudget, SearchSet};
use super::window::TimeWindow;
use crate::delivery::DeliveryLog;
use crate::observability::{log_event_with_fields, Event, ObservationScope};
use crate::source::{AuthoritativeSource, RetryPolicy, SourceError};
use crate::storage::{RecordStore, RecordUri};

/// Default tracked collections
pub const DEFAULT_COLLECTIONS: [&str; 6] = [
    "app.bsky.feed.post",
    "app.bsky.feed.like",
    "app.bsky.feed.repost",
    "app.bsky.graph.follow",
    "app.bsky.graph.block",
    "app.bsky.actor.profile",
];

/// Default delivery streams
pub const DEFAULT_STREAMS: [&str; 2] = ["firehose_live", "firehose_backfill"];

/// Parameters of one check
#[derive(Debug, Clone)]
pub struct CheckOptions {
    pub identity: String,
    pub collections: Vec<String>,
    pub streams: Vec<String>,
    /// Source listing page size
    pub page_size: usize,
    pub window: Option<TimeWindow>,
    pub budget: ScanBudget,
    pub retry: RetryPolicy,
}

impl CheckOptions {
    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            collections: DEFAULT_COLLECTIONS.iter().map(|c| c.to_string()).collect(),
            streams: DEFAULT_STREAMS.iter().map(|s| s.to_string()).collect(),
            page_size: 100,
            window: None,
            budget: ScanBudget::default(),
            retry: RetryPolicy::default(),
        }
    }
}

/// Record key to creation time, per collection
type AuthoritativeSet = BTreeMap<String, Option<DateTime<Utc>>>;

pub struct ReconciliationChecker<'a, A: ?Sized, S: ?Sized, L: ?Sized> {
    source: &'a A,
    store: &'a S,
    log: &'a L,
}

impl<'a, A, S, L> ReconciliationChecker<'a, A, S, L>
where
    A: AuthoritativeSource + ?Sized,
    S: RecordStore + ?Sized,
    L: DeliveryLog + ?Sized,
{
    pub fn new(source: &'a A, store: &'a S, log: &'a L) -> Self {
        Self { source, store, log }
    }

    /// Runs fetch, diff and verify for one identity.
    ///
    /// Listing and stream failures end up in the report. Only a store
    /// failure or a bad window is an error.
    pub fn check(&self, options: &CheckOptions) -> ReconcileResult<ReconciliationReport> {
        let scope = ObservationScope::with_fields("RECONCILE", &[("identity", &options.identity)]);

        let mut fetch_errors = BTreeMap::new();
        let mut authoritative: BTreeMap<String, AuthoritativeSet> = BTreeMap::new();
        for collection in &options.collections {
            let (records, error) = self.fetch_collection(options, collection);
            if let Some(error) = error {
                fetch_errors.insert(collection.clone(), error);
            }
            authoritative.insert(collection.clone(), records);
        }

        let indexed = match self.fetch_indexed(&options.identity) {
            Ok(indexed) => indexed,
            Err(e) => {
                scope.fail(&e.to_string());
                return Err(e);
            }
        };

        let mut collections = BTreeMap::new();
        let mut missing: Vec<(String, String, Option<DateTime<Utc>>)> = Vec::new();
        let mut total_authoritative = 0u64;
        // Every indexed record of the identity, tracked collection or not
        let total_indexed: u64 = indexed.values().map(|keys| keys.len() as u64).sum();

        for (collection, records) in &authoritative {
            let indexed_keys = indexed.get(collection);
            let mut counts = CollectionCounts {
                indexed: indexed_keys.map_or(0, |keys| keys.len() as u64),
                ..CollectionCounts::default()
            };

            for (rkey, created_at) in records {
                if let Some(window) = &options.window {
                    match created_at {
                        Some(at) if window.contains(*at) => {}
                        _ => continue,
                    }
                }
                counts.authoritative += 1;
                if !indexed_keys.is_some_and(|keys| keys.contains(rkey)) {
                    counts.missing += 1;
                    missing.push((collection.clone(), rkey.clone(), *created_at));
                }
            }

            total_authoritative += counts.authoritative;
            collections.insert(collection.clone(), counts);
        }

        let mut search = SearchSet::default();
        for (collection, rkey, _) in &missing {
            search.insert(rkey.clone(), collection.clone());
        }

        let scan = if search.is_empty() {
            Default::default()
        } else {
            scan_streams(
                self.log,
                &options.identity,
                &options.streams,
                options.budget,
                &mut search,
            )
        };

        let still_missing: BTreeSet<(&str, &str)> = search.iter().collect();
        let unconfirmed: Vec<UnconfirmedRecord> = missing
            .iter()
            .filter(|(collection, rkey, _)| still_missing.contains(&(rkey.as_str(), collection.as_str())))
            .map(|(collection, rkey, created_at)| UnconfirmedRecord {
                collection: collection.clone(),
                rkey: rkey.clone(),
                created_at: *created_at,
            })
            .collect();

        for record in &unconfirmed {
            let created_at = record.created_at.map(|t| t.to_rfc3339()).unwrap_or_default();
            log_event_with_fields(
                Event::ReconcileRecordUnconfirmed,
                &[
                    ("collection", &record.collection),
                    ("rkey", &record.rkey),
                    ("created_at", &created_at),
                ],
            );
        }

        let report = ReconciliationReport {
            identity: options.identity.clone(),
            window: options.window,
            total_authoritative,
            total_indexed,
            collections,
            confirmed: scan.confirmed,
            unconfirmed,
            streams: scan.streams,
            fetch_errors,
            generated_at: Utc::now(),
        };

        scope.complete_with_fields(&[
            ("authoritative", &report.total_authoritative.to_string()),
            ("indexed", &report.total_indexed.to_string()),
            ("missing", &report.total_missing().to_string()),
            ("confirmed", &report.confirmed.len().to_string()),
            ("unconfirmed", &report.unconfirmed.len().to_string()),
        ]);

        Ok(report)
    }

    /// Pages one collection to the end. Returns what was fetched before any
    /// error, plus the error text.
    fn fetch_collection(
        &self,
        options: &CheckOptions,
        collection: &str,
    ) -> (AuthoritativeSet, Option<String>) {
        let mut records = AuthoritativeSet::new();
        let mut cursor: Option<String> = None;

        loop {
            let page = options.retry.run(
                || {
                    self.source.list_collection(
                        &options.identity,
                        collection,
                        cursor.as_deref(),
                        options.page_size,
                    )
                },
                |attempt, e: &SourceError| {
                    log_event_with_fields(
                        Event::ReconcileRetry,
                        &[
                            ("collection", collection),
                            ("attempt", &attempt.to_string()),
                            ("code", e.code()),
                        ],
                    );
                },
            );

            let page = match page {
                Ok(page) => page,
                Err(e) => {
                    log_event_with_fields(
                        Event::ReconcileCollectionFailed,
                        &[
                            ("collection", collection),
                            ("code", e.code()),
                            ("reason", &e.to_string()),
                            ("fetched", &records.len().to_string()),
                        ],
                    );
                    return (records, Some(e.to_string()));
                }
            };

            if page.records.is_empty() {
                break;
            }
            for record in &page.records {
                records.insert(record.rkey().to_string(), record.created_at());
            }

            match page.cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        log_event_with_fields(
            Event::ReconcileCollectionFetched,
            &[("collection", collection), ("records", &records.len().to_string())],
        );
        (records, None)
    }

    /// Indexed record keys per collection.
    fn fetch_indexed(&self, identity: &str) -> ReconcileResult<BTreeMap<String, BTreeSet<String>>> {
        let mut indexed: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        let records = self.store.query_records_by_origin(identity)?;
        let total = records.len();

        for record in records {
            let uri = RecordUri::parse(&record.uri)?;
            indexed
                .entry(uri.collection().to_string())
                .or_default()
                .insert(uri.rkey().to_string());
        }

        log_event_with_fields(
            Event::ReconcileIndexLoaded,
            &[("identity", identity), ("records", &total.to_string())],
        );
        Ok(indexed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::MemoryDeliveryLog;
    use crate::source::{MemorySource, SourceRecord};
    use crate::storage::{record_now, FileRecordStore};
    use serde_json::json;
    use std::time::Duration;
    use tempfile::TempDir;

    const DID: &str = "did:plc:a";

    fn post(rkey: &str, created_at: &str) -> SourceRecord {
        SourceRecord::new(
            format!("at://{}/app.bsky.feed.post/{}", DID, rkey),
            json!({"text": rkey, "createdAt": created_at}),
        )
    }

    fn options() -> CheckOptions {
        let mut options = CheckOptions::new(DID);
        options.collections = vec!["app.bsky.feed.post".to_string()];
        options.retry = RetryPolicy::none();
        options
    }

    fn store_with(dir: &TempDir, rkeys: &[&str]) -> FileRecordStore {
        let mut store = FileRecordStore::open(dir.path()).unwrap();
        let records: Vec<_> = rkeys
            .iter()
            .map(|k| record_now(format!("at://{}/app.bsky.feed.post/{}", DID, k), "{}"))
            .collect();
        if !records.is_empty() {
            store.insert_records(&records).unwrap();
        }
        store
    }

    #[test]
    fn test_missing_records_are_confirmed_or_unconfirmed() {
        let dir = TempDir::new().unwrap();
        let store = store_with(&dir, &["a"]);

        let mut source = MemorySource::new();
        for k in ["a", "b", "c"] {
            source.insert(post(k, "2025-10-14T12:00:00Z")).unwrap();
        }

        let mut log = MemoryDeliveryLog::new();
        log.append("firehose_backfill", DID, "/app.bsky.feed.post/b", b"");

        let report = ReconciliationChecker::new(&source, &store, &log)
            .check(&options())
            .unwrap();

        assert_eq!(report.total_authoritative, 3);
        assert_eq!(report.total_indexed, 1);
        assert_eq!(report.total_missing(), 2);
        assert_eq!(report.confirmed.len(), 1);
        assert_eq!(report.confirmed[0].rkey, "b");
        assert_eq!(report.confirmed[0].stream, "firehose_backfill");
        assert_eq!(report.unconfirmed.len(), 1);
        assert_eq!(report.unconfirmed[0].rkey, "c");
    }

    #[test]
    fn test_indexed_totals_count_the_whole_index() {
        let dir = TempDir::new().unwrap();
        let mut store = store_with(&dir, &["a", "z"]);
        store
            .insert_records(&[record_now(format!("at://{}/app.bsky.feed.like/l", DID), "{}")])
            .unwrap();

        let mut source = MemorySource::new();
        for k in ["a", "b"] {
            source.insert(post(k, "2025-10-14T12:00:00Z")).unwrap();
        }

        let log = MemoryDeliveryLog::new();
        let report = ReconciliationChecker::new(&source, &store, &log)
            .check(&options())
            .unwrap();

        assert_eq!(report.total_authoritative, 2);
        assert_eq!(report.total_indexed, 3);
        let posts = report.collections["app.bsky.feed.post"];
        assert_eq!((posts.authoritative, posts.indexed, posts.missing), (2, 2, 1));
        assert!(!report.collections.contains_key("app.bsky.feed.like"));
        assert_eq!(report.unconfirmed[0].rkey, "b");
    }

    #[test]
    fn test_window_narrows_the_diff() {
        let dir = TempDir::new().unwrap();
        let store = store_with(&dir, &[]);

        let mut source = MemorySource::new();
        source.insert(post("early", "2025-09-30T23:59:59Z")).unwrap();
        source.insert(post("inside", "2025-10-14T08:00:00Z")).unwrap();
        source
            .insert(SourceRecord::new(
                format!("at://{}/app.bsky.feed.post/undated", DID),
                json!({"text": "no timestamp"}),
            ))
            .unwrap();

        let mut options = options();
        options.window = TimeWindow::from_bounds(Some("2025-10-01"), Some("2025-10-31")).unwrap();

        let log = MemoryDeliveryLog::new();
        let report = ReconciliationChecker::new(&source, &store, &log)
            .check(&options)
            .unwrap();

        assert_eq!(report.total_authoritative, 1);
        assert_eq!(report.unconfirmed.len(), 1);
        assert_eq!(report.unconfirmed[0].rkey, "inside");
    }

    #[test]
    fn test_paging_and_transient_retry() {
        let dir = TempDir::new().unwrap();
        let store = store_with(&dir, &[]);

        let mut source = MemorySource::new();
        for i in 0..7 {
            source.insert(post(&format!("k{}", i), "2025-10-14T12:00:00Z")).unwrap();
        }
        source.fail_next("app.bsky.feed.post", SourceError::RateLimited { retry_after: None });

        let mut options = options();
        options.page_size = 3;
        options.retry = RetryPolicy::new(2, Duration::ZERO);

        let log = MemoryDeliveryLog::new();
        let report = ReconciliationChecker::new(&source, &store, &log)
            .check(&options)
            .unwrap();

        assert_eq!(report.total_authoritative, 7);
        assert!(report.fetch_errors.is_empty());
    }

    #[test]
    fn test_fetch_error_is_scoped_to_collection() {
        let dir = TempDir::new().unwrap();
        let store = store_with(&dir, &[]);

        let mut source = MemorySource::new();
        source.insert(post("a", "2025-10-14T12:00:00Z")).unwrap();
        source
            .insert(SourceRecord::new(
                format!("at://{}/app.bsky.feed.like/l1", DID),
                json!({"createdAt": "2025-10-14T12:00:00Z"}),
            ))
            .unwrap();
        source.fail_next("app.bsky.feed.like", SourceError::Unavailable("502".to_string()));

        let mut options = options();
        options.collections.push("app.bsky.feed.like".to_string());

        let log = MemoryDeliveryLog::new();
        let report = ReconciliationChecker::new(&source, &store, &log)
            .check(&options)
            .unwrap();

        assert_eq!(report.collections["app.bsky.feed.post"].authoritative, 1);
        assert_eq!(report.collections["app.bsky.feed.like"].authoritative, 0);
        assert!(report.fetch_errors.contains_key("app.bsky.feed.like"));
        assert!(!report.is_clean());
    }
}
