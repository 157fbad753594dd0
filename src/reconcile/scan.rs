//! Bounded reverse scan of delivery streams
//!
//! Each stream is read newest to oldest in batches of `batch_size`, for at
//! most `max_batches` batches. An entry confirms a missing record when its
//! identity matches and its path's trailing segment is a missing record key.
//! "Unconfirmed" therefore means "not seen within the budget".

use std::collections::{BTreeMap, BTreeSet};

use super::report::{ConfirmedRecord, StreamSummary};
use crate::delivery::{DeliveryEntry, DeliveryLog, MessageId};
use crate::observability::{log_event_with_fields, Event};

/// Per-stream scan limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanBudget {
    pub batch_size: usize,
    pub max_batches: usize,
}

impl ScanBudget {
    pub fn new(batch_size: usize, max_batches: usize) -> Self {
        Self {
            batch_size,
            max_batches,
        }
    }

    /// Most messages one stream scan can read.
    pub fn max_messages(&self) -> u64 {
        self.batch_size as u64 * self.max_batches as u64
    }
}

impl Default for ScanBudget {
    fn default() -> Self {
        Self::new(10_000, 20)
    }
}

/// Record keys still being searched for, with their collections
///
/// Keyed by record key because stream paths are matched on their trailing
/// segment. A key shared by several collections is confirmed once per
/// collection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchSet {
    keys: BTreeMap<String, BTreeSet<String>>,
}

impl SearchSet {
    pub fn insert(&mut self, rkey: impl Into<String>, collection: impl Into<String>) {
        self.keys.entry(rkey.into()).or_default().insert(collection.into());
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn len(&self) -> usize {
        self.keys.values().map(BTreeSet::len).sum()
    }

    /// Removes and returns the collection `entry` confirms, if any.
    ///
    /// Prefers the collection named in the entry's path.
    fn take_match(&mut self, entry: &DeliveryEntry) -> Option<String> {
        let rkey = entry.record_key();
        let collections = self.keys.get_mut(rkey)?;

        let path_collection = entry.path.trim_start_matches('/').split('/').next();
        let collection = match path_collection {
            Some(c) if collections.contains(c) => c.to_string(),
            _ => collections.iter().next()?.clone(),
        };

        collections.remove(&collection);
        if collections.is_empty() {
            self.keys.remove(rkey);
        }
        Some(collection)
    }

    /// Remaining `(rkey, collection)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.keys.iter().flat_map(|(rkey, collections)| {
            collections.iter().map(move |c| (rkey.as_str(), c.as_str()))
        })
    }
}

/// Outcome of scanning all streams
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanOutcome {
    pub confirmed: Vec<ConfirmedRecord>,
    pub streams: Vec<StreamSummary>,
}

/// Searches `streams` for the keys in `search`, removing every one found.
pub fn scan_streams<L: DeliveryLog + ?Sized>(
    log: &L,
    identity: &str,
    streams: &[String],
    budget: ScanBudget,
    search: &mut SearchSet,
) -> ScanOutcome {
    let mut outcome = ScanOutcome::default();

    for stream in streams {
        let mut summary = StreamSummary {
            stream: stream.clone(),
            ..Default::default()
        };

        match log.length(stream) {
            Ok(length) => summary.length = length,
            Err(e) => {
                summary.error = Some(e.to_string());
                log_event_with_fields(
                    Event::ReconcileStreamFailed,
                    &[("stream", stream), ("reason", &e.to_string())],
                );
                outcome.streams.push(summary);
                continue;
            }
        }

        let mut before: Option<MessageId> = None;
        for _ in 0..budget.max_batches {
            if search.is_empty() {
                break;
            }

            let batch = match log.reverse_scan(stream, before, budget.batch_size) {
                Ok(batch) => batch,
                Err(e) => {
                    summary.error = Some(e.to_string());
                    log_event_with_fields(
                        Event::ReconcileStreamFailed,
                        &[("stream", stream), ("reason", &e.to_string())],
                    );
                    break;
                }
            };

            summary.messages_scanned += batch.len() as u64;

            for entry in batch.iter().filter(|e| e.identity == identity) {
                if let Some(collection) = search.take_match(entry) {
                    log_event_with_fields(
                        Event::ReconcileRecordConfirmed,
                        &[
                            ("collection", &collection),
                            ("rkey", entry.record_key()),
                            ("stream", stream),
                            ("message_id", &entry.id.to_string()),
                        ],
                    );
                    summary.confirmed += 1;
                    outcome.confirmed.push(ConfirmedRecord {
                        collection,
                        rkey: entry.record_key().to_string(),
                        stream: stream.clone(),
                        message_id: entry.id,
                    });
                }
            }

            // Reached the oldest entry
            if batch.len() < budget.batch_size {
                break;
            }
            before = batch.last().map(|entry| entry.id);
        }

        log_event_with_fields(
            Event::ReconcileStreamScanned,
            &[
                ("stream", stream),
                ("messages_scanned", &summary.messages_scanned.to_string()),
                ("confirmed", &summary.confirmed.to_string()),
            ],
        );
        outcome.streams.push(summary);
    }

    outcome
}
