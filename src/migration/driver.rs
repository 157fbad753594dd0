//! Batch migration driver
//!
//! ```text
//! Idle -> Counting (optional) -> Fetching -> Fixing -> Committing
//!                                   ^                      |
//!                                   +----------------------+
//!                                   |
//!                                   v
//!                                  Done
//! ```
//!
//! Records are visited in ascending URI order, strictly after `last_key`.
//! `last_key` moves only after a batch has been committed (live) or fully
//! processed (dry-run), and in live mode it is persisted right after the
//! commit. A restart from the persisted key neither repeats committed work
//! nor skips anything. Should a crash land between commit and cursor
//! write, the redone batch finds nothing left to fix.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use uuid::Uuid;

use super::cursor::ResumeCursor;
use super::errors::{MigrationError, MigrationResult};
use super::stats::{MigrationMode, MigrationTotals};
use crate::observability::{log_event_with_fields, Event, Logger, ObservationScope};
use crate::repair::{repair_json, RepairOutcome};
use crate::storage::{RecordFilter, RecordStore, RecordUpdate};

/// Default number of records per batch
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Driver state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationState {
    Idle,
    Counting,
    Fetching,
    Fixing,
    Committing,
    Done,
}

/// Run parameters
#[derive(Debug, Clone)]
pub struct MigrationOptions {
    pub mode: MigrationMode,
    pub batch_size: usize,
    /// Maximum records to process in this run
    pub limit: Option<u64>,
    /// Skip the informational candidate count
    pub skip_count: bool,
    /// Where the resume cursor lives; no cursor is written when `None`
    pub cursor_dir: Option<PathBuf>,
}

impl MigrationOptions {
    pub fn new(mode: MigrationMode) -> Self {
        Self {
            mode,
            batch_size: DEFAULT_BATCH_SIZE,
            limit: None,
            skip_count: false,
            cursor_dir: None,
        }
    }
}

/// Result of a finished run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationSummary {
    pub run_id: Uuid,
    pub mode: MigrationMode,
    pub totals: MigrationTotals,
    /// Candidate count taken at start, unless skipped
    pub candidates: Option<u64>,
    pub last_key: Option<String>,
    /// Ended by the stop flag rather than by running out of records
    pub stopped: bool,
}

/// Result of a single-record repair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordFix {
    pub uri: String,
    pub outcome: RepairOutcome,
    /// Repaired body was written
    pub persisted: bool,
    /// Repaired body text, when anything changed
    pub repaired_body: Option<String>,
}

/// Resumable batch repair over a record store
pub struct MigrationDriver<'a, S: RecordStore + ?Sized> {
    store: &'a mut S,
    options: MigrationOptions,
    state: MigrationState,
    run_id: Uuid,
    last_key: Option<String>,
    totals: MigrationTotals,
    processed_this_run: u64,
    candidates: Option<u64>,
    stop: Option<Arc<AtomicBool>>,
    stopped: bool,
}

impl<'a, S: RecordStore + ?Sized> MigrationDriver<'a, S> {
    /// Fresh run starting at the first record.
    pub fn new(store: &'a mut S, options: MigrationOptions) -> Self {
        Self {
            store,
            options,
            state: MigrationState::Idle,
            run_id: Uuid::new_v4(),
            last_key: None,
            totals: MigrationTotals::default(),
            processed_this_run: 0,
            candidates: None,
            stop: None,
            stopped: false,
        }
    }

    /// Continues a previous run from its cursor, keeping its id and totals.
    pub fn resume(store: &'a mut S, options: MigrationOptions, cursor: ResumeCursor) -> Self {
        let mut driver = Self::new(store, options);
        driver.run_id = cursor.run_id;
        driver.last_key = cursor.last_key;
        driver.totals = cursor.totals;
        driver
    }

    /// Checked between batches; setting it ends the run after the current one.
    pub fn with_stop_flag(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = Some(stop);
        self
    }

    pub fn state(&self) -> MigrationState {
        self.state
    }

    pub fn totals(&self) -> &MigrationTotals {
        &self.totals
    }

    pub fn last_key(&self) -> Option<&str> {
        self.last_key.as_deref()
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn candidates(&self) -> Option<u64> {
        self.candidates
    }

    /// Performs one fetch/fix/commit cycle and returns the new state.
    ///
    /// On a storage error the batch is abandoned, `last_key` stays where it
    /// was and the driver stays in its current state, so the step can be
    /// retried.
    pub fn step(&mut self) -> MigrationResult<MigrationState> {
        if self.state == MigrationState::Done {
            return Ok(MigrationState::Done);
        }

        if self.state == MigrationState::Idle {
            if !self.options.skip_count {
                self.state = MigrationState::Counting;
                let count = self.store.count_records(RecordFilter::ContainsRawReference)?;
                self.candidates = Some(count);
                log_event_with_fields(Event::MigrationCounted, &[("candidates", &count.to_string())]);
            }
            self.state = MigrationState::Fetching;
        }

        if self.stop.as_ref().is_some_and(|flag| flag.load(Ordering::SeqCst)) {
            self.stopped = true;
            log_event_with_fields(
                Event::MigrationStopped,
                &[("last_key", self.last_key.as_deref().unwrap_or(""))],
            );
            return Ok(self.finish());
        }

        let requested = match self.options.limit {
            Some(limit) => {
                let remaining = limit.saturating_sub(self.processed_this_run);
                if remaining == 0 {
                    log_event_with_fields(
                        Event::MigrationLimitReached,
                        &[("limit", &limit.to_string())],
                    );
                    return Ok(self.finish());
                }
                (self.options.batch_size as u64).min(remaining) as usize
            }
            None => self.options.batch_size,
        };

        self.state = MigrationState::Fetching;
        let page = self.store.list_records_after(
            self.last_key.as_deref(),
            requested,
            RecordFilter::ContainsRawReference,
        )?;
        log_event_with_fields(
            Event::MigrationBatchFetched,
            &[
                ("records", &page.len().to_string()),
                ("after", self.last_key.as_deref().unwrap_or("")),
            ],
        );

        let Some(page_last) = page.last().map(|record| record.uri.clone()) else {
            return Ok(self.finish());
        };

        self.state = MigrationState::Fixing;
        let mut batch = MigrationTotals::default();
        let mut updates = Vec::new();

        for record in &page {
            batch.records_processed += 1;
            match repair_json(&record.body) {
                Ok(repaired) => {
                    batch.references_skipped += repaired.outcome.skipped.len() as u64;
                    if repaired.outcome.changed() {
                        batch.records_fixed += 1;
                        batch.identifiers_fixed += repaired.outcome.fixes as u64;
                        Logger::trace(
                            Event::MigrationRecordFixed.as_str(),
                            &[
                                ("uri", &record.uri),
                                ("fixes", &repaired.outcome.fixes.to_string()),
                            ],
                        );
                        updates.push(RecordUpdate::new(record.uri.clone(), repaired.text));
                    }
                }
                Err(e) => {
                    batch.records_skipped += 1;
                    log_event_with_fields(
                        Event::MigrationRecordSkipped,
                        &[("uri", &record.uri), ("reason", &e.to_string())],
                    );
                }
            }
        }

        self.state = MigrationState::Committing;
        if self.options.mode.is_live() && !updates.is_empty() {
            if let Err(e) = self.store.commit_batch(&updates) {
                self.state = MigrationState::Fetching;
                return Err(e.into());
            }
        }

        batch.batches_committed = 1;
        self.accumulate(&batch);
        self.processed_this_run += batch.records_processed;
        self.last_key = Some(page_last);

        let mut fields: Vec<(&str, String)> = batch.fields().into();
        fields.push(("mode", self.options.mode.to_string()));
        fields.push(("last_key", self.last_key.clone().unwrap_or_default()));
        let fields: Vec<(&str, &str)> = fields.iter().map(|(k, v)| (*k, v.as_str())).collect();
        log_event_with_fields(Event::MigrationBatchCommitted, &fields);

        if self.options.mode.is_live() {
            self.save_cursor()?;
        }

        if page.len() < requested {
            return Ok(self.finish());
        }
        self.state = MigrationState::Fetching;
        Ok(self.state)
    }

    /// Steps until done.
    pub fn run(&mut self) -> MigrationResult<MigrationSummary> {
        self.run_with_progress(|_| {})
    }

    /// Steps until done, calling `on_batch` with the running totals after
    /// every completed batch.
    pub fn run_with_progress(
        &mut self,
        mut on_batch: impl FnMut(&MigrationTotals),
    ) -> MigrationResult<MigrationSummary> {
        let run_id = self.run_id.to_string();
        let mode = self.options.mode.as_str();
        let scope = ObservationScope::with_fields("MIGRATION", &[("run_id", &run_id), ("mode", mode)]);

        loop {
            match self.step() {
                Ok(MigrationState::Done) => break,
                Ok(_) => on_batch(&self.totals),
                Err(e) => {
                    scope.fail(&e.to_string());
                    return Err(e);
                }
            }
        }

        let fields = self.totals.fields();
        let fields: Vec<(&str, &str)> = fields.iter().map(|(k, v)| (*k, v.as_str())).collect();
        scope.complete_with_fields(&fields);
        Ok(self.summary())
    }

    /// Snapshot of the run so far.
    pub fn summary(&self) -> MigrationSummary {
        MigrationSummary {
            run_id: self.run_id,
            mode: self.options.mode,
            totals: self.totals,
            candidates: self.candidates,
            last_key: self.last_key.clone(),
            stopped: self.stopped,
        }
    }

    /// Repairs one record by URI, outside of batch paging.
    ///
    /// Persists in live mode only. Leaves the run's cursor and totals alone.
    pub fn fix_record(&mut self, uri: &str) -> MigrationResult<RecordFix> {
        let record = self
            .store
            .get_record(uri)?
            .ok_or_else(|| MigrationError::NotFound(uri.to_string()))?;

        let repaired = repair_json(&record.body).map_err(|source| MigrationError::Serialization {
            uri: uri.to_string(),
            source,
        })?;

        let changed = repaired.outcome.changed();
        let persisted = changed && self.options.mode.is_live();
        if persisted {
            self.store.update_record_body(uri, &repaired.text)?;
        }

        Ok(RecordFix {
            uri: uri.to_string(),
            outcome: repaired.outcome,
            persisted,
            repaired_body: changed.then_some(repaired.text),
        })
    }

    fn accumulate(&mut self, batch: &MigrationTotals) {
        let t = &mut self.totals;
        t.records_processed += batch.records_processed;
        t.records_fixed += batch.records_fixed;
        t.identifiers_fixed += batch.identifiers_fixed;
        t.records_skipped += batch.records_skipped;
        t.references_skipped += batch.references_skipped;
        t.batches_committed += batch.batches_committed;
    }

    fn save_cursor(&self) -> MigrationResult<()> {
        let Some(dir) = &self.options.cursor_dir else {
            return Ok(());
        };

        let mut cursor = ResumeCursor::new(self.run_id, self.options.mode);
        cursor.last_key = self.last_key.clone();
        cursor.totals = self.totals;
        cursor.save(dir)?;

        log_event_with_fields(
            Event::MigrationCursorSaved,
            &[("last_key", self.last_key.as_deref().unwrap_or(""))],
        );
        Ok(())
    }

    fn finish(&mut self) -> MigrationState {
        self.state = MigrationState::Done;
        self.state
    }
}
