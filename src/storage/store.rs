//! File-backed record store
//!
//! `records.dat` is append-only. A write is a batch of put entries closed by
//! one commit marker, followed by a single fsync. On open the file is
//! replayed: puts are applied to the index only when their commit marker is
//! read, and any trailing puts without a marker are truncated away. A batch
//! is therefore either fully visible or not visible at all.
//!
//! The index maps URI to the offset of the latest committed put, ordered by
//! URI so pages and origin queries are range scans.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::ops::Bound;
use std::path::{Path, PathBuf};

use chrono::Utc;

use super::errors::{StorageError, StorageResult};
use super::reader::RecordReader;
use super::record::{RecordEntry, StoredRecord};
use super::uri::RecordUri;
use crate::observability::{log_event_with_fields, Event};
use crate::repair::RAW_REFERENCE_MARKER;

/// Which records a listing or count includes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordFilter {
    All,
    /// Body text contains `"ref":[`
    ContainsRawReference,
}

impl RecordFilter {
    /// Whether a body passes this filter.
    pub fn matches(&self, body: &str) -> bool {
        match self {
            RecordFilter::All => true,
            RecordFilter::ContainsRawReference => body.contains(RAW_REFERENCE_MARKER),
        }
    }
}

/// New body for an existing record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordUpdate {
    pub uri: String,
    pub body: String,
}

impl RecordUpdate {
    pub fn new(uri: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            body: body.into(),
        }
    }
}

/// Record store contract used by migration and reconciliation
pub trait RecordStore {
    /// Records with URI strictly greater than `after`, ascending, at most
    /// `limit` of them, restricted to `filter`.
    fn list_records_after(
        &self,
        after: Option<&str>,
        limit: usize,
        filter: RecordFilter,
    ) -> StorageResult<Vec<StoredRecord>>;

    /// Replaces the bodies of existing records as one atomic batch.
    ///
    /// Fails with NotFound before writing anything if a URI is unknown.
    fn commit_batch(&mut self, updates: &[RecordUpdate]) -> StorageResult<()>;

    /// Single-record batch.
    fn update_record_body(&mut self, uri: &str, body: &str) -> StorageResult<()> {
        self.commit_batch(&[RecordUpdate::new(uri, body)])
    }

    fn count_records(&self, filter: RecordFilter) -> StorageResult<u64>;

    /// Every record whose URI belongs to `identity`.
    fn query_records_by_origin(&self, identity: &str) -> StorageResult<Vec<StoredRecord>>;

    fn get_record(&self, uri: &str) -> StorageResult<Option<StoredRecord>>;
}

#[derive(Debug, Clone, Copy)]
struct RecordSlot {
    offset: u64,
    raw_reference: bool,
}

/// Append-only record store rooted at `<data_dir>/records/records.dat`
pub struct FileRecordStore {
    path: PathBuf,
    file: File,
    current_offset: u64,
    next_batch_id: u64,
    index: BTreeMap<String, RecordSlot>,
}

struct Replay {
    index: BTreeMap<String, RecordSlot>,
    committed_len: u64,
    next_batch_id: u64,
    discarded_entries: usize,
}

impl FileRecordStore {
    /// Opens or creates the store under `data_dir`.
    ///
    /// Truncates an uncommitted or torn tail left by an interrupted batch.
    pub fn open(data_dir: &Path) -> StorageResult<Self> {
        let records_dir = data_dir.join("records");
        let path = records_dir.join("records.dat");

        if !records_dir.exists() {
            fs::create_dir_all(&records_dir).map_err(|e| {
                StorageError::io_error(
                    format!("Failed to create records directory: {}", records_dir.display()),
                    e,
                )
            })?;
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)
            .map_err(|e| {
                StorageError::io_error(
                    format!("Failed to open record file: {}", path.display()),
                    e,
                )
            })?;

        let file_len = file
            .metadata()
            .map_err(|e| StorageError::io_error("Failed to read file metadata", e))?
            .len();

        let replay = Self::replay(&path)?;

        if replay.committed_len < file_len {
            file.set_len(replay.committed_len).map_err(|e| {
                StorageError::io_error("Failed to truncate uncommitted tail", e)
            })?;
            file.sync_all()
                .map_err(|e| StorageError::io_error("fsync failed after truncation", e))?;

            let discarded_bytes = (file_len - replay.committed_len).to_string();
            let discarded_entries = replay.discarded_entries.to_string();
            log_event_with_fields(
                Event::StoreTailDiscarded,
                &[
                    ("bytes", &discarded_bytes),
                    ("entries", &discarded_entries),
                ],
            );
        }

        let records = replay.index.len().to_string();
        log_event_with_fields(
            Event::StoreOpened,
            &[("path", &path.display().to_string()), ("records", &records)],
        );

        Ok(Self {
            path,
            file,
            current_offset: replay.committed_len,
            next_batch_id: replay.next_batch_id,
            index: replay.index,
        })
    }

    fn replay(path: &Path) -> StorageResult<Replay> {
        let mut reader = RecordReader::open(path)?;
        let mut index = BTreeMap::new();
        let mut pending: Vec<(String, RecordSlot)> = Vec::new();
        let mut committed_len = 0;
        let mut next_batch_id = 1;

        loop {
            let offset = reader.current_offset();
            match reader.read_next()? {
                Some(RecordEntry::Put(record)) => {
                    let slot = RecordSlot {
                        offset,
                        raw_reference: RecordFilter::ContainsRawReference.matches(&record.body),
                    };
                    pending.push((record.uri, slot));
                }
                Some(RecordEntry::Commit {
                    batch_id,
                    entry_count,
                }) => {
                    if entry_count as usize != pending.len() {
                        return Err(StorageError::corruption_at_offset(
                            offset,
                            format!(
                                "Commit marker for batch {} covers {} entries, found {}",
                                batch_id,
                                entry_count,
                                pending.len()
                            ),
                        ));
                    }
                    index.extend(pending.drain(..));
                    committed_len = reader.current_offset();
                    next_batch_id = batch_id + 1;
                }
                None => break,
            }
        }

        Ok(Replay {
            index,
            committed_len,
            next_batch_id,
            discarded_entries: pending.len() + usize::from(reader.torn_tail().is_some()),
        })
    }

    /// Returns the path to the record file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of committed records.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Inserts or overwrites whole records as one atomic batch.
    pub fn insert_records(&mut self, records: &[StoredRecord]) -> StorageResult<()> {
        for record in records {
            RecordUri::parse(&record.uri)?;
        }
        self.append_batch(records)?;

        let imported = records.len().to_string();
        log_event_with_fields(Event::StoreImported, &[("records", &imported)]);
        Ok(())
    }

    fn append_batch(&mut self, records: &[StoredRecord]) -> StorageResult<()> {
        if records.is_empty() {
            return Ok(());
        }

        self.discard_uncommitted_tail()?;

        let batch_id = self.next_batch_id;
        let start_offset = self.current_offset;

        let mut buffer = Vec::new();
        let mut slots = Vec::with_capacity(records.len());
        for record in records {
            slots.push((
                record.uri.clone(),
                RecordSlot {
                    offset: start_offset + buffer.len() as u64,
                    raw_reference: RecordFilter::ContainsRawReference.matches(&record.body),
                },
            ));
            buffer.extend_from_slice(&RecordEntry::Put(record.clone()).serialize());
        }
        buffer.extend_from_slice(
            &RecordEntry::Commit {
                batch_id,
                entry_count: records.len() as u32,
            }
            .serialize(),
        );

        let written = self
            .file
            .write_all(&buffer)
            .and_then(|()| self.file.sync_all());

        if let Err(e) = written {
            // A failed rollback leaves the tail for the next append to discard
            let message = match self.truncate_to_committed() {
                Ok(()) => format!("Failed to commit batch {}", batch_id),
                Err(rollback) => format!(
                    "Failed to commit batch {}; rollback failed: {}",
                    batch_id, rollback
                ),
            };
            return Err(StorageError::persistence_failed(message, e));
        }

        self.current_offset += buffer.len() as u64;
        self.next_batch_id += 1;
        self.index.extend(slots);

        let entries = records.len().to_string();
        let batch = batch_id.to_string();
        log_event_with_fields(
            Event::StoreBatchCommitted,
            &[("batch_id", &batch), ("entries", &entries)],
        );
        Ok(())
    }

    fn truncate_to_committed(&mut self) -> io::Result<()> {
        self.file.set_len(self.current_offset)?;
        self.file.sync_all()
    }

    /// Appends go to the real end of the file, so bytes past the committed
    /// length would shift every new slot offset. Cut them before writing.
    fn discard_uncommitted_tail(&mut self) -> StorageResult<()> {
        let file_len = self
            .file
            .metadata()
            .map_err(|e| StorageError::io_error("Failed to read file metadata", e))?
            .len();

        if file_len < self.current_offset {
            return Err(StorageError::data_corruption(format!(
                "Record file shrank to {} bytes below committed length {}",
                file_len, self.current_offset
            )));
        }

        if file_len > self.current_offset {
            self.truncate_to_committed().map_err(|e| {
                StorageError::persistence_failed("Failed to discard uncommitted tail", e)
            })?;
            let discarded_bytes = (file_len - self.current_offset).to_string();
            log_event_with_fields(Event::StoreTailDiscarded, &[("bytes", &discarded_bytes)]);
        }
        Ok(())
    }

    fn read_slots<'a>(
        &self,
        slots: impl Iterator<Item = &'a RecordSlot>,
    ) -> StorageResult<Vec<StoredRecord>> {
        let mut reader = RecordReader::open(&self.path)?;
        slots.map(|slot| reader.read_record_at(slot.offset)).collect()
    }
}

impl RecordStore for FileRecordStore {
    fn list_records_after(
        &self,
        after: Option<&str>,
        limit: usize,
        filter: RecordFilter,
    ) -> StorageResult<Vec<StoredRecord>> {
        let lower = match after {
            Some(key) => Bound::Excluded(key),
            None => Bound::Unbounded,
        };

        let slots = self
            .index
            .range::<str, _>((lower, Bound::Unbounded))
            .map(|(_, slot)| slot)
            .filter(|slot| match filter {
                RecordFilter::All => true,
                RecordFilter::ContainsRawReference => slot.raw_reference,
            })
            .take(limit);

        self.read_slots(slots)
    }

    fn commit_batch(&mut self, updates: &[RecordUpdate]) -> StorageResult<()> {
        let mut records = Vec::with_capacity(updates.len());
        {
            let mut reader = RecordReader::open(&self.path)?;
            for update in updates {
                let slot = self
                    .index
                    .get(&update.uri)
                    .ok_or_else(|| StorageError::not_found(&update.uri))?;
                let existing = reader.read_record_at(slot.offset)?;
                records.push(StoredRecord {
                    body: update.body.clone(),
                    ..existing
                });
            }
        }
        self.append_batch(&records)
    }

    fn count_records(&self, filter: RecordFilter) -> StorageResult<u64> {
        let count = match filter {
            RecordFilter::All => self.index.len(),
            RecordFilter::ContainsRawReference => {
                self.index.values().filter(|slot| slot.raw_reference).count()
            }
        };
        Ok(count as u64)
    }

    fn query_records_by_origin(&self, identity: &str) -> StorageResult<Vec<StoredRecord>> {
        let prefix = RecordUri::origin_prefix(identity);
        let slots = self
            .index
            .range::<str, _>((Bound::Included(prefix.as_str()), Bound::Unbounded))
            .take_while(|(uri, _)| uri.starts_with(&prefix))
            .map(|(_, slot)| slot);

        self.read_slots(slots)
    }

    fn get_record(&self, uri: &str) -> StorageResult<Option<StoredRecord>> {
        match self.index.get(uri) {
            Some(slot) => {
                let mut reader = RecordReader::open(&self.path)?;
                reader.read_record_at(slot.offset).map(Some)
            }
            None => Ok(None),
        }
    }
}

/// Builds a record stamped with the current time.
pub fn record_now(uri: impl Into<String>, body: impl Into<String>) -> StoredRecord {
    StoredRecord::new(uri, body, Utc::now())
}
