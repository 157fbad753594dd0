//! Delivery log readers
//!
//! Each stream is one append-only file `<log_dir>/<stream>.log` holding
//! checksummed entries in strictly increasing id order. A missing stream
//! file is an empty stream.
//!
//! Reverse scans go through a per-stream offset index that is extended
//! incrementally as the file grows.

use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File};
use std::io::{BufReader, ErrorKind, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::errors::{DeliveryError, DeliveryResult};
use super::message::{DeliveryEntry, MessageId, MIN_ENTRY_SIZE};

/// Read side of a durable, ordered delivery log
pub trait DeliveryLog {
    /// Number of entries in `stream`.
    fn length(&self, stream: &str) -> DeliveryResult<u64>;

    /// Up to `count` entries with id strictly less than `before` (or from
    /// the newest when `None`), newest first.
    fn reverse_scan(
        &self,
        stream: &str,
        before: Option<MessageId>,
        count: usize,
    ) -> DeliveryResult<Vec<DeliveryEntry>>;
}

/// Path of a stream file under `log_dir`.
pub fn stream_path(log_dir: &Path, stream: &str) -> PathBuf {
    log_dir.join(format!("{}.log", stream))
}

#[derive(Debug, Default)]
struct StreamIndex {
    entries: Vec<(MessageId, u64)>,
    indexed_len: u64,
}

/// File-backed delivery log
pub struct FileDeliveryLog {
    log_dir: PathBuf,
    indexes: Mutex<HashMap<String, StreamIndex>>,
}

impl FileDeliveryLog {
    pub fn open(log_dir: &Path) -> Self {
        Self {
            log_dir: log_dir.to_path_buf(),
            indexes: Mutex::new(HashMap::new()),
        }
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    /// Runs `f` against the up-to-date index of `stream`.
    fn with_index<T>(
        &self,
        stream: &str,
        f: impl FnOnce(&StreamIndex) -> DeliveryResult<T>,
    ) -> DeliveryResult<T> {
        let mut indexes = self
            .indexes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let index = indexes.entry(stream.to_string()).or_default();
        self.extend_index(stream, index)?;
        f(index)
    }

    fn extend_index(&self, stream: &str, index: &mut StreamIndex) -> DeliveryResult<()> {
        let path = stream_path(&self.log_dir, stream);
        let file_len = match fs::metadata(&path) {
            Ok(m) => m.len(),
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => {
                return Err(DeliveryError::io_error(
                    format!("Failed to read stream metadata: {}", path.display()),
                    e,
                ))
            }
        };

        if file_len <= index.indexed_len {
            return Ok(());
        }

        let file = File::open(&path).map_err(|e| {
            DeliveryError::io_error(format!("Failed to open stream: {}", path.display()), e)
        })?;
        let mut reader = BufReader::new(file);
        reader
            .seek(SeekFrom::Start(index.indexed_len))
            .map_err(|e| DeliveryError::io_error("Failed to seek stream", e))?;

        let mut offset = index.indexed_len;
        while file_len - offset >= MIN_ENTRY_SIZE as u64 {
            let mut len_buf = [0u8; 4];
            reader
                .read_exact(&mut len_buf)
                .map_err(|e| DeliveryError::io_error("Failed to read entry length", e))?;
            let entry_length = u32::from_le_bytes(len_buf) as u64;

            if entry_length < MIN_ENTRY_SIZE as u64 {
                return Err(DeliveryError::corruption(
                    stream,
                    offset,
                    format!("Invalid entry length: {}", entry_length),
                ));
            }

            // Entry still being appended
            if entry_length > file_len - offset {
                break;
            }

            let mut buf = vec![0u8; entry_length as usize];
            buf[..4].copy_from_slice(&len_buf);
            reader
                .read_exact(&mut buf[4..])
                .map_err(|e| DeliveryError::io_error("Failed to read entry", e))?;

            let (entry, consumed) = DeliveryEntry::deserialize(&buf)
                .map_err(|e| DeliveryError::corruption(stream, offset, e.to_string()))?;

            if let Some((last, _)) = index.entries.last() {
                if entry.id <= *last {
                    return Err(DeliveryError::corruption(
                        stream,
                        offset,
                        format!("Message id {} does not follow {}", entry.id, last),
                    ));
                }
            }

            index.entries.push((entry.id, offset));
            offset += consumed as u64;
            index.indexed_len = offset;
        }

        Ok(())
    }

    fn read_at(&self, stream: &str, offsets: &[u64]) -> DeliveryResult<Vec<DeliveryEntry>> {
        if offsets.is_empty() {
            return Ok(Vec::new());
        }

        let path = stream_path(&self.log_dir, stream);
        let file = File::open(&path).map_err(|e| {
            DeliveryError::io_error(format!("Failed to open stream: {}", path.display()), e)
        })?;
        let mut reader = BufReader::new(file);

        let mut entries = Vec::with_capacity(offsets.len());
        for &offset in offsets {
            reader
                .seek(SeekFrom::Start(offset))
                .map_err(|e| DeliveryError::io_error("Failed to seek stream", e))?;
            let mut len_buf = [0u8; 4];
            reader
                .read_exact(&mut len_buf)
                .map_err(|e| DeliveryError::io_error("Failed to read entry length", e))?;
            let mut buf = vec![0u8; u32::from_le_bytes(len_buf) as usize];
            if buf.len() < MIN_ENTRY_SIZE {
                return Err(DeliveryError::corruption(stream, offset, "Invalid entry length"));
            }
            buf[..4].copy_from_slice(&len_buf);
            reader
                .read_exact(&mut buf[4..])
                .map_err(|e| DeliveryError::io_error("Failed to read entry", e))?;
            let (entry, _) = DeliveryEntry::deserialize(&buf)
                .map_err(|e| DeliveryError::corruption(stream, offset, e.to_string()))?;
            entries.push(entry);
        }
        Ok(entries)
    }
}

/// Entries of `ids` (ascending) that precede `before`, newest first, at most `count`.
fn window<T: Copy>(ids: &[(MessageId, T)], before: Option<MessageId>, count: usize) -> Vec<T> {
    let end = match before {
        Some(before) => ids.partition_point(|(id, _)| *id < before),
        None => ids.len(),
    };
    let start = end.saturating_sub(count);
    ids[start..end].iter().rev().map(|(_, item)| *item).collect()
}

impl DeliveryLog for FileDeliveryLog {
    fn length(&self, stream: &str) -> DeliveryResult<u64> {
        self.with_index(stream, |index| Ok(index.entries.len() as u64))
    }

    fn reverse_scan(
        &self,
        stream: &str,
        before: Option<MessageId>,
        count: usize,
    ) -> DeliveryResult<Vec<DeliveryEntry>> {
        let offsets = self.with_index(stream, |index| Ok(window(&index.entries, before, count)))?;
        self.read_at(stream, &offsets)
    }
}

/// In-memory delivery log
#[derive(Debug, Default)]
pub struct MemoryDeliveryLog {
    streams: BTreeMap<String, Vec<DeliveryEntry>>,
}

impl MemoryDeliveryLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry with the next id after the stream's newest.
    pub fn append(
        &mut self,
        stream: &str,
        identity: &str,
        path: &str,
        payload: &[u8],
    ) -> MessageId {
        let entries = self.streams.entry(stream.to_string()).or_default();
        let id = match entries.last() {
            Some(last) => MessageId::new(last.id.ms, last.id.seq + 1),
            None => MessageId::new(1, 0),
        };
        entries.push(DeliveryEntry {
            id,
            identity: identity.to_string(),
            path: path.to_string(),
            payload: payload.to_vec(),
        });
        id
    }
}

impl DeliveryLog for MemoryDeliveryLog {
    fn length(&self, stream: &str) -> DeliveryResult<u64> {
        Ok(self.streams.get(stream).map_or(0, |entries| entries.len() as u64))
    }

    fn reverse_scan(
        &self,
        stream: &str,
        before: Option<MessageId>,
        count: usize,
    ) -> DeliveryResult<Vec<DeliveryEntry>> {
        let Some(entries) = self.streams.get(stream) else {
            return Ok(Vec::new());
        };
        let ids: Vec<(MessageId, usize)> =
            entries.iter().enumerate().map(|(i, e)| (e.id, i)).collect();
        Ok(window(&ids, before, count)
            .into_iter()
            .map(|i| entries[i].clone())
            .collect())
    }
}
