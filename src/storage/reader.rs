//! Sequential and positional reads over the record file
//!
//! - Every read validates the entry checksum
//! - A checksum or framing failure is fatal data corruption
//! - A final entry cut short by a crash is a torn tail, not corruption:
//!   reading stops and the tail offset is reported

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use super::errors::{StorageError, StorageResult};
use super::record::{RecordEntry, StoredRecord, MIN_ENTRY_SIZE};

/// Reader for the record file
pub struct RecordReader {
    path: PathBuf,
    reader: BufReader<File>,
    current_offset: u64,
    file_size: u64,
    torn_tail: Option<u64>,
}

impl RecordReader {
    /// Opens the record file for reading.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let file = File::open(path).map_err(|e| {
            StorageError::read_failed(format!("Failed to open record file: {}", path.display()), e)
        })?;

        let file_size = file
            .metadata()
            .map_err(|e| StorageError::read_failed("Failed to read file metadata", e))?
            .len();

        Ok(Self {
            path: path.to_path_buf(),
            reader: BufReader::new(file),
            current_offset: 0,
            file_size,
            torn_tail: None,
        })
    }

    /// Returns the record file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the offset of the next entry.
    pub fn current_offset(&self) -> u64 {
        self.current_offset
    }

    /// Offset where an incomplete final entry starts, once one was hit.
    pub fn torn_tail(&self) -> Option<u64> {
        self.torn_tail
    }

    /// Reads the next entry.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(entry))` if an entry was read
    /// - `Ok(None)` at end of file or at a torn tail
    /// - `Err(MEND_DATA_CORRUPTION)` if a complete entry fails validation
    pub fn read_next(&mut self) -> StorageResult<Option<RecordEntry>> {
        if self.torn_tail.is_some() || self.current_offset >= self.file_size {
            return Ok(None);
        }

        let remaining = self.file_size - self.current_offset;
        if remaining < MIN_ENTRY_SIZE as u64 {
            self.torn_tail = Some(self.current_offset);
            return Ok(None);
        }

        let mut len_buf = [0u8; 4];
        self.reader.read_exact(&mut len_buf).map_err(|e| {
            StorageError::read_failed(
                format!("Failed to read entry length at offset {}", self.current_offset),
                e,
            )
        })?;
        let entry_length = u32::from_le_bytes(len_buf) as u64;

        if entry_length < MIN_ENTRY_SIZE as u64 {
            return Err(StorageError::corruption_at_offset(
                self.current_offset,
                format!("Invalid entry length: {}", entry_length),
            ));
        }

        if entry_length > remaining {
            self.torn_tail = Some(self.current_offset);
            return Ok(None);
        }

        let mut entry_buf = vec![0u8; entry_length as usize];
        entry_buf[0..4].copy_from_slice(&len_buf);
        self.reader.read_exact(&mut entry_buf[4..]).map_err(|e| {
            StorageError::read_failed(
                format!("Failed to read entry body at offset {}", self.current_offset),
                e,
            )
        })?;

        let (entry, consumed) = RecordEntry::deserialize(&entry_buf)
            .map_err(|e| StorageError::corruption_at_offset(self.current_offset, e.to_string()))?;

        self.current_offset += consumed as u64;
        Ok(Some(entry))
    }

    /// Seeks to a specific offset in the file.
    pub fn seek_to(&mut self, offset: u64) -> StorageResult<()> {
        self.reader.seek(SeekFrom::Start(offset)).map_err(|e| {
            StorageError::read_failed(format!("Failed to seek to offset {}", offset), e)
        })?;
        self.current_offset = offset;
        self.torn_tail = None;
        Ok(())
    }

    /// Reads the put entry at `offset`.
    pub fn read_record_at(&mut self, offset: u64) -> StorageResult<StoredRecord> {
        self.seek_to(offset)?;
        match self.read_next()? {
            Some(RecordEntry::Put(record)) => Ok(record),
            Some(RecordEntry::Commit { .. }) => Err(StorageError::corruption_at_offset(
                offset,
                "Expected a put entry, found a commit marker",
            )),
            None => Err(StorageError::corruption_at_offset(
                offset,
                "No entry at specified offset",
            )),
        }
    }
}
