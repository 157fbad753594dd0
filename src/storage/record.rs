//! Record file entry types
//!
//! Every entry in `records.dat` has the same framing:
//!
//! ```text
//! +------------------+
//! | Entry Length     | (u32 LE, includes this field and the checksum)
//! +------------------+
//! | Kind             | (u8: 1 = put, 2 = commit)
//! +------------------+
//! | Body             | (kind specific)
//! +------------------+
//! | Checksum         | (u32 LE)
//! +------------------+
//! ```
//!
//! Put body: URI, indexed_at (RFC 3339) and document body, each a
//! length-prefixed UTF-8 string.
//!
//! Commit body: batch id (u64 LE) and the number of put entries in the
//! batch (u32 LE). Puts become visible only when the commit that closes
//! their batch has been read.
//!
//! Checksum covers all bytes except the checksum itself.

use std::io::{self, Cursor, Read};

use chrono::{DateTime, Utc};

use super::checksum::compute_checksum;

const KIND_PUT: u8 = 1;
const KIND_COMMIT: u8 = 2;

/// Smallest possible entry: length + kind + checksum
pub const MIN_ENTRY_SIZE: usize = 4 + 1 + 4;

/// A stored record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRecord {
    /// `at://<identity>/<collection>/<rkey>`
    pub uri: String,
    /// Document body as compact JSON text
    pub body: String,
    pub indexed_at: DateTime<Utc>,
}

impl StoredRecord {
    pub fn new(uri: impl Into<String>, body: impl Into<String>, indexed_at: DateTime<Utc>) -> Self {
        Self {
            uri: uri.into(),
            body: body.into(),
            indexed_at,
        }
    }
}

/// One entry in the record file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordEntry {
    /// Full record write, pending until its batch commits
    Put(StoredRecord),
    /// Closes a batch of `entry_count` puts
    Commit { batch_id: u64, entry_count: u32 },
}

impl RecordEntry {
    fn serialize_body(&self) -> Vec<u8> {
        let mut buf = Vec::new();

        match self {
            RecordEntry::Put(record) => {
                buf.push(KIND_PUT);
                write_string(&mut buf, &record.uri);
                write_string(&mut buf, &record.indexed_at.to_rfc3339());
                write_string(&mut buf, &record.body);
            }
            RecordEntry::Commit {
                batch_id,
                entry_count,
            } => {
                buf.push(KIND_COMMIT);
                buf.extend_from_slice(&batch_id.to_le_bytes());
                buf.extend_from_slice(&entry_count.to_le_bytes());
            }
        }

        buf
    }

    /// Serialize the complete entry to bytes.
    pub fn serialize(&self) -> Vec<u8> {
        let body = self.serialize_body();
        let entry_length = (4 + body.len() + 4) as u32;

        let mut entry = Vec::with_capacity(entry_length as usize);
        entry.extend_from_slice(&entry_length.to_le_bytes());
        entry.extend_from_slice(&body);
        let checksum = compute_checksum(&entry);
        entry.extend_from_slice(&checksum.to_le_bytes());

        entry
    }

    /// Deserialize an entry from bytes, verifying checksum.
    ///
    /// Returns the entry and the number of bytes consumed. A short buffer is
    /// reported as `UnexpectedEof`; everything else as `InvalidData`.
    pub fn deserialize(data: &[u8]) -> io::Result<(Self, usize)> {
        if data.len() < MIN_ENTRY_SIZE {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "Entry too short"));
        }

        let entry_length = u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize;

        if entry_length < MIN_ENTRY_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Invalid entry length: {}", entry_length),
            ));
        }

        if data.len() < entry_length {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "Entry truncated: expected {} bytes, got {}",
                    entry_length,
                    data.len()
                ),
            ));
        }

        let checksum_offset = entry_length - 4;
        let stored_checksum = u32::from_le_bytes([
            data[checksum_offset],
            data[checksum_offset + 1],
            data[checksum_offset + 2],
            data[checksum_offset + 3],
        ]);
        let computed_checksum = compute_checksum(&data[..checksum_offset]);

        if computed_checksum != stored_checksum {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "Checksum mismatch: computed {:08x}, stored {:08x}",
                    computed_checksum, stored_checksum
                ),
            ));
        }

        let mut cursor = Cursor::new(&data[4..checksum_offset]);
        let mut kind = [0u8; 1];
        cursor.read_exact(&mut kind).map_err(invalid_body)?;

        let entry = match kind[0] {
            KIND_PUT => {
                let uri = read_string(&mut cursor)?;
                let indexed_at = read_string(&mut cursor)?;
                let indexed_at = DateTime::parse_from_rfc3339(&indexed_at)
                    .map_err(|e| {
                        io::Error::new(
                            io::ErrorKind::InvalidData,
                            format!("Invalid indexed_at: {}", e),
                        )
                    })?
                    .with_timezone(&Utc);
                let body = read_string(&mut cursor)?;
                RecordEntry::Put(StoredRecord {
                    uri,
                    body,
                    indexed_at,
                })
            }
            KIND_COMMIT => {
                let mut id_buf = [0u8; 8];
                cursor.read_exact(&mut id_buf).map_err(invalid_body)?;
                let mut count_buf = [0u8; 4];
                cursor.read_exact(&mut count_buf).map_err(invalid_body)?;
                RecordEntry::Commit {
                    batch_id: u64::from_le_bytes(id_buf),
                    entry_count: u32::from_le_bytes(count_buf),
                }
            }
            other => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("Unknown entry kind: {}", other),
                ))
            }
        };

        Ok((entry, entry_length))
    }
}

fn write_string(buf: &mut Vec<u8>, value: &str) {
    buf.extend_from_slice(&(value.len() as u32).to_le_bytes());
    buf.extend_from_slice(value.as_bytes());
}

fn read_string<R: Read>(reader: &mut R) -> io::Result<String> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).map_err(invalid_body)?;
    let len = u32::from_le_bytes(len_buf) as usize;

    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).map_err(invalid_body)?;

    String::from_utf8(buf)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, format!("Invalid UTF-8: {}", e)))
}

// A checksummed body that is too short is malformed, not truncated.
fn invalid_body(e: io::Error) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, format!("Malformed entry body: {}", e))
}
