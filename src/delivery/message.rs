//! Delivery log messages
//!
//! Stream file entry format:
//!
//! ```text
//! +------------------+
//! | Entry Length     | (u32 LE, includes this field and the checksum)
//! +------------------+
//! | Millis           | (u64 LE)
//! +------------------+
//! | Sequence         | (u64 LE)
//! +------------------+
//! | Identity         | (length-prefixed string)
//! +------------------+
//! | Path             | (length-prefixed string)
//! +------------------+
//! | Payload          | (length-prefixed bytes)
//! +------------------+
//! | Checksum         | (u32 LE)
//! +------------------+
//! ```

use std::fmt;
use std::io::{self, Cursor, Read};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::DeliveryError;
use crate::storage::compute_checksum;

/// Smallest possible entry: length + id + three empty fields + checksum
pub const MIN_ENTRY_SIZE: usize = 4 + 16 + 4 * 3 + 4;

/// Stream message id, `<millis>-<seq>`
///
/// Ordered by millis, then sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MessageId {
    pub ms: u64,
    pub seq: u64,
}

impl MessageId {
    pub fn new(ms: u64, seq: u64) -> Self {
        Self { ms, seq }
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.ms, self.seq)
    }
}

impl FromStr for MessageId {
    type Err = DeliveryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (ms, seq) = s.split_once('-').ok_or_else(|| DeliveryError::invalid_id(s))?;
        let ms = ms.parse().map_err(|_| DeliveryError::invalid_id(s))?;
        let seq = seq.parse().map_err(|_| DeliveryError::invalid_id(s))?;
        Ok(Self { ms, seq })
    }
}

impl TryFrom<String> for MessageId {
    type Error = DeliveryError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MessageId> for String {
    fn from(id: MessageId) -> Self {
        id.to_string()
    }
}

/// One queued update in a stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryEntry {
    pub id: MessageId,
    /// Origin identity of the record
    pub identity: String,
    /// `/<collection>/<record key>`
    pub path: String,
    pub payload: Vec<u8>,
}

impl DeliveryEntry {
    /// Trailing segment of the path.
    pub fn record_key(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or_default()
    }

    /// Serialize the complete entry to bytes.
    pub fn serialize(&self) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(&self.id.ms.to_le_bytes());
        body.extend_from_slice(&self.id.seq.to_le_bytes());
        write_bytes(&mut body, self.identity.as_bytes());
        write_bytes(&mut body, self.path.as_bytes());
        write_bytes(&mut body, &self.payload);

        let entry_length = (4 + body.len() + 4) as u32;
        let mut entry = Vec::with_capacity(entry_length as usize);
        entry.extend_from_slice(&entry_length.to_le_bytes());
        entry.extend_from_slice(&body);
        let checksum = compute_checksum(&entry);
        entry.extend_from_slice(&checksum.to_le_bytes());
        entry
    }

    /// Deserialize an entry, verifying checksum.
    ///
    /// Returns the entry and the number of bytes consumed.
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
                format!("Entry truncated: expected {} bytes, got {}", entry_length, data.len()),
            ));
        }

        let checksum_offset = entry_length - 4;
        let mut checksum_buf = [0u8; 4];
        checksum_buf.copy_from_slice(&data[checksum_offset..entry_length]);
        let stored_checksum = u32::from_le_bytes(checksum_buf);
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
        let ms = read_u64(&mut cursor)?;
        let seq = read_u64(&mut cursor)?;
        let identity = read_string(&mut cursor)?;
        let path = read_string(&mut cursor)?;
        let payload = read_bytes(&mut cursor)?;

        Ok((
            Self {
                id: MessageId { ms, seq },
                identity,
                path,
                payload,
            },
            entry_length,
        ))
    }
}

fn write_bytes(buf: &mut Vec<u8>, value: &[u8]) {
    buf.extend_from_slice(&(value.len() as u32).to_le_bytes());
    buf.extend_from_slice(value);
}

fn read_u64<R: Read>(reader: &mut R) -> io::Result<u64> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf).map_err(malformed)?;
    Ok(u64::from_le_bytes(buf))
}

fn read_bytes<R: Read>(reader: &mut R) -> io::Result<Vec<u8>> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).map_err(malformed)?;
    let mut buf = vec![0u8; u32::from_le_bytes(len_buf) as usize];
    reader.read_exact(&mut buf).map_err(malformed)?;
    Ok(buf)
}

fn read_string<R: Read>(reader: &mut R) -> io::Result<String> {
    String::from_utf8(read_bytes(reader)?)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, format!("Invalid UTF-8: {}", e)))
}

fn malformed(e: io::Error) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, format!("Malformed entry body: {}", e))
}
