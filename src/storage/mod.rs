//! Record storage
//!
//! The record store holds every indexed record keyed by its URI. It is an
//! append-only, checksummed file with no in-place updates.
//!
//! # Design Principles
//!
//! - Append-only, latest committed put wins
//! - Checksum-verified on every read
//! - Batches are atomic: durable only once the commit marker is fsynced
//! - Uncommitted tails are ignored on replay and truncated on open
//! - Ordered key index for resumable paging

mod checksum;
mod errors;
mod reader;
mod record;
mod store;
mod uri;

pub use checksum::compute_checksum;
pub use errors::{StorageError, StorageErrorCode, StorageResult};
pub use reader::RecordReader;
pub use record::{RecordEntry, StoredRecord};
pub use store::{record_now, FileRecordStore, RecordFilter, RecordStore, RecordUpdate};
pub use uri::RecordUri;
