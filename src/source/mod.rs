//! Authoritative source
//!
//! The system of record for which records exist, listed per identity and
//! collection with cursor paging. Listings may be rate limited; callers wrap
//! them in a [`RetryPolicy`].

mod errors;
mod listing;
mod retry;

pub use errors::{SourceError, SourceResult};
pub use listing::{AuthoritativeSource, ExportSource, ListPage, MemorySource, SourceRecord};
pub use retry::RetryPolicy;
