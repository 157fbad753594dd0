//! cidmend - content-identifier repair and cross-store reconciliation
//!
//! Repairs records whose content identifiers were stored as raw byte arrays
//! and verifies that every record an authoritative source knows about has
//! reached the record store, or is still queued in the delivery log.

pub mod cid;
pub mod cli;
pub mod delivery;
pub mod migration;
pub mod observability;
pub mod reconcile;
pub mod repair;
pub mod source;
pub mod storage;
