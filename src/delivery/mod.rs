//! Durable delivery log
//!
//! Ordered, replayable per-stream queues of record updates that have been
//! accepted but may not yet be applied to the record store. Another
//! process appends to them; the checker only reads them, newest first.

mod errors;
mod log;
mod message;

pub use errors::{DeliveryError, DeliveryErrorCode, DeliveryResult};
pub use log::{stream_path, DeliveryLog, FileDeliveryLog, MemoryDeliveryLog};
pub use message::{DeliveryEntry, MessageId};
