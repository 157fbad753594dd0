//! Reference repair
//!
//! Rewrites `"ref"` values that hold raw identifier bytes into canonical
//! `{"$link": ...}` objects. Repair is idempotent: a repaired document has
//! no corrupted references left, so a second pass reports zero fixes.

mod engine;
mod errors;
mod reference;

pub use engine::{repair, repair_json, RepairOutcome, RepairedJson, SkippedReference};
pub use errors::{RepairError, RepairResult};
pub use reference::{CanonicalLink, CorruptedReference, LINK_KEY, REF_KEY};

/// Substring present in a stored body that may hold a corrupted reference.
///
/// Matches compact serialization only, which is how bodies are stored.
pub const RAW_REFERENCE_MARKER: &str = "\"ref\":[";
