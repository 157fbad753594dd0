//! Document-level repair errors
//!
//! Reference-level problems never surface here: a malformed reference is
//! skipped and reported in the outcome. Only a document that cannot be read
//! or written as JSON at all fails the repair of that record.

use thiserror::Error;

/// Result type for document repair
pub type RepairResult<T> = Result<T, RepairError>;

/// Document is not valid structured text
#[derive(Debug, Error)]
pub enum RepairError {
    #[error("Document is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Failed to serialize repaired document: {0}")]
    Serialize(serde_json::Error),
}

impl RepairError {
    /// Stable error code for log lines
    pub fn code(&self) -> &'static str {
        "MEND_SERIALIZATION_ERROR"
    }
}
