//! Migration errors
//!
//! Per-record problems never surface here; they are counted and logged as
//! skips. These errors end a run or a single-record fix.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::repair::RepairError;
use crate::storage::StorageError;

/// Result type for migration operations
pub type MigrationResult<T> = Result<T, MigrationError>;

#[derive(Debug, Error)]
pub enum MigrationError {
    /// Listing or commit failed; the cursor was not advanced
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Record {uri} is not valid JSON: {source}")]
    Serialization {
        uri: String,
        #[source]
        source: RepairError,
    },

    #[error("Resume cursor {path}: {reason}")]
    Cursor {
        path: PathBuf,
        reason: String,
        #[source]
        source: Option<io::Error>,
    },
}

impl MigrationError {
    pub(crate) fn cursor(path: &std::path::Path, reason: impl Into<String>) -> Self {
        MigrationError::Cursor {
            path: path.to_path_buf(),
            reason: reason.into(),
            source: None,
        }
    }

    pub(crate) fn cursor_io(path: &std::path::Path, reason: impl Into<String>, source: io::Error) -> Self {
        MigrationError::Cursor {
            path: path.to_path_buf(),
            reason: reason.into(),
            source: Some(source),
        }
    }

    /// Stable error code for log lines
    pub fn code(&self) -> &'static str {
        match self {
            MigrationError::Storage(e) => e.code().code(),
            MigrationError::NotFound(_) => "MEND_MIGRATION_NOT_FOUND",
            MigrationError::Serialization { .. } => "MEND_SERIALIZATION_ERROR",
            MigrationError::Cursor { .. } => "MEND_MIGRATION_CURSOR_FAILED",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes() {
        assert_eq!(
            MigrationError::NotFound("at://a/b/c".into()).code(),
            "MEND_MIGRATION_NOT_FOUND"
        );
        let storage = MigrationError::from(StorageError::not_found("at://a/b/c"));
        assert_eq!(storage.code(), "MEND_STORAGE_NOT_FOUND");
        let cursor = MigrationError::cursor(std::path::Path::new("cursor.json"), "bad mode");
        assert!(cursor.to_string().contains("cursor.json"));
    }
}
