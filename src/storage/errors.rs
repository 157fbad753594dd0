//! Record store error types
//!
//! Error codes:
//! - MEND_STORAGE_IO_ERROR (ERROR severity)
//! - MEND_STORAGE_PERSISTENCE_FAILED (ERROR severity)
//! - MEND_STORAGE_READ_FAILED (ERROR severity)
//! - MEND_STORAGE_NOT_FOUND (ERROR severity)
//! - MEND_STORAGE_INVALID_URI (ERROR severity)
//! - MEND_DATA_CORRUPTION (FATAL severity)

use std::fmt;
use std::io;

/// Severity levels for storage errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Operation fails, process continues
    Error,
    /// Store cannot be trusted, process must stop
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "ERROR"),
            Severity::Fatal => write!(f, "FATAL"),
        }
    }
}

/// Storage-specific error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageErrorCode {
    /// Disk I/O failure outside a commit
    MendStorageIoError,
    /// Batch commit failed; nothing from the batch is visible
    MendStoragePersistenceFailed,
    /// Record read failed
    MendStorageReadFailed,
    /// Record does not exist
    MendStorageNotFound,
    /// Record URI is malformed
    MendStorageInvalidUri,
    /// Checksum or framing failure inside committed data
    MendDataCorruption,
}

impl StorageErrorCode {
    /// Returns the stable string code
    pub fn code(&self) -> &'static str {
        match self {
            StorageErrorCode::MendStorageIoError => "MEND_STORAGE_IO_ERROR",
            StorageErrorCode::MendStoragePersistenceFailed => "MEND_STORAGE_PERSISTENCE_FAILED",
            StorageErrorCode::MendStorageReadFailed => "MEND_STORAGE_READ_FAILED",
            StorageErrorCode::MendStorageNotFound => "MEND_STORAGE_NOT_FOUND",
            StorageErrorCode::MendStorageInvalidUri => "MEND_STORAGE_INVALID_URI",
            StorageErrorCode::MendDataCorruption => "MEND_DATA_CORRUPTION",
        }
    }

    /// Returns the severity level for this error
    pub fn severity(&self) -> Severity {
        match self {
            StorageErrorCode::MendDataCorruption => Severity::Fatal,
            _ => Severity::Error,
        }
    }
}

impl fmt::Display for StorageErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Storage error with code, message and optional context
#[derive(Debug)]
pub struct StorageError {
    code: StorageErrorCode,
    message: String,
    details: Option<String>,
    source: Option<io::Error>,
}

impl StorageError {
    fn new(code: StorageErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
            source: None,
        }
    }

    /// Create a new storage I/O error
    pub fn io_error(message: impl Into<String>, source: io::Error) -> Self {
        Self {
            source: Some(source),
            ..Self::new(StorageErrorCode::MendStorageIoError, message)
        }
    }

    /// Create a commit failure error
    pub fn persistence_failed(message: impl Into<String>, source: io::Error) -> Self {
        Self {
            source: Some(source),
            ..Self::new(StorageErrorCode::MendStoragePersistenceFailed, message)
        }
    }

    /// Create a new read failure error
    pub fn read_failed(message: impl Into<String>, source: io::Error) -> Self {
        Self {
            source: Some(source),
            ..Self::new(StorageErrorCode::MendStorageReadFailed, message)
        }
    }

    /// Create a not-found error for a record URI
    pub fn not_found(uri: &str) -> Self {
        Self {
            details: Some(format!("uri: {}", uri)),
            ..Self::new(StorageErrorCode::MendStorageNotFound, "Record not found")
        }
    }

    /// Create an invalid URI error
    pub fn invalid_uri(uri: &str) -> Self {
        Self {
            details: Some(format!("uri: {}", uri)),
            ..Self::new(
                StorageErrorCode::MendStorageInvalidUri,
                "Expected at://<identity>/<collection>/<record key>",
            )
        }
    }

    /// Create a data corruption error (FATAL)
    pub fn data_corruption(message: impl Into<String>) -> Self {
        Self::new(StorageErrorCode::MendDataCorruption, message)
    }

    /// Create a data corruption error with byte offset context
    pub fn corruption_at_offset(offset: u64, reason: impl Into<String>) -> Self {
        Self {
            details: Some(format!("byte_offset: {}", offset)),
            ..Self::new(StorageErrorCode::MendDataCorruption, reason)
        }
    }

    /// Returns the error code
    pub fn code(&self) -> StorageErrorCode {
        self.code
    }

    /// Returns the severity level
    pub fn severity(&self) -> Severity {
        self.code.severity()
    }

    /// Returns the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns additional error details
    pub fn details(&self) -> Option<&str> {
        self.details.as_deref()
    }

    /// Returns whether this error is fatal
    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }

    /// Returns whether the record was missing
    pub fn is_not_found(&self) -> bool {
        self.code == StorageErrorCode::MendStorageNotFound
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {}",
            self.code.severity(),
            self.code.code(),
            self.message
        )?;
        if let Some(ref details) = self.details {
            write!(f, " ({})", details)?;
        }
        Ok(())
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(StorageErrorCode::MendStorageIoError.code(), "MEND_STORAGE_IO_ERROR");
        assert_eq!(
            StorageErrorCode::MendStoragePersistenceFailed.code(),
            "MEND_STORAGE_PERSISTENCE_FAILED"
        );
        assert_eq!(StorageErrorCode::MendStorageNotFound.code(), "MEND_STORAGE_NOT_FOUND");
        assert_eq!(StorageErrorCode::MendDataCorruption.code(), "MEND_DATA_CORRUPTION");
    }

    #[test]
    fn test_only_corruption_is_fatal() {
        assert!(StorageError::data_corruption("checksum mismatch").is_fatal());
        assert!(!StorageError::not_found("at://a/b/c").is_fatal());
        assert!(!StorageError::persistence_failed(
            "disk full",
            io::Error::new(io::ErrorKind::Other, "disk full"),
        )
        .is_fatal());
    }

    #[test]
    fn test_not_found_carries_uri() {
        let err = StorageError::not_found("at://did:plc:x/app.bsky.feed.post/1");
        assert!(err.is_not_found());
        assert_eq!(err.details(), Some("uri: at://did:plc:x/app.bsky.feed.post/1"));
    }

    #[test]
    fn test_error_display_contains_required_fields() {
        let err = StorageError::corruption_at_offset(1024, "checksum mismatch");
        let display = format!("{}", err);
        assert!(display.contains("MEND_DATA_CORRUPTION"));
        assert!(display.contains("FATAL"));
        assert!(display.contains("checksum mismatch"));
        assert!(display.contains("byte_offset: 1024"));
    }
}
