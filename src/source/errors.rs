//! Authoritative source errors

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Result type for source listings
pub type SourceResult<T> = Result<T, SourceError>;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Rate limited by source")]
    RateLimited { retry_after: Option<Duration> },

    #[error("Source unavailable: {0}")]
    Unavailable(String),

    #[error("Failed to read export {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Malformed export {path}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid record URI in listing: {0}")]
    InvalidUri(String),
}

impl SourceError {
    /// Worth retrying after a pause.
    pub fn is_transient(&self) -> bool {
        matches!(self, SourceError::RateLimited { .. } | SourceError::Unavailable(_))
    }

    /// Stable error code for log lines
    pub fn code(&self) -> &'static str {
        match self {
            SourceError::RateLimited { .. } => "MEND_SOURCE_RATE_LIMITED",
            SourceError::Unavailable(_) => "MEND_SOURCE_UNAVAILABLE",
            SourceError::Io { .. } => "MEND_SOURCE_IO_ERROR",
            SourceError::Malformed { .. } => "MEND_SOURCE_MALFORMED",
            SourceError::InvalidUri(_) => "MEND_SOURCE_INVALID_URI",
        }
    }
}
