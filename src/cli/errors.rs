//! CLI-specific error types
//!
//! Every CLI error ends the process with a non-zero exit code.

use std::fmt;
use std::io;

use crate::cid::FormatError;
use crate::migration::MigrationError;
use crate::reconcile::ReconcileError;
use crate::storage::StorageError;

/// CLI error codes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliErrorCode {
    /// Configuration file error
    ConfigError,
    /// I/O error (stdin/stdout, dump files)
    IoError,
    /// Record store could not be opened or read
    StoreError,
    /// Migration aborted, usually on a failed batch commit
    MigrationFailed,
    /// Reconciliation could not run
    ReconcileFailed,
    /// Operator input could not be parsed
    InvalidInput,
}

impl CliErrorCode {
    /// Get the error code string
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConfigError => "MEND_CLI_CONFIG_ERROR",
            Self::IoError => "MEND_CLI_IO_ERROR",
            Self::StoreError => "MEND_CLI_STORE_ERROR",
            Self::MigrationFailed => "MEND_CLI_MIGRATION_FAILED",
            Self::ReconcileFailed => "MEND_CLI_RECONCILE_FAILED",
            Self::InvalidInput => "MEND_CLI_INVALID_INPUT",
        }
    }
}

/// CLI error
#[derive(Debug)]
pub struct CliError {
    code: CliErrorCode,
    message: String,
}

impl CliError {
    /// Create a new CLI error
    pub fn new(code: CliErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Config error
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::ConfigError, msg)
    }

    /// I/O error
    pub fn io_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::IoError, msg)
    }

    pub fn store_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::StoreError, msg)
    }

    pub fn migration_failed(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::MigrationFailed, msg)
    }

    pub fn reconcile_failed(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::ReconcileFailed, msg)
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::InvalidInput, msg)
    }

    /// Get the error code
    pub fn code(&self) -> &CliErrorCode {
        &self.code
    }

    /// Get the error code string
    pub fn code_str(&self) -> &'static str {
        self.code.code()
    }

    /// Get the error message
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.code(), self.message)
    }
}

impl std::error::Error for CliError {}

impl From<io::Error> for CliError {
    fn from(e: io::Error) -> Self {
        Self::io_error(e.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        Self::io_error(format!("JSON error: {}", e))
    }
}

impl From<StorageError> for CliError {
    fn from(e: StorageError) -> Self {
        Self::store_error(e.to_string())
    }
}

impl From<MigrationError> for CliError {
    fn from(e: MigrationError) -> Self {
        Self::migration_failed(format!("{} ({})", e, e.code()))
    }
}

impl From<ReconcileError> for CliError {
    fn from(e: ReconcileError) -> Self {
        Self::reconcile_failed(format!("{} ({})", e, e.code()))
    }
}

impl From<FormatError> for CliError {
    fn from(e: FormatError) -> Self {
        Self::invalid_input(format!("{} ({})", e, e.code()))
    }
}

/// CLI result type
pub type CliResult<T> = Result<T, CliError>;
