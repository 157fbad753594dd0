//! Reconciliation errors
//!
//! Source and delivery-log failures are recorded in the report and do not
//! end a check. Only these do.

use thiserror::Error;

use crate::storage::StorageError;

/// Result type for reconciliation
pub type ReconcileResult<T> = Result<T, ReconcileError>;

#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Indexed set could not be read
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Invalid time window: {0}")]
    InvalidWindow(String),
}

impl ReconcileError {
    /// Stable error code for log lines
    pub fn code(&self) -> &'static str {
        match self {
            ReconcileError::Storage(e) => e.code().code(),
            ReconcileError::InvalidWindow(_) => "MEND_RECONCILE_INVALID_WINDOW",
        }
    }
}
