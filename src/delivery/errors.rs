//! Delivery log error types
//!
//! Error codes:
//! - MEND_DELIVERY_IO_ERROR (ERROR severity)
//! - MEND_DELIVERY_INVALID_ID (ERROR severity)
//! - MEND_DELIVERY_CORRUPTION (FATAL severity)

use std::fmt;
use std::io;

/// Severity levels for delivery log errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
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

/// Delivery-log error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryErrorCode {
    /// Stream file could not be opened or read
    MendDeliveryIoError,
    /// Message id text is not `<millis>-<seq>`
    MendDeliveryInvalidId,
    /// Checksum, framing or ordering failure in a stream file
    MendDeliveryCorruption,
}

impl DeliveryErrorCode {
    /// Returns the stable string code
    pub fn code(&self) -> &'static str {
        match self {
            DeliveryErrorCode::MendDeliveryIoError => "MEND_DELIVERY_IO_ERROR",
            DeliveryErrorCode::MendDeliveryInvalidId => "MEND_DELIVERY_INVALID_ID",
            DeliveryErrorCode::MendDeliveryCorruption => "MEND_DELIVERY_CORRUPTION",
        }
    }

    /// Returns the severity level for this error
    pub fn severity(&self) -> Severity {
        match self {
            DeliveryErrorCode::MendDeliveryCorruption => Severity::Fatal,
            _ => Severity::Error,
        }
    }
}

/// Delivery log error with code, message and optional context
#[derive(Debug)]
pub struct DeliveryError {
    code: DeliveryErrorCode,
    message: String,
    details: Option<String>,
    source: Option<io::Error>,
}

impl DeliveryError {
    /// Create an I/O error
    pub fn io_error(message: impl Into<String>, source: io::Error) -> Self {
        Self {
            code: DeliveryErrorCode::MendDeliveryIoError,
            message: message.into(),
            details: None,
            source: Some(source),
        }
    }

    /// Create an invalid message id error
    pub fn invalid_id(text: &str) -> Self {
        Self {
            code: DeliveryErrorCode::MendDeliveryInvalidId,
            message: "Expected <millis>-<seq>".to_string(),
            details: Some(format!("id: {}", text)),
            source: None,
        }
    }

    /// Create a corruption error with stream and byte offset context
    pub fn corruption(stream: &str, offset: u64, reason: impl Into<String>) -> Self {
        Self {
            code: DeliveryErrorCode::MendDeliveryCorruption,
            message: reason.into(),
            details: Some(format!("stream: {}, byte_offset: {}", stream, offset)),
            source: None,
        }
    }

    /// Returns the error code
    pub fn code(&self) -> DeliveryErrorCode {
        self.code
    }

    /// Returns the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns whether this error is fatal
    pub fn is_fatal(&self) -> bool {
        self.code.severity() == Severity::Fatal
    }
}

impl fmt::Display for DeliveryError {
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

impl std::error::Error for DeliveryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// Result type for delivery log operations
pub type DeliveryResult<T> = Result<T, DeliveryError>;
