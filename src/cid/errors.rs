//! Identifier format errors
//!
//! Every failure is a `FormatError`. Decoding is all-or-nothing, so there is
//! no partially decoded identifier to report alongside the error.

use thiserror::Error;

/// Result type for codec operations
pub type FormatResult<T> = Result<T, FormatError>;

/// Malformed identifier bytes or text
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    // Binary form
    #[error("Invalid identifier length: expected 36 bytes, got {0}")]
    InvalidLength(usize),

    #[error("Unsupported CID version: {0}")]
    UnsupportedVersion(u8),

    #[error("Unsupported codec: 0x{0:02x}")]
    UnsupportedCodec(u8),

    #[error("Unsupported hash function: 0x{0:02x}")]
    UnsupportedHashFunction(u8),

    #[error("Invalid digest length: {0}")]
    InvalidDigestLength(u8),

    // Text form
    #[error("Unsupported multibase prefix: {0:?}")]
    UnsupportedMultibase(Option<char>),

    #[error("Invalid base32 text: {0}")]
    InvalidEncoding(String),
}

impl FormatError {
    /// Stable error code for log lines
    pub fn code(&self) -> &'static str {
        "MEND_CID_FORMAT_ERROR"
    }
}
