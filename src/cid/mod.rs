//! Content identifier codec
//!
//! Encodes and decodes the one identifier profile the upstream system ever
//! produced: CIDv1, raw codec, sha2-256, 32-byte digest. The canonical text
//! form is the `b` multibase prefix followed by lowercase unpadded base32,
//! produced and read through the `multibase` crate.
//!
//! # Design Principles
//!
//! - One profile, validated exhaustively
//! - All-or-nothing decoding
//! - Binary and text forms round-trip exactly

mod errors;
mod identifier;

pub use errors::{FormatError, FormatResult};
pub use identifier::{
    Codec, ContentIdentifier, HashFunction, CANONICAL_TEXT_LENGTH, CID_VERSION, DIGEST_LENGTH,
    HEADER_LENGTH, IDENTIFIER_LENGTH, MULTIBASE_BASE32, RAW_CODEC, SHA256_CODE,
};

/// Decodes a 36-byte identifier and returns its canonical text form.
pub fn bytes_to_canonical(bytes: &[u8]) -> FormatResult<String> {
    ContentIdentifier::decode(bytes).map(|cid| cid.encode())
}

/// Parses canonical text and returns the 36-byte binary form.
pub fn canonical_to_bytes(text: &str) -> FormatResult<[u8; IDENTIFIER_LENGTH]> {
    ContentIdentifier::parse(text).map(|cid| cid.to_bytes())
}
