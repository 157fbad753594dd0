//! Content identifier value type
//!
//! Binary layout (36 bytes):
//!
//! ```text
//! +---------+---------+---------------+---------------+------------------+
//! | version | codec   | hash function | digest length | digest           |
//! | 0x01    | 0x55    | 0x12          | 0x20          | 32 bytes         |
//! +---------+---------+---------------+---------------+------------------+
//! ```
//!
//! Canonical text: `b` followed by the lowercase, unpadded base32 encoding of
//! all 36 bytes (59 characters in total).
//!
//! Only this single profile is accepted. Every other version, codec, hash
//! function or digest length is a `FormatError`.

use std::fmt;
use std::str::FromStr;

use multibase::Base;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::errors::{FormatError, FormatResult};

/// The only supported CID version
pub const CID_VERSION: u8 = 1;
/// Multicodec tag for raw binary content
pub const RAW_CODEC: u8 = 0x55;
/// Multihash tag for sha2-256
pub const SHA256_CODE: u8 = 0x12;
/// Digest length in bytes
pub const DIGEST_LENGTH: usize = 32;
/// Header length in bytes (version, codec, hash function, digest length)
pub const HEADER_LENGTH: usize = 4;
/// Total binary length
pub const IDENTIFIER_LENGTH: usize = HEADER_LENGTH + DIGEST_LENGTH;
/// Multibase prefix for lowercase base32
pub const MULTIBASE_BASE32: char = 'b';
/// Length of the canonical text form
pub const CANONICAL_TEXT_LENGTH: usize = 1 + (IDENTIFIER_LENGTH * 8 + 4) / 5;

/// Content codec of the identified blob
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Codec {
    /// Raw bytes (0x55)
    Raw,
}

impl Codec {
    /// Multicodec name
    pub fn name(&self) -> &'static str {
        match self {
            Codec::Raw => "raw",
        }
    }

    /// Multicodec tag
    pub fn code(&self) -> u8 {
        match self {
            Codec::Raw => RAW_CODEC,
        }
    }
}

/// Hash function that produced the digest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashFunction {
    /// sha2-256 (0x12)
    Sha256,
}

impl HashFunction {
    /// Multihash name
    pub fn name(&self) -> &'static str {
        match self {
            HashFunction::Sha256 => "sha256",
        }
    }

    /// Multihash tag
    pub fn code(&self) -> u8 {
        match self {
            HashFunction::Sha256 => SHA256_CODE,
        }
    }
}

/// A CIDv1 / raw / sha256 content identifier.
///
/// Immutable. The binary and textual forms are two views of the same value
/// and both round-trip losslessly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentIdentifier {
    digest: [u8; DIGEST_LENGTH],
}

impl ContentIdentifier {
    /// Builds an identifier around an existing sha256 digest.
    pub fn from_digest(digest: [u8; DIGEST_LENGTH]) -> Self {
        Self { digest }
    }

    /// Computes the identifier of a raw blob.
    pub fn for_data(data: &[u8]) -> Self {
        let mut digest = [0u8; DIGEST_LENGTH];
        digest.copy_from_slice(&Sha256::digest(data));
        Self { digest }
    }

    /// Decodes the 36-byte binary form.
    ///
    /// # Errors
    ///
    /// Returns `FormatError` if the length is not 36, or if the version,
    /// codec, hash function or digest length field do not match the profile.
    pub fn decode(bytes: &[u8]) -> FormatResult<Self> {
        if bytes.len() != IDENTIFIER_LENGTH {
            return Err(FormatError::InvalidLength(bytes.len()));
        }

        let (version, codec, hash_function, digest_length) =
            (bytes[0], bytes[1], bytes[2], bytes[3]);

        if version != CID_VERSION {
            return Err(FormatError::UnsupportedVersion(version));
        }
        if codec != RAW_CODEC {
            return Err(FormatError::UnsupportedCodec(codec));
        }
        if hash_function != SHA256_CODE {
            return Err(FormatError::UnsupportedHashFunction(hash_function));
        }
        if digest_length as usize != DIGEST_LENGTH {
            return Err(FormatError::InvalidDigestLength(digest_length));
        }

        let mut digest = [0u8; DIGEST_LENGTH];
        digest.copy_from_slice(&bytes[HEADER_LENGTH..]);
        Ok(Self { digest })
    }

    /// Parses the canonical text form (`b` + base32).
    ///
    /// The base32 body is accepted in either case. Padding, characters
    /// outside the alphabet and non-zero trailing bits are rejected.
    pub fn parse(text: &str) -> FormatResult<Self> {
        match text.chars().next() {
            Some(MULTIBASE_BASE32) => {}
            other => return Err(FormatError::UnsupportedMultibase(other)),
        }
        let (base, bytes) = multibase::decode(text.to_ascii_lowercase())
            .map_err(|e| FormatError::InvalidEncoding(e.to_string()))?;
        if base != Base::Base32Lower {
            return Err(FormatError::UnsupportedMultibase(Some(base.code())));
        }
        Self::decode(&bytes)
    }

    /// Returns the 36-byte binary form.
    pub fn to_bytes(&self) -> [u8; IDENTIFIER_LENGTH] {
        let mut bytes = [0u8; IDENTIFIER_LENGTH];
        bytes[0] = CID_VERSION;
        bytes[1] = RAW_CODEC;
        bytes[2] = SHA256_CODE;
        bytes[3] = DIGEST_LENGTH as u8;
        bytes[HEADER_LENGTH..].copy_from_slice(&self.digest);
        bytes
    }

    /// Returns the canonical text form.
    pub fn encode(&self) -> String {
        multibase::encode(Base::Base32Lower, self.to_bytes())
    }

    /// Always 1.
    pub fn version(&self) -> u8 {
        CID_VERSION
    }

    /// Always raw.
    pub fn codec(&self) -> Codec {
        Codec::Raw
    }

    /// Always sha256.
    pub fn hash_function(&self) -> HashFunction {
        HashFunction::Sha256
    }

    /// The 32-byte digest.
    pub fn digest(&self) -> &[u8; DIGEST_LENGTH] {
        &self.digest
    }
}

impl fmt::Display for ContentIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl FromStr for ContentIdentifier {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ContentIdentifier {
    type Error = FormatError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ContentIdentifier> for String {
    fn from(cid: ContentIdentifier) -> Self {
        cid.encode()
    }
}

impl TryFrom<&[u8]> for ContentIdentifier {
    type Error = FormatError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        Self::decode(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_BYTES: [u8; 36] = [
        1, 85, 18, 32, 53, 200, 170, 252, 248, 164, 102, 188, 130, 25, 215, 52, 203, 146, 215,
        60, 77, 125, 126, 70, 180, 46, 207, 17, 225, 206, 211, 81, 108, 209, 83, 250,
    ];
    const SAMPLE_TEXT: &str = "bafkreibvzcvpz6fem26iegoxgtfzfvz4jv6x4rvuf3hrdyoo2niwzukt7i";

    #[test]
    fn test_decode_sample_fields() {
        let cid = ContentIdentifier::decode(&SAMPLE_BYTES).unwrap();
        assert_eq!(cid.version(), 1);
        assert_eq!(cid.codec().name(), "raw");
        assert_eq!(cid.hash_function().name(), "sha256");
        assert_eq!(&cid.digest()[..], &SAMPLE_BYTES[4..]);
    }

    #[test]
    fn test_encode_sample() {
        let cid = ContentIdentifier::decode(&SAMPLE_BYTES).unwrap();
        let text = cid.encode();
        assert_eq!(text, SAMPLE_TEXT);
        assert_eq!(text.len(), CANONICAL_TEXT_LENGTH);
        assert_eq!(text.len(), 59);
    }

    #[test]
    fn test_parse_then_to_bytes() {
        let cid: ContentIdentifier = SAMPLE_TEXT.parse().unwrap();
        assert_eq!(cid.to_bytes(), SAMPLE_BYTES);
    }

    #[test]
    fn test_rejects_35_bytes() {
        assert_eq!(
            ContentIdentifier::decode(&SAMPLE_BYTES[..35]).unwrap_err(),
            FormatError::InvalidLength(35)
        );
    }

    #[test]
    fn test_rejects_each_header_field() {
        let mut bytes = SAMPLE_BYTES;
        bytes[0] = 0;
        assert_eq!(
            ContentIdentifier::decode(&bytes).unwrap_err(),
            FormatError::UnsupportedVersion(0)
        );

        let mut bytes = SAMPLE_BYTES;
        bytes[1] = 0x71;
        assert_eq!(
            ContentIdentifier::decode(&bytes).unwrap_err(),
            FormatError::UnsupportedCodec(0x71)
        );

        let mut bytes = SAMPLE_BYTES;
        bytes[2] = 0x13;
        assert_eq!(
            ContentIdentifier::decode(&bytes).unwrap_err(),
            FormatError::UnsupportedHashFunction(0x13)
        );

        let mut bytes = SAMPLE_BYTES;
        bytes[3] = 31;
        assert_eq!(
            ContentIdentifier::decode(&bytes).unwrap_err(),
            FormatError::InvalidDigestLength(31)
        );
    }

    #[test]
    fn test_parse_rejects_other_multibase() {
        assert_eq!(
            ContentIdentifier::parse("zQmSomething").unwrap_err(),
            FormatError::UnsupportedMultibase(Some('z'))
        );
        assert_eq!(
            ContentIdentifier::parse("").unwrap_err(),
            FormatError::UnsupportedMultibase(None)
        );
    }

    #[test]
    fn test_for_data_known_hash() {
        let cid = ContentIdentifier::for_data(b"hello world");
        assert_eq!(
            cid.to_string(),
            "bafkreifzjut3te2nhyekklss27nh3k72ysco7y32koao5eei66wof36n5e"
        );
        assert_eq!(cid, ContentIdentifier::for_data(b"hello world"));
        assert_ne!(cid, ContentIdentifier::for_data(b"hello world!"));
    }

    #[test]
    fn test_serde_uses_canonical_text() {
        let cid = ContentIdentifier::decode(&SAMPLE_BYTES).unwrap();
        let json = serde_json::to_string(&cid).unwrap();
        assert_eq!(json, format!("\"{}\"", SAMPLE_TEXT));

        let back: ContentIdentifier = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cid);

        assert!(serde_json::from_str::<ContentIdentifier>("\"bnotacid\"").is_err());
    }
}
