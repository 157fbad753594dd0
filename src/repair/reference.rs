//! Reference node shapes
//!
//! A well-formed blob reference holds a canonical link:
//!
//! ```text
//! {"ref": {"$link": "bafkrei..."}}
//! ```
//!
//! The corrupted shape holds the raw identifier bytes instead:
//!
//! ```text
//! {"ref": [1, 85, 18, 32, ...32 digest bytes...]}
//! ```
//!
//! Only arrays of exactly 36 integers in 0..=255 are treated as corrupted.
//! Shorter or longer arrays are ordinary data and are never rewritten.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::cid::{ContentIdentifier, FormatResult, IDENTIFIER_LENGTH};

/// Mapping key that holds a blob reference
pub const REF_KEY: &str = "ref";

/// Mapping key of a canonical link object
pub const LINK_KEY: &str = "$link";

/// Raw identifier bytes found under a `"ref"` key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorruptedReference {
    bytes: [u8; IDENTIFIER_LENGTH],
}

impl CorruptedReference {
    /// Interprets a `"ref"` value as raw identifier bytes.
    ///
    /// Returns `None` when the value has any other shape, so the caller can
    /// fall through to ordinary traversal.
    pub fn parse(value: &Value) -> Option<Self> {
        let items = value.as_array()?;
        if items.len() != IDENTIFIER_LENGTH {
            return None;
        }

        let mut bytes = [0u8; IDENTIFIER_LENGTH];
        for (slot, item) in bytes.iter_mut().zip(items) {
            *slot = u8::try_from(item.as_u64()?).ok()?;
        }

        Some(Self { bytes })
    }

    /// The raw bytes as stored.
    pub fn bytes(&self) -> &[u8; IDENTIFIER_LENGTH] {
        &self.bytes
    }

    /// Decodes the bytes into a canonical link.
    ///
    /// Fails when the bytes have the right length but a malformed header.
    pub fn to_link(&self) -> FormatResult<CanonicalLink> {
        ContentIdentifier::decode(&self.bytes).map(CanonicalLink::new)
    }
}

/// `{"$link": "<canonical identifier>"}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalLink {
    #[serde(rename = "$link")]
    link: ContentIdentifier,
}

impl CanonicalLink {
    /// Wraps an identifier
    pub fn new(link: ContentIdentifier) -> Self {
        Self { link }
    }

    /// The linked identifier
    pub fn identifier(&self) -> &ContentIdentifier {
        &self.link
    }

    /// Interprets a value as a canonical link object.
    pub fn parse(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        if object.len() != 1 {
            return None;
        }
        let text = object.get(LINK_KEY)?.as_str()?;
        ContentIdentifier::parse(text).ok().map(Self::new)
    }

    /// Builds the JSON object form.
    pub fn to_value(&self) -> Value {
        let mut object = Map::with_capacity(1);
        object.insert(LINK_KEY.to_string(), Value::String(self.link.encode()));
        Value::Object(object)
    }
}
