//! Record URIs
//!
//! `at://<origin identity>/<collection>/<record key>`

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;

use super::errors::{StorageError, StorageResult};

const SCHEME: &str = "at://";

fn uri_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^at://([^/]+)/([^/]+)/([^/]+)$").expect("static regex"))
}

/// A validated record URI
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordUri {
    identity: String,
    collection: String,
    rkey: String,
}

impl RecordUri {
    /// Builds a URI from its parts.
    pub fn new(
        identity: impl Into<String>,
        collection: impl Into<String>,
        rkey: impl Into<String>,
    ) -> StorageResult<Self> {
        let uri = format!("{}{}/{}/{}", SCHEME, identity.into(), collection.into(), rkey.into());
        Self::parse(&uri)
    }

    /// Parses and validates a URI string.
    pub fn parse(text: &str) -> StorageResult<Self> {
        let captures = uri_pattern()
            .captures(text)
            .ok_or_else(|| StorageError::invalid_uri(text))?;

        Ok(Self {
            identity: captures[1].to_string(),
            collection: captures[2].to_string(),
            rkey: captures[3].to_string(),
        })
    }

    /// Origin identity (e.g. a DID)
    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Record key, the last path segment
    pub fn rkey(&self) -> &str {
        &self.rkey
    }

    /// Common prefix of every URI belonging to `identity`.
    pub fn origin_prefix(identity: &str) -> String {
        format!("{}{}/", SCHEME, identity)
    }
}

impl fmt::Display for RecordUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}/{}/{}", SCHEME, self.identity, self.collection, self.rkey)
    }
}

impl FromStr for RecordUri {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_components() {
        let uri = RecordUri::parse("at://did:plc:abc123/app.bsky.feed.post/3kabc").unwrap();
        assert_eq!(uri.identity(), "did:plc:abc123");
        assert_eq!(uri.collection(), "app.bsky.feed.post");
        assert_eq!(uri.rkey(), "3kabc");
        assert_eq!(uri.to_string(), "at://did:plc:abc123/app.bsky.feed.post/3kabc");
    }

    #[test]
    fn test_rejects_malformed() {
        for bad in [
            "",
            "at://did:plc:abc/app.bsky.feed.post",
            "at://did:plc:abc/app.bsky.feed.post/3k/extra",
            "https://did:plc:abc/app.bsky.feed.post/3k",
            "at:///app.bsky.feed.post/3k",
        ] {
            let err = RecordUri::parse(bad).unwrap_err();
            assert_eq!(err.code().code(), "MEND_STORAGE_INVALID_URI");
        }
    }

    #[test]
    fn test_new_and_prefix() {
        let uri = RecordUri::new("did:plc:abc", "app.bsky.actor.profile", "self").unwrap();
        assert!(uri.to_string().starts_with(&RecordUri::origin_prefix("did:plc:abc")));
        assert!(RecordUri::new("did:plc:abc", "a/b", "self").is_err());
    }
}
