//! Authoritative record listings
//!
//! Pages are ordered by record key. A page carries the cursor for the next
//! one; a missing cursor or an empty page ends the listing.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::errors::{SourceError, SourceResult};
use crate::observability::{log_event_with_fields, Event};
use crate::storage::RecordUri;

/// One record as the source lists it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRecord {
    pub uri: String,
    pub value: Value,
}

impl SourceRecord {
    pub fn new(uri: impl Into<String>, value: Value) -> Self {
        Self {
            uri: uri.into(),
            value,
        }
    }

    /// Trailing URI segment.
    pub fn rkey(&self) -> &str {
        self.uri.rsplit('/').next().unwrap_or_default()
    }

    /// `value.createdAt` when it is a valid RFC 3339 timestamp.
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        let text = self.value.get("createdAt")?.as_str()?;
        DateTime::parse_from_rfc3339(text)
            .ok()
            .map(|t| t.with_timezone(&Utc))
    }
}

/// One page of a collection listing
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListPage {
    pub records: Vec<SourceRecord>,
    pub cursor: Option<String>,
}

/// Source of truth for which records exist
pub trait AuthoritativeSource {
    /// Lists `collection` of `identity` after `cursor`, at most `page_size`.
    fn list_collection(
        &self,
        identity: &str,
        collection: &str,
        cursor: Option<&str>,
        page_size: usize,
    ) -> SourceResult<ListPage>;
}

/// Pages one collection's records, already sorted by record key.
fn page_of(records: &[SourceRecord], cursor: Option<&str>, page_size: usize) -> ListPage {
    let start = match cursor {
        Some(cursor) => records.partition_point(|r| r.rkey() <= cursor),
        None => 0,
    };
    let end = (start + page_size).min(records.len());
    let page: Vec<SourceRecord> = records[start..end].to_vec();

    let cursor = if end < records.len() {
        page.last().map(|r| r.rkey().to_string())
    } else {
        None
    };

    ListPage {
        records: page,
        cursor,
    }
}

type Collections = BTreeMap<String, Vec<SourceRecord>>;

/// Source backed by repository export files
///
/// `<source_dir>/<identity with ':' replaced by '_'>.json` holds a JSON array
/// of `{uri, value}` objects for every collection of that identity.
pub struct ExportSource {
    source_dir: PathBuf,
    loaded: Mutex<HashMap<String, Arc<Collections>>>,
}

impl ExportSource {
    pub fn new(source_dir: &Path) -> Self {
        Self {
            source_dir: source_dir.to_path_buf(),
            loaded: Mutex::new(HashMap::new()),
        }
    }

    /// Export file path for `identity`.
    pub fn export_path(&self, identity: &str) -> PathBuf {
        self.source_dir.join(format!("{}.json", identity.replace(':', "_")))
    }

    fn load(&self, identity: &str) -> SourceResult<Arc<Collections>> {
        let mut loaded = self
            .loaded
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(collections) = loaded.get(identity) {
            return Ok(Arc::clone(collections));
        }

        let path = self.export_path(identity);
        let text = fs::read_to_string(&path).map_err(|source| SourceError::Io {
            path: path.clone(),
            source,
        })?;
        let records: Vec<SourceRecord> =
            serde_json::from_str(&text).map_err(|source| SourceError::Malformed {
                path: path.clone(),
                source,
            })?;

        let mut collections = Collections::new();
        for record in records {
            let uri = RecordUri::parse(&record.uri)
                .map_err(|_| SourceError::InvalidUri(record.uri.clone()))?;
            if uri.identity() != identity {
                log_event_with_fields(
                    Event::SourceForeignRecordSkipped,
                    &[("identity", identity), ("uri", &record.uri)],
                );
                continue;
            }
            collections
                .entry(uri.collection().to_string())
                .or_default()
                .push(record);
        }
        for records in collections.values_mut() {
            records.sort_by(|a, b| a.rkey().cmp(b.rkey()));
        }

        let collections = Arc::new(collections);
        loaded.insert(identity.to_string(), Arc::clone(&collections));
        Ok(collections)
    }
}

impl AuthoritativeSource for ExportSource {
    fn list_collection(
        &self,
        identity: &str,
        collection: &str,
        cursor: Option<&str>,
        page_size: usize,
    ) -> SourceResult<ListPage> {
        let collections = self.load(identity)?;
        Ok(collections
            .get(collection)
            .map(|records| page_of(records, cursor, page_size))
            .unwrap_or_default())
    }
}

/// In-memory source with injectable failures
#[derive(Default)]
pub struct MemorySource {
    records: BTreeMap<(String, String), Vec<SourceRecord>>,
    failures: Mutex<HashMap<String, VecDeque<SourceError>>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a record; the URI decides identity and collection.
    pub fn insert(&mut self, record: SourceRecord) -> SourceResult<()> {
        let uri = RecordUri::parse(&record.uri)
            .map_err(|_| SourceError::InvalidUri(record.uri.clone()))?;
        let records = self
            .records
            .entry((uri.identity().to_string(), uri.collection().to_string()))
            .or_default();
        records.push(record);
        records.sort_by(|a, b| a.rkey().cmp(b.rkey()));
        Ok(())
    }

    /// Makes the next listing call for `collection` fail with `error`.
    pub fn fail_next(&self, collection: &str, error: SourceError) {
        self.failures
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .entry(collection.to_string())
            .or_default()
            .push_back(error);
    }
}

impl AuthoritativeSource for MemorySource {
    fn list_collection(
        &self,
        identity: &str,
        collection: &str,
        cursor: Option<&str>,
        page_size: usize,
    ) -> SourceResult<ListPage> {
        let injected = self
            .failures
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get_mut(collection)
            .and_then(VecDeque::pop_front);
        if let Some(error) = injected {
            return Err(error);
        }

        Ok(self
            .records
            .get(&(identity.to_string(), collection.to_string()))
            .map(|records| page_of(records, cursor, page_size))
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn post(rkey: &str, created_at: &str) -> SourceRecord {
        SourceRecord::new(
            format!("at://did:plc:a/app.bsky.feed.post/{}", rkey),
            json!({"text": "x", "createdAt": created_at}),
        )
    }

    #[test]
    fn test_created_at_parsing() {
        assert!(post("1", "2025-10-14T12:00:00.000Z").created_at().is_some());
        assert!(post("1", "2025-10-14T12:00:00+02:00").created_at().is_some());
        assert!(post("1", "yesterday").created_at().is_none());
        assert!(SourceRecord::new("at://a/b/c", json!({})).created_at().is_none());
    }

    #[test]
    fn test_paging_with_cursor() {
        let records: Vec<SourceRecord> = ["a", "b", "c", "d", "e"]
            .iter()
            .map(|k| post(k, "2025-01-01T00:00:00Z"))
            .collect();

        let first = page_of(&records, None, 2);
        assert_eq!(first.records.len(), 2);
        assert_eq!(first.cursor.as_deref(), Some("b"));

        let second = page_of(&records, first.cursor.as_deref(), 2);
        assert_eq!(second.records[0].rkey(), "c");

        let last = page_of(&records, Some("d"), 2);
        assert_eq!(last.records.len(), 1);
        assert!(last.cursor.is_none());
    }

    #[test]
    fn test_memory_source_injected_failure() {
        let mut source = MemorySource::new();
        source.insert(post("1", "2025-01-01T00:00:00Z")).unwrap();
        source.fail_next("app.bsky.feed.post", SourceError::RateLimited { retry_after: None });

        assert!(source
            .list_collection("did:plc:a", "app.bsky.feed.post", None, 10)
            .is_err());
        let page = source
            .list_collection("did:plc:a", "app.bsky.feed.post", None, 10)
            .unwrap();
        assert_eq!(page.records.len(), 1);
    }

    #[test]
    fn test_export_source_reads_identity_file() {
        let temp_dir = TempDir::new().unwrap();
        let records = vec![
            post("2", "2025-01-02T00:00:00Z"),
            post("1", "2025-01-01T00:00:00Z"),
            SourceRecord::new("at://did:plc:a/app.bsky.feed.like/9", json!({})),
        ];
        fs::write(
            temp_dir.path().join("did_plc_a.json"),
            serde_json::to_string(&records).unwrap(),
        )
        .unwrap();

        let source = ExportSource::new(temp_dir.path());
        let page = source
            .list_collection("did:plc:a", "app.bsky.feed.post", None, 10)
            .unwrap();
        let keys: Vec<&str> = page.records.iter().map(|r| r.rkey()).collect();
        assert_eq!(keys, vec!["1", "2"]);

        let empty = source
            .list_collection("did:plc:a", "app.bsky.graph.block", None, 10)
            .unwrap();
        assert!(empty.records.is_empty());
    }

    #[test]
    fn test_export_source_ignores_other_identities() {
        let temp_dir = TempDir::new().unwrap();
        let records = vec![
            post("1", "2025-01-01T00:00:00Z"),
            SourceRecord::new("at://did:plc:b/app.bsky.feed.post/2", json!({})),
        ];
        fs::write(
            temp_dir.path().join("did_plc_a.json"),
            serde_json::to_string(&records).unwrap(),
        )
        .unwrap();

        let source = ExportSource::new(temp_dir.path());
        let page = source
            .list_collection("did:plc:a", "app.bsky.feed.post", None, 10)
            .unwrap();
        let uris: Vec<&str> = page.records.iter().map(|r| r.uri.as_str()).collect();
        assert_eq!(uris, vec!["at://did:plc:a/app.bsky.feed.post/1"]);
    }

    #[test]
    fn test_export_source_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let source = ExportSource::new(temp_dir.path());
        let err = source
            .list_collection("did:plc:zzz", "app.bsky.feed.post", None, 10)
            .unwrap_err();
        assert_eq!(err.code(), "MEND_SOURCE_IO_ERROR");
    }
}
