//! Depth-first document repair
//!
//! Every mapping entry keyed `"ref"` whose value is a corrupted reference is
//! replaced by a canonical link object. All other nodes are copied through
//! unchanged, key order included.
//!
//! A reference with the right length but a malformed header is left as it
//! is, logged with its JSON pointer and counted as skipped.

use serde_json::{Map, Value};

use super::errors::{RepairError, RepairResult};
use super::reference::{CorruptedReference, REF_KEY};
use crate::cid::FormatError;
use crate::observability::{log_event_with_fields, Event};

/// A reference that looked corrupted but could not be decoded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedReference {
    /// RFC 6901 pointer to the `"ref"` value
    pub pointer: String,
    pub error: FormatError,
}

/// What one repair pass did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepairOutcome {
    /// Number of references rewritten
    pub fixes: usize,
    pub skipped: Vec<SkippedReference>,
}

impl RepairOutcome {
    /// True when the document was rewritten
    pub fn changed(&self) -> bool {
        self.fixes > 0
    }
}

/// Repaired document in text form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepairedJson {
    pub text: String,
    pub outcome: RepairOutcome,
}

/// Repairs a parsed document.
pub fn repair(document: Value) -> (Value, RepairOutcome) {
    let mut walker = Walker::default();
    let repaired = walker.visit(document);
    (repaired, walker.outcome)
}

/// Parses, repairs and re-serializes a document.
///
/// The returned text is only meaningful when `outcome.changed()`; callers
/// that see no fixes should keep the original text.
pub fn repair_json(text: &str) -> RepairResult<RepairedJson> {
    let document: Value = serde_json::from_str(text)?;
    let (repaired, outcome) = repair(document);
    let text = serde_json::to_string(&repaired).map_err(RepairError::Serialize)?;
    Ok(RepairedJson { text, outcome })
}

enum Segment {
    Key(String),
    Index(usize),
}

#[derive(Default)]
struct Walker {
    path: Vec<Segment>,
    outcome: RepairOutcome,
}

impl Walker {
    fn visit(&mut self, value: Value) -> Value {
        match value {
            Value::Object(map) => Value::Object(self.visit_object(map)),
            Value::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for (index, item) in items.into_iter().enumerate() {
                    self.path.push(Segment::Index(index));
                    out.push(self.visit(item));
                    self.path.pop();
                }
                Value::Array(out)
            }
            scalar => scalar,
        }
    }

    fn visit_object(&mut self, map: Map<String, Value>) -> Map<String, Value> {
        let mut out = Map::with_capacity(map.len());
        for (key, value) in map {
            self.path.push(Segment::Key(key.clone()));
            let value = if key == REF_KEY {
                self.visit_reference(value)
            } else {
                self.visit(value)
            };
            self.path.pop();
            out.insert(key, value);
        }
        out
    }

    fn visit_reference(&mut self, value: Value) -> Value {
        let Some(reference) = CorruptedReference::parse(&value) else {
            return self.visit(value);
        };

        match reference.to_link() {
            Ok(link) => {
                self.outcome.fixes += 1;
                link.to_value()
            }
            Err(error) => {
                let pointer = self.pointer();
                let reason = error.to_string();
                log_event_with_fields(
                    Event::RepairReferenceSkipped,
                    &[("pointer", &pointer), ("reason", &reason)],
                );
                self.outcome.skipped.push(SkippedReference { pointer, error });
                value
            }
        }
    }

    fn pointer(&self) -> String {
        let mut pointer = String::new();
        for segment in &self.path {
            pointer.push('/');
            match segment {
                Segment::Key(key) => pointer.push_str(&key.replace('~', "~0").replace('/', "~1")),
                Segment::Index(index) => pointer.push_str(&index.to_string()),
            }
        }
        pointer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cid::ContentIdentifier;
    use serde_json::json;

    fn sample() -> ContentIdentifier {
        ContentIdentifier::for_data(b"image bytes")
    }

    fn corrupted(cid: &ContentIdentifier) -> Value {
        json!(cid.to_bytes().to_vec())
    }

    #[test]
    fn test_repairs_nested_image_reference() {
        let cid = sample();
        let doc = json!({
            "text": "hi",
            "embed": {"images": [{"image": {"ref": corrupted(&cid), "mimeType": "image/jpeg"}}]}
        });

        let (repaired, outcome) = repair(doc);
        assert_eq!(outcome.fixes, 1);
        assert!(outcome.skipped.is_empty());
        assert_eq!(
            repaired["embed"]["images"][0]["image"]["ref"],
            json!({"$link": cid.encode()})
        );
        assert_eq!(repaired["embed"]["images"][0]["image"]["mimeType"], "image/jpeg");
        assert_eq!(repaired["text"], "hi");
    }

    #[test]
    fn test_counts_every_reference() {
        let a = ContentIdentifier::for_data(b"a");
        let b = ContentIdentifier::for_data(b"b");
        let doc = json!({"avatar": {"ref": corrupted(&a)}, "banner": {"ref": corrupted(&b)}});

        let (repaired, outcome) = repair(doc);
        assert_eq!(outcome.fixes, 2);
        assert_eq!(repaired["avatar"]["ref"]["$link"], a.encode());
        assert_eq!(repaired["banner"]["ref"]["$link"], b.encode());
    }

    #[test]
    fn test_leaves_canonical_and_unrelated_arrays() {
        let doc = json!({
            "image": {"ref": {"$link": sample().encode()}},
            "ref": [1, 2, 3],
            "bytes": corrupted(&sample())
        });

        let (repaired, outcome) = repair(doc.clone());
        assert_eq!(outcome, RepairOutcome::default());
        assert_eq!(repaired, doc);
    }

    #[test]
    fn test_is_idempotent() {
        let doc = json!({"image": {"ref": corrupted(&sample())}});
        let (once, first) = repair(doc);
        let (twice, second) = repair(once.clone());

        assert_eq!(first.fixes, 1);
        assert_eq!(second.fixes, 0);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_malformed_reference_is_skipped_with_pointer() {
        let mut bytes = sample().to_bytes().to_vec();
        bytes[0] = 0;
        let doc = json!({"embed": {"images": [{"image": {"ref": bytes.clone()}}]}});

        let (repaired, outcome) = repair(doc.clone());
        assert_eq!(outcome.fixes, 0);
        assert_eq!(outcome.skipped.len(), 1);
        assert_eq!(outcome.skipped[0].pointer, "/embed/images/0/image/ref");
        assert_eq!(outcome.skipped[0].error, FormatError::UnsupportedVersion(0));
        assert_eq!(repaired, doc);
    }

    #[test]
    fn test_pointer_escapes_keys() {
        let mut bytes = sample().to_bytes().to_vec();
        bytes[1] = 0x70;
        let doc = json!({"a/b": {"c~d": {"ref": bytes}}});

        let (_, outcome) = repair(doc);
        assert_eq!(outcome.skipped[0].pointer, "/a~1b/c~0d/ref");
    }

    #[test]
    fn test_repair_json_preserves_key_order() {
        let cid = sample();
        let text = format!(
            r#"{{"zeta":1,"image":{{"ref":{},"size":10}},"alpha":2}}"#,
            serde_json::to_string(&cid.to_bytes().to_vec()).unwrap()
        );

        let repaired = repair_json(&text).unwrap();
        assert!(repaired.outcome.changed());
        assert_eq!(
            repaired.text,
            format!(
                r#"{{"zeta":1,"image":{{"ref":{{"$link":"{}"}},"size":10}},"alpha":2}}"#,
                cid
            )
        );
    }

    #[test]
    fn test_repair_json_rejects_invalid_text() {
        let err = repair_json("{not json").unwrap_err();
        assert!(matches!(err, RepairError::InvalidJson(_)));
        assert_eq!(err.code(), "MEND_SERIALIZATION_ERROR");
    }
}
