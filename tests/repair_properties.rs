//! Document repair properties
//!
//! - Every corrupted reference becomes a canonical link
//! - Nothing outside corrupted references changes
//! - A repaired document repairs to itself

use cidmend::cid::ContentIdentifier;
use cidmend::repair::{repair, repair_json, RAW_REFERENCE_MARKER};
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use serde_json::{json, Value};

fn random_cid(rng: &mut StdRng) -> ContentIdentifier {
    let mut digest = [0u8; 32];
    rng.fill_bytes(&mut digest);
    ContentIdentifier::from_digest(digest)
}

/// Builds a random document and the document it should repair to.
fn random_document(rng: &mut StdRng, depth: u32, fixes: &mut usize) -> (Value, Value) {
    if depth == 0 {
        let scalar = match rng.gen_range(0..4) {
            0 => json!(rng.gen::<i64>()),
            1 => json!(format!("s{}", rng.gen::<u16>())),
            2 => json!(rng.gen::<bool>()),
            _ => Value::Null,
        };
        return (scalar.clone(), scalar);
    }

    match rng.gen_range(0..4) {
        0 => {
            let cid = random_cid(rng);
            *fixes += 1;
            (
                json!({"$type": "blob", "ref": cid.to_bytes().to_vec(), "size": 10}),
                json!({"$type": "blob", "ref": {"$link": cid.encode()}, "size": 10}),
            )
        }
        1 => {
            let mut input = Vec::new();
            let mut expected = Vec::new();
            for _ in 0..rng.gen_range(0..4) {
                let (i, e) = random_document(rng, depth - 1, fixes);
                input.push(i);
                expected.push(e);
            }
            (Value::Array(input), Value::Array(expected))
        }
        2 => {
            // Near misses: 35 numbers, or an object without "ref"
            let short: Vec<u8> = (0..35).map(|_| rng.gen()).collect();
            let near_miss = json!({"ref": short, "bytes": [1, 85, 18, 32]});
            (near_miss.clone(), near_miss)
        }
        _ => {
            let mut input = serde_json::Map::new();
            let mut expected = serde_json::Map::new();
            for i in 0..rng.gen_range(0..4) {
                let (a, b) = random_document(rng, depth - 1, fixes);
                input.insert(format!("k{}", i), a);
                expected.insert(format!("k{}", i), b);
            }
            (Value::Object(input), Value::Object(expected))
        }
    }
}

#[test]
fn test_repair_matches_expected_and_is_idempotent() {
    let mut rng = StdRng::seed_from_u64(42);

    for _ in 0..200 {
        let mut fixes = 0;
        let (input, expected) = random_document(&mut rng, 4, &mut fixes);

        let (repaired, outcome) = repair(input);
        assert_eq!(repaired, expected);
        assert_eq!(outcome.fixes, fixes);
        assert!(outcome.skipped.is_empty());

        let (again, second) = repair(repaired.clone());
        assert_eq!(again, repaired);
        assert_eq!(second.fixes, 0);
    }
}

#[test]
fn test_repaired_text_has_no_raw_references() {
    let mut rng = StdRng::seed_from_u64(9);
    let cid = random_cid(&mut rng);
    let text = json!({
        "text": "post",
        "embed": {"images": [{"image": {"ref": cid.to_bytes().to_vec()}, "alt": ""}]}
    })
    .to_string();
    assert!(text.contains(RAW_REFERENCE_MARKER));

    let repaired = repair_json(&text).unwrap();

    assert_eq!(repaired.outcome.fixes, 1);
    assert!(!repaired.text.contains(RAW_REFERENCE_MARKER));
    assert!(repaired.text.contains(&cid.encode()));
    assert!(repaired.text.starts_with(r#"{"text":"post","embed":"#));
}

#[test]
fn test_undecodable_reference_is_skipped_with_pointer() {
    let mut bytes = vec![1u8, 0x71, 18, 32];
    bytes.extend([7u8; 32]);
    let document = json!({"a/b": [{"ref": bytes.clone()}]});

    let (repaired, outcome) = repair(document.clone());

    assert_eq!(repaired, document);
    assert_eq!(outcome.fixes, 0);
    assert_eq!(outcome.skipped.len(), 1);
    assert_eq!(outcome.skipped[0].pointer, "/a~1b/0/ref");
}
