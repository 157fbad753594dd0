//! Shared fixtures for integration tests

#![allow(dead_code)]

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use cidmend::delivery::{stream_path, DeliveryEntry, MessageId};

/// Appends one entry to `<log_dir>/<stream>.log` the way the producer does.
pub fn append_entry(log_dir: &Path, stream: &str, id: MessageId, identity: &str, path: &str) {
    fs::create_dir_all(log_dir).unwrap();
    let entry = DeliveryEntry {
        id,
        identity: identity.to_string(),
        path: path.to_string(),
        payload: b"{}".to_vec(),
    };
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(stream_path(log_dir, stream))
        .unwrap();
    file.write_all(&entry.serialize()).unwrap();
}
