//! Reconciliation report

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::window::TimeWindow;
use crate::delivery::MessageId;

/// Per-collection set sizes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CollectionCounts {
    /// Listed by the source, inside the window if one is set
    pub authoritative: u64,
    /// Everything the store holds for the collection
    pub indexed: u64,
    pub missing: u64,
}

/// A missing record found queued in a delivery stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfirmedRecord {
    pub collection: String,
    pub rkey: String,
    pub stream: String,
    pub message_id: MessageId,
}

/// A missing record not found within the scan budget
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnconfirmedRecord {
    pub collection: String,
    pub rkey: String,
    pub created_at: Option<DateTime<Utc>>,
}

/// What the scan of one stream saw
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StreamSummary {
    pub stream: String,
    /// Stream length when the scan started
    pub length: u64,
    pub messages_scanned: u64,
    pub confirmed: u64,
    /// Scan ended early on this error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Full result of one check
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconciliationReport {
    pub identity: String,
    pub window: Option<TimeWindow>,
    pub total_authoritative: u64,
    pub total_indexed: u64,
    pub collections: BTreeMap<String, CollectionCounts>,
    pub confirmed: Vec<ConfirmedRecord>,
    pub unconfirmed: Vec<UnconfirmedRecord>,
    pub streams: Vec<StreamSummary>,
    /// Collections whose listing ended on an error
    pub fetch_errors: BTreeMap<String, String>,
    pub generated_at: DateTime<Utc>,
}

impl ReconciliationReport {
    pub fn total_missing(&self) -> u64 {
        self.collections.values().map(|c| c.missing).sum()
    }

    /// True when nothing is missing and every listing completed.
    pub fn is_clean(&self) -> bool {
        self.total_missing() == 0 && self.fetch_errors.is_empty()
    }
}

impl fmt::Display for ReconciliationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Reconciliation for {} ===", self.identity)?;
        if let Some(window) = &self.window {
            writeln!(f, "Window: {}", window)?;
        }
        writeln!(f, "Authoritative records: {}", self.total_authoritative)?;
        writeln!(f, "Indexed records:       {}", self.total_indexed)?;
        writeln!(f, "Missing records:       {}", self.total_missing())?;

        writeln!(f)?;
        writeln!(f, "{:<28} {:>12} {:>10} {:>10}", "collection", "authoritative", "indexed", "missing")?;
        for (collection, counts) in &self.collections {
            writeln!(
                f,
                "{:<28} {:>12} {:>10} {:>10}",
                collection, counts.authoritative, counts.indexed, counts.missing
            )?;
        }

        if !self.fetch_errors.is_empty() {
            writeln!(f)?;
            writeln!(f, "Fetch errors:")?;
            for (collection, error) in &self.fetch_errors {
                writeln!(f, "  {}: {}", collection, error)?;
            }
        }

        if !self.streams.is_empty() {
            writeln!(f)?;
            writeln!(f, "Delivery log:")?;
            for stream in &self.streams {
                write!(
                    f,
                    "  {}: scanned {} of {} messages, confirmed {}",
                    stream.stream, stream.messages_scanned, stream.length, stream.confirmed
                )?;
                if let Some(error) = &stream.error {
                    write!(f, " (stopped: {})", error)?;
                }
                writeln!(f)?;
            }
        }

        if !self.confirmed.is_empty() {
            writeln!(f)?;
            writeln!(f, "Queued but not yet indexed ({}):", self.confirmed.len())?;
            for record in &self.confirmed {
                writeln!(
                    f,
                    "  {}/{} in {} at {}",
                    record.collection, record.rkey, record.stream, record.message_id
                )?;
            }
        }

        if !self.unconfirmed.is_empty() {
            writeln!(f)?;
            writeln!(f, "Not found in delivery log ({}):", self.unconfirmed.len())?;
            for record in &self.unconfirmed {
                let created_at = record
                    .created_at
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| "unknown".to_string());
                writeln!(f, "  {}/{} created {}", record.collection, record.rkey, created_at)?;
            }
        }

        Ok(())
    }
}
