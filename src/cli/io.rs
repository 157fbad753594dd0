//! Terminal and dump-file I/O for the CLI
//!
//! - Confirmation prompts read one line from stdin
//! - JSON output goes to stdout as a single object
//! - Record dumps are JSON lines of `{uri, json, indexed_at}`

use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use super::errors::{CliError, CliResult};
use crate::storage::StoredRecord;

/// Ask on stdout, read the answer from stdin.
pub fn confirm(prompt: &str) -> CliResult<bool> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    confirm_with(&mut stdin.lock(), &mut stdout, prompt)
}

/// True only when the answer is `yes`, in any case.
pub fn confirm_with<R: BufRead, W: Write>(input: &mut R, output: &mut W, prompt: &str) -> CliResult<bool> {
    write!(output, "{} (yes/no): ", prompt)?;
    output.flush()?;

    let mut line = String::new();
    input.read_line(&mut line)?;
    Ok(line.trim().eq_ignore_ascii_case("yes"))
}

/// Write a success response to stdout
pub fn write_response(data: Value) -> CliResult<()> {
    let response = serde_json::json!({
        "status": "ok",
        "data": data
    });

    let mut stdout = io::stdout();
    serde_json::to_writer(&mut stdout, &response)?;
    writeln!(stdout)?;
    stdout.flush()?;

    Ok(())
}

#[derive(Debug, Deserialize)]
struct DumpLine {
    uri: String,
    /// Body as JSON text or as an inline document
    json: Value,
    #[serde(default)]
    indexed_at: Option<DateTime<Utc>>,
}

impl DumpLine {
    fn into_record(self) -> StoredRecord {
        let body = match self.json {
            Value::String(text) => text,
            other => other.to_string(),
        };
        StoredRecord::new(self.uri, body, self.indexed_at.unwrap_or_else(Utc::now))
    }
}

/// Reads every record from a JSON lines dump. Blank lines are ignored.
pub fn read_dump(path: &Path) -> CliResult<Vec<StoredRecord>> {
    let file = File::open(path)
        .map_err(|e| CliError::io_error(format!("Failed to open {}: {}", path.display(), e)))?;
    parse_dump(BufReader::new(file))
}

pub fn parse_dump<R: BufRead>(reader: R) -> CliResult<Vec<StoredRecord>> {
    let mut records = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let parsed: DumpLine = serde_json::from_str(&line).map_err(|e| {
            CliError::invalid_input(format!("Dump line {}: {}", index + 1, e))
        })?;
        records.push(parsed.into_record());
    }
    Ok(records)
}
