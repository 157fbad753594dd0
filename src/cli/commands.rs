//! CLI command implementations
//!
//! Each command loads the JSON config, opens what it needs and prints
//! operator-facing progress to stdout. Structured logs go through the
//! observability logger alongside.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cid::{bytes_to_canonical, canonical_to_bytes};
use crate::delivery::FileDeliveryLog;
use crate::migration::{
    MigrationDriver, MigrationMode, MigrationOptions, MigrationSummary, ResumeCursor,
};
use crate::observability::{log_event_with_fields, Event, Logger, Severity};
use crate::reconcile::{
    CheckOptions, ReconciliationChecker, ScanBudget, TimeWindow, DEFAULT_COLLECTIONS,
    DEFAULT_STREAMS,
};
use crate::source::{ExportSource, RetryPolicy};
use crate::storage::{FileRecordStore, RecordFilter, RecordStore};

use super::args::Command;
use super::errors::{CliError, CliResult};
use super::io::{confirm, read_dump, write_response};

/// Configuration file structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Data directory (required)
    pub data_dir: String,

    /// Delivery log directory (optional, default `<data_dir>/delivery`)
    #[serde(default)]
    pub delivery_log_dir: Option<String>,

    /// Authoritative export directory (optional, default `<data_dir>/exports`)
    #[serde(default)]
    pub source_dir: Option<String>,

    /// Delivery streams scanned by `check`
    #[serde(default = "default_streams")]
    pub streams: Vec<String>,

    /// Collections reconciled by `check`
    #[serde(default = "default_collections")]
    pub collections: Vec<String>,

    /// Records per migration batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Source listing page size
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Messages per reverse-scan batch
    #[serde(default = "default_scan_batch_size")]
    pub scan_batch_size: usize,

    /// Reverse-scan batches per stream
    #[serde(default = "default_scan_max_batches")]
    pub scan_max_batches: usize,

    /// Attempts per source page, including the first
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    /// Sleep between attempts
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

fn default_streams() -> Vec<String> {
    DEFAULT_STREAMS.iter().map(|s| s.to_string()).collect()
}
fn default_collections() -> Vec<String> {
    DEFAULT_COLLECTIONS.iter().map(|c| c.to_string()).collect()
}
fn default_batch_size() -> usize {
    1000
}
fn default_page_size() -> usize {
    100
}
fn default_scan_batch_size() -> usize {
    10_000
}
fn default_scan_max_batches() -> usize {
    20
}
fn default_retry_attempts() -> u32 {
    5
}
fn default_retry_delay_ms() -> u64 {
    1000
}

impl Config {
    /// Load configuration from file
    pub fn load(path: &Path) -> CliResult<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| CliError::config_error(format!("Failed to read config: {}", e)))?;

        let config: Config = serde_json::from_str(&content)
            .map_err(|e| CliError::config_error(format!("Invalid config JSON: {}", e)))?;

        config.validate()?;

        log_event_with_fields(
            Event::ConfigLoaded,
            &[("path", &path.display().to_string()), ("data_dir", &config.data_dir)],
        );
        Ok(config)
    }

    fn validate(&self) -> CliResult<()> {
        if self.data_dir.trim().is_empty() {
            return Err(CliError::config_error("data_dir must not be empty"));
        }

        let positive = [
            ("batch_size", self.batch_size),
            ("page_size", self.page_size),
            ("scan_batch_size", self.scan_batch_size),
            ("scan_max_batches", self.scan_max_batches),
            ("retry_attempts", self.retry_attempts as usize),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(CliError::config_error(format!("{} must be > 0", name)));
            }
        }

        if self.streams.is_empty() {
            return Err(CliError::config_error("streams must name at least one stream"));
        }
        if self.collections.is_empty() {
            return Err(CliError::config_error(
                "collections must name at least one collection",
            ));
        }

        Ok(())
    }

    /// Get data directory as Path
    pub fn data_path(&self) -> &Path {
        Path::new(&self.data_dir)
    }

    pub fn delivery_log_path(&self) -> PathBuf {
        match &self.delivery_log_dir {
            Some(dir) => PathBuf::from(dir),
            None => self.data_path().join("delivery"),
        }
    }

    pub fn source_path(&self) -> PathBuf {
        match &self.source_dir {
            Some(dir) => PathBuf::from(dir),
            None => self.data_path().join("exports"),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry_attempts, Duration::from_millis(self.retry_delay_ms))
    }

    pub fn scan_budget(&self) -> ScanBudget {
        ScanBudget::new(self.scan_batch_size, self.scan_max_batches)
    }
}

/// Flags of the `fix` command
#[derive(Debug, Clone, Default)]
pub struct FixFlags {
    pub dry_run: bool,
    pub limit: Option<u64>,
    pub batch_size: Option<usize>,
    pub skip_count: bool,
    pub yes: bool,
    pub resume: bool,
}

/// Flags of the `check` command
#[derive(Debug, Clone, Default)]
pub struct CheckFlags {
    pub identity: String,
    pub start: Option<String>,
    pub end: Option<String>,
    pub collections: Vec<String>,
    pub json: bool,
}

/// Main CLI entry point
///
/// Parses arguments and dispatches to the appropriate command.
/// This is the only function that main.rs should call.
pub fn run() -> CliResult<()> {
    let cli = super::args::Cli::parse_args();
    run_command(cli.command)
}

/// Run the appropriate command based on CLI args
pub fn run_command(cmd: Command) -> CliResult<()> {
    match cmd {
        Command::Fix {
            config,
            dry_run,
            limit,
            batch_size,
            skip_count,
            yes,
            resume,
        } => fix(
            &config,
            FixFlags {
                dry_run,
                limit,
                batch_size,
                skip_count,
                yes,
                resume,
            },
        )
        .map(|_| ()),
        Command::FixOne {
            config,
            uri,
            dry_run,
            yes,
        } => fix_one(&config, &uri, dry_run, yes),
        Command::Check {
            config,
            identity,
            start,
            end,
            collections,
            json,
        } => check(
            &config,
            CheckFlags {
                identity,
                start,
                end,
                collections,
                json,
            },
        ),
        Command::Convert { input } => {
            println!("{}", convert(&input)?);
            Ok(())
        }
        Command::Count { config } => count(&config).map(|_| ()),
        Command::Import { config, input } => import(&config, &input).map(|_| ()),
    }
}

fn mode_of(dry_run: bool) -> MigrationMode {
    if dry_run {
        MigrationMode::DryRun
    } else {
        MigrationMode::Live
    }
}

/// Batch repair of the whole store
///
/// Returns `None` when the operator declines the confirmation prompt.
pub fn fix(config_path: &Path, flags: FixFlags) -> CliResult<Option<MigrationSummary>> {
    let config = Config::load(config_path)?;
    let mode = mode_of(flags.dry_run);

    println!("CID Corruption Migration");
    println!("{}", "=".repeat(50));
    if mode.is_live() {
        println!("MODE: LIVE (changes will be applied)");
        if !flags.yes && !confirm("Are you sure you want to proceed?")? {
            println!("Aborted.");
            return Ok(None);
        }
    } else {
        println!("MODE: DRY RUN (no changes will be made)");
    }

    let mut store = FileRecordStore::open(config.data_path())?;

    let mut options = MigrationOptions::new(mode);
    options.batch_size = flags.batch_size.unwrap_or(config.batch_size);
    options.limit = flags.limit;
    options.skip_count = flags.skip_count;
    if mode.is_live() {
        options.cursor_dir = Some(config.data_path().to_path_buf());
    }
    if options.batch_size == 0 {
        return Err(CliError::invalid_input("--batch-size must be > 0"));
    }

    let cursor = if flags.resume {
        ResumeCursor::load(config.data_path())?
    } else {
        None
    };

    let mut driver = match cursor {
        Some(cursor) => {
            println!(
                "Resuming run {} after {}",
                cursor.run_id,
                cursor.last_key.as_deref().unwrap_or("(start)")
            );
            MigrationDriver::resume(&mut store, options, cursor)
        }
        None => {
            if flags.resume {
                println!("No resume cursor found, starting from the beginning");
            }
            MigrationDriver::new(&mut store, options)
        }
    };

    if flags.skip_count {
        println!("Skipping count (will process until no more records found)");
    }

    let summary = driver.run_with_progress(|totals| {
        println!(
            "Progress: {} records processed, {} fixed, {} identifiers",
            totals.records_processed, totals.records_fixed, totals.identifiers_fixed
        );
    })?;

    if let Some(candidates) = summary.candidates {
        println!("Found {} broken records at start", candidates);
    }
    if let Some(limit) = flags.limit {
        if summary.totals.records_processed >= limit {
            println!("Reached limit of {} records", limit);
        }
    }

    let t = &summary.totals;
    println!();
    println!("{}COMPLETE!", if mode.is_live() { "" } else { "DRY RUN " });
    println!("Records processed:      {}", t.records_processed);
    println!("Records fixed:          {}", t.records_fixed);
    println!("Identifiers fixed:      {}", t.identifiers_fixed);
    println!("Records skipped:        {}", t.records_skipped);
    println!("References skipped:     {}", t.references_skipped);
    println!("Batches:                {}", t.batches_committed);
    if let Some(last_key) = &summary.last_key {
        println!("Last key:               {}", last_key);
    }

    Ok(Some(summary))
}

/// Repair of one record by URI
pub fn fix_one(config_path: &Path, uri: &str, dry_run: bool, yes: bool) -> CliResult<()> {
    let config = Config::load(config_path)?;
    let mode = mode_of(dry_run);

    if mode.is_live() && !yes && !confirm(&format!("Rewrite {}?", uri))? {
        println!("Aborted.");
        return Ok(());
    }

    let mut store = FileRecordStore::open(config.data_path())?;
    let mut driver = MigrationDriver::new(&mut store, MigrationOptions::new(mode));
    let fix = driver.fix_record(uri)?;

    for skipped in &fix.outcome.skipped {
        println!("  Skipped reference at {}: {}", skipped.pointer, skipped.error);
    }

    match (&fix.repaired_body, fix.persisted) {
        (None, _) => println!("No corrupted identifiers in {}", fix.uri),
        (Some(_), true) => println!("Fixed {} identifier(s) in {}", fix.outcome.fixes, fix.uri),
        (Some(body), false) => {
            println!(
                "[DRY RUN] Would fix {} identifier(s) in {}",
                fix.outcome.fixes, fix.uri
            );
            println!("{}", body);
        }
    }

    Ok(())
}

/// Reconciliation report for one identity
pub fn check(config_path: &Path, flags: CheckFlags) -> CliResult<()> {
    if flags.json {
        // Keep stdout clean for the report
        Logger::set_min_severity(Severity::Error);
    }

    let config = Config::load(config_path)?;
    let window = TimeWindow::from_bounds(flags.start.as_deref(), flags.end.as_deref())?;

    let store = FileRecordStore::open(config.data_path())?;
    let source = ExportSource::new(&config.source_path());
    let log = FileDeliveryLog::open(&config.delivery_log_path());

    let mut options = CheckOptions::new(flags.identity);
    options.collections = if flags.collections.is_empty() {
        config.collections.clone()
    } else {
        flags.collections
    };
    options.streams = config.streams.clone();
    options.page_size = config.page_size;
    options.window = window;
    options.budget = config.scan_budget();
    options.retry = config.retry_policy();

    let report = ReconciliationChecker::new(&source, &store, &log).check(&options)?;

    if flags.json {
        write_response(serde_json::to_value(&report)?)?;
    } else {
        print!("{}", report);
    }

    Ok(())
}

/// Converts a byte list to its canonical string, or a canonical string to
/// its bytes.
pub fn convert(input: &str) -> CliResult<String> {
    let input = input.trim();

    if input.starts_with('b') {
        let bytes: Vec<String> = canonical_to_bytes(input)?.iter().map(|b| b.to_string()).collect();
        return Ok(bytes.join(","));
    }

    let bytes = input
        .split(|c: char| c == ',' || c == '[' || c == ']' || c.is_whitespace())
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<u8>()
                .map_err(|_| CliError::invalid_input(format!("{:?} is not a byte value", part)))
        })
        .collect::<CliResult<Vec<u8>>>()?;

    Ok(bytes_to_canonical(&bytes)?)
}

/// Number of records holding raw-byte identifiers
pub fn count(config_path: &Path) -> CliResult<u64> {
    let config = Config::load(config_path)?;
    let store = FileRecordStore::open(config.data_path())?;

    let count = store.count_records(RecordFilter::ContainsRawReference)?;
    println!("Found {} broken records", count);
    Ok(count)
}

/// Loads a JSON lines dump into the record store
pub fn import(config_path: &Path, input: &Path) -> CliResult<usize> {
    let config = Config::load(config_path)?;
    let records = read_dump(input)?;

    let mut store = FileRecordStore::open(config.data_path())?;
    for chunk in records.chunks(config.batch_size) {
        store.insert_records(chunk)?;
    }

    println!("Imported {} records", records.len());
    Ok(records.len())
}
