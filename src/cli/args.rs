//! CLI argument definitions using clap
//!
//! Commands:
//! - cidmend fix --config <path> [--dry-run] [--limit N] [--batch-size N] [--skip-count] [--yes] [--resume]
//! - cidmend fix-one --config <path> --uri <at-uri> [--dry-run] [--yes]
//! - cidmend check --config <path> --identity <did> [--start D] [--end D] [--collection C ...] [--json]
//! - cidmend convert <bytes|cid>
//! - cidmend count --config <path>
//! - cidmend import --config <path> --input <jsonl>

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// cidmend - repairs corrupted content identifiers and reconciles record stores
#[derive(Parser, Debug)]
#[command(name = "cidmend")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Repair every record holding raw-byte identifiers
    Fix {
        /// Path to configuration file
        #[arg(long, default_value = "./cidmend.json")]
        config: PathBuf,

        /// Report what would change without writing
        #[arg(long)]
        dry_run: bool,

        /// Maximum records to process in this run
        #[arg(long)]
        limit: Option<u64>,

        /// Records per batch (overrides config)
        #[arg(long)]
        batch_size: Option<usize>,

        /// Skip the initial candidate count
        #[arg(long)]
        skip_count: bool,

        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,

        /// Continue from the saved resume cursor
        #[arg(long)]
        resume: bool,
    },

    /// Repair a single record
    FixOne {
        /// Path to configuration file
        #[arg(long, default_value = "./cidmend.json")]
        config: PathBuf,

        /// Record URI (at://<identity>/<collection>/<rkey>)
        #[arg(long)]
        uri: String,

        /// Show the repaired body without writing
        #[arg(long)]
        dry_run: bool,

        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },

    /// Compare the authoritative source with the record store
    Check {
        /// Path to configuration file
        #[arg(long, default_value = "./cidmend.json")]
        config: PathBuf,

        /// Identity (DID) to reconcile
        #[arg(long)]
        identity: String,

        /// Window start, YYYY-MM-DD or RFC 3339
        #[arg(long)]
        start: Option<String>,

        /// Window end, YYYY-MM-DD or RFC 3339
        #[arg(long)]
        end: Option<String>,

        /// Collection to check; repeatable (overrides config)
        #[arg(long = "collection")]
        collections: Vec<String>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Convert a byte list to its canonical identifier, or back
    Convert {
        /// Comma or space separated bytes, or a canonical `b...` string
        input: String,
    },

    /// Count records holding raw-byte identifiers
    Count {
        /// Path to configuration file
        #[arg(long, default_value = "./cidmend.json")]
        config: PathBuf,
    },

    /// Load records from a JSON lines dump
    Import {
        /// Path to configuration file
        #[arg(long, default_value = "./cidmend.json")]
        config: PathBuf,

        /// Dump of `{uri, json, indexed_at}` lines
        #[arg(long)]
        input: PathBuf,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
