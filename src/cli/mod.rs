//! CLI module for cidmend
//!
//! Provides command-line interface for:
//! - fix / fix-one: repair raw-byte identifiers in stored records
//! - check: reconcile the authoritative source against the record store
//! - convert: identifier codec self-test
//! - count: number of corrupted records
//! - import: seed the record store from a dump

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command};
pub use commands::{
    check, convert, count, fix, fix_one, import, run, run_command, CheckFlags, Config, FixFlags,
};
pub use errors::{CliError, CliErrorCode, CliResult};
pub use io::{confirm_with, parse_dump, read_dump};
