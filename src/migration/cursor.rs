//! Resume cursor file
//!
//! Location: `<data_dir>/migration/cursor.json`
//!
//! Written after every committed live batch. The file is replaced through
//! a temporary file and rename, with the file and its directory fsynced, so
//! a crash leaves either the previous cursor or the new one.

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::{MigrationError, MigrationResult};
use super::stats::{MigrationMode, MigrationTotals};

const FORMAT_VERSION: u8 = 1;

/// Persisted resume state of a live run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeCursor {
    pub run_id: Uuid,
    pub mode: MigrationMode,
    /// Last record key processed; the next run starts strictly after it
    pub last_key: Option<String>,
    pub totals: MigrationTotals,
    pub updated_at: DateTime<Utc>,
    pub format_version: u8,
}

impl ResumeCursor {
    pub fn new(run_id: Uuid, mode: MigrationMode) -> Self {
        Self {
            run_id,
            mode,
            last_key: None,
            totals: MigrationTotals::default(),
            updated_at: Utc::now(),
            format_version: FORMAT_VERSION,
        }
    }

    /// Cursor file path under `data_dir`.
    pub fn path(data_dir: &Path) -> PathBuf {
        data_dir.join("migration").join("cursor.json")
    }

    /// Reads the cursor under `data_dir`, `None` if there is none yet.
    pub fn load(data_dir: &Path) -> MigrationResult<Option<Self>> {
        let path = Self::path(data_dir);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(MigrationError::cursor_io(&path, "Failed to read", e)),
        };

        let cursor: Self = serde_json::from_str(&text)
            .map_err(|e| MigrationError::cursor(&path, format!("Failed to parse: {}", e)))?;

        if cursor.format_version != FORMAT_VERSION {
            return Err(MigrationError::cursor(
                &path,
                format!("Unsupported format version {}", cursor.format_version),
            ));
        }
        Ok(Some(cursor))
    }

    /// Writes the cursor under `data_dir` durably.
    pub fn save(&self, data_dir: &Path) -> MigrationResult<()> {
        let path = Self::path(data_dir);
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| MigrationError::cursor(&path, format!("Failed to serialize: {}", e)))?;

        let Some(parent) = path.parent() else {
            return Err(MigrationError::cursor(&path, "Cursor path has no parent"));
        };
        fs::create_dir_all(parent)
            .map_err(|e| MigrationError::cursor_io(&path, "Failed to create directory", e))?;

        let tmp_path = path.with_extension("json.tmp");
        let mut file = File::create(&tmp_path)
            .map_err(|e| MigrationError::cursor_io(&path, "Failed to create temp file", e))?;
        file.write_all(json.as_bytes())
            .map_err(|e| MigrationError::cursor_io(&path, "Failed to write", e))?;
        file.sync_all()
            .map_err(|e| MigrationError::cursor_io(&path, "Failed to fsync", e))?;

        fs::rename(&tmp_path, &path)
            .map_err(|e| MigrationError::cursor_io(&path, "Failed to replace", e))?;

        let dir = OpenOptions::new()
            .read(true)
            .open(parent)
            .map_err(|e| MigrationError::cursor_io(&path, "Failed to open directory", e))?;
        dir.sync_all()
            .map_err(|e| MigrationError::cursor_io(&path, "Failed to fsync directory", e))?;

        Ok(())
    }
}
