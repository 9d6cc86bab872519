//! Completion marker.
//!
//! `<db>/.scrub_completion.json` is written after a scrub finishes and
//! removed when the next one starts. A database without a marker therefore
//! belongs to a run that never completed.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::error::{io_err, ScrubError};

pub const MARKER_FILE: &str = ".scrub_completion.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorruptedFile {
    pub path: PathBuf,
    pub detected_at: DateTime<Local>,
    pub repaired: bool,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionMarker {
    pub completed_at: DateTime<Local>,
    pub started_at: DateTime<Local>,
    pub duration_seconds: f64,
    pub directory: PathBuf,
    pub database: PathBuf,
    pub redundancy_percent: u8,
    /// `"full"` when files were verified, `"fast"` for parity-only passes.
    pub verify_mode: String,
    pub files_processed: u64,
    pub files_updated: u64,
    pub files_verified: u64,
    pub files_repaired: u64,
    pub total_file_size_mb: f64,
    #[serde(default)]
    pub corrupted_files: Vec<CorruptedFile>,
    pub timezone: String,
}

pub fn marker_path(database: &Path) -> PathBuf {
    database.join(MARKER_FILE)
}

pub fn exists(database: &Path) -> bool {
    marker_path(database).is_file()
}

/// Read the marker, `None` when absent.
pub fn read_at(database: &Path) -> Result<Option<CompletionMarker>, ScrubError> {
    let path = marker_path(database);
    let contents = match std::fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(io_err(&path, e)),
    };
    Ok(Some(serde_json::from_str(&contents)?))
}

/// Atomic write through a sibling temp file.
pub fn write_at(database: &Path, marker: &CompletionMarker) -> Result<(), ScrubError> {
    let path = marker_path(database);
    let tmp = path.with_extension("json.tmp");
    let json = serde_json::to_string_pretty(marker)?;
    {
        let mut file = std::fs::File::create(&tmp).map_err(|e| io_err(&tmp, e))?;
        file.write_all(json.as_bytes()).map_err(|e| io_err(&tmp, e))?;
        file.sync_all().map_err(|e| io_err(&tmp, e))?;
    }
    std::fs::rename(&tmp, &path).map_err(|e| io_err(&path, e))?;
    Ok(())
}

pub fn remove_at(database: &Path) -> Result<bool, ScrubError> {
    let path = marker_path(database);
    match std::fs::remove_file(&path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(io_err(&path, e)),
    }
}

pub fn local_timezone() -> String {
    Local::now().format("%:z").to_string()
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample(dir: &Path) -> CompletionMarker {
        let now = Local::now();
        CompletionMarker {
            completed_at: now,
            started_at: now,
            duration_seconds: 1.5,
            directory: dir.to_path_buf(),
            database: dir.join(".pardatabase"),
            redundancy_percent: 5,
            verify_mode: "full".into(),
            files_processed: 3,
            files_updated: 1,
            files_verified: 3,
            files_repaired: 1,
            total_file_size_mb: 0.25,
            corrupted_files: vec![CorruptedFile {
                path: PathBuf::from("a.bin"),
                detected_at: now,
                repaired: true,
                error: None,
            }],
            timezone: local_timezone(),
        }
    }

    #[test]
    fn write_read_remove_cycle() {
        let dir = TempDir::new().unwrap();
        assert!(read_at(dir.path()).unwrap().is_none());

        let marker = sample(dir.path());
        write_at(dir.path(), &marker).unwrap();
        assert!(exists(dir.path()));
        assert_eq!(read_at(dir.path()).unwrap(), Some(marker));
        assert!(!dir.path().join(".scrub_completion.json.tmp").exists());

        assert!(remove_at(dir.path()).unwrap());
        assert!(!remove_at(dir.path()).unwrap());
    }

    #[test]
    fn repaired_entries_carry_null_error() {
        let dir = TempDir::new().unwrap();
        let json = serde_json::to_value(sample(dir.path())).unwrap();
        assert!(json["corrupted_files"][0]["error"].is_null());
        assert_eq!(json["verify_mode"], "full");
    }
}
