//! Interrupted-run recovery.
//!
//! Runs before a scrub touches the database. A leftover staging area is
//! discarded. When the completion marker is missing the previous run was
//! cut short; a large database whose newest parity file is old is kept as
//! intact, anything else is purged so every parity set is rebuilt.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use storeops_core::RecoveryPolicy;
use walkdir::WalkDir;

use crate::error::{io_err, ScrubError};
use crate::marker;
use crate::naming::{is_parity_file, STAGING_DIR};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recovery {
    /// The previous run completed.
    MarkerPresent,
    /// No marker, but the database looks like a settled earlier run.
    KeptIntact { parity_files: usize },
    /// No marker; every parity file was removed.
    Purged { parity_files: usize },
}

/// Every parity file under `database`, staging excluded.
pub fn parity_files(database: &Path) -> Result<Vec<PathBuf>, ScrubError> {
    if !database.is_dir() {
        return Ok(Vec::new());
    }
    let staging = database.join(STAGING_DIR);
    let mut files = Vec::new();
    for entry in WalkDir::new(database)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.path() != staging)
    {
        let entry = entry?;
        if entry.file_type().is_file() && is_parity_file(entry.path()) {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

/// Drop `<db>/.staging` left behind by a crashed run.
pub fn discard_staging(database: &Path) -> Result<bool, ScrubError> {
    let staging = database.join(STAGING_DIR);
    match std::fs::remove_dir_all(&staging) {
        Ok(()) => {
            tracing::warn!(path = %staging.display(), "discarded leftover parity staging area");
            Ok(true)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(io_err(&staging, e)),
    }
}

/// Decide what to do with a database at the start of a run and do it.
pub fn recover(database: &Path, policy: &RecoveryPolicy, now: SystemTime) -> Result<Recovery, ScrubError> {
    discard_staging(database)?;

    if marker::exists(database) {
        return Ok(Recovery::MarkerPresent);
    }

    let files = parity_files(database)?;
    if files.is_empty() {
        return Ok(Recovery::Purged { parity_files: 0 });
    }

    let newest = newest_mtime(&files)?;
    let age = now.duration_since(newest).unwrap_or(Duration::ZERO);
    if files.len() > policy.min_parity_files && age > policy.min_age() {
        tracing::info!(
            database = %database.display(),
            parity_files = files.len(),
            newest_age_hours = age.as_secs() / 3_600,
            "no completion marker, but parity database looks settled; keeping it"
        );
        return Ok(Recovery::KeptIntact {
            parity_files: files.len(),
        });
    }

    tracing::warn!(
        database = %database.display(),
        parity_files = files.len(),
        "no completion marker; previous run was interrupted, purging parity files"
    );
    for file in &files {
        match std::fs::remove_file(file) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(io_err(file, e)),
        }
    }
    Ok(Recovery::Purged {
        parity_files: files.len(),
    })
}

fn newest_mtime(files: &[PathBuf]) -> Result<SystemTime, ScrubError> {
    let mut newest = SystemTime::UNIX_EPOCH;
    for file in files {
        let modified = std::fs::metadata(file)
            .and_then(|m| m.modified())
            .map_err(|e| io_err(file, e))?;
        newest = newest.max(modified);
    }
    Ok(newest)
}

// ─── Tests ───────────────────────────────────────────────────────────────────
