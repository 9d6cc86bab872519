//! Last-run state — one JSON object for the whole host mapping operation ids
//! to the UNIX timestamp (float seconds) of their last successful completion.
//!
//! Writes use the same atomic `.tmp` + rename pattern as the rest of the
//! workspace: the new state is serialized fully before it replaces the old
//! file, so a crash never leaves a partially-updated schedule behind.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::{state_io, StateError};
use crate::types::OperationId;

/// In-memory last-run map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LastRunState {
    entries: BTreeMap<String, f64>,
}

impl LastRunState {
    pub fn get(&self, id: &OperationId) -> Option<f64> {
        self.entries.get(id.as_str()).copied()
    }

    /// Record a successful completion of `id` at `timestamp`.
    pub fn record(&mut self, id: &OperationId, timestamp: f64) {
        self.entries.insert(id.0.clone(), timestamp);
    }

    pub fn contains(&self, id: &OperationId) -> bool {
        self.entries.contains_key(id.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

/// Load the state file. A missing file is an empty state.
pub fn load_at(path: &Path) -> Result<LastRunState, StateError> {
    if !path.exists() {
        return Ok(LastRunState::default());
    }
    let contents = std::fs::read_to_string(path).map_err(|e| state_io(path, e))?;
    if contents.trim().is_empty() {
        return Ok(LastRunState::default());
    }
    serde_json::from_str(&contents).map_err(|e| StateError::Parse {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Atomically replace the state file with `state`.
///
/// Write flow: serialize → `<path>.tmp` → fsync → `rename`.
pub fn save_at(path: &Path, state: &LastRunState) -> Result<(), StateError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| state_io(dir, e))?;
    }
    let json = serde_json::to_string_pretty(state)?;
    let tmp = path.with_extension("json.tmp");
    {
        let mut file = std::fs::File::create(&tmp).map_err(|e| state_io(&tmp, e))?;
        file.write_all(json.as_bytes()).map_err(|e| state_io(&tmp, e))?;
        file.sync_all().map_err(|e| state_io(&tmp, e))?;
    }
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(state_io(path, e));
    }
    Ok(())
}

/// Move an unreadable state file aside so the next save does not destroy it.
pub fn quarantine_at(path: &Path) -> Result<std::path::PathBuf, StateError> {
    let aside = path.with_extension("json.corrupt");
    std::fs::rename(path, &aside).map_err(|e| state_io(path, e))?;
    Ok(aside)
}

/// Current time as float UNIX seconds.
pub fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}
