//! Persisted configuration.
//!
//! One JSON document supplies the sync and scrub specs, notification targets
//! and the host's friendly name. It is parsed into strongly-typed structs and
//! validated once, so a malformed spec never reaches the scheduler.
//!
//! # API pattern
//!
//! - `load_at(path)` — explicit path; used by tests with `TempDir`
//! - `load(paths)` — reads [`RuntimePaths::config_file`]

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{config_io, ConfigError};
use crate::paths::RuntimePaths;
use crate::types::{
    normalize_lexically, NotifyKind, NotifyTarget, OperationId, RecoveryPolicy, ScrubSpec, SyncSpec,
};

/// Root of the configuration document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_friendly_name")]
    pub friendly_name: String,
    #[serde(default)]
    pub sync_specs: Vec<SyncSpec>,
    #[serde(default)]
    pub scrub_specs: Vec<ScrubSpec>,
    #[serde(default)]
    pub notify_specs: Vec<NotifyTarget>,
    /// Explicit network-mount targets; paths under these must be mounted.
    #[serde(default)]
    pub network_mounts: Vec<PathBuf>,
    /// Conventional mount root; paths under it must be mounted.
    #[serde(default = "default_mount_root")]
    pub mount_root: PathBuf,
    #[serde(default)]
    pub recovery: RecoveryPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            friendly_name: default_friendly_name(),
            sync_specs: vec![],
            scrub_specs: vec![],
            notify_specs: vec![],
            network_mounts: vec![],
            mount_root: default_mount_root(),
            recovery: RecoveryPolicy::default(),
        }
    }
}

impl Config {
    pub fn has_storage_ops(&self) -> bool {
        !self.sync_specs.is_empty() || !self.scrub_specs.is_empty()
    }

    /// Reject specs the scheduler must never see.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::<OperationId>::new();

        for spec in &self.sync_specs {
            require_absolute(&spec.source, "sync source")?;
            require_absolute(&spec.destination, "sync destination")?;
            if spec.source == spec.destination {
                return Err(ConfigError::Invalid(format!(
                    "sync source and destination are the same path: {}",
                    spec.source.display()
                )));
            }
            if !seen.insert(spec.operation_id()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate sync spec: {}",
                    spec.operation_id()
                )));
            }
        }

        for spec in &self.scrub_specs {
            require_absolute(&spec.directory, "scrub directory")?;
            if spec.database.as_os_str().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "scrub database is empty for {}",
                    spec.directory.display()
                )));
            }
            // Orphan cleanup deletes `*.par2` under the database, which must
            // never reach the user's own files.
            if normalize_lexically(&spec.directory).starts_with(spec.resolved_database()) {
                return Err(ConfigError::Invalid(format!(
                    "scrub database must not be the scrubbed directory or one of its parents: {}",
                    spec.directory.display()
                )));
            }
            if !seen.insert(spec.scrub_id()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate scrub spec: {}",
                    spec.scrub_id()
                )));
            }
        }

        for target in &self.notify_specs {
            if target.target.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("empty {target} notification target")));
            }
            if target.kind == NotifyKind::Webhook
                && !(target.target.starts_with("http://") || target.target.starts_with("https://"))
            {
                return Err(ConfigError::Invalid(format!(
                    "webhook target must be an http(s) URL: {}",
                    target.target
                )));
            }
        }

        for mount in &self.network_mounts {
            require_absolute(mount, "network mount")?;
        }
        Ok(())
    }
}

/// Parse and validate the configuration at `path`.
pub fn load_at(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound {
            path: path.to_path_buf(),
        });
    }
    let contents = std::fs::read_to_string(path).map_err(|e| config_io(path, e))?;
    let config: Config = serde_json::from_str(&contents).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        source: e,
    })?;
    config.validate()?;
    Ok(config)
}

/// `load_at` convenience wrapper.
pub fn load(paths: &RuntimePaths) -> Result<Config, ConfigError> {
    load_at(&paths.config_file)
}

fn require_absolute(path: &Path, label: &str) -> Result<(), ConfigError> {
    if path.is_absolute() {
        Ok(())
    } else {
        Err(ConfigError::Invalid(format!(
            "{label} must be an absolute path: {}",
            path.display()
        )))
    }
}

fn default_mount_root() -> PathBuf {
    PathBuf::from("/mnt")
}

fn default_friendly_name() -> String {
    std::fs::read_to_string("/proc/sys/kernel/hostname")
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
