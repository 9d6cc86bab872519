//! Domain types for storage operations.
//!
//! All path fields use `PathBuf`; never `&str` or `String` for filesystem paths.
//! Specs are immutable once loaded and are deserialized strictly: unknown
//! fields and unknown interval names are rejected.

use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Interval
// ---------------------------------------------------------------------------

/// How often an operation should run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interval {
    Hourly,
    Daily,
    Weekly,
    Biweekly,
    Monthly,
    Bimonthly,
}

impl Interval {
    pub const ALL: [Interval; 6] = [
        Interval::Hourly,
        Interval::Daily,
        Interval::Weekly,
        Interval::Biweekly,
        Interval::Monthly,
        Interval::Bimonthly,
    ];

    pub fn seconds(self) -> u64 {
        match self {
            Interval::Hourly => 3_600,
            Interval::Daily => 86_400,
            Interval::Weekly => 604_800,
            Interval::Biweekly => 1_209_600,
            Interval::Monthly => 2_592_000,
            Interval::Bimonthly => 5_184_000,
        }
    }

    pub fn duration(self) -> Duration {
        Duration::from_secs(self.seconds())
    }

    /// Interval of the fast parity-only pass for a scrub scheduled at `self`:
    /// daily, or the scrub's own interval when that is shorter.
    pub fn fast_parity(self) -> Interval {
        if self.seconds() < Interval::Daily.seconds() {
            self
        } else {
            Interval::Daily
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Interval::Hourly => "hourly",
            Interval::Daily => "daily",
            Interval::Weekly => "weekly",
            Interval::Biweekly => "biweekly",
            Interval::Monthly => "monthly",
            Interval::Bimonthly => "bimonthly",
        };
        f.write_str(name)
    }
}

impl FromStr for Interval {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Interval::ALL
            .into_iter()
            .find(|i| i.to_string() == s.to_ascii_lowercase())
            .ok_or_else(|| {
                format!(
                    "unknown interval '{s}'; expected: hourly, daily, weekly, biweekly, monthly, bimonthly"
                )
            })
    }
}

// ---------------------------------------------------------------------------
// Redundancy
// ---------------------------------------------------------------------------

/// Parity redundancy in percent, always within `1..=100`.
///
/// Deserializes from either an integer (`10`) or the persisted string form
/// (`"10%"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawRedundancy", into = "u8")]
pub struct Redundancy(u8);

impl Redundancy {
    pub fn new(percent: u64) -> Result<Self, String> {
        if (1..=100).contains(&percent) {
            Ok(Self(percent as u8))
        } else {
            Err(format!("redundancy must be between 1 and 100 percent, got {percent}"))
        }
    }

    pub fn percent(self) -> u8 {
        self.0
    }
}

impl fmt::Display for Redundancy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.0)
    }
}

impl From<Redundancy> for u8 {
    fn from(r: Redundancy) -> Self {
        r.0
    }
}

impl FromStr for Redundancy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.trim().trim_end_matches('%');
        let value: u64 = digits
            .parse()
            .map_err(|_| format!("invalid redundancy '{s}'"))?;
        Redundancy::new(value)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawRedundancy {
    Number(u64),
    Text(String),
}

impl TryFrom<RawRedundancy> for Redundancy {
    type Error = String;

    fn try_from(raw: RawRedundancy) -> Result<Self, Self::Error> {
        match raw {
            RawRedundancy::Number(n) => Redundancy::new(n),
            RawRedundancy::Text(s) => s.parse(),
        }
    }
}

// ---------------------------------------------------------------------------
// Specs
// ---------------------------------------------------------------------------

/// A one-way mirror job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SyncSpec {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub interval: Interval,
}

impl SyncSpec {
    pub fn operation_id(&self) -> OperationId {
        OperationId::sync(&self.source, &self.destination)
    }
}

/// A parity-protection job for one directory tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScrubSpec {
    pub directory: PathBuf,
    /// Parity store; may be relative to `directory`.
    pub database: PathBuf,
    pub redundancy: Redundancy,
    pub interval: Interval,
}

impl ScrubSpec {
    /// Absolute, lexically normalised database path.
    pub fn resolved_database(&self) -> PathBuf {
        resolve_database(&self.directory, &self.database)
    }

    /// Id of the full verify+repair pass.
    pub fn scrub_id(&self) -> OperationId {
        OperationId::scrub(&self.directory, &self.database)
    }

    /// Id of the fast parity-only pass.
    pub fn parity_id(&self) -> OperationId {
        OperationId::parity(&self.directory, &self.database)
    }
}

/// Join a relative database onto `directory` and normalise `.`/`..`.
pub fn resolve_database(directory: &Path, database: &Path) -> PathBuf {
    if database.is_absolute() {
        normalize_lexically(database)
    } else {
        normalize_lexically(&directory.join(database))
    }
}

/// Lexical normalisation: drops `.` and folds `..` without touching the disk.
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Kind of notification transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotifyKind {
    Webhook,
    Mailbox,
}

/// A notification destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NotifyTarget {
    #[serde(rename = "type")]
    pub kind: NotifyKind,
    pub target: String,
}

impl fmt::Display for NotifyTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            NotifyKind::Webhook => "webhook",
            NotifyKind::Mailbox => "mailbox",
        };
        write!(f, "{kind}:{}", self.target)
    }
}

/// Thresholds for the interrupted-run heuristic: a marker-less database with
/// more than `min_parity_files` parity files, none newer than `min_age_hours`,
/// is treated as intact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct RecoveryPolicy {
    pub min_parity_files: usize,
    pub min_age_hours: u64,
}

impl Default for RecoveryPolicy {
    fn default() -> Self {
        Self {
            min_parity_files: 50,
            min_age_hours: 24,
        }
    }
}

impl RecoveryPolicy {
    pub fn min_age(&self) -> Duration {
        Duration::from_secs(self.min_age_hours * 3_600)
    }
}

// ---------------------------------------------------------------------------
// Operation id
// ---------------------------------------------------------------------------

/// Deterministic key for an operation, derived from its kind and defining
/// fields. Tracks last-run time per distinct operation, not per list position.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationId(pub String);

impl OperationId {
    pub fn sync(source: &Path, destination: &Path) -> Self {
        Self(format!("sync:{}:{}", source.display(), destination.display()))
    }

    pub fn scrub(directory: &Path, database: &Path) -> Self {
        Self(format!("scrub:{}:{}", directory.display(), database.display()))
    }

    pub fn parity(directory: &Path, database: &Path) -> Self {
        Self(format!("parity:{}:{}", directory.display(), database.display()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for OperationId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
