//! Incremental parsing of the mirror tool's progress records.
//!
//! rsync's `--info=progress2` rewrites one status line with carriage returns:
//!
//! ```text
//!   1,234,567  45%   12.34MB/s    0:01:23 (xfr#12, to-chk=100/2000)
//! ```
//!
//! Records are therefore split on both `\r` and `\n`.

use std::sync::OnceLock;
use std::time::{Duration, Instant};

use regex::Regex;

/// Minimum gap between two logged progress records.
pub const PROGRESS_LOG_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressLine {
    pub bytes: u64,
    pub percent: u8,
    pub rate: String,
    pub eta: String,
    pub transfers: Option<u64>,
}

const PROGRESS_PATTERN: &str =
    r"^\s*([\d,]+)\s+(\d{1,3})%\s+(\S+/s)\s+(\d+:\d{2}:\d{2})(?:\s+\(xfr#(\d+)[^)]*\))?";

fn progress_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(PROGRESS_PATTERN).ok()).as_ref()
}

/// Parse one progress record; `None` for anything else (file names, stats).
pub fn parse_progress(record: &str) -> Option<ProgressLine> {
    let caps = progress_re()?.captures(record)?;
    Some(ProgressLine {
        bytes: caps[1].replace(',', "").parse().ok()?,
        percent: caps[2].parse().ok()?,
        rate: caps[3].to_string(),
        eta: caps[4].to_string(),
        transfers: caps.get(5).and_then(|m| m.as_str().parse().ok()),
    })
}

/// Lets one event through per interval.
#[derive(Debug, Clone)]
pub struct ProgressThrottle {
    interval: Duration,
    last: Option<Instant>,
}

impl ProgressThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    /// `true` if an event at `now` should be emitted; records it if so.
    pub fn ready_at(&mut self, now: Instant) -> bool {
        match self.last {
            Some(last) if now.saturating_duration_since(last) < self.interval => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }

    pub fn ready(&mut self) -> bool {
        self.ready_at(Instant::now())
    }
}

/// Splits a byte stream into records at `\r` or `\n`, across chunk
/// boundaries. Empty records are dropped.
#[derive(Debug, Default)]
pub struct RecordSplitter {
    pending: Vec<u8>,
}

impl RecordSplitter {
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut records = Vec::new();
        for &byte in chunk {
            if byte == b'\r' || byte == b'\n' {
                if !self.pending.is_empty() {
                    records.push(String::from_utf8_lossy(&self.pending).into_owned());
                    self.pending.clear();
                }
            } else {
                self.pending.push(byte);
            }
        }
        records
    }

    /// Whatever is left after the stream closed.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            None
        } else {
            let rest = String::from_utf8_lossy(&self.pending).into_owned();
            self.pending.clear();
            Some(rest)
        }
    }
}
