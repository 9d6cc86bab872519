//! End-of-run summary.

use chrono::{DateTime, Local};
use serde::Serialize;

use crate::error::NotifyError;
use crate::notification::{Notification, Status};
use crate::render::MessageRenderer;

pub const RUN_JOB: &str = "storage-ops";

/// How one operation ended in this run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Succeeded,
    Failed,
    /// Not attempted (mount validation failed, lock busy, shutdown).
    Skipped,
}

impl Outcome {
    pub fn mark(self) -> &'static str {
        match self {
            Outcome::Succeeded => "✓",
            Outcome::Failed => "✗",
            Outcome::Skipped => "○",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationReport {
    pub name: String,
    pub outcome: Outcome,
    pub message: Option<String>,
}

impl OperationReport {
    pub fn succeeded(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(name, Outcome::Succeeded, Some(message.into()))
    }

    pub fn failed(name: impl Into<String>, error: impl Into<String>) -> Self {
        Self::new(name, Outcome::Failed, Some(error.into()))
    }

    pub fn skipped(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(name, Outcome::Skipped, Some(reason.into()))
    }

    fn new(name: impl Into<String>, outcome: Outcome, message: Option<String>) -> Self {
        Self {
            name: name.into(),
            outcome,
            message,
        }
    }
}

/// Outcomes of every operation attempted in one orchestrator run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub started_at: DateTime<Local>,
    pub finished_at: Option<DateTime<Local>>,
    pub syncs: Vec<OperationReport>,
    pub scrubs: Vec<OperationReport>,
    pub parity_updates: Vec<OperationReport>,
}

impl RunSummary {
    pub fn start() -> Self {
        Self {
            started_at: Local::now(),
            finished_at: None,
            syncs: vec![],
            scrubs: vec![],
            parity_updates: vec![],
        }
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Local::now());
    }

    /// Skips are benign; only failures count against the run.
    pub fn has_failures(&self) -> bool {
        self.all().any(|op| op.outcome == Outcome::Failed)
    }

    pub fn is_empty(&self) -> bool {
        self.all().next().is_none()
    }

    /// `"Syncs: 1/2, Scrubs: 0/0, Parity updates: 1/1"`.
    pub fn counts_line(&self) -> String {
        format!(
            "Syncs: {}/{}, Scrubs: {}/{}, Parity updates: {}/{}",
            succeeded(&self.syncs),
            self.syncs.len(),
            succeeded(&self.scrubs),
            self.scrubs.len(),
            succeeded(&self.parity_updates),
            self.parity_updates.len()
        )
    }

    pub fn to_notification(
        &self,
        renderer: &MessageRenderer,
        host: &str,
    ) -> Result<Notification, NotifyError> {
        let (status, subject) = if self.has_failures() {
            (Status::Error, "Storage operations completed with errors")
        } else {
            (Status::Good, "Storage operations completed")
        };
        let details = renderer.run_summary(&self.view(host))?;
        Ok(Notification::new(subject, RUN_JOB, status, self.counts_line()).with_details(details))
    }

    fn all(&self) -> impl Iterator<Item = &OperationReport> {
        self.syncs
            .iter()
            .chain(self.scrubs.iter())
            .chain(self.parity_updates.iter())
    }

    fn view(&self, host: &str) -> SummaryView {
        let section = |title: &'static str, ops: &[OperationReport]| SectionView {
            title,
            operations: ops.iter().map(LineView::from).collect(),
        };
        SummaryView {
            host: host.to_string(),
            started_at: self.started_at.to_rfc3339(),
            finished_at: self
                .finished_at
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "-".to_string()),
            sections: vec![
                section("Sync Operations", &self.syncs),
                section("Full Scrub Operations", &self.scrubs),
                section("Parity Update Operations", &self.parity_updates),
            ],
        }
    }
}

/// Notification sent when a run with at least one target begins.
pub fn start_notification(host: &str, syncs: usize, scrubs: usize) -> Notification {
    Notification::new(
        "Storage operations started",
        RUN_JOB,
        Status::Info,
        format!("Starting storage operations on {host}: {syncs} sync specs, {scrubs} scrub specs"),
    )
}

fn succeeded(ops: &[OperationReport]) -> usize {
    ops.iter().filter(|op| op.outcome == Outcome::Succeeded).count()
}

#[derive(Serialize)]
struct SummaryView {
    host: String,
    started_at: String,
    finished_at: String,
    sections: Vec<SectionView>,
}

#[derive(Serialize)]
struct SectionView {
    title: &'static str,
    operations: Vec<LineView>,
}

#[derive(Serialize)]
struct LineView {
    mark: &'static str,
    name: String,
    note: Option<String>,
}

impl From<&OperationReport> for LineView {
    fn from(op: &OperationReport) -> Self {
        let note = op.message.as_ref().map(|m| match op.outcome {
            Outcome::Succeeded => m.clone(),
            Outcome::Failed | Outcome::Skipped => format!("Error: {m}"),
        });
        Self {
            mark: op.outcome.mark(),
            name: op.name.clone(),
            note,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary() -> RunSummary {
        let mut s = RunSummary::start();
        s.syncs.push(OperationReport::succeeded("/srv/a -> /mnt/b", "3 files, 12 MB"));
        s.syncs.push(OperationReport::skipped("/srv/c -> /mnt/d", "not mounted"));
        s.parity_updates.push(OperationReport::succeeded("/mnt/b", "0 updated"));
        s.finish();
        s
    }

    #[test]
    fn counts_line_matches_run() {
        assert_eq!(
            summary().counts_line(),
            "Syncs: 1/2, Scrubs: 0/0, Parity updates: 1/1"
        );
    }

    #[test]
    fn skips_do_not_make_the_run_fail() {
        let renderer = MessageRenderer::new().unwrap();
        let n = summary().to_notification(&renderer, "nas").unwrap();
        assert_eq!(n.status, Status::Good);
        assert_eq!(n.subject, "Storage operations completed");
    }

    #[test]
    fn failure_turns_summary_into_error_with_marks() {
        let renderer = MessageRenderer::new().unwrap();
        let mut s = summary();
        s.scrubs.push(OperationReport::failed("/mnt/b", "scrub timed out"));
        let n = s.to_notification(&renderer, "nas").unwrap();
        assert_eq!(n.status, Status::Error);
        let details = n.details.unwrap();
        assert!(details.contains("  ✓ /srv/a -> /mnt/b\n    3 files, 12 MB\n"));
        assert!(details.contains("  ○ /srv/c -> /mnt/d\n    Error: not mounted\n"));
        assert!(details.contains("  ✗ /mnt/b\n    Error: scrub timed out\n"));
        assert!(details.contains("Host: nas"));
    }

    #[test]
    fn empty_sections_render_none() {
        let renderer = MessageRenderer::new().unwrap();
        let mut s = RunSummary::start();
        s.finish();
        let details = s.to_notification(&renderer, "nas").unwrap().details.unwrap();
        assert!(details.contains("Full Scrub Operations:\n  None\n"));
    }
}
