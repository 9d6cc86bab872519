//! Tera rendering of notification bodies.
//!
//! Templates are embedded at compile time; there are no user overrides.

use serde::Serialize;
use tera::{Context, Tera};

use crate::error::NotifyError;
use crate::notification::Notification;

const EMAIL: &str = "email.txt";
const RUN_SUMMARY: &str = "run_summary.txt";
const SCRUB_SUMMARY: &str = "scrub_summary.txt";

const TPLS: &[(&str, &str)] = &[
    (EMAIL, include_str!("templates/email.txt.tera")),
    (RUN_SUMMARY, include_str!("templates/run_summary.txt.tera")),
    (SCRUB_SUMMARY, include_str!("templates/scrub_summary.txt.tera")),
];

/// Renders plain-text bodies. Create once and reuse.
pub struct MessageRenderer {
    tera: Tera,
}

impl MessageRenderer {
    pub fn new() -> Result<Self, NotifyError> {
        let mut tera = Tera::default();
        tera.add_raw_templates(TPLS.iter().copied())?;
        Ok(Self { tera })
    }

    /// Email body: job, upper-cased status and message. Details are left out.
    pub fn email_body(&self, notification: &Notification, host: &str) -> Result<String, NotifyError> {
        let mut ctx = Context::new();
        ctx.insert("job", &notification.job);
        ctx.insert("status", notification.status.as_str());
        ctx.insert("message", &notification.message);
        ctx.insert("host", host);
        Ok(self.tera.render(EMAIL, &ctx)?)
    }

    /// Details block of the end-of-run summary.
    pub fn run_summary(&self, view: &impl Serialize) -> Result<String, NotifyError> {
        let ctx = Context::from_serialize(view)?;
        Ok(self.tera.render(RUN_SUMMARY, &ctx)?)
    }

    /// Details block of a completed scrub.
    pub fn scrub_summary(&self, view: &impl Serialize) -> Result<String, NotifyError> {
        let ctx = Context::from_serialize(view)?;
        Ok(self.tera.render(SCRUB_SUMMARY, &ctx)?)
    }
}

impl std::fmt::Debug for MessageRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageRenderer").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::Status;

    #[test]
    fn renderer_new_succeeds() {
        MessageRenderer::new().expect("embedded templates must parse");
    }

    #[test]
    fn email_body_has_upper_status_and_no_details() {
        let renderer = MessageRenderer::new().unwrap();
        let n = Notification::new("Error: Scrub failed", "scrub", Status::Error, "disk gone")
            .with_details("secret details");
        let body = renderer.email_body(&n, "nas01").unwrap();
        assert!(body.starts_with("Job: scrub\nStatus: ERROR\n\ndisk gone\n"));
        assert!(body.contains("storage-ops on nas01"));
        assert!(!body.contains("secret details"));
    }

    #[test]
    fn scrub_summary_lists_unrepaired_files() {
        let renderer = MessageRenderer::new().unwrap();
        let view = serde_json::json!({
            "directory": "/mnt/data",
            "database": "/mnt/data/.pardatabase",
            "mode": "full",
            "files_processed": 10,
            "files_updated": 1,
            "files_verified": 10,
            "files_repaired": 1,
            "files_failed": 0,
            "orphans_removed": 2,
            "total_file_size_mb": 42,
            "redundancy": 5,
            "duration_seconds": 12,
            "corrupted_files": [
                {"path": "a.bin", "repaired": true, "error": null},
                {"path": "b.bin", "repaired": false, "error": "repair failed"}
            ]
        });
        let text = renderer.scrub_summary(&view).unwrap();
        assert!(text.contains("Directory: /mnt/data"));
        assert!(text.contains("  repaired a.bin\n"));
        assert!(text.contains("  UNREPAIRED b.bin (repair failed)"));
    }
}
