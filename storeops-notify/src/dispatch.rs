//! Delivery to configured targets: JSON webhook POST or the local `mail`
//! command.

use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use storeops_core::{NotifyKind, NotifyTarget};

use crate::error::NotifyError;
use crate::notification::{Notification, Notifier};
use crate::render::MessageRenderer;

pub const NETWORK_TIMEOUT: Duration = Duration::from_secs(30);
pub const USER_AGENT: &str = "storage-ops-notification/1.0";
const ACCEPTED_STATUS: [u16; 4] = [200, 201, 202, 204];

/// Sends every notification to every configured target.
#[derive(Debug)]
pub struct Dispatcher {
    targets: Vec<NotifyTarget>,
    host: String,
    renderer: MessageRenderer,
    agent: ureq::Agent,
    mail_program: PathBuf,
    timeout: Duration,
}

impl Dispatcher {
    pub fn new(targets: Vec<NotifyTarget>, host: impl Into<String>) -> Result<Self, NotifyError> {
        Ok(Self {
            targets,
            host: host.into(),
            renderer: MessageRenderer::new()?,
            agent: ureq::AgentBuilder::new()
                .timeout(NETWORK_TIMEOUT)
                .user_agent(USER_AGENT)
                .build(),
            mail_program: PathBuf::from("mail"),
            timeout: NETWORK_TIMEOUT,
        })
    }

    /// Replace the `mail` executable (any program taking `-s <subject> <address>`
    /// and reading the body on stdin).
    pub fn with_mail_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.mail_program = program.into();
        self
    }

    pub fn targets(&self) -> &[NotifyTarget] {
        &self.targets
    }

    fn send_webhook(&self, url: &str, notification: &Notification) -> Result<(), NotifyError> {
        let fail = |reason: String| NotifyError::Webhook {
            url: url.to_string(),
            reason,
        };
        let body = serde_json::to_string(notification)?;
        let response = self
            .agent
            .post(url)
            .set("Content-Type", "application/json")
            .send_string(&body)
            .map_err(|e| fail(e.to_string()))?;
        if ACCEPTED_STATUS.contains(&response.status()) {
            Ok(())
        } else {
            Err(fail(format!("unexpected status {}", response.status())))
        }
    }

    fn send_mail(&self, address: &str, notification: &Notification) -> Result<(), NotifyError> {
        let fail = |reason: String| NotifyError::Mail {
            address: address.to_string(),
            reason,
        };
        let body = self.renderer.email_body(notification, &self.host)?;
        let mut child = Command::new(&self.mail_program)
            .arg("-s")
            .arg(&notification.subject)
            .arg(address)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| fail(format!("cannot run {}: {e}", self.mail_program.display())))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(body.as_bytes())
                .map_err(|e| fail(format!("writing body: {e}")))?;
        }

        let deadline = Instant::now() + self.timeout;
        loop {
            match child.try_wait() {
                Ok(Some(status)) if status.success() => return Ok(()),
                Ok(Some(status)) => return Err(fail(format!("exited with {status}"))),
                Ok(None) if Instant::now() >= deadline => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(fail("timed out".to_string()));
                }
                Ok(None) => std::thread::sleep(Duration::from_millis(50)),
                Err(e) => return Err(fail(e.to_string())),
            }
        }
    }
}

impl Notifier for Dispatcher {
    fn send(&self, notification: &Notification) -> bool {
        if self.targets.is_empty() {
            return true;
        }
        let mut delivered = false;
        for target in &self.targets {
            let result = match target.kind {
                NotifyKind::Webhook => self.send_webhook(&target.target, notification),
                NotifyKind::Mailbox => self.send_mail(&target.target, notification),
            };
            match result {
                Ok(()) => {
                    tracing::info!(destination = %target, subject = %notification.subject, "notification sent");
                    delivered = true;
                }
                Err(err) => {
                    tracing::error!(destination = %target, error = %err, "failed to send notification");
                }
            }
        }
        delivered
    }

    fn has_targets(&self) -> bool {
        !self.targets.is_empty()
    }
}
