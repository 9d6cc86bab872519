//! Ordered steps with compensating rollbacks.
//!
//! A [`Transaction`] queues steps, each a forward action plus an optional
//! rollback. [`Transaction::execute`] drains the queue in order; if a step
//! fails or the deadline passes, every step completed since the last
//! checkpoint is rolled back in reverse order and the error is returned.
//! [`Transaction::create_checkpoint`] commits the completed steps: their
//! rollbacks are dropped and will never run.

use std::fmt;
use std::time::{Duration, Instant};

use thiserror::Error;

/// Error returned by a single step's forward or rollback action.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct StepError(String);

impl StepError {
    pub fn new(message: impl fmt::Display) -> Self {
        Self(message.to_string())
    }
}

impl From<std::io::Error> for StepError {
    fn from(err: std::io::Error) -> Self {
        Self(err.to_string())
    }
}

impl From<String> for StepError {
    fn from(message: String) -> Self {
        Self(message)
    }
}

#[derive(Debug, Error)]
pub enum TransactionError {
    #[error("step '{id}' ({description}) failed: {message}")]
    StepFailed {
        id: String,
        description: String,
        message: String,
    },

    #[error("transaction '{name}' exceeded its {timeout:?} deadline")]
    TimedOut { name: String, timeout: Duration },
}

type Action<'a> = Box<dyn FnMut() -> Result<(), StepError> + 'a>;

struct Step<'a> {
    id: String,
    description: String,
    forward: Action<'a>,
    rollback: Option<Action<'a>>,
}

pub struct Transaction<'a> {
    name: String,
    timeout: Duration,
    started: Instant,
    pending: Vec<Step<'a>>,
    completed: Vec<Step<'a>>,
    checkpoints: Vec<String>,
}

impl<'a> Transaction<'a> {
    pub fn new(name: impl Into<String>, timeout: Duration) -> Self {
        Self {
            name: name.into(),
            timeout,
            started: Instant::now(),
            pending: Vec::new(),
            completed: Vec::new(),
            checkpoints: Vec::new(),
        }
    }

    /// Queue a step. `rollback` undoes `forward` if a later step fails.
    pub fn add_step<F, R>(&mut self, forward: F, rollback: R, description: &str, id: &str)
    where
        F: FnMut() -> Result<(), StepError> + 'a,
        R: FnMut() -> Result<(), StepError> + 'a,
    {
        self.pending.push(Step {
            id: id.to_string(),
            description: description.to_string(),
            forward: Box::new(forward),
            rollback: Some(Box::new(rollback)),
        });
    }

    /// Queue a check with nothing to undo.
    pub fn add_validation_step<F>(&mut self, check: F, description: &str, id: &str)
    where
        F: FnMut() -> Result<(), StepError> + 'a,
    {
        self.pending.push(Step {
            id: id.to_string(),
            description: description.to_string(),
            forward: Box::new(check),
            rollback: None,
        });
    }

    /// Run every queued step. The deadline is checked before each one.
    pub fn execute(&mut self) -> Result<(), TransactionError> {
        let pending = std::mem::take(&mut self.pending);
        for mut step in pending {
            if self.is_expired() {
                self.rollback("deadline exceeded");
                return Err(TransactionError::TimedOut {
                    name: self.name.clone(),
                    timeout: self.timeout,
                });
            }

            tracing::debug!(transaction = %self.name, step = %step.id, "executing step");
            match (step.forward)() {
                Ok(()) => self.completed.push(step),
                Err(err) => {
                    tracing::warn!(
                        transaction = %self.name,
                        step = %step.id,
                        error = %err,
                        "step failed: {}",
                        step.description
                    );
                    self.rollback(&format!("step '{}' failed", step.id));
                    return Err(TransactionError::StepFailed {
                        id: step.id,
                        description: step.description,
                        message: err.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Undo every uncommitted completed step, newest first. Rollback errors
    /// are logged and do not stop the remaining rollbacks. Returns `true`
    /// when every rollback succeeded.
    pub fn rollback(&mut self, reason: &str) -> bool {
        if self.completed.is_empty() {
            return true;
        }
        tracing::warn!(
            transaction = %self.name,
            steps = self.completed.len(),
            "rolling back: {reason}"
        );
        let mut clean = true;
        while let Some(mut step) = self.completed.pop() {
            let Some(undo) = step.rollback.as_mut() else {
                continue;
            };
            if let Err(err) = undo() {
                clean = false;
                tracing::error!(
                    transaction = %self.name,
                    step = %step.id,
                    error = %err,
                    "rollback failed"
                );
            }
        }
        clean
    }

    /// Commit all completed steps.
    pub fn create_checkpoint(&mut self, name: &str) {
        tracing::debug!(
            transaction = %self.name,
            checkpoint = name,
            committed = self.completed.len(),
            "checkpoint"
        );
        self.completed.clear();
        self.checkpoints.push(name.to_string());
    }

    pub fn is_expired(&self) -> bool {
        self.started.elapsed() >= self.timeout
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn checkpoints(&self) -> &[String] {
        &self.checkpoints
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
