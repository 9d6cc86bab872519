//! Graceful shutdown on SIGINT/SIGTERM.
//!
//! The first signal records which one arrived and cancels the shared token.
//! Running work observes the token: the mirror tool and the parity tool are
//! killed, the open transaction segment is rolled back, and the process
//! exits with `128 + signo`.

use std::sync::{Arc, OnceLock};

use tokio::signal::unix::{signal, SignalKind};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    Interrupt,
    Terminate,
}

impl ShutdownSignal {
    pub fn name(self) -> &'static str {
        match self {
            ShutdownSignal::Interrupt => "SIGINT",
            ShutdownSignal::Terminate => "SIGTERM",
        }
    }

    pub fn exit_code(self) -> i32 {
        match self {
            ShutdownSignal::Interrupt => 130,
            ShutdownSignal::Terminate => 143,
        }
    }
}

/// Shutdown flag shared by everything in one process.
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    token: CancellationToken,
    signal: Arc<OnceLock<ShutdownSignal>>,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn trigger(&self, signal: ShutdownSignal) {
        if self.signal.set(signal).is_ok() {
            tracing::warn!(signal = signal.name(), "shutdown requested; rolling back in-flight work");
        }
        self.token.cancel();
    }

    pub fn signal(&self) -> Option<ShutdownSignal> {
        self.signal.get().copied()
    }

    pub fn is_requested(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Exit status for an interrupted process.
    pub fn exit_code(&self) -> i32 {
        self.signal().map(ShutdownSignal::exit_code).unwrap_or(1)
    }
}

/// Listen for SIGINT and SIGTERM until one arrives or `shutdown` is
/// cancelled by other means.
pub fn spawn_signal_listener(shutdown: Shutdown) -> JoinHandle<()> {
    tokio::spawn(async move {
        let terminate = async {
            match signal(SignalKind::terminate()) {
                Ok(mut stream) => {
                    stream.recv().await;
                }
                Err(err) => {
                    tracing::warn!(error = %err, "cannot listen for SIGTERM");
                    std::future::pending::<()>().await;
                }
            }
        };

        tokio::select! {
            _ = shutdown.token.cancelled() => {}
            result = tokio::signal::ctrl_c() => match result {
                Ok(()) => shutdown.trigger(ShutdownSignal::Interrupt),
                Err(err) => tracing::warn!(error = %err, "cannot listen for SIGINT"),
            },
            _ = terminate => shutdown.trigger(ShutdownSignal::Terminate),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_signal_wins() {
        let shutdown = Shutdown::new();
        assert!(!shutdown.is_requested());
        assert_eq!(shutdown.exit_code(), 1);

        shutdown.trigger(ShutdownSignal::Terminate);
        shutdown.trigger(ShutdownSignal::Interrupt);

        assert!(shutdown.is_requested());
        assert_eq!(shutdown.signal(), Some(ShutdownSignal::Terminate));
        assert_eq!(shutdown.exit_code(), 143);
    }

    #[test]
    fn clones_share_the_flag() {
        let shutdown = Shutdown::new();
        let clone = shutdown.clone();
        clone.trigger(ShutdownSignal::Interrupt);
        assert!(shutdown.token().is_cancelled());
        assert_eq!(shutdown.exit_code(), 130);
    }

    #[tokio::test]
    async fn listener_exits_when_cancelled_elsewhere() {
        let shutdown = Shutdown::new();
        let handle = spawn_signal_listener(shutdown.clone());
        shutdown.token().cancel();
        handle.await.unwrap();
        assert_eq!(shutdown.signal(), None);
    }
}
