//! Tracing initialisation.
//!
//! Events go to stderr and, when a log file is given, are appended to it as
//! well. The file is size-rotated before it is opened. `log` records from
//! crates using the `log` facade reach the same subscriber.

use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::log_rotation;

/// Install the global subscriber. Safe to call more than once; later calls
/// are no-ops.
pub fn init_tracing(log_file: Option<&Path>) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr = fmt::layer().with_target(false).with_writer(std::io::stderr);

    let mut open_error = None;
    let mut rotated = false;
    let file_layer = log_file.and_then(|path| match log_rotation::open_for_append(path) {
        Ok((file, did_rotate)) => {
            rotated = did_rotate;
            Some(
                fmt::layer()
                    .with_target(false)
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        Err(err) => {
            open_error = Some(err);
            None
        }
    });

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(stderr)
        .with(file_layer)
        .try_init();

    if let Some(path) = log_file {
        match open_error {
            Some(err) => {
                tracing::warn!(path = %path.display(), error = %err, "cannot open log file; logging to stderr only")
            }
            None if rotated => tracing::info!(path = %path.display(), "log file rotated"),
            None => {}
        }
    }
}
