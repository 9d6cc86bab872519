//! Frequency scheduler.
//!
//! An operation is due when at least one interval has elapsed since its last
//! successful completion. With no record, the caller's `first_run_default`
//! decides: syncs pass `true`, full scrubs and fast parity passes pass
//! `false` so that multi-hour work only starts once a spec has been seeded.

use crate::state::{unix_now, LastRunState};
use crate::types::{Interval, OperationId};

/// `is_due` against an explicit clock (`now`, float UNIX seconds).
pub fn is_due_at(
    last_run: &LastRunState,
    id: &OperationId,
    interval: Interval,
    first_run_default: bool,
    now: f64,
) -> bool {
    match last_run.get(id) {
        None => first_run_default,
        Some(last) => now - last >= interval.seconds() as f64,
    }
}

/// `is_due_at` convenience wrapper using the wall clock.
pub fn is_due(
    last_run: &LastRunState,
    id: &OperationId,
    interval: Interval,
    first_run_default: bool,
) -> bool {
    is_due_at(last_run, id, interval, first_run_default, unix_now())
}

/// Timestamp at which `id` next becomes due, or `None` if it has never run.
pub fn next_due(last_run: &LastRunState, id: &OperationId, interval: Interval) -> Option<f64> {
    last_run.get(id).map(|last| last + interval.seconds() as f64)
}
