//! Progress reporting.
//!
//! The core never draws anything. It produces a [`ProgressEvent`] each time
//! the shared completion signal fires (and at least once per
//! [`PROGRESS_TICK`] so elapsed time keeps moving) and hands it to a
//! [`ProgressSink`]. The terminal renderer lives in
//! [`output::terminal`](crate::output::terminal).

use crate::aggregate::{AggregateState, Coordination};
use std::time::{Duration, Instant};

/// Longest the progress line goes without a refresh.
pub const PROGRESS_TICK: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressEvent {
    pub bytes_done: u64,
    pub bytes_total: u64,
    pub elapsed: Duration,
    pub active_workers: usize,
    pub completed_batches: usize,
}

impl ProgressEvent {
    pub fn from_state(state: &AggregateState, elapsed: Duration) -> Self {
        Self {
            bytes_done: state.bytes_processed,
            bytes_total: state.bytes_expected,
            elapsed,
            active_workers: state.active_workers,
            completed_batches: state.completed_batches,
        }
    }

    /// `bytes_done / bytes_total` as a percentage.
    pub fn percent(&self) -> f64 {
        if self.bytes_total == 0 {
            100.0
        } else {
            self.bytes_done as f64 * 100.0 / self.bytes_total as f64
        }
    }
}

/// Receives progress events from the reporter thread.
pub trait ProgressSink: Sync {
    fn update(&self, event: &ProgressEvent);

    /// Called once, after the last worker has finished.
    fn finish(&self, event: &ProgressEvent) {
        self.update(event);
    }
}

/// Discards every event.
pub struct NullProgress;

impl ProgressSink for NullProgress {
    fn update(&self, _event: &ProgressEvent) {}
}

/// Forwards progress until the coordinator closes the run.
pub fn run_reporter(coord: &Coordination, started: Instant, sink: &dyn ProgressSink) {
    loop {
        let (state, closed) = coord.wait_for_change(PROGRESS_TICK);
        let event = ProgressEvent::from_state(&state, started.elapsed());
        if closed {
            sink.finish(&event);
            return;
        }
        sink.update(&event);
    }
}
