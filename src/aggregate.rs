//! Shared run state and the single coordination primitive.
//!
//! [`Coordination`] owns the aggregate counters and the two report files
//! behind one `parking_lot::Mutex`, paired with a `Condvar` that is broadcast
//! on every worker completion. It doubles as the counting semaphore that caps
//! concurrent workers: [`Coordination::acquire_slot`] blocks while the cap is
//! reached and [`Coordination::complete`] releases the slot.
//!
//! Every waiter re-checks its own condition after waking, so spurious or
//! unrelated wakeups are harmless.

use crate::data::WorkerResult;
use crate::dispatch::CancelToken;
use parking_lot::{Condvar, Mutex};
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::time::Duration;
use tracing::error;

/// How often blocked waiters re-check the cancellation flag.
pub const WAKE_INTERVAL: Duration = Duration::from_millis(200);

/// Counters accumulated across all workers.
///
/// Every field only grows, except `active_workers`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AggregateState {
    pub active_workers: usize,
    pub scanned_files: u64,
    pub infected_files: u64,
    pub bytes_processed: u64,
    pub bytes_expected: u64,
    pub completed_batches: usize,
    pub failed_batches: usize,
    /// Batches never started because the run was cancelled
    pub skipped_batches: usize,
}

impl AggregateState {
    pub fn new(bytes_expected: u64) -> Self {
        Self {
            bytes_expected,
            ..Default::default()
        }
    }

    /// Adds one batch's counters.
    pub fn merge(&mut self, result: &WorkerResult) {
        self.scanned_files += result.scanned;
        self.infected_files += result.infected;
        self.bytes_processed += result.bytes_processed;
        self.completed_batches += 1;
        if !result.succeeded {
            self.failed_batches += 1;
        }
    }

    /// Percent of expected bytes processed, 100 when nothing was expected.
    pub fn percent_complete(&self) -> f64 {
        if self.bytes_expected == 0 {
            100.0
        } else {
            self.bytes_processed as f64 * 100.0 / self.bytes_expected as f64
        }
    }
}

/// Text a finished worker appends to the report files.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportEntries {
    pub success: Option<String>,
    pub error: Option<String>,
}

/// The two append-only report files.
pub struct ReportSink {
    success: Box<dyn Write + Send>,
    errors: Box<dyn Write + Send>,
    error_entries: usize,
}

impl ReportSink {
    /// Truncates both files and opens them for appending.
    pub fn create(success_path: &Path, error_path: &Path) -> io::Result<Self> {
        Ok(Self::from_writers(
            Box::new(open_truncated(success_path)?),
            Box::new(open_truncated(error_path)?),
        ))
    }

    pub fn from_writers(success: Box<dyn Write + Send>, errors: Box<dyn Write + Send>) -> Self {
        Self {
            success,
            errors,
            error_entries: 0,
        }
    }

    fn write(&mut self, entries: &ReportEntries) {
        if let Some(text) = &entries.success {
            if let Err(e) = self
                .success
                .write_all(text.as_bytes())
                .and_then(|_| self.success.flush())
            {
                error!("failed to append to the scan report: {}", e);
            }
        }
        if let Some(text) = &entries.error {
            self.error_entries += 1;
            if let Err(e) = self
                .errors
                .write_all(text.as_bytes())
                .and_then(|_| self.errors.flush())
            {
                error!("failed to append to the error report: {}", e);
            }
        }
    }
}

fn open_truncated(path: &Path) -> io::Result<File> {
    File::create(path)?;
    OpenOptions::new().append(true).open(path)
}

struct Inner {
    totals: AggregateState,
    sink: ReportSink,
    closed: bool,
}

/// Counters, report files and the completion signal, shared by the
/// coordinator, the workers and the progress reporter.
pub struct Coordination {
    inner: Mutex<Inner>,
    changed: Condvar,
}

impl Coordination {
    pub fn new(bytes_expected: u64, sink: ReportSink) -> Self {
        Self {
            inner: Mutex::new(Inner {
                totals: AggregateState::new(bytes_expected),
                sink,
                closed: false,
            }),
            changed: Condvar::new(),
        }
    }

    /// Blocks until fewer than `cap` workers are active, then takes a slot.
    ///
    /// Returns `false` without taking a slot if `cancel` trips while waiting.
    pub fn acquire_slot(&self, cap: usize, cancel: &CancelToken) -> bool {
        let mut inner = self.inner.lock();
        while inner.totals.active_workers >= cap.max(1) {
            if cancel.is_cancelled() {
                return false;
            }
            self.changed.wait_for(&mut inner, WAKE_INTERVAL);
        }
        if cancel.is_cancelled() {
            return false;
        }
        inner.totals.active_workers += 1;
        true
    }

    /// Records a finished batch: appends its report text, merges its
    /// counters, releases its slot and wakes every waiter.
    pub fn complete(&self, result: &WorkerResult, entries: &ReportEntries) {
        let mut inner = self.inner.lock();
        inner.sink.write(entries);
        inner.totals.merge(result);
        inner.totals.active_workers = inner.totals.active_workers.saturating_sub(1);
        drop(inner);
        self.changed.notify_all();
    }

    /// Records a batch that was never started. Its entries are written but no
    /// slot is released and no counter other than `skipped_batches` moves.
    pub fn skip(&self, entries: &ReportEntries) {
        let mut inner = self.inner.lock();
        inner.sink.write(entries);
        inner.totals.skipped_batches += 1;
        drop(inner);
        self.changed.notify_all();
    }

    /// Blocks until no worker holds a slot.
    pub fn wait_idle(&self) {
        let mut inner = self.inner.lock();
        while inner.totals.active_workers > 0 {
            self.changed.wait_for(&mut inner, WAKE_INTERVAL);
        }
    }

    /// Waits for the next completion signal, or `timeout`.
    ///
    /// Returns the current counters and whether the run has been closed.
    pub fn wait_for_change(&self, timeout: Duration) -> (AggregateState, bool) {
        let mut inner = self.inner.lock();
        if !inner.closed {
            self.changed.wait_for(&mut inner, timeout);
        }
        (inner.totals, inner.closed)
    }

    /// Marks the run finished and wakes every waiter.
    pub fn close(&self) {
        self.inner.lock().closed = true;
        self.changed.notify_all();
    }

    /// Wakes every waiter so it can re-check its condition.
    pub fn notify(&self) {
        self.changed.notify_all();
    }

    pub fn snapshot(&self) -> AggregateState {
        self.inner.lock().totals
    }

    /// Number of entries written to the error report so far.
    pub fn error_entries(&self) -> usize {
        self.inner.lock().sink.error_entries
    }
}
