//! Dispatch coordinator.
//!
//! Launches one worker thread per [`Batch`] while never letting more than
//! `max_workers` run at once. The lifecycle is
//! `Idle → Dispatching → Draining → Done`:
//!
//! - **Dispatching**: for each batch, take a slot from [`Coordination`]
//!   (blocking while the cap is reached), then spawn the worker
//! - **Draining**: every batch is submitted; join all worker threads
//! - **Done**: counters are final and safe to read
//!
//! Workers run on scoped threads and are joined explicitly, so the
//! coordinator knows when all work is done without inferring it from a
//! counter. A progress thread runs alongside and forwards a
//! [`ProgressEvent`](crate::progress::ProgressEvent) on every completion signal.

use crate::aggregate::{AggregateState, Coordination, ReportEntries};
use crate::data::{Batch, WorkerResult};
use crate::progress::{ProgressSink, run_reporter};
use crate::utils::separator_line;
use crate::error::BatchError;
use crate::worker::{BatchOutcome, error_entry};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Shared flag that asks the run to stop.
///
/// Checked by the coordinator while it waits for a slot and by every worker
/// while it waits for its scanner to exit.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Runs one batch to completion. Implemented by
/// [`ScannerCommand`](crate::worker::ScannerCommand).
pub trait BatchRunner: Sync {
    fn run(&self, batch: &Batch, cancel: &CancelToken) -> BatchOutcome;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchPhase {
    Idle,
    Dispatching,
    Draining,
    Done,
}

/// Final state of a dispatch run.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchSummary {
    pub totals: AggregateState,
    pub batches_submitted: usize,
    pub peak_workers: usize,
    pub cancelled: bool,
    pub elapsed: Duration,
}

/// Releases a worker's slot even if the worker panics.
struct SlotGuard<'a> {
    coord: &'a Coordination,
    batch_size: usize,
    batch_id: usize,
    released: bool,
}

impl SlotGuard<'_> {
    fn complete(mut self, outcome: &BatchOutcome) {
        self.coord.complete(&outcome.result, &outcome.entries);
        self.released = true;
    }
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        if !self.released {
            error!(batch = self.batch_id, "worker aborted without a result");
            let entries = ReportEntries {
                success: None,
                error: Some(format!(
                    "Scan failed: worker for batch {} aborted.\n\n{}\n\n\n\n",
                    self.batch_id,
                    separator_line()
                )),
            };
            self.coord
                .complete(&WorkerResult::failed(self.batch_size), &entries);
        }
    }
}

/// Writes a cancellation entry for every batch that never got a worker.
fn record_skipped<I>(coord: &Coordination, batches: I) -> usize
where
    I: Iterator<Item = Batch>,
{
    let header = format!("Scan failed: {}.", BatchError::Cancelled);
    let mut skipped = 0;
    for batch in batches {
        coord.skip(&ReportEntries {
            success: None,
            error: Some(error_entry(&header, &batch, "")),
        });
        skipped += 1;
    }
    skipped
}

pub struct Dispatcher<'a, R: BatchRunner> {
    runner: &'a R,
    coord: Arc<Coordination>,
    max_workers: usize,
    cancel: CancelToken,
    phase: DispatchPhase,
}

impl<'a, R: BatchRunner> Dispatcher<'a, R> {
    pub fn new(
        runner: &'a R,
        coord: Arc<Coordination>,
        max_workers: usize,
        cancel: CancelToken,
    ) -> Self {
        Self {
            runner,
            coord,
            max_workers: max_workers.max(1),
            cancel,
            phase: DispatchPhase::Idle,
        }
    }

    pub fn phase(&self) -> DispatchPhase {
        self.phase
    }

    fn enter(&mut self, phase: DispatchPhase) {
        debug!(from = ?self.phase, to = ?phase, "dispatch phase");
        self.phase = phase;
    }

    /// Submits every batch and blocks until all workers have finished.
    ///
    /// # Arguments
    /// * `batches` - Batches in submission order
    /// * `progress` - Receives an event on each completion and at least once
    ///   per [`PROGRESS_TICK`](crate::progress::PROGRESS_TICK)
    ///
    /// # Returns
    /// * `DispatchSummary` - Final counters; `cancelled` is set if the token
    ///   tripped before every batch was submitted or finished
    pub fn run<I>(&mut self, batches: I, progress: &dyn ProgressSink) -> DispatchSummary
    where
        I: IntoIterator<Item = Batch>,
    {
        let started = Instant::now();
        let mut submitted = 0usize;
        let mut peak = 0usize;

        self.enter(DispatchPhase::Dispatching);
        let coord = Arc::clone(&self.coord);
        let runner = self.runner;
        let cancel = self.cancel.clone();
        let cap = self.max_workers;

        thread::scope(|scope| {
            let reporter = scope.spawn(|| run_reporter(&coord, started, progress));

            let mut workers = Vec::new();
            let mut pending = batches.into_iter();
            while let Some(batch) = pending.next() {
                if !coord.acquire_slot(cap, &cancel) {
                    let skipped = record_skipped(&coord, std::iter::once(batch).chain(pending));
                    warn!(
                        submitted,
                        skipped, "cancellation requested, remaining batches were not started"
                    );
                    break;
                }
                submitted += 1;
                peak = peak.max(coord.snapshot().active_workers);
                debug!(
                    batch = batch.id,
                    files = batch.len(),
                    bytes = batch.total_bytes,
                    "starting worker"
                );

                let guard = SlotGuard {
                    coord: &coord,
                    batch_size: batch.len(),
                    batch_id: batch.id,
                    released: false,
                };
                let cancel = cancel.clone();
                workers.push(scope.spawn(move || {
                    let outcome = runner.run(&batch, &cancel);
                    guard.complete(&outcome);
                }));
            }

            self.enter(DispatchPhase::Draining);
            info!(batches = submitted, "all batches submitted, waiting for workers");
            for handle in workers {
                if handle.join().is_err() {
                    error!("a worker thread panicked");
                }
            }
            coord.wait_idle();
            coord.close();
            if reporter.join().is_err() {
                error!("the progress reporter panicked");
            }
        });

        self.enter(DispatchPhase::Done);
        let totals = self.coord.snapshot();
        DispatchSummary {
            totals,
            batches_submitted: submitted,
            peak_workers: peak,
            cancelled: self.cancel.is_cancelled(),
            elapsed: started.elapsed(),
        }
    }
}
