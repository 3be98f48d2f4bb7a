//! Data structures shared by the batching pipeline.
//!
//! This module defines the values that flow from the report parser through the
//! partitioner to the workers:
//!
//! - [`ReportEntry`]: one qualifying line of the integrity report
//! - [`ScanTarget`]: a confirmed, existing file with its size
//! - [`Batch`]: a sealed group of targets handed to exactly one worker
//! - [`WorkerResult`]: the counters a worker produced for its batch

use serde::Serialize;
use std::path::PathBuf;

/// A single qualifying line of the integrity report.
///
/// # Fields
/// * `marker` - The leading type marker (`'f'` for files, `'d'` for directories)
/// * `path` - The trimmed text after the first separator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportEntry {
    pub marker: char,
    pub path: String,
}

/// A file confirmed to exist at parse time.
///
/// # Fields
/// * `path` - Absolute path of the file
/// * `size` - Size in bytes when the report was parsed
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct ScanTarget {
    pub path: PathBuf,
    pub size: u64,
}

impl ScanTarget {
    /// Length this target adds to the scanner command line: ` "<path>"`.
    pub fn serialized_len(&self) -> usize {
        self.path.as_os_str().len() + 3
    }
}

/// A sealed group of targets dispatched to one scanner process.
///
/// Batches are immutable once built by the partitioner; the worker that
/// receives one owns it until it finishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    /// Sequence number in submission order, starting at 1
    pub id: usize,
    pub items: Vec<ScanTarget>,
    pub total_bytes: u64,
    pub serialized_len: usize,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Counters produced by one worker for one batch.
///
/// A failed batch (launch error, timeout, cancellation) reports zero for
/// every counter and `succeeded == false`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WorkerResult {
    pub scanned: u64,
    pub infected: u64,
    pub batch_size: usize,
    pub bytes_processed: u64,
    #[serde(skip)]
    pub raw_output: String,
    pub succeeded: bool,
}

impl WorkerResult {
    /// Result for a batch whose scanner never produced usable output.
    pub fn failed(batch_size: usize) -> Self {
        Self {
            batch_size,
            ..Default::default()
        }
    }

    /// Whether the batch needs an entry in the error report.
    pub fn has_discrepancy(&self) -> bool {
        self.scanned != self.batch_size as u64 || self.infected > 0
    }
}
