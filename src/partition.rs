//! Batch partitioning.
//!
//! Groups the sorted target list into [`Batch`]es for the workers. Two bounds
//! apply while accumulating:
//!
//! - count: a batch is sealed once it holds more than
//!   `max(1, targets / workers)` items
//! - length: a target is not added when the serialized command line would
//!   reach `max_command_len`; the current batch is sealed first
//!
//! A target that is longer than the limit on its own is never split or
//! dropped; it becomes a batch of one. This is a pure function with no I/O.

use crate::data::{Batch, ScanTarget};

/// Default command-line budget: 512 KiB minus room for the fixed arguments.
pub const MAX_COMMAND_LEN: usize = 512 * 1024 - 4096;

/// Inputs that shape the partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionPlan {
    pub workers: usize,
    pub max_command_len: usize,
}

impl PartitionPlan {
    pub fn new(workers: usize, max_command_len: usize) -> Self {
        Self {
            workers: workers.max(1),
            max_command_len,
        }
    }

    /// Items per batch before the count bound seals it.
    pub fn target_count(&self, total: usize) -> usize {
        (total / self.workers).max(1)
    }
}

impl Default for PartitionPlan {
    fn default() -> Self {
        Self::new(num_cpus::get(), MAX_COMMAND_LEN)
    }
}

/// Accumulates targets and seals batches as bounds are reached.
struct BatchBuilder {
    next_id: usize,
    items: Vec<ScanTarget>,
    total_bytes: u64,
    serialized_len: usize,
    sealed: Vec<Batch>,
}

impl BatchBuilder {
    fn new() -> Self {
        Self {
            next_id: 1,
            items: Vec::new(),
            total_bytes: 0,
            serialized_len: 0,
            sealed: Vec::new(),
        }
    }

    fn push(&mut self, target: ScanTarget) {
        self.serialized_len += target.serialized_len();
        self.total_bytes += target.size;
        self.items.push(target);
    }

    fn seal(&mut self) {
        if self.items.is_empty() {
            return;
        }
        self.sealed.push(Batch {
            id: self.next_id,
            items: std::mem::take(&mut self.items),
            total_bytes: self.total_bytes,
            serialized_len: self.serialized_len,
        });
        self.next_id += 1;
        self.total_bytes = 0;
        self.serialized_len = 0;
    }
}

/// Splits `targets` into batches.
///
/// # Arguments
/// * `targets` - Targets in the order they should be submitted
/// * `plan` - Worker count and command-line budget
///
/// # Returns
/// * `Vec<Batch>` - Every target exactly once, in input order, ids from 1
pub fn partition(targets: Vec<ScanTarget>, plan: PartitionPlan) -> Vec<Batch> {
    let per_batch = plan.target_count(targets.len());
    let mut builder = BatchBuilder::new();

    for target in targets {
        let len = target.serialized_len();
        if !builder.items.is_empty() && builder.serialized_len + len >= plan.max_command_len {
            builder.seal();
        }

        builder.push(target);

        if builder.items.len() > per_batch || builder.serialized_len >= plan.max_command_len {
            builder.seal();
        }
    }

    builder.seal();
    builder.sealed
}
