//! End-to-end run: parse → partition → dispatch → summarize.
//!
//! [`plan`] covers the first two steps and [`execute`] the rest, so the binary
//! can report the file count before the progress line starts drawing.
//!
//! [`run`] chains the two and is the entry point the integration tests drive
//! with a stand-in scanner.

use crate::aggregate::{Coordination, ReportSink};
use crate::cli::Args;
use crate::config::ScanConfig;
use crate::data::Batch;
use crate::dispatch::{CancelToken, DispatchSummary, Dispatcher};
use crate::error::{FatalError, exit_code};
use crate::metrics::{RunProfile, rss_after_phase};
use crate::partition::{MAX_COMMAND_LEN, PartitionPlan, partition};
use crate::progress::ProgressSink;
use crate::report::parse_report_file;
use crate::time_phase;
use crate::utils::{absolute_path, effective_workers};
use crate::worker::ScannerCommand;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub const DEFAULT_REPORT_FILE: &str = "clamav-report.log";
pub const DEFAULT_ERROR_FILE: &str = "errors.log";

/// Everything a run needs, resolved from the configuration file and CLI.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub config: ScanConfig,
    pub workers: usize,
    pub max_command_len: usize,
    pub timeout: Option<Duration>,
    pub renice: bool,
    pub report_file: PathBuf,
    pub error_file: PathBuf,
}

impl RunOptions {
    /// Options with the stock defaults: worker count from the config file
    /// (clamped to the CPU count), no timeout, priority lowering on.
    pub fn new(config: ScanConfig) -> Self {
        let workers = effective_workers(config.workers, num_cpus::get());
        Self {
            config,
            workers,
            max_command_len: MAX_COMMAND_LEN,
            timeout: None,
            renice: true,
            report_file: PathBuf::from(DEFAULT_REPORT_FILE),
            error_file: PathBuf::from(DEFAULT_ERROR_FILE),
        }
    }

    /// Applies command-line overrides on top of the configuration file.
    pub fn from_args(config: ScanConfig, args: &Args) -> Self {
        let requested = args.threads.or(config.workers);
        Self {
            workers: effective_workers(requested, num_cpus::get()),
            max_command_len: args.max_command_len,
            timeout: (args.timeout > 0).then(|| Duration::from_secs(args.timeout)),
            renice: !args.no_renice,
            report_file: args.report_file.clone(),
            error_file: args.error_file.clone(),
            config,
        }
    }

    fn scanner(&self) -> ScannerCommand {
        ScannerCommand {
            program: self.config.scanner.clone(),
            fixed_args: self.config.scanner_args.clone(),
            renice: self.renice,
            timeout: self.timeout,
        }
    }
}

/// How a completed run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// Every submitted file was reported scanned
    Success,
    /// The scanner reported fewer (or more) files than submitted
    Incomplete,
    Cancelled,
}

impl Verdict {
    pub fn exit_code(self) -> i32 {
        match self {
            Verdict::Success => exit_code::SUCCESS,
            Verdict::Incomplete => exit_code::SCAN_INCOMPLETE,
            Verdict::Cancelled => exit_code::CANCELLED,
        }
    }
}

/// The outcome of [`run`].
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub files_submitted: usize,
    pub bytes_expected: u64,
    pub batches: usize,
    pub workers: usize,
    pub dispatch: DispatchSummary,
    pub report_file: PathBuf,
    pub error_file: PathBuf,
    pub error_entries: usize,
    pub profile: RunProfile,
}

impl RunSummary {
    pub fn verdict(&self) -> Verdict {
        if self.dispatch.cancelled {
            Verdict::Cancelled
        } else if self.dispatch.totals.scanned_files != self.files_submitted as u64 {
            Verdict::Incomplete
        } else {
            Verdict::Success
        }
    }

    pub fn scanned(&self) -> u64 {
        self.dispatch.totals.scanned_files
    }

    pub fn infected(&self) -> u64 {
        self.dispatch.totals.infected_files
    }
}

/// The partitioned work of a run, ready to dispatch.
#[derive(Debug, Clone)]
pub struct ScanPlan {
    pub files_submitted: usize,
    pub bytes_expected: u64,
    pub batches: Vec<Batch>,
    pub profile: RunProfile,
}

/// Validates the configuration, parses the report and partitions it.
///
/// # Errors
/// A missing or unreadable report, or a missing scanner path.
pub fn plan(options: &RunOptions) -> Result<ScanPlan, FatalError> {
    options.config.validate()?;
    let mut profile = RunProfile::new();

    let (set, timing) = time_phase!("Parse report", {
        parse_report_file(&options.config.report_path)
    });
    profile.add_phase(timing);
    profile.record_memory(rss_after_phase());
    let set = set?;

    let files_submitted = set.len();
    let bytes_expected = set.total_bytes;
    let plan = PartitionPlan::new(options.workers, options.max_command_len);
    let (batches, timing) = time_phase!("Partition", { partition(set.targets, plan) });
    profile.add_phase(timing);
    info!(
        batches = batches.len(),
        workers = options.workers,
        per_batch = plan.target_count(files_submitted),
        "report partitioned"
    );

    Ok(ScanPlan {
        files_submitted,
        bytes_expected,
        batches,
        profile,
    })
}

/// Dispatches a [`ScanPlan`] and collects the outcome.
///
/// # Errors
/// Only when the report files cannot be created. Per-batch failures end up
/// in the error report and in the verdict.
pub fn execute(
    options: &RunOptions,
    plan: ScanPlan,
    progress: &dyn ProgressSink,
    cancel: &CancelToken,
) -> Result<RunSummary, FatalError> {
    let ScanPlan {
        files_submitted,
        bytes_expected,
        batches,
        mut profile,
    } = plan;
    let batch_count = batches.len();

    let sink = ReportSink::create(&options.report_file, &options.error_file).map_err(|source| {
        FatalError::Write {
            path: options.report_file.clone(),
            source,
        }
    })?;
    let coord = Arc::new(Coordination::new(bytes_expected, sink));
    let scanner = options.scanner();

    let (dispatch, timing) = time_phase!("Dispatch", {
        Dispatcher::new(&scanner, Arc::clone(&coord), options.workers, cancel.clone())
            .run(batches, progress)
    });
    profile.add_phase(timing);
    profile.record_memory(rss_after_phase());
    profile.add_metadata("batches", batch_count);
    profile.add_metadata("peak workers", dispatch.peak_workers);

    Ok(RunSummary {
        files_submitted,
        bytes_expected,
        batches: batch_count,
        workers: options.workers,
        error_entries: coord.error_entries(),
        dispatch,
        report_file: absolute_path(&options.report_file),
        error_file: absolute_path(&options.error_file),
        profile,
    })
}

/// Runs the whole pipeline for an already-loaded configuration:
/// [`plan`] followed by [`execute`].
pub fn run(
    options: &RunOptions,
    progress: &dyn ProgressSink,
    cancel: &CancelToken,
) -> Result<RunSummary, FatalError> {
    execute(options, plan(options)?, progress, cancel)
}
