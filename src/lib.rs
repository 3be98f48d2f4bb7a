//! Library crate for avscan-batch
//!
//! Scans the files named in an integrity report (AIDE `report.log`) with an
//! external antivirus scanner, running several scanner processes in parallel.
//!
//! # Pipeline
//!
//! 1. [`report`]: parse report lines into existing, deduplicated, sorted files
//! 2. [`partition`]: group them into batches bounded by count and
//!    command-line length
//! 3. [`dispatch`]: launch one [`worker`] per batch under a concurrency cap
//! 4. [`aggregate`]: merge per-batch counters and append to the report files
//! 5. [`progress`] / [`output`]: progress events and final summary
//!
//! # Modules
//!
//! - [`cli`]: Command-line interface definitions
//! - [`config`]: The line-oriented configuration file
//! - [`data`]: Core data structures (`ScanTarget`, `Batch`, `WorkerResult`)
//! - [`error`]: Fatal and per-batch error types, exit codes
//! - [`run`]: The end-to-end run used by the binary

pub mod aggregate;
pub mod cli;
pub mod config;
pub mod data;
pub mod dispatch;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod output;
pub mod partition;
pub mod progress;
pub mod report;
pub mod run;
pub mod utils;
pub mod worker;

pub use cli::Args;
pub use data::{Batch, ScanTarget, WorkerResult};
pub use dispatch::{CancelToken, Dispatcher};
pub use run::{RunOptions, RunSummary, Verdict, run};
