//! Error taxonomy.
//!
//! Two classes of failure exist:
//!
//! - [`FatalError`]: configuration and report problems that stop the run before
//!   any batch is dispatched. Each maps to a distinct process exit code.
//! - [`BatchError`]: per-batch problems. They are logged and written to the
//!   error report, the batch contributes zero to the counters, and the run
//!   continues.

use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Process exit codes.
pub mod exit_code {
    pub const SUCCESS: i32 = 0;
    pub const HELP: i32 = 1;
    pub const CONFIG_MISSING: i32 = 101;
    pub const REPORT_MISSING: i32 = 102;
    pub const SCANNER_MISSING: i32 = 103;
    /// The number of scanned files differs from the number submitted.
    pub const SCAN_INCOMPLETE: i32 = 104;
    pub const IO_FAILURE: i32 = 105;
    pub const CANCELLED: i32 = 130;
    pub const CONFIG_MALFORMED: i32 = 1011;
}

/// Errors that abort the whole run.
#[derive(Debug, Error)]
pub enum FatalError {
    #[error("The configuration file not exists: \"{}\"", .path.display())]
    ConfigMissing { path: PathBuf },

    #[error("Configuration file incorrect: {reason}")]
    ConfigMalformed { reason: String },

    #[error("The integrity report file not exists: \"{}\"", .path.display())]
    ReportMissing { path: PathBuf },

    #[error("The scanner executable not exists: \"{}\"", .path.display())]
    ScannerMissing { path: PathBuf },

    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl FatalError {
    pub fn exit_code(&self) -> i32 {
        match self {
            FatalError::ConfigMissing { .. } => exit_code::CONFIG_MISSING,
            FatalError::ConfigMalformed { .. } => exit_code::CONFIG_MALFORMED,
            FatalError::ReportMissing { .. } => exit_code::REPORT_MISSING,
            FatalError::ScannerMissing { .. } => exit_code::SCANNER_MISSING,
            FatalError::Read { .. } | FatalError::Write { .. } => exit_code::IO_FAILURE,
        }
    }

    /// Malformed configuration is followed by the usage text.
    pub fn wants_help(&self) -> bool {
        matches!(self, FatalError::ConfigMalformed { .. })
    }
}

/// Errors confined to a single batch.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("failed to start scanner {program}: {source}")]
    ProcessLaunch {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("label {label:?} not found or not followed by a number in scanner output")]
    OutputParse { label: &'static str },

    #[error("scanner did not finish within {timeout:?} and was killed")]
    WorkerTimeout { timeout: Duration },

    #[error("scan cancelled before the scanner finished")]
    Cancelled,

    #[error("failed waiting for scanner: {0}")]
    Wait(#[source] io::Error),
}
