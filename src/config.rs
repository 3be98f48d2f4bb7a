//! Configuration file loading.
//!
//! The configuration is a plain text file with one value per line:
//!
//! ```text
//! /var/lib/aide/report.log      # integrity report
//! clamscan                      # scanner executable
//! --no-summary=no -i            # fixed scanner arguments
//! 4                             # optional: scanner processes in parallel
//! ```
//!
//! Comments are not supported; the lines are taken verbatim (trimmed).

use crate::error::FatalError;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Name used when the config argument is `?`.
pub const DEFAULT_CONFIG_FILE: &str = "aide-clamav.conf";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanConfig {
    pub report_path: PathBuf,
    pub scanner: String,
    pub scanner_args: String,
    /// Worker count from line 4; `None` if absent or not a number
    pub workers: Option<usize>,
}

impl ScanConfig {
    /// Parses configuration text.
    ///
    /// # Errors
    /// `ConfigMalformed` when fewer than three lines are present or the report
    /// or scanner line is empty.
    pub fn parse(text: &str) -> Result<Self, FatalError> {
        let lines: Vec<&str> = text.lines().map(str::trim).collect();
        if lines.len() < 3 {
            return Err(FatalError::ConfigMalformed {
                reason: format!(
                    "three lines required, but there are {} only",
                    lines.len()
                ),
            });
        }
        if lines[0].is_empty() {
            return Err(FatalError::ConfigMalformed {
                reason: "first line (integrity report path) is empty".into(),
            });
        }
        if lines[1].is_empty() {
            return Err(FatalError::ConfigMalformed {
                reason: "second line (scanner command) is empty".into(),
            });
        }

        let workers = match lines.get(3).filter(|l| !l.is_empty()) {
            None => None,
            Some(raw) => match raw.parse::<usize>() {
                Ok(n) => Some(n),
                Err(_) => {
                    warn!(value = %raw, "fourth line is not a process count, ignoring it");
                    None
                }
            },
        };

        Ok(Self {
            report_path: PathBuf::from(lines[0]),
            scanner: lines[1].to_string(),
            scanner_args: lines[2].to_string(),
            workers,
        })
    }

    /// Reads and parses the configuration file at `path`.
    pub fn load(path: &Path) -> Result<Self, FatalError> {
        if !path.is_file() {
            return Err(FatalError::ConfigMissing {
                path: path.to_path_buf(),
            });
        }
        let text = fs::read_to_string(path).map_err(|source| FatalError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }

    /// Checks that the referenced report and scanner exist.
    ///
    /// A scanner given as a bare name is left to `PATH` lookup at launch.
    pub fn validate(&self) -> Result<(), FatalError> {
        if !self.report_path.is_file() {
            return Err(FatalError::ReportMissing {
                path: self.report_path.clone(),
            });
        }
        let scanner = Path::new(&self.scanner);
        if self.scanner.contains('/') && !scanner.exists() {
            return Err(FatalError::ScannerMissing {
                path: scanner.to_path_buf(),
            });
        }
        Ok(())
    }
}

/// Maps the command-line config argument to a path; `?` selects
/// [`DEFAULT_CONFIG_FILE`] in the current directory.
pub fn resolve_config_arg(arg: &str) -> PathBuf {
    if arg == "?" {
        PathBuf::from(DEFAULT_CONFIG_FILE)
    } else {
        PathBuf::from(arg)
    }
}
