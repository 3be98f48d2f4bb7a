//! CLI interface definitions for the `avscan-batch` application.
//!
//! This module defines command-line arguments using [`clap`] and exposes:
//!
//! - [`Args`]: the main struct parsed from CLI inputs
//! - [`ParsedArgs`]: the result of [`parse_args`], which separates help
//!   requests from real runs so the caller can pick the exit code
//!
//! # Example
//!
//! ```bash
//! avscan-batch /etc/aide-clamav.conf --threads 4 --timeout 7200
//! avscan-batch ?          # uses ./aide-clamav.conf
//! ```

use crate::partition::MAX_COMMAND_LEN;
use crate::run::{DEFAULT_ERROR_FILE, DEFAULT_REPORT_FILE};
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use std::ffi::OsString;
use std::path::PathBuf;

const CONFIG_FORMAT_HELP: &str = "\
Configuration file format:
  first line:  path to the AIDE report.log
  second line: scanner command, e.g. clamscan
  third line:  scanner arguments
  fourth line (optional): scanner processes to run in parallel

'avscan-batch ?' uses aide-clamav.conf in the current directory.";

/// Command-line arguments for `avscan-batch`.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "avscan-batch",
    version,
    about = "Scan the files listed in an integrity report with parallel antivirus processes",
    after_help = CONFIG_FORMAT_HELP
)]
pub struct Args {
    /// Path to the configuration file ('?' for ./aide-clamav.conf)
    #[arg(value_name = "CONFIG")]
    pub config: Option<String>,

    /// Scanner processes to run in parallel (overrides the config file)
    #[arg(long, value_name = "N")]
    pub threads: Option<usize>,

    /// Kill a scanner process after this many seconds (0 disables)
    #[arg(long, value_name = "SECS", default_value_t = 86400)]
    pub timeout: u64,

    /// File that receives the raw scanner output
    #[arg(long, value_name = "FILE", default_value = DEFAULT_REPORT_FILE)]
    pub report_file: PathBuf,

    /// File that receives infected, failed and incomplete batches
    #[arg(long, value_name = "FILE", default_value = DEFAULT_ERROR_FILE)]
    pub error_file: PathBuf,

    /// Upper bound on the length of one scanner command line
    #[arg(long, value_name = "BYTES", default_value_t = MAX_COMMAND_LEN, hide = true)]
    pub max_command_len: usize,

    /// Do not lower the scanners' CPU and I/O priority
    #[arg(long, default_value_t = false)]
    pub no_renice: bool,

    /// Show phase timings and memory peak at the end
    #[arg(long, default_value_t = false)]
    pub profile: bool,

    /// Write a JSON summary of the run to FILE
    #[arg(long, value_name = "FILE")]
    pub stats_json: Option<PathBuf>,

    /// Increase log verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// What the command line asked for.
#[derive(Debug)]
pub enum ParsedArgs {
    Run(Args),
    /// `-h`, `--help`, `/?` or no config argument at all
    Help,
    /// Printed output (version, usage error) with its exit code
    Exit { message: String, code: i32 },
}

/// Parses the command line, treating every help request as distinct from a
/// run so the caller can exit with the help code.
pub fn parse_args<I, T>(argv: I) -> ParsedArgs
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let argv: Vec<OsString> = argv.into_iter().map(Into::into).collect();
    if argv.iter().skip(1).any(|a| a == "/?") {
        return ParsedArgs::Help;
    }

    match Args::try_parse_from(&argv) {
        Ok(args) if args.config.is_none() => ParsedArgs::Help,
        Ok(args) => ParsedArgs::Run(args),
        Err(err) => match err.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                ParsedArgs::Help
            }
            _ => ParsedArgs::Exit {
                message: err.render().to_string(),
                code: err.exit_code(),
            },
        },
    }
}

/// Full help text, including the configuration file format.
pub fn help_text() -> String {
    Args::command().render_long_help().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_help_requests() {
        for argv in [
            vec!["avscan-batch"],
            vec!["avscan-batch", "-h"],
            vec!["avscan-batch", "--help"],
            vec!["avscan-batch", "/?"],
        ] {
            assert!(matches!(parse_args(argv), ParsedArgs::Help));
        }
    }

    #[test]
    fn test_run_with_defaults() {
        let ParsedArgs::Run(args) = parse_args(["avscan-batch", "?"]) else {
            panic!("expected a run");
        };
        assert_eq!(args.config.as_deref(), Some("?"));
        assert_eq!(args.timeout, 86400);
        assert_eq!(args.report_file, PathBuf::from(DEFAULT_REPORT_FILE));
        assert_eq!(args.error_file, PathBuf::from(DEFAULT_ERROR_FILE));
        assert_eq!(args.max_command_len, MAX_COMMAND_LEN);
        assert!(!args.no_renice);
    }

    #[test]
    fn test_overrides() {
        let ParsedArgs::Run(args) = parse_args([
            "avscan-batch",
            "/etc/scan.conf",
            "--threads",
            "3",
            "--timeout",
            "0",
            "--no-renice",
            "-vv",
            "--stats-json",
            "stats.json",
        ]) else {
            panic!("expected a run");
        };
        assert_eq!(args.threads, Some(3));
        assert_eq!(args.timeout, 0);
        assert!(args.no_renice);
        assert_eq!(args.verbose, 2);
        assert_eq!(args.stats_json, Some(PathBuf::from("stats.json")));
    }

    #[test]
    fn test_version_and_bad_flags_exit() {
        match parse_args(["avscan-batch", "--version"]) {
            ParsedArgs::Exit { code, .. } => assert_eq!(code, 0),
            other => panic!("unexpected {:?}", other),
        }
        match parse_args(["avscan-batch", "x.conf", "--bogus"]) {
            ParsedArgs::Exit { code, .. } => assert_ne!(code, 0),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_help_text_mentions_config_format() {
        assert!(help_text().contains("Configuration file format"));
    }
}
