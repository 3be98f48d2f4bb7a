//! Main entry point for the `avscan-batch` CLI application.
//!
//! `avscan-batch` takes the file list of an integrity report (AIDE
//! `report.log`), splits it into batches and runs an antivirus scanner such
//! as `clamscan` over them with several processes in parallel.
//!
//! # Responsibilities
//! - Parses CLI arguments via [`clap`] and maps help requests to exit code 1
//! - Loads and validates the configuration file
//! - Installs the Ctrl-C handler that cancels the run gracefully
//! - Delegates the pipeline to [`avscan_batch::run::plan`] and
//!   [`avscan_batch::run::execute`]
//! - Prints the verdict and exits with the code that matches it
//!
//! # Exit codes
//! - `0` every submitted file was scanned (infections do not change this)
//! - `1` help
//! - `101`/`102`/`103` missing config, report or scanner
//! - `104` scanned count differs from submitted count
//! - `130` cancelled
//! - `1011` malformed config

use anyhow::Result;
use avscan_batch::cli::{self, Args, ParsedArgs, help_text};
use avscan_batch::config::{ScanConfig, resolve_config_arg};
use avscan_batch::error::{FatalError, exit_code};
use avscan_batch::metrics::print_profile_summary;
use avscan_batch::output::{TerminalProgress, print_summary, save_stats_json};
use avscan_batch::run::{execute, plan};
use avscan_batch::{CancelToken, RunOptions, Verdict, logging};
use chrono::Local;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{error, warn};

/// Prints a fatal error (plus usage for a malformed config) and returns its exit code.
fn report_fatal(err: FatalError) -> i32 {
    eprintln!("{}", err);
    if err.wants_help() {
        eprintln!("{}", help_text());
    }
    err.exit_code()
}

/// Ctrl-C trips the token once; running scanners are terminated by their workers.
fn install_cancel_handler(cancel: CancelToken) {
    let notified = Arc::new(AtomicBool::new(false));
    let result = ctrlc::set_handler(move || {
        cancel.cancel();
        if !notified.swap(true, Ordering::SeqCst) {
            eprintln!("\nsignal: cancelling, waiting for running scanners to stop");
        }
    });
    if let Err(e) = result {
        warn!("Ctrl-C handler not installed: {}", e);
    }
}

fn run_cli(args: &Args) -> Result<i32> {
    logging::init(args.verbose);

    let config_path = resolve_config_arg(args.config.as_deref().unwrap_or("?"));
    let config = match ScanConfig::load(&config_path).and_then(|c| c.validate().map(|_| c)) {
        Ok(config) => config,
        Err(e) => return Ok(report_fatal(e)),
    };

    println!("Begin. Time {}", Local::now().format("%Y-%m-%d %H:%M:%S"));

    let options = RunOptions::from_args(config, args);
    let cancel = CancelToken::new();
    install_cancel_handler(cancel.clone());

    let plan = match plan(&options) {
        Ok(plan) => plan,
        Err(e) => return Ok(report_fatal(e)),
    };
    println!("Files to scan: {}", plan.files_submitted);

    let progress = TerminalProgress::new()?;
    let summary = match execute(&options, plan, &progress, &cancel) {
        Ok(summary) => summary,
        Err(e) => return Ok(report_fatal(e)),
    };

    print_summary(&summary);
    if args.profile {
        print_profile_summary(&summary.profile);
    }
    if let Some(path) = &args.stats_json {
        save_stats_json(path, &summary)?;
    }

    let verdict = summary.verdict();
    if verdict == Verdict::Incomplete {
        error!(
            submitted = summary.files_submitted,
            scanned = summary.scanned(),
            "scanner did not report every submitted file as scanned"
        );
    }
    Ok(verdict.exit_code())
}

fn main() {
    let code = match cli::parse_args(std::env::args_os()) {
        ParsedArgs::Help => {
            eprintln!("{}", help_text());
            exit_code::HELP
        }
        ParsedArgs::Exit { message, code } => {
            if code == exit_code::SUCCESS {
                print!("{}", message);
            } else {
                eprint!("{}", message);
            }
            code
        }
        ParsedArgs::Run(args) => match run_cli(&args) {
            Ok(code) => code,
            Err(e) => {
                eprintln!("Error: {:#}", e);
                exit_code::IO_FAILURE
            }
        },
    };
    std::process::exit(code);
}
