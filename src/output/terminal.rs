//! Terminal output for progress and the final summary.
//!
//! Progress is drawn on a single `indicatif` spinner line on stderr, which
//! `indicatif` hides automatically when stderr is not a terminal. The
//! summary goes to stdout.

use crate::progress::{ProgressEvent, ProgressSink};
use crate::run::{RunSummary, Verdict};
use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use humansize::{DECIMAL, format_size};
use indicatif::{ProgressBar, ProgressStyle};
use std::fmt::Write as _;
use std::fs;
use std::time::Duration;

/// Formats one progress line:
/// `" 42.0% completed. Execution time  3 minutes. Time 2024-05-01 10:00:00"`.
pub fn format_status(event: &ProgressEvent, now: DateTime<Local>) -> String {
    let minutes = (event.elapsed.as_secs_f64() / 60.0).round() as u64;
    format!(
        "{:5.1}% completed. Execution time {:2} minutes. Time {}",
        event.percent(),
        minutes,
        now.format("%Y-%m-%d %H:%M:%S")
    )
}

/// Renders progress events on an in-place spinner line.
pub struct TerminalProgress {
    bar: ProgressBar,
}

impl TerminalProgress {
    pub fn new() -> Result<Self> {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::default_spinner()
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"])
                .template("{spinner} {msg}")
                .context("Failed to set progress template")?,
        );
        bar.enable_steady_tick(Duration::from_millis(100));
        Ok(Self { bar })
    }
}

impl ProgressSink for TerminalProgress {
    fn update(&self, event: &ProgressEvent) {
        self.bar.set_message(format_status(event, Local::now()));
    }

    fn finish(&self, event: &ProgressEvent) {
        self.bar
            .finish_with_message(format_status(event, Local::now()));
    }
}

/// Builds the closing lines of a run.
///
/// The error report is only mentioned when something was written to it.
pub fn render_summary(summary: &RunSummary) -> String {
    let mut out = String::new();
    let totals = &summary.dispatch.totals;

    let _ = writeln!(out, "Added to scan {} files", summary.files_submitted);
    let _ = writeln!(
        out,
        "Data scanned: {} of {} in {} batches",
        format_size(totals.bytes_processed, DECIMAL),
        format_size(summary.bytes_expected, DECIMAL),
        summary.batches
    );

    if summary.infected() > 0 {
        let _ = writeln!(out, "FOUND INFECTED FILES: {}", summary.infected());
    }

    match summary.verdict() {
        Verdict::Success => {
            let _ = writeln!(
                out,
                "Program successfully ended. Scanned {} files",
                summary.scanned()
            );
        }
        Verdict::Incomplete => {
            let _ = writeln!(
                out,
                "Program ended. FAILURE! Added to scan: {} files; scanned: {} files",
                summary.files_submitted,
                summary.scanned()
            );
        }
        Verdict::Cancelled => {
            let _ = writeln!(
                out,
                "Program cancelled. Added to scan: {} files; scanned: {} files; batches not started: {}",
                summary.files_submitted,
                summary.scanned(),
                totals.skipped_batches
            );
        }
    }

    let _ = writeln!(
        out,
        "scanner reports in the file {}",
        summary.report_file.display()
    );
    let error_file_used = fs::metadata(&summary.error_file)
        .map(|m| m.len() > 0)
        .unwrap_or(false);
    if error_file_used {
        let _ = writeln!(
            out,
            "errors reports in the file {}",
            summary.error_file.display()
        );
    }
    out
}

/// Prints [`render_summary`] to stdout.
pub fn print_summary(summary: &RunSummary) {
    print!("{}", render_summary(summary));
}
