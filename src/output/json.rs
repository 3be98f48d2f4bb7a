//! JSON run summary for scripting integration.

use crate::run::RunSummary;
use anyhow::{Context, Result};
use std::path::Path;

/// Builds the JSON document written by [`save_stats_json`].
pub fn stats_value(summary: &RunSummary) -> serde_json::Value {
    let totals = &summary.dispatch.totals;
    serde_json::json!({
        "verdict": summary.verdict(),
        "exit_code": summary.verdict().exit_code(),
        "files_submitted": summary.files_submitted,
        "files_scanned": totals.scanned_files,
        "files_infected": totals.infected_files,
        "bytes_expected": summary.bytes_expected,
        "bytes_processed": totals.bytes_processed,
        "batches": summary.batches,
        "failed_batches": totals.failed_batches,
        "skipped_batches": totals.skipped_batches,
        "error_entries": summary.error_entries,
        "workers": summary.workers,
        "peak_workers": summary.dispatch.peak_workers,
        "elapsed_ms": summary.dispatch.elapsed.as_millis() as u64,
        "phases": summary.profile.phases,
        "memory_peak_bytes": summary.profile.memory_peak,
        "report_file": summary.report_file,
        "error_file": summary.error_file,
        "timestamp": chrono::Utc::now().to_rfc3339()
    })
}

/// Writes the run summary to `path` as pretty-printed JSON.
pub fn save_stats_json(path: &Path, summary: &RunSummary) -> Result<()> {
    let text = serde_json::to_string_pretty(&stats_value(summary))?;
    std::fs::write(path, text)
        .with_context(|| format!("Failed to write stats to {}", path.display()))?;
    println!("Run stats saved to: {}", path.display());
    Ok(())
}
