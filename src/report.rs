//! Integrity report parsing.
//!
//! Turns the lines of an AIDE-style integrity report into the sorted,
//! deduplicated list of files to scan. A line qualifies when it starts with
//! the file marker (`f`) and contains a `:` separator; the trimmed text after
//! the first separator is the candidate path.
//!
//! Lines are checked against the live filesystem in parallel with `rayon`.
//! Paths that no longer exist are skipped silently, since the report may
//! predate their deletion.

use crate::data::{ReportEntry, ScanTarget};
use crate::error::FatalError;
use crate::utils::absolute_path;
use rayon::prelude::*;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

pub const FILE_MARKER: char = 'f';
pub const SEPARATOR: char = ':';

/// The files selected for scanning.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetSet {
    /// Sorted by path, each path at most once
    pub targets: Vec<ScanTarget>,
    pub total_bytes: u64,
}

impl TargetSet {
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

/// Extracts a report entry from one line, if the line describes a file.
pub fn parse_line(line: &str) -> Option<ReportEntry> {
    let marker = line.chars().next()?;
    if marker != FILE_MARKER {
        return None;
    }
    let (_, rest) = line.split_once(SEPARATOR)?;
    let path = rest.trim();
    if path.is_empty() {
        return None;
    }
    Some(ReportEntry {
        marker,
        path: path.to_string(),
    })
}

/// Confirms an entry against the filesystem.
///
/// Returns `None` when the path does not exist or is not a regular file.
pub fn resolve_entry(entry: &ReportEntry) -> Option<ScanTarget> {
    let path = Path::new(&entry.path);
    let metadata = fs::metadata(path).ok()?;
    if !metadata.is_file() {
        return None;
    }
    Some(ScanTarget {
        path: absolute_path(path),
        size: metadata.len(),
    })
}

/// Builds the target set from raw report lines.
///
/// # Arguments
/// * `lines` - Raw report lines in any order
///
/// # Returns
/// * `TargetSet` - Existing files sorted by absolute path, deduplicated, with
///   their combined size
pub fn collect_targets<S>(lines: &[S]) -> TargetSet
where
    S: AsRef<str> + Sync,
{
    let mut targets: Vec<ScanTarget> = lines
        .par_iter()
        .filter_map(|line| parse_line(line.as_ref()))
        .filter_map(|entry| {
            let target = resolve_entry(&entry);
            if target.is_none() {
                debug!(path = %entry.path, "skipping missing file");
            }
            target
        })
        .collect();

    targets.sort_by(|a, b| a.path.cmp(&b.path));
    targets.dedup_by(|a, b| a.path == b.path);

    let total_bytes = targets.iter().map(|t| t.size).sum();
    TargetSet {
        targets,
        total_bytes,
    }
}

/// Reads an integrity report from disk and collects its targets.
///
/// Invalid UTF-8 in the report is replaced rather than rejected so one odd
/// filename cannot abort the run.
pub fn parse_report_file(path: &Path) -> Result<TargetSet, FatalError> {
    let raw = fs::read(path).map_err(|source| FatalError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let text = String::from_utf8_lossy(&raw);
    let lines: Vec<&str> = text.lines().collect();
    let set = collect_targets(&lines);
    info!(
        lines = lines.len(),
        files = set.len(),
        bytes = set.total_bytes,
        "integrity report parsed"
    );
    Ok(set)
}
