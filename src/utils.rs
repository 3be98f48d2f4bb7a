//! Utility functions shared across the pipeline.
//!
//! This module provides:
//! - Absolute path resolution without following symlinks
//! - Command-line rendering helpers for logs and length accounting
//! - The separator block written between report entries
//! - Worker-count validation against the CPU count

use std::path::{Path, PathBuf};
use tracing::warn;

/// Width of the dashed line between report file entries.
pub const SEPARATOR_WIDTH: usize = 64;

/// Returns `path` as an absolute path, joined onto the current directory if
/// relative. Symlinks are kept as written.
pub fn absolute_path(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Splits the fixed scanner argument string into argv entries.
pub fn split_args(args: &str) -> Vec<String> {
    args.split_whitespace().map(str::to_string).collect()
}

/// Renders a scanner invocation the way a shell would see it:
/// `program <fixed-args> "<path1>" "<path2>" ...`.
pub fn render_command_line<'a, I>(program: &str, fixed_args: &str, paths: I) -> String
where
    I: IntoIterator<Item = &'a Path>,
{
    let mut line = String::with_capacity(program.len() + fixed_args.len() + 64);
    line.push_str(program);
    if !fixed_args.is_empty() {
        line.push(' ');
        line.push_str(fixed_args);
    }
    for path in paths {
        line.push_str(" \"");
        line.push_str(&path.to_string_lossy());
        line.push('"');
    }
    line
}

/// The dashed line used to separate entries in the report files.
pub fn separator_line() -> String {
    "-".repeat(SEPARATOR_WIDTH)
}

/// Clamps a requested worker count to `1..=cpus`.
///
/// Anything outside that range (or absent) falls back to the CPU count.
pub fn effective_workers(requested: Option<usize>, cpus: usize) -> usize {
    let cpus = cpus.max(1);
    match requested {
        Some(n) if (1..=cpus).contains(&n) => n,
        Some(n) => {
            warn!(
                requested = n,
                cpus, "scanner process count is out of range, using the CPU count"
            );
            cpus
        }
        None => cpus,
    }
}
