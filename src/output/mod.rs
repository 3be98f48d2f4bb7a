//! Presentation layer for a run.
//!
//! Nothing in here affects what gets scanned; it only renders the progress
//! events and the final [`RunSummary`](crate::run::RunSummary).
//!
//! # Available Outputs
//!
//! - **Terminal**: in-place progress line via `indicatif` and the final
//!   verdict lines
//! - **JSON**: machine-readable run summary for scripting (`--stats-json`)

pub mod json;
pub mod terminal;

/// JSON summary writer.
///
/// See [`json::save_stats_json`] for full documentation.
pub use json::save_stats_json;

/// Terminal summary printer.
///
/// See [`terminal::print_summary`] for full documentation.
pub use terminal::{TerminalProgress, print_summary};
