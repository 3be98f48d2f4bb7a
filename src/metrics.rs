//! Phase timing and memory metrics for a run.
//!
//! This module provides:
//! - [`PhaseTimer`] - A wrapper around `Instant` for timing pipeline phases
//! - [`rss_after_phase`] - Current RSS of this process via `sysinfo`
//! - [`RunProfile`] - Collected phase timings and peak memory
//! - [`print_profile_summary`] - Terminal output for `--profile`
//!
//! # Usage
//!
//! ```rust
//! use avscan_batch::metrics::{RunProfile, rss_after_phase};
//!
//! let mut profile = RunProfile::new();
//! let (lines, timing) = avscan_batch::time_phase!("Parse report", {
//!     // ... do work ...
//!     3
//! });
//!
//! profile.add_phase(timing);
//! profile.record_memory(rss_after_phase());
//! assert_eq!(lines, 3);
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use sysinfo::{Pid, System};

/// A timer for one named phase of the run.
#[derive(Debug, Clone)]
pub struct PhaseTimer {
    pub name: String,
    pub start: Instant,
}

impl PhaseTimer {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            start: Instant::now(),
        }
    }

    /// Stops the timer and returns the phase result.
    pub fn finish(self) -> PhaseResult {
        PhaseResult {
            name: self.name,
            duration: self.start.elapsed(),
        }
    }
}

/// The result of a completed phase timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseResult {
    pub name: String,
    /// Serialized as whole milliseconds
    #[serde(with = "duration_millis")]
    pub duration: Duration,
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Timings and memory figures collected over a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunProfile {
    pub phases: Vec<PhaseResult>,
    /// Highest RSS observed at a phase boundary, in bytes
    pub memory_peak: Option<u64>,
    pub metadata: BTreeMap<String, String>,
}

impl RunProfile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_phase(&mut self, phase: PhaseResult) {
        self.phases.push(phase);
    }

    /// Keeps the larger of the stored and the given RSS reading.
    pub fn record_memory(&mut self, rss: Option<u64>) {
        self.memory_peak = match (self.memory_peak, rss) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
    }

    pub fn add_metadata(&mut self, key: &str, value: impl ToString) {
        self.metadata.insert(key.to_string(), value.to_string());
    }

    pub fn total_duration(&self) -> Duration {
        self.phases.iter().map(|p| p.duration).sum()
    }
}

/// Resident set size of this process in bytes, if the platform reports it.
pub fn rss_after_phase() -> Option<u64> {
    let pid = Pid::from_u32(std::process::id());
    let mut system = System::new();
    if !system.refresh_process(pid) {
        return None;
    }
    system.process(pid).map(|p| p.memory())
}

/// Prints phase timings and memory peak.
///
/// # Example Output
/// ```text
/// Run phase timings
///   Parse report        85 ms
///   Partition            2 ms
///   Dispatch        731204 ms
///   Total           731291 ms
/// Memory peak:      42.0 MB
/// ```
pub fn print_profile_summary(profile: &RunProfile) {
    println!("\nRun phase timings");
    for phase in &profile.phases {
        println!("  {:<15} {:>7} ms", phase.name, phase.duration.as_millis());
    }
    println!("  {:<15} {:>7} ms", "Total", profile.total_duration().as_millis());

    if let Some(memory_peak) = profile.memory_peak {
        let memory_mb = memory_peak as f64 / (1024.0 * 1024.0);
        println!("Memory peak:      {:.1} MB", memory_mb);
    }

    if !profile.metadata.is_empty() {
        println!("\nAdditional metrics:");
        for (key, value) in &profile.metadata {
            println!("  {:<15} {}", key, value);
        }
    }

    println!();
}

/// Times a block, returning `(result, PhaseResult)`.
///
/// ```rust
/// use avscan_batch::time_phase;
///
/// let (answer, timing) = time_phase!("Partition", { 6 * 7 });
/// assert_eq!(answer, 42);
/// assert_eq!(timing.name, "Partition");
/// ```
#[macro_export]
macro_rules! time_phase {
    ($name:expr, $code:block) => {{
        let timer = $crate::metrics::PhaseTimer::new($name);
        let result = $code;
        let timing = timer.finish();
        (result, timing)
    }};
}
