//! Worker runner: one scanner process per batch.
//!
//! For a sealed [`Batch`] this module
//! - starts the scanner as `program <fixed-args> <path1> <path2> ...` in its
//!   own process group, with stdout and stderr captured
//! - lowers the child's CPU and I/O priority with `renice`/`ionice`
//! - drains both pipes on reader threads while polling for exit, so a full
//!   pipe never stalls the scanner
//! - enforces the per-worker timeout and the run's cancellation flag by
//!   signalling the process group (`SIGTERM`, then `SIGKILL`)
//! - parses the `Scanned files:` and `Infected files:` counters
//! - formats the text destined for the two report files
//!
//! Nothing here touches shared state; the dispatcher hands the returned
//! [`BatchOutcome`] to [`Coordination::complete`](crate::aggregate::Coordination::complete).

use crate::aggregate::ReportEntries;
use crate::data::{Batch, WorkerResult};
use crate::dispatch::{BatchRunner, CancelToken};
use crate::error::BatchError;
use crate::utils::{render_command_line, separator_line, split_args};
use std::io::{self, Read};
use std::os::unix::process::CommandExt;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

pub const SCANNED_LABEL: &str = "Scanned files: ";
pub const INFECTED_LABEL: &str = "Infected files: ";

const POLL_INTERVAL: Duration = Duration::from_millis(50);
const TERMINATE_GRACE: Duration = Duration::from_secs(2);

/// How to invoke the external scanner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannerCommand {
    pub program: String,
    pub fixed_args: String,
    /// Lower the child's scheduling priority after launch
    pub renice: bool,
    /// Kill the scanner if it runs longer than this
    pub timeout: Option<Duration>,
}

impl ScannerCommand {
    pub fn new(program: impl Into<String>, fixed_args: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            fixed_args: fixed_args.into(),
            renice: true,
            timeout: None,
        }
    }

    fn build(&self, batch: &Batch) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(split_args(&self.fixed_args))
            .args(batch.items.iter().map(|t| t.path.as_os_str()))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0);
        cmd
    }
}

impl BatchRunner for ScannerCommand {
    fn run(&self, batch: &Batch, cancel: &CancelToken) -> BatchOutcome {
        run_batch(batch, self, cancel)
    }
}

/// What one worker produced for its batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOutcome {
    pub result: WorkerResult,
    pub entries: ReportEntries,
}

/// Reads the run of decimal digits that follows `label` in `output`.
///
/// Non-digit characters between the label and the number are skipped.
pub fn parse_counter(output: &str, label: &'static str) -> Result<u64, BatchError> {
    let start = output
        .find(label)
        .ok_or(BatchError::OutputParse { label })?
        + label.len();
    let rest = &output[start..];
    let digits_at = rest
        .find(|c: char| c.is_ascii_digit())
        .ok_or(BatchError::OutputParse { label })?;
    let digits: &str = &rest[digits_at..];
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    digits[..end]
        .parse()
        .map_err(|_| BatchError::OutputParse { label })
}

/// Runs the scanner over one batch and returns its result exactly once.
///
/// Failures never escape: a batch that cannot be launched, times out or is
/// cancelled yields a zeroed [`WorkerResult`] and an error report entry.
pub fn run_batch(batch: &Batch, scanner: &ScannerCommand, cancel: &CancelToken) -> BatchOutcome {
    debug!(
        batch = batch.id,
        files = batch.len(),
        "{}",
        render_command_line(
            &scanner.program,
            &scanner.fixed_args,
            batch.items.iter().map(|t| t.path.as_path())
        )
    );

    match execute(batch, scanner, cancel) {
        Ok(captured) => finished_outcome(batch, captured),
        Err((err, captured)) => {
            error!(batch = batch.id, files = batch.len(), "{}", err);
            failed_outcome(batch, &err, captured.as_ref())
        }
    }
}

/// Captured pipes of a scanner process.
#[derive(Debug, Default)]
struct Captured {
    stdout: String,
    stderr: String,
}

fn execute(
    batch: &Batch,
    scanner: &ScannerCommand,
    cancel: &CancelToken,
) -> Result<Captured, (BatchError, Option<Captured>)> {
    let mut child = scanner.build(batch).spawn().map_err(|source| {
        (
            BatchError::ProcessLaunch {
                program: scanner.program.clone(),
                source,
            },
            None,
        )
    })?;

    if scanner.renice {
        lower_priority(child.id());
    }

    let stdout = spawn_reader(child.stdout.take());
    let stderr = spawn_reader(child.stderr.take());

    let waited = wait_for_exit(&mut child, scanner.timeout, cancel);
    let captured = Captured {
        stdout: join_reader(stdout),
        stderr: join_reader(stderr),
    };

    match waited {
        Ok(status) => {
            debug!(batch = batch.id, %status, "scanner exited");
            Ok(captured)
        }
        Err(err) => Err((err, Some(captured))),
    }
}

fn spawn_reader<R>(pipe: Option<R>) -> Option<JoinHandle<String>>
where
    R: Read + Send + 'static,
{
    let mut pipe = pipe?;
    Some(thread::spawn(move || {
        let mut buf = Vec::new();
        if let Err(e) = pipe.read_to_end(&mut buf) {
            warn!("failed reading scanner output: {}", e);
        }
        String::from_utf8_lossy(&buf).into_owned()
    }))
}

fn join_reader(handle: Option<JoinHandle<String>>) -> String {
    handle.and_then(|h| h.join().ok()).unwrap_or_default()
}

fn wait_for_exit(
    child: &mut Child,
    timeout: Option<Duration>,
    cancel: &CancelToken,
) -> Result<ExitStatus, BatchError> {
    let deadline = timeout.map(|t| (Instant::now() + t, t));
    loop {
        if has_exited(child).map_err(BatchError::Wait)? {
            // leftovers in the group would hold the pipes open
            signal_group(child, libc::SIGKILL);
            return child.wait().map_err(BatchError::Wait);
        }
        if cancel.is_cancelled() {
            terminate(child);
            return Err(BatchError::Cancelled);
        }
        if let Some((at, timeout)) = deadline {
            if Instant::now() >= at {
                terminate(child);
                return Err(BatchError::WorkerTimeout { timeout });
            }
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// Whether the scanner has exited. The child is left unreaped, so its pid
/// still names its process group while the group is signalled.
fn has_exited(child: &Child) -> io::Result<bool> {
    // SAFETY: siginfo_t is plain data and valid when zeroed.
    let mut info: libc::siginfo_t = unsafe { std::mem::zeroed() };
    let rc = unsafe {
        libc::waitid(
            libc::P_PID,
            child.id() as libc::id_t,
            &mut info,
            libc::WEXITED | libc::WNOHANG | libc::WNOWAIT,
        )
    };
    if rc == -1 {
        let err = io::Error::last_os_error();
        return match err.kind() {
            io::ErrorKind::Interrupted => Ok(false),
            _ => Err(err),
        };
    }
    // si_pid stays zero while the child is still running
    Ok(unsafe { info.si_pid() } != 0)
}

fn signal_group(child: &Child, signal: libc::c_int) {
    unsafe {
        libc::kill(-(child.id() as libc::pid_t), signal);
    }
}

/// Sends `SIGTERM` to the child's process group, then `SIGKILL` once the
/// leader is gone or the grace period ends. Always reaps the child, and only
/// after the last signal.
fn terminate(child: &mut Child) {
    signal_group(child, libc::SIGTERM);

    let grace_end = Instant::now() + TERMINATE_GRACE;
    while Instant::now() < grace_end {
        match has_exited(child) {
            Ok(true) | Err(_) => break,
            Ok(false) => thread::sleep(POLL_INTERVAL),
        }
    }

    signal_group(child, libc::SIGKILL);
    if let Err(e) = child.wait() {
        warn!(pid = child.id(), "failed to reap scanner: {}", e);
    }
}

/// Best-effort `renice`/`ionice` of the scanner; failures are only logged.
pub fn lower_priority(pid: u32) {
    let pid = pid.to_string();
    let tools: [(&str, [&str; 4]); 2] = [
        ("renice", ["-n", "19", "-p", pid.as_str()]),
        ("ionice", ["-c", "3", "-p", pid.as_str()]),
    ];
    for (tool, args) in tools {
        match Command::new(tool)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
        {
            Ok(status) if status.success() => {}
            Ok(status) => warn!(tool, pid = %pid, %status, "priority adjustment failed"),
            Err(e) => warn!(tool, pid = %pid, "priority adjustment failed: {}", e),
        }
    }
}

fn finished_outcome(batch: &Batch, captured: Captured) -> BatchOutcome {
    let counter = |label: &'static str| match parse_counter(&captured.stdout, label) {
        Ok(n) => Some(n),
        Err(e) => {
            warn!(batch = batch.id, "{}", e);
            None
        }
    };
    let infected = counter(INFECTED_LABEL);
    let scanned = counter(SCANNED_LABEL);

    let result = WorkerResult {
        scanned: scanned.unwrap_or(0),
        infected: infected.unwrap_or(0),
        batch_size: batch.len(),
        bytes_processed: batch.total_bytes,
        raw_output: captured.stdout,
        succeeded: scanned.is_some(),
    };

    let error = result.has_discrepancy().then(|| {
        let header = format!(
            "Error or infected in files. Infected: {}; Scanned: {}.",
            result.infected, result.scanned
        );
        error_entry(&header, batch, &captured.stderr)
    });

    BatchOutcome {
        entries: ReportEntries {
            success: Some(success_entry(&result.raw_output)),
            error,
        },
        result,
    }
}

fn failed_outcome(batch: &Batch, err: &BatchError, captured: Option<&Captured>) -> BatchOutcome {
    let stderr = captured.map(|c| c.stderr.as_str()).unwrap_or_default();
    let partial = captured
        .map(|c| c.stdout.as_str())
        .filter(|s| !s.is_empty())
        .map(success_entry);
    BatchOutcome {
        result: WorkerResult::failed(batch.len()),
        entries: ReportEntries {
            success: partial,
            error: Some(error_entry(&format!("Scan failed: {}.", err), batch, stderr)),
        },
    }
}

/// Scanner output followed by the separator block.
pub fn success_entry(output: &str) -> String {
    format!("{}\n\n{}\n\n", output, separator_line())
}

/// Header, affected paths and captured stderr, followed by the separator block.
pub fn error_entry(header: &str, batch: &Batch, stderr: &str) -> String {
    let mut text = format!("{} Files:\n", header);
    for target in &batch.items {
        text.push_str(&target.path.to_string_lossy());
        text.push('\n');
    }
    if !stderr.trim().is_empty() {
        text.push_str("Scanner stderr:\n");
        text.push_str(stderr.trim_end());
        text.push('\n');
    }
    text.push_str(&format!("\n\n{}\n\n\n\n", separator_line()));
    text
}
