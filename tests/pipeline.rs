mod util;

use avscan_batch::config::ScanConfig;
use avscan_batch::progress::NullProgress;
use avscan_batch::{CancelToken, RunOptions, Verdict, run};
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use util::*;

fn options(dir: &Path, report: PathBuf, scanner: &str, args: String, workers: usize) -> RunOptions {
    let mut options = RunOptions::new(ScanConfig {
        report_path: report,
        scanner: scanner.to_string(),
        scanner_args: args,
        workers: None,
    });
    options.workers = workers;
    options.renice = false;
    options.report_file = dir.join("clamav-report.log");
    options.error_file = dir.join("errors.log");
    options
}

fn sh_options(dir: &Path, report: PathBuf, body: &str, workers: usize) -> RunOptions {
    let script = write_scanner(dir, body);
    options(dir, report, "/bin/sh", format!("{} -i", script.display()), workers)
}

#[test]
fn test_pipeline_scans_every_existing_file() {
    let dir = TempDir::new().unwrap();
    let mut files = make_files(
        dir.path(),
        &["a.txt", "b.txt", "c-infected.bin", "d.txt", "e.txt"],
        100,
    );
    files.push(dir.path().join("data").join("deleted.txt"));
    let report = write_report(dir.path(), &files);
    let opts = sh_options(dir.path(), report, CLAMSCAN_LIKE, 2);

    let summary = run(&opts, &NullProgress, &CancelToken::new()).unwrap();

    assert_eq!(summary.files_submitted, 5);
    assert_eq!(summary.bytes_expected, 500);
    assert_eq!(summary.scanned(), 5);
    assert_eq!(summary.infected(), 1);
    assert_eq!(summary.dispatch.totals.bytes_processed, 500);
    assert_eq!(summary.verdict(), Verdict::Success);
    assert_eq!(summary.verdict().exit_code(), 0);

    let report_text = fs::read_to_string(dir.path().join("clamav-report.log")).unwrap();
    assert_eq!(report_text.matches("Scanned files:").count(), summary.batches);
    assert_eq!(report_text.matches(&"-".repeat(64)).count(), summary.batches);

    let errors = fs::read_to_string(dir.path().join("errors.log")).unwrap();
    assert_eq!(summary.error_entries, 1);
    assert!(errors.contains("Infected: 1;"));
    assert!(errors.contains("c-infected.bin"));
}

#[test]
fn test_short_scan_is_incomplete() {
    let dir = TempDir::new().unwrap();
    let files = make_files(dir.path(), &["a", "b", "c", "d"], 10);
    let report = write_report(dir.path(), &files);
    let opts = sh_options(dir.path(), report, SKIPS_ONE, 1);

    let summary = run(&opts, &NullProgress, &CancelToken::new()).unwrap();

    assert_eq!(summary.verdict(), Verdict::Incomplete);
    assert_eq!(summary.scanned(), 4 - summary.batches as u64);
    assert_eq!(summary.error_entries, summary.batches);
    let errors = fs::read_to_string(dir.path().join("errors.log")).unwrap();
    assert!(errors.starts_with("Error or infected in files. Infected: 0;"));
}

#[test]
fn test_launch_failure_does_not_abort_the_run() {
    let dir = TempDir::new().unwrap();
    let files = make_files(dir.path(), &["a", "b", "c"], 10);
    let report = write_report(dir.path(), &files);
    let opts = options(
        dir.path(),
        report,
        "avscan-batch-test-no-such-scanner",
        "-i".into(),
        2,
    );

    let summary = run(&opts, &NullProgress, &CancelToken::new()).unwrap();

    assert_eq!(summary.scanned(), 0);
    assert_eq!(summary.dispatch.totals.bytes_processed, 0);
    assert_eq!(summary.dispatch.totals.failed_batches, summary.batches);
    assert_eq!(summary.dispatch.totals.active_workers, 0);
    assert_eq!(summary.verdict(), Verdict::Incomplete);
    let errors = fs::read_to_string(dir.path().join("errors.log")).unwrap();
    assert_eq!(errors.matches("failed to start scanner").count(), summary.batches);
}

#[test]
fn test_stuck_scanner_is_killed_after_timeout() {
    let dir = TempDir::new().unwrap();
    let files = make_files(dir.path(), &["a", "b"], 10);
    let report = write_report(dir.path(), &files);
    let mut opts = sh_options(dir.path(), report, HANGS, 2);
    opts.timeout = Some(Duration::from_millis(300));

    let started = Instant::now();
    let summary = run(&opts, &NullProgress, &CancelToken::new()).unwrap();

    assert!(started.elapsed() < Duration::from_secs(15));
    assert_eq!(summary.scanned(), 0);
    assert_eq!(summary.dispatch.totals.failed_batches, summary.batches);
    let errors = fs::read_to_string(dir.path().join("errors.log")).unwrap();
    assert!(errors.contains("did not finish within"));
}

#[test]
fn test_workers_never_exceed_cap() {
    let dir = TempDir::new().unwrap();
    let names: Vec<String> = (0..12).map(|i| format!("file{:02}", i)).collect();
    let refs: Vec<&str> = names.iter().map(String::as_str).collect();
    let files = make_files(dir.path(), &refs, 1);
    let report = write_report(dir.path(), &files);
    // a tiny command-line budget forces one file per batch
    let mut opts = sh_options(dir.path(), report, SLOW, 3);
    opts.max_command_len = 1;

    let summary = run(&opts, &NullProgress, &CancelToken::new()).unwrap();

    assert_eq!(summary.batches, 12);
    assert!(summary.dispatch.peak_workers <= 3);
    assert!(summary.dispatch.peak_workers >= 1);
    assert_eq!(summary.scanned(), 12);
    assert_eq!(summary.verdict(), Verdict::Success);
}

#[test]
fn test_empty_report_succeeds_with_empty_reports() {
    let dir = TempDir::new().unwrap();
    let report = write_report(dir.path(), &[]);
    fs::write(dir.path().join("errors.log"), "left over").unwrap();
    let opts = sh_options(dir.path(), report, CLAMSCAN_LIKE, 2);

    let summary = run(&opts, &NullProgress, &CancelToken::new()).unwrap();

    assert_eq!(summary.files_submitted, 0);
    assert_eq!(summary.batches, 0);
    assert_eq!(summary.verdict(), Verdict::Success);
    assert_eq!(fs::read_to_string(dir.path().join("errors.log")).unwrap(), "");
}

#[test]
fn test_cancellation_stops_running_scanners() {
    let dir = TempDir::new().unwrap();
    let files = make_files(dir.path(), &["a", "b", "c", "d"], 10);
    let report = write_report(dir.path(), &files);
    let mut opts = sh_options(dir.path(), report, HANGS, 1);
    opts.max_command_len = 1;

    let cancel = CancelToken::new();
    let trip = {
        let cancel = cancel.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(300));
            cancel.cancel();
        })
    };

    let started = Instant::now();
    let summary = run(&opts, &NullProgress, &cancel).unwrap();
    trip.join().unwrap();

    assert!(started.elapsed() < Duration::from_secs(15));
    assert_eq!(summary.verdict(), Verdict::Cancelled);
    assert!(summary.dispatch.batches_submitted < 4);
    assert_eq!(summary.dispatch.totals.active_workers, 0);
    assert_eq!(
        summary.dispatch.totals.skipped_batches,
        4 - summary.dispatch.batches_submitted
    );
    let errors = fs::read_to_string(dir.path().join("errors.log")).unwrap();
    assert!(errors.contains("cancelled"));
    for file in &files {
        assert!(
            errors.contains(&file.display().to_string()),
            "{} missing from the error report",
            file.display()
        );
    }
    assert_eq!(summary.error_entries, 4);
}

#[test]
fn test_background_child_of_scanner_does_not_hold_the_slot() {
    let dir = TempDir::new().unwrap();
    let files = make_files(dir.path(), &["a"], 10);
    let report = write_report(dir.path(), &files);
    let mut opts = sh_options(dir.path(), report, LEAVES_BACKGROUND_CHILD, 1);
    opts.timeout = Some(Duration::from_millis(500));

    let started = Instant::now();
    let summary = run(&opts, &NullProgress, &CancelToken::new()).unwrap();

    assert!(
        started.elapsed() < Duration::from_secs(10),
        "worker held its slot for {:?}",
        started.elapsed()
    );
    assert_eq!(summary.scanned(), 1);
    assert_eq!(summary.dispatch.totals.active_workers, 0);
    assert_eq!(summary.verdict(), Verdict::Success);
}

#[test]
fn test_priority_lowering_does_not_affect_the_result() {
    let dir = TempDir::new().unwrap();
    let files = make_files(dir.path(), &["a", "b", "c"], 10);
    let report = write_report(dir.path(), &files);
    let mut opts = sh_options(dir.path(), report, CLAMSCAN_LIKE, 2);
    opts.renice = true;

    let summary = run(&opts, &NullProgress, &CancelToken::new()).unwrap();

    assert_eq!(summary.scanned(), 3);
    assert_eq!(summary.dispatch.totals.failed_batches, 0);
    assert_eq!(summary.verdict(), Verdict::Success);
}

#[test]
fn test_missing_report_is_fatal() {
    let dir = TempDir::new().unwrap();
    let opts = sh_options(dir.path(), dir.path().join("nope.log"), CLAMSCAN_LIKE, 1);
    let err = run(&opts, &NullProgress, &CancelToken::new()).unwrap_err();
    assert_eq!(err.exit_code(), 102);
    assert!(!dir.path().join("clamav-report.log").exists());
}

#[test]
fn test_plan_partitions_without_touching_report_files() {
    let dir = TempDir::new().unwrap();
    let files = make_files(dir.path(), &["a", "b", "c", "d", "e"], 4);
    let report = write_report(dir.path(), &files);
    let opts = sh_options(dir.path(), report, CLAMSCAN_LIKE, 2);

    let plan = avscan_batch::run::plan(&opts).unwrap();

    assert_eq!(plan.files_submitted, 5);
    assert_eq!(plan.bytes_expected, 20);
    assert_eq!(plan.batches.iter().map(|b| b.len()).sum::<usize>(), 5);
    let phases: Vec<&str> = plan.profile.phases.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(phases, vec!["Parse report", "Partition"]);
    assert!(!dir.path().join("clamav-report.log").exists());
}
