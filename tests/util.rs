//! Shared fixtures for the integration tests.
//!
//! The scanner is replaced by small POSIX shell scripts run through
//! `/bin/sh <script>`, so no file in the temp directory has to be executed
//! directly.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

/// Prints one line per path and a clamscan-style summary. Paths containing
/// `infected` are reported as FOUND.
pub const CLAMSCAN_LIKE: &str = r#"
scanned=0
infected=0
for f in "$@"; do
  case "$f" in -*) continue ;; esac
  scanned=$((scanned + 1))
  case "$f" in
    *infected*) echo "$f: Eicar-Test-Signature FOUND"; infected=$((infected + 1)) ;;
    *) echo "$f: OK" ;;
  esac
done
echo
echo "----------- SCAN SUMMARY -----------"
echo "Scanned files: $scanned"
echo "Infected files: $infected"
"#;

/// Like [`CLAMSCAN_LIKE`] but always reports one file fewer than it was given.
pub const SKIPS_ONE: &str = r#"
scanned=0
for f in "$@"; do
  case "$f" in -*) continue ;; esac
  scanned=$((scanned + 1))
done
echo "Scanned files: $((scanned - 1))"
echo "Infected files: 0"
"#;

/// Reports every file scanned but leaves a background process holding its
/// output pipes.
pub const LEAVES_BACKGROUND_CHILD: &str = r#"
scanned=0
for f in "$@"; do
  case "$f" in -*) continue ;; esac
  scanned=$((scanned + 1))
done
sleep 30 &
echo "Scanned files: $scanned"
echo "Infected files: 0"
"#;

/// Never finishes on its own.
pub const HANGS: &str = "exec sleep 30\n";

/// Takes a moment per batch so several run at once.
pub const SLOW: &str = r#"
sleep 0.2
scanned=0
for f in "$@"; do
  case "$f" in -*) continue ;; esac
  scanned=$((scanned + 1))
done
echo "Scanned files: $scanned"
echo "Infected files: 0"
"#;

/// Writes a scanner script and returns its path.
pub fn write_scanner(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("fake-scanner.sh");
    fs::write(&path, format!("#!/bin/sh\n{}", body)).expect("write scanner script");
    path
}

/// Creates `names` under `dir/data` with `size` bytes each.
pub fn make_files(dir: &Path, names: &[&str], size: usize) -> Vec<PathBuf> {
    let data = dir.join("data");
    fs::create_dir_all(&data).expect("create data dir");
    names
        .iter()
        .map(|name| {
            let path = data.join(name);
            fs::write(&path, vec![b'x'; size]).expect("write data file");
            path
        })
        .collect()
}

/// Writes an AIDE-style report listing `files` plus a directory line.
pub fn write_report(dir: &Path, files: &[PathBuf]) -> PathBuf {
    let mut text = String::from("AIDE found differences between database and filesystem!!\n\nAdded entries:\n\n");
    text.push_str(&format!("d++++++++++++++++: {}\n", dir.display()));
    for file in files {
        text.push_str(&format!("f++++++++++++++++: {}\n", file.display()));
    }
    let path = dir.join("report.log");
    fs::write(&path, text).expect("write report");
    path
}

/// Writes a configuration file that runs `script` through `/bin/sh`.
pub fn write_config(dir: &Path, report: &Path, script: &Path, workers: Option<usize>) -> PathBuf {
    let mut text = format!("{}\n/bin/sh\n{} -i\n", report.display(), script.display());
    if let Some(n) = workers {
        text.push_str(&format!("{}\n", n));
    }
    let path = dir.join("aide-clamav.conf");
    fs::write(&path, text).expect("write config");
    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_fixtures_write_expected_files() {
        let dir = TempDir::new().unwrap();
        let files = make_files(dir.path(), &["a.txt", "b.txt"], 3);
        let report = write_report(dir.path(), &files);
        let script = write_scanner(dir.path(), CLAMSCAN_LIKE);
        let config = write_config(dir.path(), &report, &script, Some(2));

        let text = fs::read_to_string(config).unwrap();
        assert_eq!(text.lines().count(), 4);
        assert!(fs::read_to_string(report).unwrap().contains("a.txt"));
        assert_eq!(fs::metadata(&files[0]).unwrap().len(), 3);
    }
}
