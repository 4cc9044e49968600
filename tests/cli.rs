//! Smoke tests for the banisher binary.
//!
//! None of these need root: they stop before the packet filter is touched.

use std::io::Write;
use std::process::Command;
use tempfile::{NamedTempFile, TempDir};

/// Run banisher and return its output
fn run_banisher(args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_banisher"))
        .args(args)
        .output()
        .expect("Failed to execute banisher")
}

fn is_root() -> bool {
    unsafe { libc::geteuid() == 0 }
}

#[test]
fn test_version_flag() {
    let output = run_banisher(&["--version"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_help_lists_commands() {
    let output = run_banisher(&["--help"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("run"));
    assert!(stdout.contains("list"));
    assert!(stdout.contains("check"));
}

#[test]
fn test_check_example_is_accepted_by_check() {
    let example = run_banisher(&["check", "--example"]);
    assert!(example.status.success());

    let mut file = NamedTempFile::new().unwrap();
    file.write_all(&example.stdout).unwrap();

    let output = run_banisher(&["--config", file.path().to_str().unwrap(), "check"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("is valid"));
    assert!(stdout.contains("sshd-failed-password"));
}

#[test]
fn test_check_reports_invalid_whitelist() {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(
        b"defaultBanishmentDuration: 60\nwhitelist:\n  - 300.0.0.1\nrules:\n  - name: ssh\n    match: sshd\n",
    )
    .unwrap();

    let output = run_banisher(&["--config", file.path().to_str().unwrap(), "check"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("300.0.0.1"));
}

#[test]
fn test_list_missing_database() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("absent.redb");
    let output = run_banisher(&["list", "--db", db.to_str().unwrap()]);
    assert!(!output.status.success());
}

#[test]
fn test_run_requires_root() {
    if is_root() {
        eprintln!("Skipping test_run_requires_root: running as root");
        return;
    }
    let output = run_banisher(&["run", "--db", ":memory:", "--source", "stdin"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("root privileges"));
}
