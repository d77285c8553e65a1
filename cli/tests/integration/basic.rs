//! Basic functionality integration tests for the msync CLI.

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

#[test]
fn test_once_mirrors_tree() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();

    fs::create_dir_all(src.path().join("subdir/nested")).unwrap();
    fs::write(src.path().join("file1.txt"), "content1").unwrap();
    fs::write(src.path().join("subdir/file2.txt"), "content2").unwrap();
    fs::write(src.path().join("subdir/nested/file3.txt"), "content3").unwrap();

    let mut cmd = cargo_bin_cmd!("msync");
    cmd.arg("--once")
        .arg(src.path())
        .arg(dst.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("3 files copied"));

    assert_eq!(
        fs::read_to_string(dst.path().join("file1.txt")).unwrap(),
        "content1"
    );
    assert_eq!(
        fs::read_to_string(dst.path().join("subdir/file2.txt")).unwrap(),
        "content2"
    );
    assert_eq!(
        fs::read_to_string(dst.path().join("subdir/nested/file3.txt")).unwrap(),
        "content3"
    );
}

#[test]
fn test_second_run_copies_nothing() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    fs::write(src.path().join("a.txt"), "alpha").unwrap();

    let mut first = cargo_bin_cmd!("msync");
    first
        .arg("--once")
        .arg(src.path())
        .arg(dst.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("1 files copied"));

    // Timestamps were preserved, so the mirror is already up to date
    let mut second = cargo_bin_cmd!("msync");
    second
        .arg("--once")
        .arg(src.path())
        .arg(dst.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("0 files copied"));
}

#[test]
fn test_backup_created_on_overwrite() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    fs::write(src.path().join("data.csv"), "new content").unwrap();
    fs::write(dst.path().join("data.csv"), "old content").unwrap();
    // Ensure the source is strictly newer than the stale mirror copy
    filetime::set_file_mtime(
        dst.path().join("data.csv"),
        filetime::FileTime::from_unix_time(1_000_000, 0),
    )
    .unwrap();

    let mut cmd = cargo_bin_cmd!("msync");
    cmd.arg("--once")
        .arg("--backup")
        .arg(src.path())
        .arg(dst.path())
        .assert()
        .success();

    assert_eq!(
        fs::read_to_string(dst.path().join("data.csv")).unwrap(),
        "new content"
    );
    let backups: Vec<_> = fs::read_dir(dst.path().join("backups"))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(backups.len(), 1);
    assert!(backups[0].starts_with("data.csv.bak."));
}

#[test]
fn test_missing_source_fails_with_usage_exit_code() {
    let dst = TempDir::new().unwrap();

    let mut cmd = cargo_bin_cmd!("msync");
    cmd.arg("--once")
        .arg("/definitely/not/a/real/source")
        .arg(dst.path())
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("source directory not found"));
}

#[test]
fn test_target_inside_source_rejected() {
    let src = TempDir::new().unwrap();
    fs::write(src.path().join("a.txt"), "a").unwrap();

    let mut cmd = cargo_bin_cmd!("msync");
    cmd.arg("--once")
        .arg(src.path())
        .arg(src.path().join("mirror"))
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("inside the source tree"));
}

#[test]
fn test_loop_failure_exits_nonzero() {
    let root = TempDir::new().unwrap();
    let src = root.path().join("src");
    let dst = root.path().join("dst");
    fs::create_dir(&src).unwrap();
    fs::write(src.join("a.txt"), "a").unwrap();

    let mut child = std::process::Command::new(env!("CARGO_BIN_EXE_msync"))
        .arg("--interval")
        .arg("1")
        .arg("--quiet")
        .arg(&src)
        .arg(&dst)
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .spawn()
        .unwrap();

    // Let the first pass land, then break the source for the next one
    std::thread::sleep(std::time::Duration::from_millis(500));
    fs::remove_dir_all(&src).unwrap();

    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(10);
    let status = loop {
        if let Some(status) = child.try_wait().unwrap() {
            break status;
        }
        if std::time::Instant::now() > deadline {
            child.kill().ok();
            panic!("msync kept running after its source vanished");
        }
        std::thread::sleep(std::time::Duration::from_millis(100));
    };
    assert_eq!(status.code(), Some(1));
    assert!(dst.join("a.txt").exists());
}

#[test]
fn test_json_summary_output() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    fs::write(src.path().join("a.txt"), "12345").unwrap();

    let mut cmd = cargo_bin_cmd!("msync");
    let output = cmd
        .arg("--once")
        .arg("--output")
        .arg("json")
        .arg(src.path())
        .arg(dst.path())
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let record: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(record["record_type"], "summary");
    assert_eq!(record["files_copied"], 1);
    assert_eq!(record["bytes_copied"], 5);
}
