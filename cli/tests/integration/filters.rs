//! Pattern and date filter integration tests for the msync CLI.

use assert_cmd::cargo::cargo_bin_cmd;
use filetime::FileTime;
use std::fs;
use tempfile::TempDir;

#[test]
fn test_file_patterns_limit_what_is_copied() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    fs::write(src.path().join("keep.csv"), "k").unwrap();
    fs::write(src.path().join("keep.json"), "k").unwrap();
    fs::write(src.path().join("drop.log"), "d").unwrap();

    let mut cmd = cargo_bin_cmd!("msync");
    cmd.arg("--once")
        .arg("--file-patterns")
        .arg("*.csv, *.json")
        .arg(src.path())
        .arg(dst.path())
        .assert()
        .success();

    assert!(dst.path().join("keep.csv").exists());
    assert!(dst.path().join("keep.json").exists());
    assert!(!dst.path().join("drop.log").exists());
}

#[test]
fn test_exclusion_wins_over_inclusion() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    fs::write(src.path().join("report.txt"), "r").unwrap();
    fs::write(src.path().join("scratch.tmp"), "s").unwrap();

    // scratch.tmp matches the inclusion list but the default exclusion drops it
    let mut cmd = cargo_bin_cmd!("msync");
    cmd.arg("--once")
        .arg(src.path())
        .arg(dst.path())
        .assert()
        .success();

    assert!(dst.path().join("report.txt").exists());
    assert!(!dst.path().join("scratch.tmp").exists());
}

#[test]
fn test_folder_patterns_prune_subtrees() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    fs::create_dir(src.path().join("data")).unwrap();
    fs::create_dir(src.path().join("cache")).unwrap();
    fs::write(src.path().join("data/keep.txt"), "k").unwrap();
    fs::write(src.path().join("cache/drop.txt"), "d").unwrap();

    let mut cmd = cargo_bin_cmd!("msync");
    cmd.arg("--once")
        .arg("--folder-patterns")
        .arg("data")
        .arg(src.path())
        .arg(dst.path())
        .assert()
        .success();

    assert!(dst.path().join("data/keep.txt").exists());
    assert!(!dst.path().join("cache").exists());
}

#[test]
fn test_date_filter_skips_old_files() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    let old = src.path().join("old.txt");
    let new = src.path().join("new.txt");
    fs::write(&old, "old").unwrap();
    fs::write(&new, "new").unwrap();
    // 2000-01-01, far before the bound
    filetime::set_file_mtime(&old, FileTime::from_unix_time(946_684_800, 0)).unwrap();

    let mut cmd = cargo_bin_cmd!("msync");
    cmd.arg("--once")
        .arg("--from-date")
        .arg("2020-01-01")
        .arg(src.path())
        .arg(dst.path())
        .assert()
        .success();

    assert!(dst.path().join("new.txt").exists());
    assert!(!dst.path().join("old.txt").exists());
}
