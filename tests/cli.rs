mod common;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

use common::*;

fn aeszip() -> Command {
    let mut cmd = Command::cargo_bin("aeszip").unwrap();
    cmd.env_remove("AESZIP_PASSWORD").env_remove("RUST_LOG");
    cmd
}

#[test]
fn lists_entries() {
    let dir = TempDir::new().unwrap();
    let archive = write_archive(dir.path(), "aes.zip", &build_zip(&sample_files(), Some(PASSWORD)));

    aeszip()
        .args(["--strategy", "native", "-l"])
        .arg(&archive)
        .assert()
        .success()
        .stdout(predicate::str::contains("a.txt"))
        .stdout(predicate::str::contains("b/d/e.txt"))
        .stdout(predicate::str::contains("b/\n").not());
}

#[test]
fn verbose_listing_shows_method_and_backend() {
    let dir = TempDir::new().unwrap();
    let archive = write_archive(dir.path(), "aes.zip", &build_zip(&sample_files(), Some(PASSWORD)));

    aeszip()
        .args(["--strategy", "native", "-v"])
        .arg(&archive)
        .assert()
        .success()
        .stdout(predicate::str::contains("AES"))
        .stdout(predicate::str::contains("3 files"))
        .stdout(predicate::str::contains("native backend"));
}

#[test]
fn extracts_with_password_from_env() {
    let dir = TempDir::new().unwrap();
    let archive = write_archive(dir.path(), "aes.zip", &build_zip(&sample_files(), Some(PASSWORD)));
    let out = dir.path().join("out");

    aeszip()
        .env("AESZIP_PASSWORD", PASSWORD)
        .args(["--strategy", "native", "-d"])
        .arg(&out)
        .arg(&archive)
        .arg("*.txt")
        .assert()
        .success()
        .stdout(predicate::str::contains("2 file(s) extracted."));

    assert_eq!(std::fs::read(out.join("a.txt")).unwrap(), b"hello");
    assert!(out.join("b/d/e.txt").exists());
    assert!(!out.join("b/c.bin").exists());
}

#[test]
fn wrong_password_fails() {
    let dir = TempDir::new().unwrap();
    let archive = write_archive(dir.path(), "aes.zip", &build_zip(&sample_files(), Some(PASSWORD)));

    aeszip()
        .args(["--strategy", "native", "-t", "-P", "nope"])
        .arg(&archive)
        .assert()
        .failure()
        .stderr(predicate::str::contains("wrong password"));
}

#[test]
fn damaged_entry_fails_test_run() {
    let dir = TempDir::new().unwrap();
    let archive = write_archive(dir.path(), "damaged.zip", &build_damaged_zip());

    aeszip()
        .args(["--strategy", "native", "-t"])
        .arg(&archive)
        .assert()
        .failure()
        .stdout(predicate::str::contains("file3.txt"))
        .stdout(predicate::str::contains("1 error(s) detected"));
}

#[test]
fn missing_archive_fails() {
    let dir = TempDir::new().unwrap();

    aeszip()
        .args(["--strategy", "native", "-l"])
        .arg(dir.path().join("absent.zip"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("archive not found"));
}

#[test]
fn forced_external_with_broken_tool_fails() {
    let dir = TempDir::new().unwrap();
    let archive = write_archive(dir.path(), "plain.zip", &build_zip(&sample_files(), None));

    aeszip()
        .args(["--strategy", "external", "--tool"])
        .arg(dir.path().join("no-such-7z"))
        .arg("-l")
        .arg(&archive)
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to start"));
}
