//! End-to-end CLI tests for the paperbot binary.

use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn help_displays_usage() {
    let mut cmd = Command::cargo_bin("paperbot").unwrap();
    cmd.arg("--help").assert().success().stdout(predicate::str::contains("research-paper"));
}

#[test]
fn version_displays_version() {
    let mut cmd = Command::cargo_bin("paperbot").unwrap();
    cmd.arg("--version").assert().success().stdout(predicate::str::contains("paperbot"));
}

#[test]
fn invalid_flag_returns_error() {
    let mut cmd = Command::cargo_bin("paperbot").unwrap();
    cmd.arg("--invalid-flag").assert().failure();
}

#[test]
fn run_without_query_fails() {
    let mut cmd = Command::cargo_bin("paperbot").unwrap();
    cmd.arg("run").assert().failure().stderr(predicate::str::contains("query"));
}

#[test]
fn run_with_malformed_query_fails_with_filter_error() {
    let dir = tempfile::tempdir().unwrap();
    let mut cmd = Command::cargo_bin("paperbot").unwrap();
    cmd.env("PAPERBOT_DB_PATH", dir.path().join("metadata.db"))
        .env("PAPERBOT_STAGING_DIR", dir.path().join("staging"))
        .env("PAPERBOT_PAPERS_DIR", dir.path().join("library"))
        .args(["run", "--mode", "test", "--query", "(\"unbalanced"])
        .assert()
        .failure();
}

#[test]
fn rollback_requires_since_flag() {
    let mut cmd = Command::cargo_bin("paperbot").unwrap();
    cmd.args(["rollback", "preprint"]).assert().failure();
}

#[test]
fn backup_on_empty_library_succeeds() {
    let dir = tempfile::tempdir().unwrap();
    let mut cmd = Command::cargo_bin("paperbot").unwrap();
    cmd.env("PAPERBOT_PAPERS_DIR", dir.path().join("library"))
        .env("PAPERBOT_DB_PATH", dir.path().join("metadata.db"))
        .arg("backup")
        .assert()
        .success();
}
