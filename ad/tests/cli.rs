//! CLI surface tests

use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn test_help_lists_subcommands() {
    Command::cargo_bin("ad")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("events"))
        .stdout(predicate::str::contains("memory"));
}

#[test]
fn test_events_for_unknown_session_is_empty() {
    let temp = tempfile::tempdir().unwrap();
    Command::cargo_bin("ad")
        .unwrap()
        .args(["events", "no-such-session", "--workspace"])
        .arg(temp.path())
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
}

#[test]
fn test_memory_stats_on_fresh_workspace() {
    let temp = tempfile::tempdir().unwrap();
    Command::cargo_bin("ad")
        .unwrap()
        .args(["memory", "--workspace"])
        .arg(temp.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("\"total\": 0"))
        .stdout(predicate::str::contains("episodes: 0"));
}
