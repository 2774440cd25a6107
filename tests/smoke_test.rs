//! Smoke tests for the faena binary.

mod common;

use common::TestEnv;
use predicates::prelude::*;

#[test]
fn test_help() {
    let env = TestEnv::new();
    env.faena()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Construction scheduling"));
}

#[test]
fn test_version() {
    let env = TestEnv::new();
    env.faena()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_missing_subcommand_fails() {
    let env = TestEnv::new();
    env.faena().assert().failure();
}

#[test]
fn test_json_logs_go_to_stderr() {
    let env = TestEnv::new();
    let output = env
        .faena()
        .env("FAENA_LOG", "faena=debug")
        .args(["--log-json", "weeks", "between", "1/1", "1/2"])
        .assert()
        .success()
        .stderr(predicate::str::contains("resolved settings"))
        .get_output()
        .stdout
        .clone();
    let out: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(out["weeks"], 2);
}
