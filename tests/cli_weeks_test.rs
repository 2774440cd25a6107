//! Integration tests for the `weeks` commands.

mod common;

use common::TestEnv;
use predicates::prelude::*;
use serde_json::json;

#[test]
fn test_weeks_expand_crosses_months() {
    let env = TestEnv::new();
    let out = env.json(&["weeks", "expand", "1/3", "3/1"]);
    assert_eq!(out["weeks"], 7);
    let cells = out["cells"].as_array().unwrap();
    assert_eq!(cells.len(), 7);
    assert_eq!(cells[0], json!({"month": 1, "week": 3}));
    assert_eq!(cells[2], json!({"month": 2, "week": 1}));
    assert_eq!(cells[6], json!({"month": 3, "week": 1}));
}

#[test]
fn test_weeks_expand_human() {
    let env = TestEnv::new();
    env.faena()
        .args(["-H", "weeks", "expand", "2/2", "2/4"])
        .assert()
        .success()
        .stdout(predicate::str::contains("M2S2 -> M2S4: 3 week(s)"))
        .stdout(predicate::str::contains("M2S2 M2S3 M2S4"));
}

#[test]
fn test_weeks_expand_inverted_range_fails() {
    let env = TestEnv::new();
    env.faena()
        .args(["weeks", "expand", "3/1", "1/1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("\"error\""))
        .stderr(predicate::str::contains("before start"));
}

#[test]
fn test_weeks_between_floors_at_one() {
    let env = TestEnv::new();
    assert_eq!(env.json(&["weeks", "between", "1/1", "2/1"])["weeks"], 5);
    assert_eq!(env.json(&["weeks", "between", "4/1", "1/1"])["weeks"], 1);
}

#[test]
fn test_weeks_validate_reports_problem() {
    let env = TestEnv::new();
    let out = env.json(&["weeks", "validate", "1/5", "2/1"]);
    assert_eq!(out["valid"], false);
    assert!(out["error"].as_str().unwrap().contains("start week"));

    let out = env.json(&["weeks", "validate", "1/1", "1/4"]);
    assert_eq!(out["valid"], true);
    assert!(out.get("error").is_none());
}

#[test]
fn test_weeks_rejects_malformed_position() {
    let env = TestEnv::new();
    env.faena()
        .args(["-H", "weeks", "between", "3", "4/1"])
        .assert()
        .failure()
        .stderr(predicate::str::starts_with("Error: "));
}

#[test]
fn test_weeks_between_rejects_month_past_grid() {
    let env = TestEnv::new();
    env.faena()
        .args(["weeks", "between", "1/1", "2000000000/1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("month must be at most 1200"));
}

#[test]
fn test_weeks_expand_rejects_huge_span() {
    let env = TestEnv::new();
    env.faena()
        .args(["weeks", "expand", "1/1", "1000000000/4"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("end month must be at most 1200"));
}
