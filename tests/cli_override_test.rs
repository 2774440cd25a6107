//! Integration tests for manual matrix overrides.

mod common;

use common::TestEnv;
use predicates::prelude::*;

const SCOPE: [&str; 4] = ["--client", "c1", "--project", "p1"];

fn set(env: &TestEnv, month: &str, concept: &str, value: &str) -> serde_json::Value {
    let mut args = vec!["override", "set"];
    args.extend(SCOPE);
    args.extend(["--month", month, "--concept", concept, value]);
    env.json(&args)
}

fn list(env: &TestEnv) -> serde_json::Value {
    let mut args = vec!["override", "list"];
    args.extend(SCOPE);
    env.json(&args)
}

#[test]
fn test_override_list_empty() {
    let env = TestEnv::new();
    let out = list(&env);
    assert_eq!(out["count"], 0);
    assert_eq!(out["overrides"].as_array().unwrap().len(), 0);
}

#[test]
fn test_override_set_twice_keeps_one_row() {
    let env = TestEnv::new();
    let out = set(&env, "202501", "MAY-01", "1,250.50");
    assert_eq!(out["override"]["value"], 1250.5);
    assert!(out["override"]["updated_at"].is_string());

    set(&env, "202501", "MAY-01", "$99");
    let out = list(&env);
    assert_eq!(out["count"], 1);
    assert_eq!(out["overrides"][0]["value"], 99.0);
}

#[test]
fn test_override_list_is_ordered_by_month() {
    let env = TestEnv::new();
    set(&env, "202503", "B", "3");
    set(&env, "202501", "B", "1");
    set(&env, "202501", "A", "2");
    let out = list(&env);
    let keys: Vec<(String, String)> = out["overrides"]
        .as_array()
        .unwrap()
        .iter()
        .map(|o| {
            (
                o["month"].as_str().unwrap().to_string(),
                o["concept"].as_str().unwrap().to_string(),
            )
        })
        .collect();
    assert_eq!(
        keys,
        vec![
            ("202501".to_string(), "A".to_string()),
            ("202501".to_string(), "B".to_string()),
            ("202503".to_string(), "B".to_string()),
        ]
    );
}

#[test]
fn test_override_scoped_by_project() {
    let env = TestEnv::new();
    set(&env, "202501", "A", "10");
    let out = env.json(&["override", "list", "--client", "c1", "--project", "other"]);
    assert_eq!(out["count"], 0);
}

#[test]
fn test_override_rm() {
    let env = TestEnv::new();
    set(&env, "202502", "A", "10");
    let mut args = vec!["override", "rm"];
    args.extend(SCOPE);
    args.extend(["--month", "202502", "--concept", "A"]);
    let out = env.json(&args);
    assert_eq!(out["removed"], true);
    assert_eq!(list(&env)["count"], 0);

    let out = env.json(&args);
    assert_eq!(out["removed"], false);
}

#[test]
fn test_override_rejects_bad_month_and_amount() {
    let env = TestEnv::new();
    env.faena()
        .args(["override", "set", "--client", "c1", "--project", "p1", "--month", "202513"])
        .args(["--concept", "A", "1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("month"));

    env.faena()
        .args(["override", "set", "--client", "c1", "--project", "p1", "--month", "202501"])
        .args(["--concept", "A", "abc"])
        .assert()
        .failure();
    assert_eq!(list(&env)["count"], 0);
}

#[test]
fn test_override_list_human() {
    let env = TestEnv::new();
    set(&env, "202501", "MAY-01", "1500");
    env.faena()
        .args(["-H", "override", "list", "--client", "c1", "--project", "p1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1 override(s):"))
        .stdout(predicate::str::contains("1500.00"));
}
