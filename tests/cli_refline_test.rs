//! Integration tests for timeline reference lines.

mod common;

use common::TestEnv;
use predicates::prelude::*;

fn add(env: &TestEnv, plan: &str, at: &str, label: &str) -> String {
    let out = env.json(&["refline", "add", "--plan", plan, "--at", at, "--label", label]);
    out["line"]["id"].as_str().unwrap().to_string()
}

fn list(env: &TestEnv, plan: &str) -> serde_json::Value {
    env.json(&["refline", "list", "--plan", plan, "--start", "2025-01-01", "--months", "6"])
}

#[test]
fn test_refline_add_uses_default_color() {
    let env = TestEnv::new();
    let out = env.json(&["refline", "add", "--plan", "plan-1", "--at", "3/2", "--label", "Permits"]);
    assert_eq!(out["line"]["position_month"], 3);
    assert_eq!(out["line"]["position_week"], 2);
    assert_eq!(out["line"]["color"], "#ef4444");
    assert_eq!(out["line"]["label"], "Permits");
}

#[test]
fn test_refline_list_places_markers_in_order() {
    let env = TestEnv::new();
    add(&env, "plan-1", "2/4", "late");
    add(&env, "plan-1", "1/1", "kickoff");
    add(&env, "plan-2", "1/2", "other plan");

    let out = list(&env, "plan-1");
    assert_eq!(out["count"], 2);
    let markers = out["markers"].as_array().unwrap();
    assert_eq!(markers[0]["label"], "kickoff");
    assert_eq!(markers[1]["label"], "late");
    // Default layout: 360px of frozen columns, 160px per month.
    assert_eq!(markers[0]["x"], 400.5);
    assert_eq!(markers[1]["x"], 680.5);
    assert_eq!(markers[1]["placed"], true);
}

#[test]
fn test_refline_outside_layout_is_not_placed() {
    let env = TestEnv::new();
    add(&env, "plan-1", "9/1", "beyond");
    let out = list(&env, "plan-1");
    assert_eq!(out["markers"][0]["placed"], false);
    assert_eq!(out["markers"][0]["x"], 0.0);
}

#[test]
fn test_refline_update_moves_line() {
    let env = TestEnv::new();
    let id = add(&env, "plan-1", "1/1", "kickoff");
    let out = env.json(&["refline", "update", id.as_str(), "--at", "2/3", "--color", "#000000"]);
    assert_eq!(out["line"]["position_month"], 2);
    assert_eq!(out["line"]["position_week"], 3);
    assert_eq!(out["line"]["color"], "#000000");
    assert_eq!(out["line"]["label"], "kickoff");
}

#[test]
fn test_refline_update_unknown_id_fails() {
    let env = TestEnv::new();
    env.faena()
        .args(["refline", "update", "missing", "--label", "x"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("missing"));
}

#[test]
fn test_refline_rejects_week_outside_grid() {
    let env = TestEnv::new();
    env.faena()
        .args(["refline", "add", "--plan", "plan-1", "--at", "2/5"])
        .assert()
        .failure();
    assert_eq!(list(&env, "plan-1")["count"], 0);
}

#[test]
fn test_refline_rm() {
    let env = TestEnv::new();
    let id = add(&env, "plan-1", "1/1", "kickoff");
    assert_eq!(env.json(&["refline", "rm", id.as_str()])["removed"], true);
    assert_eq!(list(&env, "plan-1")["count"], 0);
    assert_eq!(env.json(&["refline", "rm", id.as_str()])["removed"], false);
}

#[test]
fn test_refline_list_human() {
    let env = TestEnv::new();
    add(&env, "plan-1", "1/2", "kickoff");
    env.faena()
        .args(["-H", "refline", "list", "--plan", "plan-1", "--start", "2025-01-01"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1 reference line(s):"))
        .stdout(predicate::str::contains("M1S2"))
        .stdout(predicate::str::contains("x=440.5"));
}

#[test]
fn test_refline_list_rejects_oversized_layout() {
    let env = TestEnv::new();
    env.faena()
        .args(["refline", "list", "--plan", "plan-1", "--months", "4000000000"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("months must be between"));
}
