//! Integration tests for `rdc context` commands.

mod common;

use common::{TestEnv, parse_json};
use predicates::prelude::*;

#[test]
fn test_context_create_and_list() {
    let env = TestEnv::new();

    env.rdc()
        .args(["context", "create", "dev", "--mode", "local"])
        .assert()
        .success();

    let output = env.rdc().args(["context", "list"]).assert().success();
    let json = parse_json(&output.get_output().stdout);
    let contexts = json["contexts"].as_array().unwrap();
    assert_eq!(contexts.len(), 1);
    assert_eq!(contexts[0]["name"], "dev");
    assert_eq!(contexts[0]["mode"], "local");
    assert_eq!(contexts[0]["encrypted"], false);
}

#[test]
fn test_context_create_duplicate_fails() {
    let env = TestEnv::new();

    env.rdc()
        .args(["context", "create", "dev", "--mode", "local"])
        .assert()
        .success();

    env.rdc()
        .args(["context", "create", "dev", "--mode", "local"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
}

#[test]
fn test_context_show_redacts_s3_secret() {
    let env = TestEnv::new();

    env.rdc()
        .args([
            "context",
            "create",
            "bucket",
            "--mode",
            "s3",
            "--s3-endpoint",
            "https://s3.example.com",
            "--s3-bucket",
            "rdc-test",
            "--s3-access-key-id",
            "AKIA123",
            "--s3-secret-access-key",
            "topsecret",
        ])
        .assert()
        .success();

    let output = env
        .rdc()
        .args(["context", "show", "bucket"])
        .assert()
        .success()
        .stdout(predicate::str::contains("topsecret").not());
    let json = parse_json(&output.get_output().stdout);
    assert_eq!(json["mode"], "s3");
    assert_eq!(json["s3"]["secretAccessKey"], "[REDACTED]");
}

#[test]
fn test_context_rename() {
    let env = TestEnv::new();

    env.rdc()
        .args(["context", "create", "old", "--mode", "local"])
        .assert()
        .success();
    env.rdc()
        .args(["context", "rename", "old", "new"])
        .assert()
        .success();

    env.rdc()
        .args(["context", "show", "old"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
    env.rdc().args(["context", "show", "new"]).assert().success();
}

#[test]
fn test_context_remove_missing_fails() {
    let env = TestEnv::new();

    env.rdc()
        .args(["context", "remove", "ghost"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn test_context_set_and_unset_defaults() {
    let env = TestEnv::with_local_context();

    env.rdc()
        .args(["context", "set", "team", "ops"])
        .assert()
        .success();

    let output = env.rdc().args(["context", "show"]).assert().success();
    let json = parse_json(&output.get_output().stdout);
    assert_eq!(json["team"], "ops");

    env.rdc()
        .args(["context", "unset", "team"])
        .assert()
        .success();
    let output = env.rdc().args(["context", "show"]).assert().success();
    let json = parse_json(&output.get_output().stdout);
    assert!(json.get("team").is_none());
}

#[test]
fn test_context_set_rejects_unknown_key() {
    let env = TestEnv::with_local_context();

    env.rdc()
        .args(["context", "set", "color", "blue"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("team, region, bridge, machine"));
}

#[test]
fn test_commands_without_context_fail_cleanly() {
    let env = TestEnv::new();

    env.rdc()
        .args(["machine", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn test_context_flag_selects_context() {
    let env = TestEnv::new();

    env.rdc()
        .args(["context", "create", "alpha", "--mode", "local"])
        .assert()
        .success();

    env.rdc()
        .args(["--context", "alpha", "machine", "list"])
        .assert()
        .success();
    env.rdc()
        .args(["--context", "beta", "machine", "list"])
        .assert()
        .failure();
}

#[test]
fn test_human_output_renders_plain_text() {
    let env = TestEnv::with_local_context();

    env.rdc()
        .args(["-H", "context", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("name: default"));
}
