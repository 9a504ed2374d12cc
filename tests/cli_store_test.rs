//! Integration tests for store registration and whole-config sync against
//! the local-file store backend.

mod common;

use common::{TestEnv, parse_json};
use predicates::prelude::*;

/// Register a local-file store named "backup" writing into `dir`.
fn add_backup_store(env: &TestEnv, dir: &std::path::Path) {
    env.rdc()
        .args([
            "store",
            "add",
            "backup",
            "--type",
            "local-file",
            "--local-path",
            dir.to_str().unwrap(),
        ])
        .assert()
        .success();
}

#[test]
fn test_store_add_verifies_and_lists() {
    let env = TestEnv::with_local_context();
    let store_dir = common::TempDir::new().unwrap();

    let output = env
        .rdc()
        .args([
            "store",
            "add",
            "backup",
            "--type",
            "local-file",
            "--local-path",
            store_dir.path().to_str().unwrap(),
        ])
        .assert()
        .success();
    let json = parse_json(&output.get_output().stdout);
    assert_eq!(json["verified"], true);

    let output = env.rdc().args(["store", "list"]).assert().success();
    let json = parse_json(&output.get_output().stdout);
    assert_eq!(json["stores"][0]["name"], "backup");
    assert_eq!(json["stores"][0]["type"], "local-file");
}

#[test]
fn test_store_add_rejects_unknown_type() {
    let env = TestEnv::with_local_context();

    env.rdc()
        .args(["store", "add", "x", "--type", "git"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid store type"));
}

#[test]
fn test_store_add_requires_type_options() {
    let env = TestEnv::with_local_context();

    env.rdc()
        .args(["store", "add", "x", "--type", "local-file"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--local-path"));

    env.rdc()
        .args(["store", "add", "y", "--type", "s3"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--s3-endpoint"));
}

#[test]
fn test_push_then_pull_round_trip() {
    let env = TestEnv::with_local_context();
    let store_dir = common::TempDir::new().unwrap();
    add_backup_store(&env, store_dir.path());

    env.rdc()
        .args(["machine", "create", "web1", "--set", "ip=10.0.0.1"])
        .assert()
        .success();

    let output = env.rdc().args(["store", "push"]).assert().success();
    let json = parse_json(&output.get_output().stdout);
    assert_eq!(json["success"], true);
    assert_eq!(json["results"][0]["store"], "backup");

    let output = env
        .rdc()
        .args(["store", "pull", "--store", "backup"])
        .assert()
        .success();
    let json = parse_json(&output.get_output().stdout);
    assert_eq!(json["success"], true);
    assert_eq!(json["config"]["version"], 2);
}

#[test]
fn test_push_without_new_edits_is_a_version_conflict() {
    let env = TestEnv::with_local_context();
    let store_dir = common::TempDir::new().unwrap();
    add_backup_store(&env, store_dir.path());

    env.rdc().args(["store", "push"]).assert().success();

    // The remote now matches the local version; the local copy did not
    // originate from a newer state, so push must refuse.
    env.rdc()
        .args(["store", "push"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("Version conflict"));

    // A local edit advances the version past the remote and push works.
    env.rdc()
        .args(["machine", "create", "web1"])
        .assert()
        .success();
    env.rdc().args(["store", "push"]).assert().success();
}

#[test]
fn test_push_from_unrelated_config_is_a_guid_mismatch() {
    let store_dir = common::TempDir::new().unwrap();

    let env_a = TestEnv::with_local_context();
    add_backup_store(&env_a, store_dir.path());
    env_a.rdc().args(["store", "push"]).assert().success();

    // A second machine with its own "default" context shares the store:
    // same name, different identity.
    let env_b = TestEnv::with_local_context();
    add_backup_store(&env_b, store_dir.path());
    env_b
        .rdc()
        .args(["machine", "create", "intruder"])
        .assert()
        .success();
    env_b
        .rdc()
        .args(["store", "push"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("GUID mismatch"));
}

#[test]
fn test_pull_missing_config_reports_not_found() {
    let env = TestEnv::with_local_context();
    let store_dir = common::TempDir::new().unwrap();
    add_backup_store(&env, store_dir.path());

    env.rdc()
        .args(["store", "pull", "--store", "backup"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("not found"));
}

#[test]
fn test_pull_corrupt_snapshot_reports_invalid_json() {
    let env = TestEnv::with_local_context();
    let store_dir = common::TempDir::new().unwrap();
    add_backup_store(&env, store_dir.path());

    std::fs::write(store_dir.path().join("default.json"), "not json").unwrap();

    env.rdc()
        .args(["store", "pull", "--store", "backup"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("invalid JSON"));
}

#[test]
fn test_store_configs_lists_sorted_names() {
    let env = TestEnv::new();
    let store_dir = common::TempDir::new().unwrap();

    for name in ["staging", "production", "rediacc"] {
        env.rdc()
            .args(["context", "create", name, "--mode", "local"])
            .assert()
            .success();
    }
    env.rdc()
        .args([
            "store",
            "add",
            "backup",
            "--type",
            "local-file",
            "--local-path",
            store_dir.path().to_str().unwrap(),
        ])
        .assert()
        .success();

    for name in ["staging", "production", "rediacc"] {
        env.rdc()
            .args(["--context", name, "store", "push"])
            .assert()
            .success();
    }

    let output = env
        .rdc()
        .args(["store", "configs", "--store", "backup"])
        .assert()
        .success();
    let json = parse_json(&output.get_output().stdout);
    assert_eq!(
        json["configs"],
        serde_json::json!(["production", "rediacc", "staging"])
    );
}

#[test]
fn test_store_delete_reports_not_found_once_gone() {
    let env = TestEnv::with_local_context();
    let store_dir = common::TempDir::new().unwrap();
    add_backup_store(&env, store_dir.path());

    env.rdc().args(["store", "push"]).assert().success();

    env.rdc()
        .args(["store", "delete", "--store", "backup", "default"])
        .assert()
        .success();
    env.rdc()
        .args(["store", "delete", "--store", "backup", "default"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("not found"));
}

#[test]
fn test_sync_is_idempotent_and_pushes_local_edits() {
    let env = TestEnv::with_local_context();
    let store_dir = common::TempDir::new().unwrap();
    add_backup_store(&env, store_dir.path());

    // First sync pushes version 1.
    let output = env.rdc().args(["store", "sync"]).assert().success();
    let json = parse_json(&output.get_output().stdout);
    assert_eq!(json["results"][0]["remoteVersion"], 1);

    // Second sync finds the remote current and does nothing.
    let output = env.rdc().args(["store", "sync"]).assert().success();
    let json = parse_json(&output.get_output().stdout);
    assert_eq!(json["results"][0]["upToDate"], true);

    // A local edit syncs through.
    env.rdc()
        .args(["machine", "create", "web1"])
        .assert()
        .success();
    let output = env.rdc().args(["store", "sync"]).assert().success();
    let json = parse_json(&output.get_output().stdout);
    assert_eq!(json["results"][0]["remoteVersion"], 2);
}

#[test]
fn test_sync_pulls_newer_remote() {
    let store_dir = common::TempDir::new().unwrap();

    let env = TestEnv::with_local_context();
    add_backup_store(&env, store_dir.path());
    env.rdc()
        .args(["machine", "create", "web1"])
        .assert()
        .success();
    env.rdc().args(["store", "push"]).assert().success();

    // Simulate a second writer advancing the remote snapshot.
    let snapshot_path = store_dir.path().join("default.json");
    let mut remote: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&snapshot_path).unwrap()).unwrap();
    remote["version"] = serde_json::json!(9);
    remote["machines"]["web2"] = serde_json::json!({"ip": "10.0.0.2"});
    std::fs::write(&snapshot_path, serde_json::to_string(&remote).unwrap()).unwrap();

    let output = env.rdc().args(["store", "sync"]).assert().success();
    let json = parse_json(&output.get_output().stdout);
    assert_eq!(json["results"][0]["pulled"], true);

    let output = env.rdc().args(["machine", "list"]).assert().success();
    let json = parse_json(&output.get_output().stdout);
    let names: Vec<&str> = json["machines"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["name"].as_str().unwrap())
        .collect();
    assert!(names.contains(&"web2"));
}

#[test]
fn test_store_remove() {
    let env = TestEnv::with_local_context();
    let store_dir = common::TempDir::new().unwrap();
    add_backup_store(&env, store_dir.path());

    env.rdc().args(["store", "remove", "backup"]).assert().success();
    env.rdc()
        .args(["store", "push"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No stores registered"));
}
