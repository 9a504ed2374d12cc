//! Integration tests for resource CRUD, vaults and the queue against a
//! local-mode context.

mod common;

use common::{TestEnv, parse_json};
use predicates::prelude::*;

#[test]
fn test_machine_create_and_list() {
    let env = TestEnv::with_local_context();

    env.rdc()
        .args([
            "machine", "create", "web1", "--set", "ip=10.0.0.1", "--set", "port=22",
        ])
        .assert()
        .success();

    let output = env.rdc().args(["machine", "list"]).assert().success();
    let json = parse_json(&output.get_output().stdout);
    let machines = json["machines"].as_array().unwrap();
    assert_eq!(machines.len(), 1);
    assert_eq!(machines[0]["name"], "web1");
    assert_eq!(machines[0]["fields"]["ip"], "10.0.0.1");
    assert_eq!(machines[0]["fields"]["port"], 22);
}

#[test]
fn test_machine_create_duplicate_reports_failure() {
    let env = TestEnv::with_local_context();

    env.rdc()
        .args(["machine", "create", "web1"])
        .assert()
        .success();

    env.rdc()
        .args(["machine", "create", "web1"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("already exists"));
}

#[test]
fn test_machine_rename_not_found_lists_available() {
    let env = TestEnv::with_local_context();

    env.rdc()
        .args(["machine", "create", "web1"])
        .assert()
        .success();

    env.rdc()
        .args(["machine", "rename", "ghost", "web2"])
        .assert()
        .failure()
        .stdout(
            predicate::str::contains("not found")
                .and(predicate::str::contains("ghost"))
                .and(predicate::str::contains("Available"))
                .and(predicate::str::contains("web1")),
        );
}

#[test]
fn test_machine_rename_keeps_fields() {
    let env = TestEnv::with_local_context();

    env.rdc()
        .args(["machine", "create", "web1", "--set", "ip=10.0.0.1"])
        .assert()
        .success();
    env.rdc()
        .args(["machine", "rename", "web1", "web2"])
        .assert()
        .success();

    let output = env
        .rdc()
        .args(["machine", "show", "web2"])
        .assert()
        .success();
    let json = parse_json(&output.get_output().stdout);
    assert_eq!(json["fields"]["ip"], "10.0.0.1");

    env.rdc().args(["machine", "show", "web1"]).assert().failure();
}

#[test]
fn test_repeated_delete_reports_not_found() {
    let env = TestEnv::with_local_context();

    env.rdc()
        .args(["storage", "create", "s1"])
        .assert()
        .success();

    env.rdc().args(["storage", "remove", "s1"]).assert().success();
    env.rdc()
        .args(["storage", "remove", "s1"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("not found"));
}

#[test]
fn test_repo_crud_round_trip() {
    let env = TestEnv::with_local_context();

    env.rdc()
        .args(["repo", "create", "app", "--set", "tag=latest"])
        .assert()
        .success();

    let output = env.rdc().args(["repo", "list"]).assert().success();
    let json = parse_json(&output.get_output().stdout);
    assert_eq!(json["repositories"].as_array().unwrap().len(), 1);
}

#[test]
fn test_vault_set_and_get() {
    let env = TestEnv::with_local_context();

    env.rdc()
        .args(["machine", "create", "web1"])
        .assert()
        .success();

    env.rdc()
        .args([
            "vault",
            "set",
            "machine",
            "web1",
            r#"{"sshUser":"root"}"#,
        ])
        .assert()
        .success();

    let output = env
        .rdc()
        .args(["vault", "get", "machine", "web1"])
        .assert()
        .success();
    let json = parse_json(&output.get_output().stdout);
    assert_eq!(json["vaultVersion"], 1);
    assert_eq!(json["vaultContent"]["sshUser"], "root");
}

#[test]
fn test_vault_stale_write_is_rejected() {
    let env = TestEnv::with_local_context();

    env.rdc()
        .args(["machine", "create", "web1"])
        .assert()
        .success();
    env.rdc()
        .args(["vault", "set", "machine", "web1", r#"{"a":1}"#])
        .assert()
        .success();

    // Still claiming base version 0 after the first write raced ahead.
    env.rdc()
        .args(["vault", "set", "machine", "web1", r#"{"b":2}"#])
        .assert()
        .failure()
        .stdout(predicate::str::contains("conflict"));

    env.rdc()
        .args([
            "vault",
            "set",
            "machine",
            "web1",
            r#"{"b":2}"#,
            "--base-version",
            "1",
        ])
        .assert()
        .success();
}

#[test]
fn test_vault_rejects_invalid_json_payload() {
    let env = TestEnv::with_local_context();

    env.rdc()
        .args(["machine", "create", "web1"])
        .assert()
        .success();

    env.rdc()
        .args(["vault", "set", "machine", "web1", "not json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not valid JSON"));
}

#[test]
fn test_queue_add_list_trace() {
    let env = TestEnv::with_local_context();

    let output = env
        .rdc()
        .args(["queue", "add", "backup", "--machine", "web1"])
        .assert()
        .success();
    let task_id = parse_json(&output.get_output().stdout)["taskId"]
        .as_str()
        .unwrap()
        .to_string();

    let output = env.rdc().args(["queue", "list"]).assert().success();
    let json = parse_json(&output.get_output().stdout);
    assert_eq!(json["queue"].as_array().unwrap().len(), 1);

    let output = env
        .rdc()
        .args(["queue", "trace", &task_id])
        .assert()
        .success();
    let json = parse_json(&output.get_output().stdout);
    assert_eq!(json["functionName"], "backup");
    assert_eq!(json["status"], "PENDING");

    env.rdc()
        .args(["queue", "trace", "no-such-task"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("not found"));
}

#[test]
fn test_encrypted_context_round_trip_via_env_password() {
    let env = TestEnv::new();

    env.rdc()
        .args(["context", "create", "default", "--mode", "local", "--encrypt"])
        .assert()
        .success();

    env.rdc()
        .env("RDC_MASTER_PASSWORD", "hunter2")
        .args(["machine", "create", "prod", "--set", "ip=1.2.3.4"])
        .assert()
        .success();

    // State file on disk holds ciphertext, not the resource maps.
    let raw = std::fs::read_to_string(
        env.config_path().join("state").join("default.json"),
    )
    .unwrap();
    assert!(raw.contains("\"encrypted\""));
    assert!(!raw.contains("\"machines\""));

    let output = env
        .rdc()
        .env("RDC_MASTER_PASSWORD", "hunter2")
        .args(["machine", "list"])
        .assert()
        .success();
    let json = parse_json(&output.get_output().stdout);
    assert_eq!(json["machines"][0]["name"], "prod");
}

#[test]
fn test_encrypted_context_rejects_wrong_password() {
    let env = TestEnv::new();

    env.rdc()
        .args(["context", "create", "default", "--mode", "local", "--encrypt"])
        .assert()
        .success();
    env.rdc()
        .env("RDC_MASTER_PASSWORD", "right")
        .args(["machine", "create", "prod"])
        .assert()
        .success();

    env.rdc()
        .env("RDC_MASTER_PASSWORD", "wrong")
        .args(["machine", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Decryption failed"));
}
