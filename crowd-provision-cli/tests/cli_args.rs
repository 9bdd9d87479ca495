use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const SETTINGS_ENV: &[&str] = &[
    "TASK_NAME",
    "BATCH_NAME",
    "AWS_REGION",
    "AWS_PRIVATE_BUCKET",
    "AWS_DEPLOY_BUCKET",
    "ADMIN_USER",
    "ADMIN_PASSWORD",
];

/// The binary, run in an empty directory so no `.env` file is picked up.
fn crowd_provision(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("crowd-provision").unwrap();
    cmd.current_dir(dir.path()).env_clear();
    cmd
}

#[test]
fn help_lists_subcommands() {
    let dir = TempDir::new().unwrap();
    crowd_provision(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("provision")
                .and(predicate::str::contains("check-permissions"))
                .and(predicate::str::contains("status")),
        );
}

#[test]
fn test_missing_configuration_is_reported_at_once() {
    let dir = TempDir::new().unwrap();
    let assert = crowd_provision(&dir).arg("provision").assert().code(2);

    let stderr = String::from_utf8_lossy(&assert.get_output().stderr).to_string();
    for variable in SETTINGS_ENV {
        assert!(stderr.contains(variable), "{variable} missing from: {stderr}");
    }
}

#[test]
fn test_partial_configuration_names_only_missing_values() {
    let dir = TempDir::new().unwrap();
    crowd_provision(&dir)
        .args(["check-permissions", "--task-name", "sentiment"])
        .env("BATCH_NAME", "batch-1")
        .env("AWS_REGION", "eu-west-1")
        .assert()
        .code(2)
        .stderr(
            predicate::str::contains("AWS_PRIVATE_BUCKET")
                .and(predicate::str::contains("ADMIN_PASSWORD"))
                .and(predicate::str::contains("TASK_NAME").not()),
        );
}

#[test]
fn test_invalid_bucket_name_is_rejected() {
    let dir = TempDir::new().unwrap();
    crowd_provision(&dir)
        .arg("provision")
        .env("TASK_NAME", "sentiment")
        .env("BATCH_NAME", "batch-1")
        .env("AWS_REGION", "eu-west-1")
        .env("AWS_PRIVATE_BUCKET", "Not_A_Bucket")
        .env("AWS_DEPLOY_BUCKET", "crowd-sentiment-deploy")
        .env("ADMIN_USER", "admin")
        .env("ADMIN_PASSWORD", "hunter22")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Not_A_Bucket"));
}

#[test]
fn test_status_on_empty_state_dir() {
    let dir = TempDir::new().unwrap();
    crowd_provision(&dir)
        .args(["status", "--state-dir"])
        .arg(dir.path().join("state"))
        .assert()
        .success()
        .stderr(predicate::str::contains("No local state"));
}

#[test]
fn test_status_lists_stored_entries() {
    let dir = TempDir::new().unwrap();
    let state = dir.path().join("state");
    std::fs::create_dir_all(state.join("queue")).unwrap();
    std::fs::write(state.join("queue").join("crowd-task-q.json"), "{}").unwrap();
    std::fs::create_dir_all(state.join("access_key").join("crowd-task-user")).unwrap();
    std::fs::write(
        state
            .join("access_key")
            .join("crowd-task-user")
            .join("AKIAEXAMPLE.json"),
        "{}",
    )
    .unwrap();

    let assert = crowd_provision(&dir)
        .args(["status", "--json"])
        .env("STATE_DIR", &state)
        .assert()
        .success();

    let entries: serde_json::Value = serde_json::from_slice(&assert.get_output().stdout).unwrap();
    let keys: Vec<&str> = entries
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["key"].as_str().unwrap())
        .collect();
    assert_eq!(
        keys,
        vec!["access_key/crowd-task-user/AKIAEXAMPLE", "queue/crowd-task-q"]
    );
}
