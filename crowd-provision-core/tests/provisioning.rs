//! End-to-end runs of the provisioning pipeline against the in-memory
//! provider.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crowd_provision_core::testing::{InMemoryProvider, ACCOUNT_ID, REGION};
use crowd_provision_core::{
    AccessKeyRecord, Action, LocalStateStore, ProvisionConfig, ProvisionError, ProvisionSettings,
    Provisioner, ResourceKind, StateKey, TaskEnvironment,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tempfile::TempDir;

const USER: &str = "crowd-task-user";

fn config(dir: &Path) -> ProvisionConfig {
    let package = dir.join("logger.zip");
    std::fs::write(&package, b"PK\x03\x04logger").unwrap();
    ProvisionSettings {
        task_name: Some("sentiment".to_string()),
        batch_name: Some("batch-1".to_string()),
        region: Some(REGION.to_string()),
        private_bucket: Some("crowd-sentiment-private".to_string()),
        deploy_bucket: Some("crowd-sentiment-deploy".to_string()),
        admin_user: Some("admin".to_string()),
        admin_password: Some("hunter22".to_string()),
        state_dir: Some(dir.join("state")),
        logger_package: Some(package),
        ..ProvisionSettings::default()
    }
    .resolve()
    .unwrap()
}

/// Every file under `root` with its content.
fn read_tree(root: &Path) -> BTreeMap<PathBuf, String> {
    let mut files = BTreeMap::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in std::fs::read_dir(&dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                pending.push(path);
            } else {
                files.insert(path.clone(), std::fs::read_to_string(&path).unwrap());
            }
        }
    }
    files
}

fn access_key(id: &str) -> StateKey {
    StateKey::with_sub_id(ResourceKind::AccessKey, USER, id)
}

#[tokio::test]
async fn test_second_run_changes_nothing() {
    let dir = TempDir::new().unwrap();
    let mut provisioner = Provisioner::new(InMemoryProvider::new(), config(dir.path()))
        .with_rng(StdRng::seed_from_u64(1));

    let first = provisioner.run().await.unwrap();
    assert_eq!(first.account_id, ACCOUNT_ID);
    assert!(first.count(Action::Created) > 0);
    let remote_after_first = provisioner.provider().snapshot().await;
    let local_after_first = read_tree(provisioner.store().root());
    provisioner.provider().clear_log().await;

    let second = provisioner.run().await.unwrap();

    assert!(provisioner.provider().mutations().await.is_empty());
    assert_eq!(second.count(Action::Created), 0);
    assert_eq!(second.count(Action::Repaired), 0);
    assert_eq!(provisioner.provider().snapshot().await, remote_after_first);
    assert_eq!(read_tree(provisioner.store().root()), local_after_first);
    assert_eq!(second.active_access_key_id, first.active_access_key_id);
    assert_eq!(second.environment_file, first.environment_file);
}

#[tokio::test]
async fn test_first_run_creates_one_key_and_publishes_it() {
    let dir = TempDir::new().unwrap();
    let mut provisioner = Provisioner::new(InMemoryProvider::new(), config(dir.path()));

    let report = provisioner.run().await.unwrap();

    let ids = provisioner.provider().access_key_ids(USER).await;
    assert_eq!(ids, vec![report.active_access_key_id.clone()]);
    let record: AccessKeyRecord = provisioner
        .store()
        .get(&access_key(&ids[0]))
        .await
        .unwrap()
        .unwrap();
    assert!(!record.secret_access_key.is_empty());

    let environment: TaskEnvironment = provisioner
        .store()
        .get(&StateKey::new(ResourceKind::Environment, "sentiment-batch-1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(environment.access_key_id, record.access_key_id);
    assert_eq!(environment.secret_access_key, record.secret_access_key);
    assert_eq!(environment.account_id, ACCOUNT_ID);
    assert_eq!(
        environment.tables.keys().map(String::as_str).collect::<Vec<_>>(),
        vec!["acl", "data", "logger"]
    );
    assert!(environment.api_endpoint.is_some());
}

#[tokio::test]
async fn test_orphaned_key_is_replaced() {
    let dir = TempDir::new().unwrap();
    let provider = InMemoryProvider::new();
    let known = provider.seed_access_key(USER).await;
    let orphan = provider.seed_access_key(USER).await;
    let config = config(dir.path());
    LocalStateStore::new(&config.state_dir)
        .put(&access_key(&known.access_key_id), &known)
        .await
        .unwrap();

    let mut provisioner = Provisioner::new(provider, config);
    let report = provisioner.run().await.unwrap();

    let mutations = provisioner.provider().mutations().await;
    assert_eq!(
        mutations
            .iter()
            .filter(|m| m.starts_with("DeleteAccessKey"))
            .collect::<Vec<_>>(),
        vec![&format!("DeleteAccessKey {}", orphan.access_key_id)]
    );
    assert_eq!(
        mutations
            .iter()
            .filter(|m| m.starts_with("CreateAccessKey"))
            .count(),
        1
    );

    let ids = provisioner.provider().access_key_ids(USER).await;
    assert_eq!(ids.len(), 2);
    assert!(ids.contains(&known.access_key_id));
    assert!(!ids.contains(&orphan.access_key_id));
    for id in &ids {
        let record: Option<AccessKeyRecord> =
            provisioner.store().get(&access_key(id)).await.unwrap();
        assert!(record.is_some(), "no local record for {id}");
    }
    assert!(ids.contains(&report.active_access_key_id));
    assert_eq!(report.count(Action::Repaired), 1);
}

#[tokio::test]
async fn test_denied_action_stops_run_before_any_create() {
    let dir = TempDir::new().unwrap();
    let provider = InMemoryProvider::new().deny_action("sqs:CreateQueue");
    let mut provisioner = Provisioner::new(provider, config(dir.path())).with_required_actions(&[
        "iam:CreateUser",
        "s3:CreateBucket",
        "sqs:CreateQueue",
        "dynamodb:CreateTable",
        "lambda:CreateFunction",
    ]);

    let err = provisioner.run().await.unwrap_err();

    match &err {
        ProvisionError::MissingPermissions { principal, actions } => {
            assert_eq!(principal, &format!("arn:aws:iam::{ACCOUNT_ID}:user/admin"));
            assert_eq!(actions, &vec!["sqs:CreateQueue".to_string()]);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.requires_operator_action());
    let requests = provisioner.provider().requests().await;
    assert!(requests.iter().all(|r| !r.starts_with("Create")), "{requests:?}");
    assert!(!provisioner.store().root().exists());
}

#[tokio::test]
async fn test_root_caller_skips_the_gate() {
    let dir = TempDir::new().unwrap();
    let provider = InMemoryProvider::new()
        .with_caller_arn(&format!("arn:aws:iam::{ACCOUNT_ID}:root"))
        .deny_simulation();
    let mut provisioner = Provisioner::new(provider, config(dir.path()));

    let (caller, results) = provisioner.check_permissions().await.unwrap();
    assert!(caller.arn.ends_with(":root"));
    assert!(results.is_none());
    provisioner.run().await.unwrap();
}

#[tokio::test]
async fn test_existing_bucket_policy_is_left_alone() {
    let dir = TempDir::new().unwrap();
    let custom = r#"{"Version":"2012-10-17","Statement":[{"Effect":"Allow","Principal":{"AWS":"arn:aws:iam::123456789012:root"},"Action":"s3:GetObject","Resource":"arn:aws:s3:::crowd-sentiment-deploy/*"}]}"#;
    let mut provisioner = Provisioner::new(InMemoryProvider::new(), config(dir.path()));
    provisioner.run().await.unwrap();
    provisioner
        .provider()
        .seed_bucket_policy("crowd-sentiment-deploy", custom)
        .await;
    provisioner.provider().clear_log().await;

    provisioner.run().await.unwrap();

    assert_eq!(
        provisioner
            .provider()
            .bucket_policy("crowd-sentiment-deploy")
            .await
            .as_deref(),
        Some(custom)
    );
    assert!(provisioner.provider().mutations().await.is_empty());
}

#[tokio::test]
async fn test_foreign_bucket_aborts_run() {
    let dir = TempDir::new().unwrap();
    let provider = InMemoryProvider::new().with_foreign_bucket("crowd-sentiment-private");
    let mut provisioner = Provisioner::new(provider, config(dir.path()));

    let err = provisioner.run().await.unwrap_err();

    assert!(matches!(err, ProvisionError::Provider(_)), "{err}");
    assert!(!err.requires_operator_action());
}

#[tokio::test]
async fn test_store_round_trip() {
    let dir = TempDir::new().unwrap();
    let store = LocalStateStore::new(dir.path());
    let key = StateKey::new(ResourceKind::Queue, "crowd-task-sentiment-batch-1-logger");
    let value = serde_json::json!({"url": "https://sqs/q", "arn": "arn:aws:sqs:eu-west-1:1:q"});

    store.put(&key, &value).await.unwrap();

    assert_eq!(
        store.get::<serde_json::Value>(&key).await.unwrap(),
        Some(value)
    );
    assert_eq!(
        store
            .get::<serde_json::Value>(&StateKey::new(ResourceKind::Queue, "never-stored"))
            .await
            .unwrap(),
        None
    );
}
