//! Logging backend: queue, tables, logger function, its event source
//! mapping, the HTTP API in front of it and the invoke permission.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::aws::CloudProvider;
use crate::error::{ProvisionError, ProvisionResult};
use crate::probe::{Claim, Probe};
use crate::store::StateKey;
use crate::types::{
    Action, ApiDescriptor, ApiSpec, EventSourceMappingDescriptor, FunctionDescriptor,
    FunctionPermissionDescriptor, FunctionSpec, QueueDescriptor, ResourceKind, TableDescriptor,
    TableSpec, TaskEnvironment,
};

impl<P: CloudProvider + ?Sized> super::Reconciler<'_, P> {
    pub async fn ensure_queue(
        &mut self,
        name: &str,
        attributes: &BTreeMap<String, String>,
    ) -> ProvisionResult<QueueDescriptor> {
        let key = StateKey::new(ResourceKind::Queue, name);
        match self.prober.queue(name).await? {
            Probe::Found(queue) => {
                self.adopt(&key, &queue).await?;
                Ok(queue)
            }
            Probe::NotFound => {
                let url = self.provider.create_queue(name, attributes).await?;
                let arn = self.provider.queue_arn(&url).await?;
                let queue = QueueDescriptor {
                    name: name.to_string(),
                    url,
                    arn,
                };
                self.created(&key, &queue).await?;
                Ok(queue)
            }
        }
    }

    pub async fn ensure_table(&mut self, spec: &TableSpec) -> ProvisionResult<TableDescriptor> {
        let claim = self.prober.claim_table(spec).await?;
        self.settle(&StateKey::new(ResourceKind::Table, &spec.name), claim)
            .await
    }

    /// The package is read before the claim: creating the function is also
    /// how its existence is probed.
    pub async fn ensure_function(
        &mut self,
        spec: &FunctionSpec,
        package_path: &Path,
    ) -> ProvisionResult<FunctionDescriptor> {
        let package = tokio::fs::read(package_path)
            .await
            .map_err(|source| ProvisionError::Package {
                path: package_path.to_path_buf(),
                source,
            })?;
        log::debug!(
            "Read {} bytes of function package {}",
            package.len(),
            package_path.display()
        );
        let claim = self.prober.claim_function(spec, package).await?;
        self.settle(&StateKey::new(ResourceKind::Function, &spec.name), claim)
            .await
    }

    pub async fn ensure_event_source_mapping(
        &mut self,
        function_name: &str,
        source_arn: &str,
        batch_size: i32,
    ) -> ProvisionResult<EventSourceMappingDescriptor> {
        let key = StateKey::new(ResourceKind::EventSourceMapping, function_name);
        match self
            .prober
            .event_source_mapping(function_name, source_arn)
            .await?
        {
            Probe::Found(mapping) => {
                self.adopt(&key, &mapping).await?;
                Ok(mapping)
            }
            Probe::NotFound => {
                let mapping = self
                    .provider
                    .create_event_source_mapping(function_name, source_arn, batch_size)
                    .await?;
                self.created(&key, &mapping).await?;
                Ok(mapping)
            }
        }
    }

    /// HTTP API names are not unique on the provider side; the first API
    /// carrying the name is adopted.
    pub async fn ensure_api(&mut self, spec: &ApiSpec) -> ProvisionResult<ApiDescriptor> {
        let key = StateKey::new(ResourceKind::Api, &spec.name);
        match self.prober.api(&spec.name).await? {
            Probe::Found(api) => {
                self.adopt(&key, &api).await?;
                Ok(api)
            }
            Probe::NotFound => {
                let api = self.provider.create_api(spec).await?;
                self.created(&key, &api).await?;
                Ok(api)
            }
        }
    }

    pub async fn ensure_invoke_permission(
        &mut self,
        function_name: &str,
        statement_id: &str,
        source_arn: &str,
    ) -> ProvisionResult<()> {
        let key = StateKey::new(ResourceKind::FunctionPermission, statement_id);
        let descriptor = FunctionPermissionDescriptor {
            function_name: function_name.to_string(),
            statement_id: statement_id.to_string(),
            principal: "apigateway.amazonaws.com".to_string(),
            source_arn: source_arn.to_string(),
        };
        let claim = match self
            .prober
            .claim_invoke_permission(function_name, statement_id, source_arn)
            .await?
        {
            Claim::Created(()) => Claim::Created(descriptor),
            Claim::Existing(()) => Claim::Existing(descriptor),
        };
        self.settle(&key, claim).await?;
        Ok(())
    }

    /// Store the task environment, replacing any previous one whole.
    pub async fn write_environment(
        &mut self,
        name: &str,
        environment: &TaskEnvironment,
    ) -> ProvisionResult<PathBuf> {
        let key = StateKey::new(ResourceKind::Environment, name);
        let previous: Option<TaskEnvironment> = self.local(&key).await?;
        let action = match previous {
            Some(previous) if previous == *environment => Action::ReusedLocal,
            Some(_) => Action::Refreshed,
            None => Action::Created,
        };
        let path = if action == Action::ReusedLocal {
            self.store.path_for(&key)
        } else {
            self.store.put(&key, environment).await?
        };
        self.record(
            ResourceKind::Environment,
            name,
            action,
            Some(path.display().to_string()),
        );
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconcile::Reconciler;
    use crate::store::LocalStateStore;
    use crate::testing::InMemoryProvider;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_package_is_reported_with_path() {
        let dir = TempDir::new().unwrap();
        let store = LocalStateStore::new(dir.path().join("state"));
        let provider = InMemoryProvider::new();
        let mut reconciler = Reconciler::new(&provider, &store, "/crowd-task/");

        let missing = dir.path().join("logger.zip");
        let err = reconciler
            .ensure_function(&InMemoryProvider::sample_function("logger"), &missing)
            .await
            .unwrap_err();
        assert!(matches!(err, ProvisionError::Package { ref path, .. } if *path == missing));
        assert!(provider.requests().await.is_empty());
    }

    #[tokio::test]
    async fn test_function_and_permission_are_claimed_once() {
        let dir = TempDir::new().unwrap();
        let package = dir.path().join("logger.zip");
        std::fs::write(&package, b"PK\x03\x04").unwrap();
        let store = LocalStateStore::new(dir.path().join("state"));
        let provider = InMemoryProvider::new();
        let spec = InMemoryProvider::sample_function("logger");
        let source = "arn:aws:execute-api:eu-west-1:123456789012:api/*/*";

        for _ in 0..2 {
            let mut reconciler = Reconciler::new(&provider, &store, "/crowd-task/");
            let function = reconciler.ensure_function(&spec, &package).await.unwrap();
            reconciler
                .ensure_invoke_permission(&function.name, "logger-invoke", source)
                .await
                .unwrap();
        }

        assert_eq!(
            provider.mutations().await,
            vec!["CreateFunction logger", "AddPermission logger"]
        );
    }

    #[tokio::test]
    async fn test_environment_kept_when_unchanged() {
        let dir = TempDir::new().unwrap();
        let store = LocalStateStore::new(dir.path());
        let provider = InMemoryProvider::new();
        let environment = TaskEnvironment {
            task_name: "sentiment".to_string(),
            batch_name: "batch-1".to_string(),
            region: "eu-west-1".to_string(),
            account_id: "123456789012".to_string(),
            private_bucket: "private".to_string(),
            deploy_bucket: "deploy".to_string(),
            queue_url: "https://sqs.eu-west-1.amazonaws.com/123456789012/q".to_string(),
            api_endpoint: None,
            tables: BTreeMap::new(),
            logger_function: "logger".to_string(),
            access_key_id: "AKIAEXAMPLE".to_string(),
            secret_access_key: "secret".to_string(),
            admin_user: "admin".to_string(),
            admin_password: "password".to_string(),
            ip_info_token: None,
        };

        let mut reconciler = Reconciler::new(&provider, &store, "/crowd-task/");
        let first = reconciler
            .write_environment("sentiment-batch-1", &environment)
            .await
            .unwrap();
        let second = reconciler
            .write_environment("sentiment-batch-1", &environment)
            .await
            .unwrap();
        let changed = TaskEnvironment {
            access_key_id: "AKIAOTHER".to_string(),
            ..environment.clone()
        };
        reconciler
            .write_environment("sentiment-batch-1", &changed)
            .await
            .unwrap();

        assert_eq!(first, second);
        let actions: Vec<Action> = reconciler.outcomes().iter().map(|o| o.action).collect();
        assert_eq!(
            actions,
            vec![Action::Created, Action::ReusedLocal, Action::Refreshed]
        );
    }
}
