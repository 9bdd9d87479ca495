//! Ordered provisioning steps of one run.
//!
//! Steps run strictly in sequence since later steps consume ARNs and IDs
//! produced by earlier ones. Every step is idempotent on its own, so a run
//! that failed part-way is recovered by running it again.

use std::collections::BTreeMap;

use rand::rngs::StdRng;

use crate::aws::CloudProvider;
use crate::config::ProvisionConfig;
use crate::documents::{
    default_cors_rules, deploy_bucket_policy, execute_api_arn, lambda_trust_policy,
    log_group_arn, logger_execution_policy, queue_arn, table_arn, task_user_policy,
};
use crate::error::ProvisionResult;
use crate::permissions::{PermissionGate, REQUIRED_ACTIONS};
use crate::reconcile::Reconciler;
use crate::store::LocalStateStore;
use crate::types::{
    ApiSpec, CallerIdentity, FunctionSpec, PermissionCheckResult, ProvisionReport, TaskEnvironment,
};

pub const LOGGER_RUNTIME: &str = "python3.12";
pub const LOGGER_HANDLER: &str = "logger.handler";
pub const LOGGER_TIMEOUT_SECONDS: i32 = 30;
pub const LOGGER_MEMORY_MB: i32 = 128;
pub const LOGGER_BATCH_SIZE: i32 = 10;

/// Visibility timeout of the log queue. SQS requires at least the timeout
/// of the function consuming it.
const QUEUE_VISIBILITY_TIMEOUT: &str = "60";
const QUEUE_RETENTION_SECONDS: &str = "1209600";

pub struct Provisioner<P> {
    provider: P,
    store: LocalStateStore,
    config: ProvisionConfig,
    required_actions: Vec<String>,
    rng: Option<StdRng>,
}

impl<P: CloudProvider> Provisioner<P> {
    pub fn new(provider: P, config: ProvisionConfig) -> Self {
        let store = LocalStateStore::new(&config.state_dir);
        Self {
            provider,
            store,
            config,
            required_actions: REQUIRED_ACTIONS.iter().map(ToString::to_string).collect(),
            rng: None,
        }
    }

    /// Replace the checklist the permission gate simulates.
    #[must_use]
    pub fn with_required_actions(mut self, actions: &[&str]) -> Self {
        self.required_actions = actions.iter().map(ToString::to_string).collect();
        self
    }

    /// Seed the active access key choice.
    #[must_use]
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = Some(rng);
        self
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn store(&self) -> &LocalStateStore {
        &self.store
    }

    pub fn config(&self) -> &ProvisionConfig {
        &self.config
    }

    fn gate(&self) -> PermissionGate<'_, P> {
        let actions: Vec<&str> = self.required_actions.iter().map(String::as_str).collect();
        PermissionGate::with_actions(&self.provider, &actions)
    }

    /// Caller identity plus the simulator verdict for every required
    /// action. The verdict is `None` for the account root.
    pub async fn check_permissions(
        &self,
    ) -> ProvisionResult<(CallerIdentity, Option<Vec<PermissionCheckResult>>)> {
        let caller = self.provider.caller_identity().await?;
        let results = self.gate().evaluate(&caller).await?;
        Ok((caller, results))
    }

    pub async fn run(&mut self) -> ProvisionResult<ProvisionReport> {
        let started = chrono::Utc::now();
        let config = &self.config;
        let names = config.names();
        let region = config.region.as_str();

        let caller = self.provider.caller_identity().await?;
        log::info!(
            "Provisioning {} in account {} as {}",
            names.environment,
            caller.account,
            caller.arn
        );
        self.gate().enforce(&caller).await?;

        let account = caller.account.as_str();
        let mut reconciler = Reconciler::new(&self.provider, &self.store, names.iam_path.as_str());
        if let Some(rng) = self.rng.take() {
            reconciler = reconciler.with_rng(rng);
        }

        let queue_arn_expected = queue_arn(region, account, &names.queue);
        let table_arns: Vec<String> = names
            .tables()
            .iter()
            .map(|(_, table)| table_arn(region, account, table))
            .collect();

        // IAM
        let user_policy = reconciler
            .ensure_policy(
                &names.user_policy,
                &task_user_policy(
                    &config.private_bucket,
                    &config.deploy_bucket,
                    &queue_arn_expected,
                    &table_arns,
                ),
            )
            .await?;
        let logger_policy = reconciler
            .ensure_policy(
                &names.logger_policy,
                &logger_execution_policy(
                    &queue_arn_expected,
                    &table_arns,
                    &log_group_arn(region, account, &names.function),
                ),
            )
            .await?;

        let user = reconciler.ensure_user(&names.user).await?;
        reconciler
            .ensure_user_policy_attachment(&user.user_name, &user_policy.arn)
            .await?;
        let access_key = reconciler.ensure_access_keys(&user.user_name).await?;

        let role = reconciler
            .ensure_role(&names.role, &lambda_trust_policy())
            .await?;
        reconciler
            .ensure_role_policy_attachment(&role.role_name, &logger_policy.arn)
            .await?;

        // S3
        reconciler
            .ensure_bucket(&config.private_bucket, region)
            .await?;
        reconciler
            .ensure_bucket(&config.deploy_bucket, region)
            .await?;
        reconciler
            .ensure_bucket_policy(
                &config.deploy_bucket,
                &deploy_bucket_policy(&config.deploy_bucket),
            )
            .await?;
        let cors = default_cors_rules();
        reconciler
            .ensure_bucket_cors(&config.private_bucket, &cors)
            .await?;
        reconciler
            .ensure_bucket_cors(&config.deploy_bucket, &cors)
            .await?;

        // Logging backend
        let queue_attributes = BTreeMap::from([
            (
                "VisibilityTimeout".to_string(),
                QUEUE_VISIBILITY_TIMEOUT.to_string(),
            ),
            (
                "MessageRetentionPeriod".to_string(),
                QUEUE_RETENTION_SECONDS.to_string(),
            ),
        ]);
        let queue = reconciler
            .ensure_queue(&names.queue, &queue_attributes)
            .await?;

        let mut tables = BTreeMap::new();
        for ((role_name, _), spec) in names.tables().iter().zip(names.table_specs()) {
            let table = reconciler.ensure_table(&spec).await?;
            tables.insert((*role_name).to_string(), table.name);
        }

        let function_spec = FunctionSpec {
            name: names.function.clone(),
            runtime: LOGGER_RUNTIME.to_string(),
            handler: LOGGER_HANDLER.to_string(),
            role_arn: role.arn.clone(),
            timeout_seconds: LOGGER_TIMEOUT_SECONDS,
            memory_mb: LOGGER_MEMORY_MB,
            environment: BTreeMap::from([
                ("QUEUE_URL".to_string(), queue.url.clone()),
                ("TABLE_NAME".to_string(), names.logger_table.clone()),
            ]),
        };
        let function = reconciler
            .ensure_function(&function_spec, &config.logger_package)
            .await?;
        reconciler
            .ensure_event_source_mapping(&function.name, &queue.arn, LOGGER_BATCH_SIZE)
            .await?;

        let api = reconciler
            .ensure_api(&ApiSpec {
                name: names.api.clone(),
                target_arn: function.arn.clone(),
                allowed_origins: vec!["*".to_string()],
            })
            .await?;
        reconciler
            .ensure_invoke_permission(
                &function.name,
                &names.invoke_statement_id,
                &execute_api_arn(region, account, &api.api_id),
            )
            .await?;

        let environment = TaskEnvironment {
            task_name: config.task_name.clone(),
            batch_name: config.batch_name.clone(),
            region: region.to_string(),
            account_id: caller.account.clone(),
            private_bucket: config.private_bucket.clone(),
            deploy_bucket: config.deploy_bucket.clone(),
            queue_url: queue.url,
            api_endpoint: api.endpoint,
            tables,
            logger_function: function.name,
            access_key_id: access_key.access_key_id.clone(),
            secret_access_key: access_key.secret_access_key,
            admin_user: config.admin_user.clone(),
            admin_password: config.admin_password.clone(),
            ip_info_token: config.ip_info_token.clone(),
        };
        let environment_file = reconciler
            .write_environment(&names.environment, &environment)
            .await?;

        let outcomes = reconciler.into_outcomes();
        let elapsed = chrono::Utc::now() - started;
        log::info!(
            "Provisioned {} resources in {}ms",
            outcomes.len(),
            elapsed.num_milliseconds()
        );
        Ok(ProvisionReport {
            account_id: caller.account,
            caller_arn: caller.arn,
            outcomes,
            active_access_key_id: access_key.access_key_id,
            environment_file,
            started_at: started,
        })
    }
}
