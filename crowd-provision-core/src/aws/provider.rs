//! Provider seams consumed by the prober and the reconciler.
//!
//! Each trait covers one AWS service family. Implementations return raw
//! outcomes; interpreting "already exists" and "not found" conditions is the
//! prober's job, not the provider's.

use std::collections::BTreeMap;

use async_trait::async_trait;

use super::ProviderResult;
use crate::types::{
    AccessKeyRecord, AccessKeySummary, ApiDescriptor, ApiSpec, BucketDescriptor, CallerIdentity,
    CorsRule, EventSourceMappingDescriptor, FunctionDescriptor, FunctionSpec,
    PermissionCheckResult, PolicyDescriptor, RoleDescriptor, TableDescriptor, TableSpec,
    UserDescriptor,
};

/// Caller identity and policy simulation.
#[async_trait]
pub trait IdentityApi: Send + Sync {
    async fn caller_identity(&self) -> ProviderResult<CallerIdentity>;

    async fn simulate_principal_policy(
        &self,
        principal_arn: &str,
        actions: &[String],
    ) -> ProviderResult<Vec<PermissionCheckResult>>;
}

/// Managed policies, users, roles, attachments and access keys.
#[async_trait]
pub trait IamApi: Send + Sync {
    async fn list_policies(&self, path_prefix: &str) -> ProviderResult<Vec<PolicyDescriptor>>;

    async fn create_policy(
        &self,
        name: &str,
        path: &str,
        document: &str,
    ) -> ProviderResult<PolicyDescriptor>;

    async fn list_users(&self, path_prefix: &str) -> ProviderResult<Vec<UserDescriptor>>;

    async fn create_user(&self, name: &str, path: &str) -> ProviderResult<UserDescriptor>;

    async fn list_roles(&self, path_prefix: &str) -> ProviderResult<Vec<RoleDescriptor>>;

    async fn create_role(
        &self,
        name: &str,
        path: &str,
        trust_document: &str,
    ) -> ProviderResult<RoleDescriptor>;

    async fn list_attached_user_policies(&self, user_name: &str) -> ProviderResult<Vec<String>>;

    async fn attach_user_policy(&self, user_name: &str, policy_arn: &str) -> ProviderResult<()>;

    async fn list_attached_role_policies(&self, role_name: &str) -> ProviderResult<Vec<String>>;

    async fn attach_role_policy(&self, role_name: &str, policy_arn: &str) -> ProviderResult<()>;

    async fn list_access_keys(&self, user_name: &str) -> ProviderResult<Vec<AccessKeySummary>>;

    async fn create_access_key(&self, user_name: &str) -> ProviderResult<AccessKeyRecord>;

    async fn delete_access_key(&self, user_name: &str, access_key_id: &str) -> ProviderResult<()>;
}

/// S3 buckets and their bucket-level configuration.
#[async_trait]
pub trait StorageApi: Send + Sync {
    async fn create_bucket(&self, name: &str, region: &str) -> ProviderResult<BucketDescriptor>;

    async fn bucket_location(&self, name: &str) -> ProviderResult<BucketDescriptor>;

    async fn get_bucket_policy(&self, bucket: &str) -> ProviderResult<String>;

    async fn put_bucket_policy(&self, bucket: &str, policy: &str) -> ProviderResult<()>;

    /// Lift the public-access block on bucket policies so a public-read
    /// policy can be attached. ACL-based public access stays blocked.
    async fn allow_public_policies(&self, bucket: &str) -> ProviderResult<()>;

    async fn get_bucket_cors(&self, bucket: &str) -> ProviderResult<Vec<CorsRule>>;

    async fn put_bucket_cors(&self, bucket: &str, rules: &[CorsRule]) -> ProviderResult<()>;
}

/// SQS queues.
#[async_trait]
pub trait QueueApi: Send + Sync {
    /// Queue URLs whose name starts with `prefix`.
    async fn list_queues(&self, prefix: &str) -> ProviderResult<Vec<String>>;

    /// Returns the URL of the new queue.
    async fn create_queue(
        &self,
        name: &str,
        attributes: &BTreeMap<String, String>,
    ) -> ProviderResult<String>;

    async fn queue_arn(&self, queue_url: &str) -> ProviderResult<String>;
}

/// DynamoDB tables.
#[async_trait]
pub trait TableApi: Send + Sync {
    async fn create_table(&self, spec: &TableSpec) -> ProviderResult<TableDescriptor>;

    async fn describe_table(&self, name: &str) -> ProviderResult<TableDescriptor>;
}

/// Lambda functions, invoke permissions and event source mappings.
#[async_trait]
pub trait FunctionApi: Send + Sync {
    async fn create_function(
        &self,
        spec: &FunctionSpec,
        package: Vec<u8>,
    ) -> ProviderResult<FunctionDescriptor>;

    async fn get_function(&self, name: &str) -> ProviderResult<FunctionDescriptor>;

    async fn add_permission(
        &self,
        function_name: &str,
        statement_id: &str,
        principal: &str,
        source_arn: &str,
    ) -> ProviderResult<()>;

    async fn list_event_source_mappings(
        &self,
        function_name: &str,
        source_arn: &str,
    ) -> ProviderResult<Vec<EventSourceMappingDescriptor>>;

    async fn create_event_source_mapping(
        &self,
        function_name: &str,
        source_arn: &str,
        batch_size: i32,
    ) -> ProviderResult<EventSourceMappingDescriptor>;
}

/// API Gateway HTTP APIs.
#[async_trait]
pub trait HttpApi: Send + Sync {
    async fn list_apis(&self) -> ProviderResult<Vec<ApiDescriptor>>;

    async fn create_api(&self, spec: &ApiSpec) -> ProviderResult<ApiDescriptor>;
}

/// Every service family a provisioning run touches.
pub trait CloudProvider:
    IdentityApi + IamApi + StorageApi + QueueApi + TableApi + FunctionApi + HttpApi
{
}

impl<T> CloudProvider for T where
    T: IdentityApi + IamApi + StorageApi + QueueApi + TableApi + FunctionApi + HttpApi
{
}
