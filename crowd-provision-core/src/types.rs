//! Resource descriptors, resource specifications and run reports.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// Identity of the credentials the run executes with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerIdentity {
    pub account: String,
    pub arn: String,
    pub user_id: String,
}

/// Resource kinds the local state store and reports know about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Policy,
    User,
    Role,
    PolicyAttachment,
    AccessKey,
    Bucket,
    BucketPolicy,
    BucketCors,
    Queue,
    Table,
    Function,
    FunctionPermission,
    EventSourceMapping,
    Api,
    Environment,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 15] = [
        ResourceKind::Policy,
        ResourceKind::User,
        ResourceKind::Role,
        ResourceKind::PolicyAttachment,
        ResourceKind::AccessKey,
        ResourceKind::Bucket,
        ResourceKind::BucketPolicy,
        ResourceKind::BucketCors,
        ResourceKind::Queue,
        ResourceKind::Table,
        ResourceKind::Function,
        ResourceKind::FunctionPermission,
        ResourceKind::EventSourceMapping,
        ResourceKind::Api,
        ResourceKind::Environment,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Policy => "policy",
            Self::User => "user",
            Self::Role => "role",
            Self::PolicyAttachment => "policy_attachment",
            Self::AccessKey => "access_key",
            Self::Bucket => "bucket",
            Self::BucketPolicy => "bucket_policy",
            Self::BucketCors => "bucket_cors",
            Self::Queue => "queue",
            Self::Table => "table",
            Self::Function => "function",
            Self::FunctionPermission => "function_permission",
            Self::EventSourceMapping => "event_source_mapping",
            Self::Api => "api",
            Self::Environment => "environment",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyDescriptor {
    pub policy_name: String,
    pub policy_id: String,
    pub arn: String,
    pub path: String,
    pub default_version_id: Option<String>,
    pub create_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDescriptor {
    pub user_name: String,
    pub user_id: String,
    pub arn: String,
    pub path: String,
    pub create_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleDescriptor {
    pub role_name: String,
    pub role_id: String,
    pub arn: String,
    pub path: String,
    pub create_date: Option<String>,
}

/// Remote view of an access key. The provider never returns the secret again
/// after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessKeySummary {
    pub user_name: String,
    pub access_key_id: String,
    pub status: Option<String>,
    pub create_date: Option<String>,
}

/// Access key together with its secret, as returned by the create call.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessKeyRecord {
    pub user_name: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub status: Option<String>,
    pub create_date: Option<String>,
}

impl fmt::Debug for AccessKeyRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessKeyRecord")
            .field("user_name", &self.user_name)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("status", &self.status)
            .field("create_date", &self.create_date)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketDescriptor {
    pub name: String,
    pub region: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorsRule {
    pub allowed_headers: Vec<String>,
    pub allowed_methods: Vec<String>,
    pub allowed_origins: Vec<String>,
    pub expose_headers: Vec<String>,
    pub max_age_seconds: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueDescriptor {
    pub name: String,
    pub url: String,
    pub arn: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDescriptor {
    pub name: String,
    pub arn: String,
    pub create_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionDescriptor {
    pub name: String,
    pub arn: String,
    pub role: String,
    pub runtime: Option<String>,
    pub handler: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventSourceMappingDescriptor {
    pub uuid: String,
    pub function_arn: Option<String>,
    pub event_source_arn: String,
    pub batch_size: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiDescriptor {
    pub name: String,
    pub api_id: String,
    pub endpoint: Option<String>,
}

/// Managed policy attached to a user or role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyAttachmentDescriptor {
    pub principal_name: String,
    pub policy_arn: String,
}

/// Resource-based permission on a function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionPermissionDescriptor {
    pub function_name: String,
    pub statement_id: String,
    pub principal: String,
    pub source_arn: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PermissionDecision {
    Allow,
    Deny,
}

/// Outcome of simulating one required action against the caller's policies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionCheckResult {
    pub action_name: String,
    pub decision: PermissionDecision,
}

impl PermissionCheckResult {
    pub fn is_denied(&self) -> bool {
        self.decision == PermissionDecision::Deny
    }
}

/// DynamoDB table to create with on-demand billing and string keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSpec {
    pub name: String,
    pub partition_key: String,
    pub sort_key: Option<String>,
}

/// Lambda function to create from a zip package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionSpec {
    pub name: String,
    pub runtime: String,
    pub handler: String,
    pub role_arn: String,
    pub timeout_seconds: i32,
    pub memory_mb: i32,
    pub environment: BTreeMap<String, String>,
}

/// HTTP API quick-created in front of a Lambda function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiSpec {
    pub name: String,
    pub target_arn: String,
    pub allowed_origins: Vec<String>,
}

/// Decision taken for one resource during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Created remotely and persisted locally.
    Created,
    /// Found remotely; the local entry already matched.
    ReusedRemote,
    /// Kept because the local store holds what the provider cannot return.
    ReusedLocal,
    /// Found remotely; the local entry was absent or stale and was replaced.
    Refreshed,
    /// Deleted remotely because its secret is unrecoverable.
    Repaired,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Created => "created",
            Self::ReusedRemote => "reused",
            Self::ReusedLocal => "kept",
            Self::Refreshed => "refreshed",
            Self::Repaired => "repaired",
        };
        f.pad(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepOutcome {
    pub kind: ResourceKind,
    pub name: String,
    pub action: Action,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Identifiers the published task needs at runtime. Replaced whole on every
/// run.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskEnvironment {
    pub task_name: String,
    pub batch_name: String,
    pub region: String,
    pub account_id: String,
    pub private_bucket: String,
    pub deploy_bucket: String,
    pub queue_url: String,
    pub api_endpoint: Option<String>,
    pub tables: BTreeMap<String, String>,
    pub logger_function: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub admin_user: String,
    pub admin_password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_info_token: Option<String>,
}

impl fmt::Debug for TaskEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskEnvironment")
            .field("task_name", &self.task_name)
            .field("batch_name", &self.batch_name)
            .field("region", &self.region)
            .field("account_id", &self.account_id)
            .field("private_bucket", &self.private_bucket)
            .field("deploy_bucket", &self.deploy_bucket)
            .field("queue_url", &self.queue_url)
            .field("api_endpoint", &self.api_endpoint)
            .field("tables", &self.tables)
            .field("logger_function", &self.logger_function)
            .field("access_key_id", &self.access_key_id)
            .field("admin_user", &self.admin_user)
            .finish_non_exhaustive()
    }
}

/// Summary of a completed run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionReport {
    pub account_id: String,
    pub caller_arn: String,
    pub outcomes: Vec<StepOutcome>,
    pub active_access_key_id: String,
    pub environment_file: PathBuf,
    pub started_at: DateTime<Utc>,
}

impl ProvisionReport {
    pub fn count(&self, action: Action) -> usize {
        self.outcomes.iter().filter(|o| o.action == action).count()
    }

    pub fn outcomes_for(&self, kind: ResourceKind) -> impl Iterator<Item = &StepOutcome> {
        self.outcomes.iter().filter(move |o| o.kind == kind)
    }
}
