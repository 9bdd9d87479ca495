//! In-memory [`CloudProvider`](crate::aws::CloudProvider) for tests.
//!
//! Mirrors the AWS behaviors the prober relies on: the same error codes for
//! duplicates and missing resources, the two-key limit on IAM users, and the
//! public-access block on new buckets. Identifiers are derived from a
//! counter, so two providers driven through the same calls end in the same
//! state.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use chrono::DateTime;
use tokio::sync::Mutex;

use crate::aws::{
    classify_code, FunctionApi, HttpApi, IamApi, IdentityApi, ProviderError, ProviderResult,
    QueueApi, StorageApi, TableApi,
};
use crate::documents::PolicyDocument;
use crate::types::{
    AccessKeyRecord, AccessKeySummary, ApiDescriptor, ApiSpec, BucketDescriptor, CallerIdentity,
    CorsRule, EventSourceMappingDescriptor, FunctionDescriptor, FunctionSpec,
    PermissionCheckResult, PermissionDecision, PolicyDescriptor, RoleDescriptor, TableDescriptor,
    TableSpec, UserDescriptor,
};

pub const ACCOUNT_ID: &str = "123456789012";
pub const REGION: &str = "eu-west-1";

const MAX_ACCESS_KEYS: usize = 2;

fn fail(operation: &str, code: &str, message: impl Into<String>) -> ProviderError {
    ProviderError::new(classify_code(Some(code)), operation, message).with_code(code)
}

/// Remote state held by the provider, comparable across runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resources {
    policies: BTreeMap<String, (PolicyDescriptor, String)>,
    users: BTreeMap<String, UserDescriptor>,
    roles: BTreeMap<String, (RoleDescriptor, String)>,
    user_attachments: BTreeMap<String, BTreeSet<String>>,
    role_attachments: BTreeMap<String, BTreeSet<String>>,
    access_keys: BTreeMap<String, Vec<AccessKeyRecord>>,
    buckets: BTreeMap<String, BucketDescriptor>,
    public_policies_allowed: BTreeSet<String>,
    bucket_policies: BTreeMap<String, String>,
    bucket_cors: BTreeMap<String, Vec<CorsRule>>,
    queues: BTreeMap<String, (String, BTreeMap<String, String>)>,
    tables: BTreeMap<String, TableDescriptor>,
    functions: BTreeMap<String, FunctionDescriptor>,
    permissions: BTreeMap<String, BTreeMap<String, String>>,
    mappings: Vec<EventSourceMappingDescriptor>,
    apis: Vec<ApiDescriptor>,
}

#[derive(Debug)]
struct State {
    counter: u64,
    caller_arn: String,
    denied_actions: BTreeSet<String>,
    simulation_denied: bool,
    foreign_buckets: BTreeSet<String>,
    resources: Resources,
    requests: Vec<String>,
    mutations: Vec<String>,
}

impl State {
    fn next_id(&mut self) -> u64 {
        self.counter += 1;
        self.counter
    }

    fn timestamp(&self) -> Option<String> {
        let offset = i64::try_from(self.counter).unwrap_or_default();
        DateTime::from_timestamp(1_700_000_000 + offset, 0).map(|d| d.to_rfc3339())
    }

    fn request(&mut self, operation: &str, target: &str) {
        self.requests.push(format!("{operation} {target}"));
    }

    fn mutated(&mut self, operation: &str, target: &str) {
        self.mutations.push(format!("{operation} {target}"));
    }
}

#[derive(Debug)]
pub struct InMemoryProvider {
    state: Mutex<State>,
}

impl Default for InMemoryProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryProvider {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                counter: 0,
                caller_arn: format!("arn:aws:iam::{ACCOUNT_ID}:user/admin"),
                denied_actions: BTreeSet::new(),
                simulation_denied: false,
                foreign_buckets: BTreeSet::new(),
                resources: Resources::default(),
                requests: Vec::new(),
                mutations: Vec::new(),
            }),
        }
    }

    #[must_use]
    pub fn with_caller_arn(mut self, arn: &str) -> Self {
        self.state.get_mut().caller_arn = arn.to_string();
        self
    }

    /// The policy simulator reports `action` as denied.
    #[must_use]
    pub fn deny_action(mut self, action: &str) -> Self {
        self.state.get_mut().denied_actions.insert(action.to_string());
        self
    }

    /// The caller may not call the policy simulator at all.
    #[must_use]
    pub fn deny_simulation(mut self) -> Self {
        self.state.get_mut().simulation_denied = true;
        self
    }

    /// A bucket name taken by another account.
    #[must_use]
    pub fn with_foreign_bucket(mut self, name: &str) -> Self {
        self.state.get_mut().foreign_buckets.insert(name.to_string());
        self
    }

    /// Create an access key without recording it as a mutation. Returns the
    /// key with its secret.
    pub async fn seed_access_key(&self, user_name: &str) -> AccessKeyRecord {
        let mut state = self.state.lock().await;
        let n = state.next_id();
        let record = AccessKeyRecord {
            user_name: user_name.to_string(),
            access_key_id: format!("AKIASEED{n:012}"),
            secret_access_key: format!("seed-secret-{n}"),
            status: Some("Active".to_string()),
            create_date: state.timestamp(),
        };
        state
            .resources
            .access_keys
            .entry(user_name.to_string())
            .or_default()
            .push(record.clone());
        record
    }

    /// Mark an access key inactive without recording a mutation.
    pub async fn deactivate_access_key(&self, user_name: &str, access_key_id: &str) {
        let mut state = self.state.lock().await;
        if let Some(key) = state
            .resources
            .access_keys
            .get_mut(user_name)
            .and_then(|keys| keys.iter_mut().find(|k| k.access_key_id == access_key_id))
        {
            key.status = Some("Inactive".to_string());
        }
    }

    /// Put a bucket policy directly, bypassing the public-access block.
    pub async fn seed_bucket_policy(&self, bucket: &str, policy: &str) {
        let mut state = self.state.lock().await;
        state
            .resources
            .bucket_policies
            .insert(bucket.to_string(), policy.to_string());
    }

    pub async fn bucket_policy(&self, bucket: &str) -> Option<String> {
        self.state
            .lock()
            .await
            .resources
            .bucket_policies
            .get(bucket)
            .cloned()
    }

    pub async fn access_key_ids(&self, user_name: &str) -> Vec<String> {
        self.state
            .lock()
            .await
            .resources
            .access_keys
            .get(user_name)
            .map(|keys| keys.iter().map(|k| k.access_key_id.clone()).collect())
            .unwrap_or_default()
    }

    /// Every request, including reads and rejected calls, as
    /// `"<Operation> <target>"`.
    pub async fn requests(&self) -> Vec<String> {
        self.state.lock().await.requests.clone()
    }

    /// Calls that changed remote state, as `"<Operation> <target>"`.
    pub async fn mutations(&self) -> Vec<String> {
        self.state.lock().await.mutations.clone()
    }

    /// Mutations that created a resource.
    pub async fn creations(&self) -> Vec<String> {
        self.mutations()
            .await
            .into_iter()
            .filter(|m| m.starts_with("Create"))
            .collect()
    }

    pub async fn clear_log(&self) {
        let mut state = self.state.lock().await;
        state.requests.clear();
        state.mutations.clear();
    }

    pub async fn snapshot(&self) -> Resources {
        self.state.lock().await.resources.clone()
    }

    pub fn sample_function(name: &str) -> FunctionSpec {
        FunctionSpec {
            name: name.to_string(),
            runtime: "python3.12".to_string(),
            handler: "logger.handler".to_string(),
            role_arn: format!("arn:aws:iam::{ACCOUNT_ID}:role/{name}-role"),
            timeout_seconds: 30,
            memory_mb: 128,
            environment: BTreeMap::new(),
        }
    }
}

#[async_trait]
impl IdentityApi for InMemoryProvider {
    async fn caller_identity(&self) -> ProviderResult<CallerIdentity> {
        let mut state = self.state.lock().await;
        state.request("GetCallerIdentity", "");
        Ok(CallerIdentity {
            account: ACCOUNT_ID.to_string(),
            arn: state.caller_arn.clone(),
            user_id: "AIDAADMIN".to_string(),
        })
    }

    async fn simulate_principal_policy(
        &self,
        principal_arn: &str,
        actions: &[String],
    ) -> ProviderResult<Vec<PermissionCheckResult>> {
        let mut state = self.state.lock().await;
        state.request("SimulatePrincipalPolicy", principal_arn);
        if state.simulation_denied {
            return Err(fail(
                "SimulatePrincipalPolicy",
                "AccessDenied",
                format!("{principal_arn} is not authorized to perform: iam:SimulatePrincipalPolicy"),
            ));
        }
        Ok(actions
            .iter()
            .map(|action| PermissionCheckResult {
                action_name: action.clone(),
                decision: if state.denied_actions.contains(action) {
                    PermissionDecision::Deny
                } else {
                    PermissionDecision::Allow
                },
            })
            .collect())
    }
}

#[async_trait]
impl IamApi for InMemoryProvider {
    async fn list_policies(&self, path_prefix: &str) -> ProviderResult<Vec<PolicyDescriptor>> {
        let mut state = self.state.lock().await;
        state.request("ListPolicies", path_prefix);
        Ok(state
            .resources
            .policies
            .values()
            .filter(|(p, _)| p.path.starts_with(path_prefix))
            .map(|(p, _)| p.clone())
            .collect())
    }

    async fn create_policy(
        &self,
        name: &str,
        path: &str,
        document: &str,
    ) -> ProviderResult<PolicyDescriptor> {
        let mut state = self.state.lock().await;
        state.request("CreatePolicy", name);
        if state.resources.policies.contains_key(name) {
            return Err(fail(
                "CreatePolicy",
                "EntityAlreadyExists",
                format!("A policy called {name} already exists"),
            ));
        }
        serde_json::from_str::<PolicyDocument>(document).map_err(|e| {
            fail("CreatePolicy", "MalformedPolicyDocument", e.to_string())
        })?;
        let n = state.next_id();
        let policy = PolicyDescriptor {
            policy_name: name.to_string(),
            policy_id: format!("ANPA{n:012}"),
            arn: format!("arn:aws:iam::{ACCOUNT_ID}:policy{path}{name}"),
            path: path.to_string(),
            default_version_id: Some("v1".to_string()),
            create_date: state.timestamp(),
        };
        state
            .resources
            .policies
            .insert(name.to_string(), (policy.clone(), document.to_string()));
        state.mutated("CreatePolicy", name);
        Ok(policy)
    }

    async fn list_users(&self, path_prefix: &str) -> ProviderResult<Vec<UserDescriptor>> {
        let mut state = self.state.lock().await;
        state.request("ListUsers", path_prefix);
        Ok(state
            .resources
            .users
            .values()
            .filter(|u| u.path.starts_with(path_prefix))
            .cloned()
            .collect())
    }

    async fn create_user(&self, name: &str, path: &str) -> ProviderResult<UserDescriptor> {
        let mut state = self.state.lock().await;
        state.request("CreateUser", name);
        if state.resources.users.contains_key(name) {
            return Err(fail(
                "CreateUser",
                "EntityAlreadyExists",
                format!("User with name {name} already exists."),
            ));
        }
        let n = state.next_id();
        let user = UserDescriptor {
            user_name: name.to_string(),
            user_id: format!("AIDA{n:012}"),
            arn: format!("arn:aws:iam::{ACCOUNT_ID}:user{path}{name}"),
            path: path.to_string(),
            create_date: state.timestamp(),
        };
        state.resources.users.insert(name.to_string(), user.clone());
        state.mutated("CreateUser", name);
        Ok(user)
    }

    async fn list_roles(&self, path_prefix: &str) -> ProviderResult<Vec<RoleDescriptor>> {
        let mut state = self.state.lock().await;
        state.request("ListRoles", path_prefix);
        Ok(state
            .resources
            .roles
            .values()
            .filter(|(r, _)| r.path.starts_with(path_prefix))
            .map(|(r, _)| r.clone())
            .collect())
    }

    async fn create_role(
        &self,
        name: &str,
        path: &str,
        trust_document: &str,
    ) -> ProviderResult<RoleDescriptor> {
        let mut state = self.state.lock().await;
        state.request("CreateRole", name);
        if state.resources.roles.contains_key(name) {
            return Err(fail(
                "CreateRole",
                "EntityAlreadyExists",
                format!("Role with name {name} already exists."),
            ));
        }
        let n = state.next_id();
        let role = RoleDescriptor {
            role_name: name.to_string(),
            role_id: format!("AROA{n:012}"),
            arn: format!("arn:aws:iam::{ACCOUNT_ID}:role{path}{name}"),
            path: path.to_string(),
            create_date: state.timestamp(),
        };
        state
            .resources
            .roles
            .insert(name.to_string(), (role.clone(), trust_document.to_string()));
        state.mutated("CreateRole", name);
        Ok(role)
    }

    async fn list_attached_user_policies(&self, user_name: &str) -> ProviderResult<Vec<String>> {
        let mut state = self.state.lock().await;
        state.request("ListAttachedUserPolicies", user_name);
        if !state.resources.users.contains_key(user_name) {
            return Err(fail(
                "ListAttachedUserPolicies",
                "NoSuchEntity",
                format!("The user with name {user_name} cannot be found."),
            ));
        }
        Ok(state
            .resources
            .user_attachments
            .get(user_name)
            .map(|arns| arns.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn attach_user_policy(&self, user_name: &str, policy_arn: &str) -> ProviderResult<()> {
        let mut state = self.state.lock().await;
        state.request("AttachUserPolicy", user_name);
        if !state.resources.users.contains_key(user_name) {
            return Err(fail(
                "AttachUserPolicy",
                "NoSuchEntity",
                format!("The user with name {user_name} cannot be found."),
            ));
        }
        state
            .resources
            .user_attachments
            .entry(user_name.to_string())
            .or_default()
            .insert(policy_arn.to_string());
        state.mutated("AttachUserPolicy", user_name);
        Ok(())
    }

    async fn list_attached_role_policies(&self, role_name: &str) -> ProviderResult<Vec<String>> {
        let mut state = self.state.lock().await;
        state.request("ListAttachedRolePolicies", role_name);
        if !state.resources.roles.contains_key(role_name) {
            return Err(fail(
                "ListAttachedRolePolicies",
                "NoSuchEntity",
                format!("The role with name {role_name} cannot be found."),
            ));
        }
        Ok(state
            .resources
            .role_attachments
            .get(role_name)
            .map(|arns| arns.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn attach_role_policy(&self, role_name: &str, policy_arn: &str) -> ProviderResult<()> {
        let mut state = self.state.lock().await;
        state.request("AttachRolePolicy", role_name);
        if !state.resources.roles.contains_key(role_name) {
            return Err(fail(
                "AttachRolePolicy",
                "NoSuchEntity",
                format!("The role with name {role_name} cannot be found."),
            ));
        }
        state
            .resources
            .role_attachments
            .entry(role_name.to_string())
            .or_default()
            .insert(policy_arn.to_string());
        state.mutated("AttachRolePolicy", role_name);
        Ok(())
    }

    async fn list_access_keys(&self, user_name: &str) -> ProviderResult<Vec<AccessKeySummary>> {
        let mut state = self.state.lock().await;
        state.request("ListAccessKeys", user_name);
        Ok(state
            .resources
            .access_keys
            .get(user_name)
            .map(|keys| {
                keys.iter()
                    .map(|k| AccessKeySummary {
                        user_name: k.user_name.clone(),
                        access_key_id: k.access_key_id.clone(),
                        status: k.status.clone(),
                        create_date: k.create_date.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn create_access_key(&self, user_name: &str) -> ProviderResult<AccessKeyRecord> {
        let mut state = self.state.lock().await;
        state.request("CreateAccessKey", user_name);
        let existing = state
            .resources
            .access_keys
            .get(user_name)
            .map_or(0, Vec::len);
        if existing >= MAX_ACCESS_KEYS {
            return Err(fail(
                "CreateAccessKey",
                "LimitExceeded",
                format!("Cannot exceed quota for AccessKeysPerUser: {MAX_ACCESS_KEYS}"),
            ));
        }
        let n = state.next_id();
        let record = AccessKeyRecord {
            user_name: user_name.to_string(),
            access_key_id: format!("AKIATEST{n:012}"),
            secret_access_key: format!("secret-{n}"),
            status: Some("Active".to_string()),
            create_date: state.timestamp(),
        };
        state
            .resources
            .access_keys
            .entry(user_name.to_string())
            .or_default()
            .push(record.clone());
        state.mutated("CreateAccessKey", user_name);
        Ok(record)
    }

    async fn delete_access_key(&self, user_name: &str, access_key_id: &str) -> ProviderResult<()> {
        let mut state = self.state.lock().await;
        state.request("DeleteAccessKey", access_key_id);
        let keys = state
            .resources
            .access_keys
            .entry(user_name.to_string())
            .or_default();
        let before = keys.len();
        keys.retain(|k| k.access_key_id != access_key_id);
        if keys.len() == before {
            return Err(fail(
                "DeleteAccessKey",
                "NoSuchEntity",
                format!("The Access Key with id {access_key_id} cannot be found."),
            ));
        }
        state.mutated("DeleteAccessKey", access_key_id);
        Ok(())
    }
}

#[async_trait]
impl StorageApi for InMemoryProvider {
    async fn create_bucket(&self, name: &str, region: &str) -> ProviderResult<BucketDescriptor> {
        let mut state = self.state.lock().await;
        state.request("CreateBucket", name);
        if state.foreign_buckets.contains(name) {
            return Err(fail(
                "CreateBucket",
                "BucketAlreadyExists",
                "The requested bucket name is not available.",
            ));
        }
        if state.resources.buckets.contains_key(name) {
            return Err(fail(
                "CreateBucket",
                "BucketAlreadyOwnedByYou",
                "Your previous request to create the named bucket succeeded and you already own it.",
            ));
        }
        let bucket = BucketDescriptor {
            name: name.to_string(),
            region: region.to_string(),
        };
        state
            .resources
            .buckets
            .insert(name.to_string(), bucket.clone());
        state.mutated("CreateBucket", name);
        Ok(bucket)
    }

    async fn bucket_location(&self, name: &str) -> ProviderResult<BucketDescriptor> {
        let mut state = self.state.lock().await;
        state.request("GetBucketLocation", name);
        state
            .resources
            .buckets
            .get(name)
            .cloned()
            .ok_or_else(|| fail("GetBucketLocation", "NoSuchBucket", "The specified bucket does not exist"))
    }

    async fn get_bucket_policy(&self, bucket: &str) -> ProviderResult<String> {
        let mut state = self.state.lock().await;
        state.request("GetBucketPolicy", bucket);
        if !state.resources.buckets.contains_key(bucket) {
            return Err(fail(
                "GetBucketPolicy",
                "NoSuchBucket",
                "The specified bucket does not exist",
            ));
        }
        state
            .resources
            .bucket_policies
            .get(bucket)
            .cloned()
            .ok_or_else(|| {
                fail(
                    "GetBucketPolicy",
                    "NoSuchBucketPolicy",
                    "The bucket policy does not exist",
                )
            })
    }

    async fn put_bucket_policy(&self, bucket: &str, policy: &str) -> ProviderResult<()> {
        let mut state = self.state.lock().await;
        state.request("PutBucketPolicy", bucket);
        if !state.resources.buckets.contains_key(bucket) {
            return Err(fail(
                "PutBucketPolicy",
                "NoSuchBucket",
                "The specified bucket does not exist",
            ));
        }
        let document: PolicyDocument = serde_json::from_str(policy)
            .map_err(|e| fail("PutBucketPolicy", "MalformedPolicy", e.to_string()))?;
        if document.grants_public_access() && !state.resources.public_policies_allowed.contains(bucket)
        {
            return Err(fail(
                "PutBucketPolicy",
                "AccessDenied",
                "public policies are blocked by the BlockPublicPolicy block public access setting",
            ));
        }
        state
            .resources
            .bucket_policies
            .insert(bucket.to_string(), policy.to_string());
        state.mutated("PutBucketPolicy", bucket);
        Ok(())
    }

    async fn allow_public_policies(&self, bucket: &str) -> ProviderResult<()> {
        let mut state = self.state.lock().await;
        state.request("PutPublicAccessBlock", bucket);
        if !state.resources.buckets.contains_key(bucket) {
            return Err(fail(
                "PutPublicAccessBlock",
                "NoSuchBucket",
                "The specified bucket does not exist",
            ));
        }
        state
            .resources
            .public_policies_allowed
            .insert(bucket.to_string());
        state.mutated("PutPublicAccessBlock", bucket);
        Ok(())
    }

    async fn get_bucket_cors(&self, bucket: &str) -> ProviderResult<Vec<CorsRule>> {
        let mut state = self.state.lock().await;
        state.request("GetBucketCors", bucket);
        if !state.resources.buckets.contains_key(bucket) {
            return Err(fail(
                "GetBucketCors",
                "NoSuchBucket",
                "The specified bucket does not exist",
            ));
        }
        state.resources.bucket_cors.get(bucket).cloned().ok_or_else(|| {
            fail(
                "GetBucketCors",
                "NoSuchCORSConfiguration",
                "The CORS configuration does not exist",
            )
        })
    }

    async fn put_bucket_cors(&self, bucket: &str, rules: &[CorsRule]) -> ProviderResult<()> {
        let mut state = self.state.lock().await;
        state.request("PutBucketCors", bucket);
        if !state.resources.buckets.contains_key(bucket) {
            return Err(fail(
                "PutBucketCors",
                "NoSuchBucket",
                "The specified bucket does not exist",
            ));
        }
        state
            .resources
            .bucket_cors
            .insert(bucket.to_string(), rules.to_vec());
        state.mutated("PutBucketCors", bucket);
        Ok(())
    }
}

#[async_trait]
impl QueueApi for InMemoryProvider {
    async fn list_queues(&self, prefix: &str) -> ProviderResult<Vec<String>> {
        let mut state = self.state.lock().await;
        state.request("ListQueues", prefix);
        Ok(state
            .resources
            .queues
            .iter()
            .filter(|(name, _)| name.starts_with(prefix))
            .map(|(_, (url, _))| url.clone())
            .collect())
    }

    async fn create_queue(
        &self,
        name: &str,
        attributes: &BTreeMap<String, String>,
    ) -> ProviderResult<String> {
        let mut state = self.state.lock().await;
        state.request("CreateQueue", name);
        // SQS returns the existing URL when the attributes match.
        if let Some((url, existing)) = state.resources.queues.get(name) {
            if existing == attributes {
                return Ok(url.clone());
            }
            return Err(fail(
                "CreateQueue",
                "QueueAlreadyExists",
                format!("A queue already exists with the same name and a different value for attribute(s) of {name}"),
            ));
        }
        let url = format!("https://sqs.{REGION}.amazonaws.com/{ACCOUNT_ID}/{name}");
        state
            .resources
            .queues
            .insert(name.to_string(), (url.clone(), attributes.clone()));
        state.mutated("CreateQueue", name);
        Ok(url)
    }

    async fn queue_arn(&self, queue_url: &str) -> ProviderResult<String> {
        let mut state = self.state.lock().await;
        state.request("GetQueueAttributes", queue_url);
        state
            .resources
            .queues
            .iter()
            .find(|(_, (url, _))| url == queue_url)
            .map(|(name, _)| format!("arn:aws:sqs:{REGION}:{ACCOUNT_ID}:{name}"))
            .ok_or_else(|| {
                fail(
                    "GetQueueAttributes",
                    "AWS.SimpleQueueService.NonExistentQueue",
                    "The specified queue does not exist.",
                )
            })
    }
}

#[async_trait]
impl TableApi for InMemoryProvider {
    async fn create_table(&self, spec: &TableSpec) -> ProviderResult<TableDescriptor> {
        let mut state = self.state.lock().await;
        state.request("CreateTable", &spec.name);
        if state.resources.tables.contains_key(&spec.name) {
            return Err(fail(
                "CreateTable",
                "ResourceInUseException",
                format!("Table already exists: {}", spec.name),
            ));
        }
        state.next_id();
        let table = TableDescriptor {
            name: spec.name.clone(),
            arn: format!("arn:aws:dynamodb:{REGION}:{ACCOUNT_ID}:table/{}", spec.name),
            create_date: state.timestamp(),
        };
        state
            .resources
            .tables
            .insert(spec.name.clone(), table.clone());
        state.mutated("CreateTable", &spec.name);
        Ok(table)
    }

    async fn describe_table(&self, name: &str) -> ProviderResult<TableDescriptor> {
        let mut state = self.state.lock().await;
        state.request("DescribeTable", name);
        state.resources.tables.get(name).cloned().ok_or_else(|| {
            fail(
                "DescribeTable",
                "ResourceNotFoundException",
                format!("Requested resource not found: Table: {name} not found"),
            )
        })
    }
}

#[async_trait]
impl FunctionApi for InMemoryProvider {
    async fn create_function(
        &self,
        spec: &FunctionSpec,
        package: Vec<u8>,
    ) -> ProviderResult<FunctionDescriptor> {
        let mut state = self.state.lock().await;
        state.request("CreateFunction", &spec.name);
        if state.resources.functions.contains_key(&spec.name) {
            return Err(fail(
                "CreateFunction",
                "ResourceConflictException",
                format!("Function already exist: {}", spec.name),
            ));
        }
        if package.is_empty() {
            return Err(fail(
                "CreateFunction",
                "InvalidParameterValueException",
                "Could not unzip uploaded file.",
            ));
        }
        let function = FunctionDescriptor {
            name: spec.name.clone(),
            arn: format!("arn:aws:lambda:{REGION}:{ACCOUNT_ID}:function:{}", spec.name),
            role: spec.role_arn.clone(),
            runtime: Some(spec.runtime.clone()),
            handler: Some(spec.handler.clone()),
        };
        state
            .resources
            .functions
            .insert(spec.name.clone(), function.clone());
        state.mutated("CreateFunction", &spec.name);
        Ok(function)
    }

    async fn get_function(&self, name: &str) -> ProviderResult<FunctionDescriptor> {
        let mut state = self.state.lock().await;
        state.request("GetFunction", name);
        state.resources.functions.get(name).cloned().ok_or_else(|| {
            fail(
                "GetFunction",
                "ResourceNotFoundException",
                format!("Function not found: {name}"),
            )
        })
    }

    async fn add_permission(
        &self,
        function_name: &str,
        statement_id: &str,
        principal: &str,
        source_arn: &str,
    ) -> ProviderResult<()> {
        let mut state = self.state.lock().await;
        state.request("AddPermission", function_name);
        if !state.resources.functions.contains_key(function_name) {
            return Err(fail(
                "AddPermission",
                "ResourceNotFoundException",
                format!("Function not found: {function_name}"),
            ));
        }
        let statements = state
            .resources
            .permissions
            .entry(function_name.to_string())
            .or_default();
        if statements.contains_key(statement_id) {
            return Err(fail(
                "AddPermission",
                "ResourceConflictException",
                format!("The statement id ({statement_id}) provided already exists."),
            ));
        }
        statements.insert(statement_id.to_string(), format!("{principal} {source_arn}"));
        state.mutated("AddPermission", function_name);
        Ok(())
    }

    async fn list_event_source_mappings(
        &self,
        function_name: &str,
        source_arn: &str,
    ) -> ProviderResult<Vec<EventSourceMappingDescriptor>> {
        let mut state = self.state.lock().await;
        state.request("ListEventSourceMappings", function_name);
        let function_arn = state
            .resources
            .functions
            .get(function_name)
            .map(|f| f.arn.clone());
        Ok(state
            .resources
            .mappings
            .iter()
            .filter(|m| m.event_source_arn == source_arn && m.function_arn == function_arn)
            .cloned()
            .collect())
    }

    async fn create_event_source_mapping(
        &self,
        function_name: &str,
        source_arn: &str,
        batch_size: i32,
    ) -> ProviderResult<EventSourceMappingDescriptor> {
        let mut state = self.state.lock().await;
        state.request("CreateEventSourceMapping", function_name);
        let Some(function_arn) = state
            .resources
            .functions
            .get(function_name)
            .map(|f| f.arn.clone())
        else {
            return Err(fail(
                "CreateEventSourceMapping",
                "ResourceNotFoundException",
                format!("Function not found: {function_name}"),
            ));
        };
        if state
            .resources
            .mappings
            .iter()
            .any(|m| m.event_source_arn == source_arn && m.function_arn.as_deref() == Some(function_arn.as_str()))
        {
            return Err(fail(
                "CreateEventSourceMapping",
                "ResourceConflictException",
                "An event source mapping with this function and event source already exists",
            ));
        }
        let n = state.next_id();
        let mapping = EventSourceMappingDescriptor {
            uuid: format!("00000000-0000-4000-8000-{n:012}"),
            function_arn: Some(function_arn),
            event_source_arn: source_arn.to_string(),
            batch_size: Some(batch_size),
        };
        state.resources.mappings.push(mapping.clone());
        state.mutated("CreateEventSourceMapping", function_name);
        Ok(mapping)
    }
}

#[async_trait]
impl HttpApi for InMemoryProvider {
    async fn list_apis(&self) -> ProviderResult<Vec<ApiDescriptor>> {
        let mut state = self.state.lock().await;
        state.request("GetApis", "");
        Ok(state.resources.apis.clone())
    }

    /// API Gateway accepts duplicate names; so does this.
    async fn create_api(&self, spec: &ApiSpec) -> ProviderResult<ApiDescriptor> {
        let mut state = self.state.lock().await;
        state.request("CreateApi", &spec.name);
        let n = state.next_id();
        let api_id = format!("api{n:07}");
        let api = ApiDescriptor {
            name: spec.name.clone(),
            endpoint: Some(format!("https://{api_id}.execute-api.{REGION}.amazonaws.com")),
            api_id,
        };
        state.resources.apis.push(api.clone());
        state.mutated("CreateApi", &spec.name);
        Ok(api)
    }
}
