//! Existence probing by deterministic name.
//!
//! Lookup kinds (policies, users, roles, queues, APIs, event source mappings)
//! are listed and matched by name. Claim kinds (buckets, tables, functions,
//! invoke permissions) are probed by attempting creation: the provider's
//! "already exists" condition means the resource is there. Only the
//! conditions named per probe resolve it; every other provider error
//! propagates unchanged.

use crate::aws::{CloudProvider, ErrorKind, ProviderResult};
use crate::types::{
    ApiDescriptor, BucketDescriptor, CorsRule, EventSourceMappingDescriptor, FunctionDescriptor,
    FunctionSpec, PolicyDescriptor, QueueDescriptor, RoleDescriptor, TableDescriptor, TableSpec,
    UserDescriptor,
};

/// Outcome of a lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe<T> {
    Found(T),
    NotFound,
}

impl<T> From<Option<T>> for Probe<T> {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::NotFound, Self::Found)
    }
}

/// Outcome of a claim-by-creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Claim<T> {
    /// This call created the resource.
    Created(T),
    /// The resource already existed; the descriptor was fetched afterwards.
    Existing(T),
}

/// `Ok(None)` when the call failed with `condition`.
fn resolve<T>(result: ProviderResult<T>, condition: ErrorKind) -> ProviderResult<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(err) if err.is(condition) => {
            log::debug!("{} resolved as {condition:?}", err.operation);
            Ok(None)
        }
        Err(err) => Err(err),
    }
}

/// `Ok(None)` when the call failed with exactly `code`.
fn resolve_code<T>(result: ProviderResult<T>, code: &str) -> ProviderResult<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(err) if err.code.as_deref() == Some(code) => {
            log::debug!("{} resolved as {code}", err.operation);
            Ok(None)
        }
        Err(err) => Err(err),
    }
}

pub struct Prober<'a, P: ?Sized> {
    provider: &'a P,
    iam_path: String,
}

impl<'a, P: CloudProvider + ?Sized> Prober<'a, P> {
    pub fn new(provider: &'a P, iam_path: impl Into<String>) -> Self {
        Self {
            provider,
            iam_path: iam_path.into(),
        }
    }

    pub async fn policy(&self, name: &str) -> ProviderResult<Probe<PolicyDescriptor>> {
        let policies = self.provider.list_policies(&self.iam_path).await?;
        Ok(policies.into_iter().find(|p| p.policy_name == name).into())
    }

    pub async fn user(&self, name: &str) -> ProviderResult<Probe<UserDescriptor>> {
        let users = self.provider.list_users(&self.iam_path).await?;
        Ok(users.into_iter().find(|u| u.user_name == name).into())
    }

    pub async fn role(&self, name: &str) -> ProviderResult<Probe<RoleDescriptor>> {
        let roles = self.provider.list_roles(&self.iam_path).await?;
        Ok(roles.into_iter().find(|r| r.role_name == name).into())
    }

    /// Queue names are matched exactly; the prefix listing also returns
    /// queues whose name merely starts with `name`.
    pub async fn queue(&self, name: &str) -> ProviderResult<Probe<QueueDescriptor>> {
        let urls = self.provider.list_queues(name).await?;
        let Some(url) = urls
            .into_iter()
            .find(|url| url.rsplit('/').next() == Some(name))
        else {
            return Ok(Probe::NotFound);
        };
        let arn = self.provider.queue_arn(&url).await?;
        Ok(Probe::Found(QueueDescriptor {
            name: name.to_string(),
            url,
            arn,
        }))
    }

    pub async fn api(&self, name: &str) -> ProviderResult<Probe<ApiDescriptor>> {
        let apis = self.provider.list_apis().await?;
        Ok(apis.into_iter().find(|a| a.name == name).into())
    }

    pub async fn event_source_mapping(
        &self,
        function_name: &str,
        source_arn: &str,
    ) -> ProviderResult<Probe<EventSourceMappingDescriptor>> {
        let mappings = self
            .provider
            .list_event_source_mappings(function_name, source_arn)
            .await?;
        Ok(mappings
            .into_iter()
            .find(|m| m.event_source_arn == source_arn)
            .into())
    }

    /// `BucketAlreadyOwnedByYou` means found. A bucket owned by another
    /// account is a hard error.
    pub async fn claim_bucket(
        &self,
        name: &str,
        region: &str,
    ) -> ProviderResult<Claim<BucketDescriptor>> {
        let created = resolve(
            self.provider.create_bucket(name, region).await,
            ErrorKind::AlreadyExists,
        )?;
        match created {
            Some(bucket) => Ok(Claim::Created(bucket)),
            None => Ok(Claim::Existing(self.provider.bucket_location(name).await?)),
        }
    }

    pub async fn claim_table(&self, spec: &TableSpec) -> ProviderResult<Claim<TableDescriptor>> {
        let created = resolve(
            self.provider.create_table(spec).await,
            ErrorKind::AlreadyExists,
        )?;
        match created {
            Some(table) => Ok(Claim::Created(table)),
            None => Ok(Claim::Existing(
                self.provider.describe_table(&spec.name).await?,
            )),
        }
    }

    pub async fn claim_function(
        &self,
        spec: &FunctionSpec,
        package: Vec<u8>,
    ) -> ProviderResult<Claim<FunctionDescriptor>> {
        let created = resolve(
            self.provider.create_function(spec, package).await,
            ErrorKind::AlreadyExists,
        )?;
        match created {
            Some(function) => Ok(Claim::Created(function)),
            None => Ok(Claim::Existing(
                self.provider.get_function(&spec.name).await?,
            )),
        }
    }

    /// Grant API Gateway permission to invoke `function_name`. A statement
    /// with the same id already on the function policy means present.
    pub async fn claim_invoke_permission(
        &self,
        function_name: &str,
        statement_id: &str,
        source_arn: &str,
    ) -> ProviderResult<Claim<()>> {
        let added = resolve(
            self.provider
                .add_permission(
                    function_name,
                    statement_id,
                    "apigateway.amazonaws.com",
                    source_arn,
                )
                .await,
            ErrorKind::AlreadyExists,
        )?;
        Ok(if added.is_some() {
            Claim::Created(())
        } else {
            Claim::Existing(())
        })
    }

    /// Bucket policy as stored; `NoSuchBucketPolicy` means none.
    pub async fn bucket_policy(&self, bucket: &str) -> ProviderResult<Probe<String>> {
        let policy = resolve_code(
            self.provider.get_bucket_policy(bucket).await,
            "NoSuchBucketPolicy",
        )?;
        Ok(policy.into())
    }

    /// CORS rules as stored; `NoSuchCORSConfiguration` means none.
    pub async fn bucket_cors(&self, bucket: &str) -> ProviderResult<Probe<Vec<CorsRule>>> {
        let rules = resolve_code(
            self.provider.get_bucket_cors(bucket).await,
            "NoSuchCORSConfiguration",
        )?;
        Ok(rules.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aws::{FunctionApi, IamApi, ProviderError, QueueApi, StorageApi};
    use crate::documents::{deploy_bucket_policy, lambda_trust_policy};
    use crate::testing::InMemoryProvider;
    use std::collections::BTreeMap;

    #[test]
    fn test_resolve_only_swallows_named_condition() {
        let not_found = ProviderError::new(ErrorKind::NotFound, "GetBucketPolicy", "none");
        assert_eq!(
            resolve::<()>(Err(not_found.clone()), ErrorKind::NotFound).unwrap(),
            None
        );
        assert!(resolve::<()>(Err(not_found), ErrorKind::AlreadyExists).is_err());

        let throttled = ProviderError::new(ErrorKind::Other, "CreateBucket", "slow down");
        assert!(resolve::<()>(Err(throttled), ErrorKind::AlreadyExists).is_err());
    }

    #[tokio::test]
    async fn test_policy_lookup_matches_exact_name_under_path() {
        let provider = InMemoryProvider::new();
        let document = lambda_trust_policy().to_json().unwrap();
        provider
            .create_policy("crowd-task-a-policy", "/crowd-task/", &document)
            .await
            .unwrap();
        let prober = Prober::new(&provider, "/crowd-task/");

        assert!(matches!(
            prober.policy("crowd-task-a-policy").await.unwrap(),
            Probe::Found(p) if p.path == "/crowd-task/"
        ));
        assert_eq!(
            prober.policy("crowd-task-a").await.unwrap(),
            Probe::NotFound
        );
    }

    #[tokio::test]
    async fn test_queue_lookup_ignores_prefix_matches() {
        let provider = InMemoryProvider::new();
        provider
            .create_queue("crowd-task-logger-old", &BTreeMap::new())
            .await
            .unwrap();
        let prober = Prober::new(&provider, "/crowd-task/");
        assert_eq!(
            prober.queue("crowd-task-logger").await.unwrap(),
            Probe::NotFound
        );

        provider
            .create_queue("crowd-task-logger", &BTreeMap::new())
            .await
            .unwrap();
        let Probe::Found(queue) = prober.queue("crowd-task-logger").await.unwrap() else {
            panic!("queue should be found");
        };
        assert!(queue.url.ends_with("/crowd-task-logger"));
        assert!(queue.arn.ends_with(":crowd-task-logger"));
    }

    #[tokio::test]
    async fn test_claim_bucket_twice() {
        let provider = InMemoryProvider::new();
        let prober = Prober::new(&provider, "/crowd-task/");
        let first = prober.claim_bucket("crowd-data", "eu-west-1").await.unwrap();
        let second = prober.claim_bucket("crowd-data", "eu-west-1").await.unwrap();
        assert!(matches!(first, Claim::Created(_)));
        let Claim::Existing(bucket) = second else {
            panic!("second claim should find the bucket");
        };
        assert_eq!(bucket.region, "eu-west-1");
    }

    #[tokio::test]
    async fn test_claim_bucket_owned_elsewhere_fails() {
        let provider = InMemoryProvider::new().with_foreign_bucket("taken");
        let prober = Prober::new(&provider, "/crowd-task/");
        let err = prober.claim_bucket("taken", "eu-west-1").await.unwrap_err();
        assert_eq!(err.code.as_deref(), Some("BucketAlreadyExists"));
    }

    #[tokio::test]
    async fn test_bucket_policy_probe() {
        let provider = InMemoryProvider::new();
        provider.create_bucket("deploy", "eu-west-1").await.unwrap();
        let prober = Prober::new(&provider, "/crowd-task/");
        assert_eq!(
            prober.bucket_policy("deploy").await.unwrap(),
            Probe::NotFound
        );
        let policy = deploy_bucket_policy("deploy").to_json().unwrap();
        provider.allow_public_policies("deploy").await.unwrap();
        provider.put_bucket_policy("deploy", &policy).await.unwrap();
        assert_eq!(
            prober.bucket_policy("deploy").await.unwrap(),
            Probe::Found(policy)
        );
        // A missing bucket is not a missing policy.
        assert!(prober.bucket_policy("absent").await.is_err());
    }

    #[tokio::test]
    async fn test_claim_invoke_permission_is_idempotent() {
        let provider = InMemoryProvider::new();
        provider
            .create_function(&InMemoryProvider::sample_function("fn"), vec![0x50, 0x4b])
            .await
            .unwrap();
        let prober = Prober::new(&provider, "/crowd-task/");
        let arn = "arn:aws:execute-api:eu-west-1:123456789012:api/*/*";
        assert_eq!(
            prober.claim_invoke_permission("fn", "invoke", arn).await.unwrap(),
            Claim::Created(())
        );
        assert_eq!(
            prober.claim_invoke_permission("fn", "invoke", arn).await.unwrap(),
            Claim::Existing(())
        );
    }
}
