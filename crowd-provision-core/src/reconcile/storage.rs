//! Buckets and their bucket-level configuration.
//!
//! Bucket policies and CORS rules are only written when the bucket has none;
//! a configuration found remotely is adopted as it is.

use serde_json::Value;

use crate::aws::CloudProvider;
use crate::documents::PolicyDocument;
use crate::error::ProvisionResult;
use crate::probe::Probe;
use crate::store::StateKey;
use crate::types::{BucketDescriptor, CorsRule, ResourceKind};

impl<P: CloudProvider + ?Sized> super::Reconciler<'_, P> {
    pub async fn ensure_bucket(
        &mut self,
        name: &str,
        region: &str,
    ) -> ProvisionResult<BucketDescriptor> {
        let claim = self.prober.claim_bucket(name, region).await?;
        self.settle(&StateKey::new(ResourceKind::Bucket, name), claim)
            .await
    }

    pub async fn ensure_bucket_policy(
        &mut self,
        bucket: &str,
        policy: &PolicyDocument,
    ) -> ProvisionResult<()> {
        let key = StateKey::new(ResourceKind::BucketPolicy, bucket);
        match self.prober.bucket_policy(bucket).await? {
            Probe::Found(existing) => {
                // Stored parsed so that formatting differences do not count
                // as drift.
                let existing = serde_json::from_str::<Value>(&existing)
                    .unwrap_or(Value::String(existing));
                if existing != serde_json::to_value(policy)? {
                    log::info!("Bucket {bucket} already has a different policy; leaving it in place");
                }
                self.adopt(&key, &existing).await?;
            }
            Probe::NotFound => {
                if policy.grants_public_access() {
                    log::debug!("Allowing public bucket policies on {bucket}");
                    self.provider.allow_public_policies(bucket).await?;
                }
                self.provider
                    .put_bucket_policy(bucket, &policy.to_json()?)
                    .await?;
                self.created(&key, &serde_json::to_value(policy)?).await?;
            }
        }
        Ok(())
    }

    pub async fn ensure_bucket_cors(
        &mut self,
        bucket: &str,
        rules: &[CorsRule],
    ) -> ProvisionResult<()> {
        let key = StateKey::new(ResourceKind::BucketCors, bucket);
        match self.prober.bucket_cors(bucket).await? {
            Probe::Found(existing) => {
                self.adopt(&key, &existing).await?;
            }
            Probe::NotFound => {
                self.provider.put_bucket_cors(bucket, rules).await?;
                self.created(&key, &rules.to_vec()).await?;
            }
        }
        Ok(())
    }
}
