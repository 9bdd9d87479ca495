//! S3 bucket operations for [`AwsProvider`].

use async_trait::async_trait;
use aws_sdk_s3::types::{
    BucketLocationConstraint, CorsConfiguration, CreateBucketConfiguration,
    PublicAccessBlockConfiguration,
};

use super::client::AwsProvider;
use super::provider::StorageApi;
use super::{member, sdk_error, ErrorKind, ProviderError, ProviderResult};
use crate::types::{BucketDescriptor, CorsRule};

/// Region S3 reports as an empty location constraint.
const DEFAULT_REGION: &str = "us-east-1";

fn build_error(operation: &str, err: impl std::fmt::Display) -> ProviderError {
    ProviderError::new(ErrorKind::Other, operation, err.to_string())
}

fn sdk_cors_rule(rule: &CorsRule) -> ProviderResult<aws_sdk_s3::types::CorsRule> {
    aws_sdk_s3::types::CorsRule::builder()
        .set_allowed_headers(Some(rule.allowed_headers.clone()))
        .set_allowed_methods(Some(rule.allowed_methods.clone()))
        .set_allowed_origins(Some(rule.allowed_origins.clone()))
        .set_expose_headers(Some(rule.expose_headers.clone()))
        .set_max_age_seconds(rule.max_age_seconds)
        .build()
        .map_err(|e| build_error("PutBucketCors", e))
}

#[async_trait]
impl StorageApi for AwsProvider {
    async fn create_bucket(&self, name: &str, region: &str) -> ProviderResult<BucketDescriptor> {
        let mut request = self.s3.create_bucket().bucket(name);
        if region != DEFAULT_REGION {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(region))
                    .build(),
            );
        }
        request
            .send()
            .await
            .map_err(|e| sdk_error("CreateBucket", e))?;
        Ok(BucketDescriptor {
            name: name.to_string(),
            region: region.to_string(),
        })
    }

    async fn bucket_location(&self, name: &str) -> ProviderResult<BucketDescriptor> {
        let output = self
            .s3
            .get_bucket_location()
            .bucket(name)
            .send()
            .await
            .map_err(|e| sdk_error("GetBucketLocation", e))?;
        let region = member::<BucketLocationConstraint>(output.location_constraint())
            .map(BucketLocationConstraint::as_str)
            .filter(|r| !r.is_empty())
            .unwrap_or(DEFAULT_REGION);
        Ok(BucketDescriptor {
            name: name.to_string(),
            region: region.to_string(),
        })
    }

    async fn get_bucket_policy(&self, bucket: &str) -> ProviderResult<String> {
        let output = self
            .s3
            .get_bucket_policy()
            .bucket(bucket)
            .send()
            .await
            .map_err(|e| sdk_error("GetBucketPolicy", e))?;
        output
            .policy()
            .map(str::to_string)
            .ok_or_else(|| ProviderError::missing_member("GetBucketPolicy", "Policy"))
    }

    async fn put_bucket_policy(&self, bucket: &str, policy: &str) -> ProviderResult<()> {
        self.s3
            .put_bucket_policy()
            .bucket(bucket)
            .policy(policy)
            .send()
            .await
            .map_err(|e| sdk_error("PutBucketPolicy", e))?;
        Ok(())
    }

    async fn allow_public_policies(&self, bucket: &str) -> ProviderResult<()> {
        let block = PublicAccessBlockConfiguration::builder()
            .block_public_acls(true)
            .ignore_public_acls(true)
            .block_public_policy(false)
            .restrict_public_buckets(false)
            .build();
        self.s3
            .put_public_access_block()
            .bucket(bucket)
            .public_access_block_configuration(block)
            .send()
            .await
            .map_err(|e| sdk_error("PutPublicAccessBlock", e))?;
        Ok(())
    }

    async fn get_bucket_cors(&self, bucket: &str) -> ProviderResult<Vec<CorsRule>> {
        let output = self
            .s3
            .get_bucket_cors()
            .bucket(bucket)
            .send()
            .await
            .map_err(|e| sdk_error("GetBucketCors", e))?;
        Ok(output
            .cors_rules()
            .iter()
            .map(|rule| CorsRule {
                allowed_headers: rule.allowed_headers().to_vec(),
                allowed_methods: rule.allowed_methods().to_vec(),
                allowed_origins: rule.allowed_origins().to_vec(),
                expose_headers: rule.expose_headers().to_vec(),
                max_age_seconds: rule.max_age_seconds(),
            })
            .collect())
    }

    async fn put_bucket_cors(&self, bucket: &str, rules: &[CorsRule]) -> ProviderResult<()> {
        let rules = rules
            .iter()
            .map(sdk_cors_rule)
            .collect::<ProviderResult<Vec<_>>>()?;
        let configuration = CorsConfiguration::builder()
            .set_cors_rules(Some(rules))
            .build()
            .map_err(|e| build_error("PutBucketCors", e))?;
        self.s3
            .put_bucket_cors()
            .bucket(bucket)
            .cors_configuration(configuration)
            .send()
            .await
            .map_err(|e| sdk_error("PutBucketCors", e))?;
        Ok(())
    }
}
