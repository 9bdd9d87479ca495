//! SDK-backed provider holding one client per service family.

use aws_config::{BehaviorVersion, Region, SdkConfig};

/// [`CloudProvider`](super::CloudProvider) implementation backed by the AWS
/// SDK. The trait impls live next to the service they call.
#[derive(Clone, Debug)]
pub struct AwsProvider {
    pub(crate) iam: aws_sdk_iam::Client,
    pub(crate) sts: aws_sdk_sts::Client,
    pub(crate) s3: aws_sdk_s3::Client,
    pub(crate) sqs: aws_sdk_sqs::Client,
    pub(crate) dynamodb: aws_sdk_dynamodb::Client,
    pub(crate) lambda: aws_sdk_lambda::Client,
    pub(crate) apigateway: aws_sdk_apigatewayv2::Client,
}

impl AwsProvider {
    /// Load credentials through the standard provider chain, pinned to
    /// `region` and optionally to a named profile.
    pub async fn from_env(region: &str, profile: Option<&str>) -> Self {
        let mut loader =
            aws_config::defaults(BehaviorVersion::latest()).region(Region::new(region.to_string()));
        if let Some(profile) = profile {
            log::debug!("Using AWS profile {profile}");
            loader = loader.profile_name(profile);
        }
        let config = loader.load().await;
        Self::from_sdk_config(&config)
    }

    pub fn from_sdk_config(config: &SdkConfig) -> Self {
        Self {
            iam: aws_sdk_iam::Client::new(config),
            sts: aws_sdk_sts::Client::new(config),
            s3: aws_sdk_s3::Client::new(config),
            sqs: aws_sdk_sqs::Client::new(config),
            dynamodb: aws_sdk_dynamodb::Client::new(config),
            lambda: aws_sdk_lambda::Client::new(config),
            apigateway: aws_sdk_apigatewayv2::Client::new(config),
        }
    }
}
