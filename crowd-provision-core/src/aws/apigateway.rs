use async_trait::async_trait;
use aws_sdk_apigatewayv2::types::{Cors, ProtocolType};

use super::client::AwsProvider;
use super::provider::HttpApi;
use super::{optional_text, sdk_error, text, ProviderResult};
use crate::types::{ApiDescriptor, ApiSpec};

#[async_trait]
impl HttpApi for AwsProvider {
    async fn list_apis(&self) -> ProviderResult<Vec<ApiDescriptor>> {
        let mut apis = Vec::new();
        let mut next_token: Option<String> = None;
        loop {
            let output = self
                .apigateway
                .get_apis()
                .set_next_token(next_token.take())
                .send()
                .await
                .map_err(|e| sdk_error("GetApis", e))?;
            apis.extend(output.items().iter().map(|api| ApiDescriptor {
                name: text(api.name()),
                api_id: text(api.api_id()),
                endpoint: optional_text(api.api_endpoint()),
            }));
            next_token = optional_text(output.next_token());
            if next_token.is_none() {
                break;
            }
        }
        Ok(apis)
    }

    /// Quick-create: the API gets a default route and stage integrated with
    /// `spec.target_arn`.
    async fn create_api(&self, spec: &ApiSpec) -> ProviderResult<ApiDescriptor> {
        let cors = Cors::builder()
            .set_allow_origins(Some(spec.allowed_origins.clone()))
            .allow_methods("*")
            .allow_headers("*")
            .build();
        let output = self
            .apigateway
            .create_api()
            .name(&spec.name)
            .protocol_type(ProtocolType::Http)
            .target(&spec.target_arn)
            .cors_configuration(cors)
            .send()
            .await
            .map_err(|e| sdk_error("CreateApi", e))?;
        Ok(ApiDescriptor {
            name: text(output.name()),
            api_id: text(output.api_id()),
            endpoint: optional_text(output.api_endpoint()),
        })
    }
}
