//! Lambda operations for [`AwsProvider`].

use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_lambda::primitives::Blob;
use aws_sdk_lambda::types::{
    Environment, EventSourceMappingConfiguration, FunctionCode, FunctionConfiguration, Runtime,
};

use super::client::AwsProvider;
use super::provider::FunctionApi;
use super::{member, optional_text, sdk_error, text, ProviderError, ProviderResult};
use crate::types::{EventSourceMappingDescriptor, FunctionDescriptor, FunctionSpec};

fn runtime_text(runtime: Option<&Runtime>) -> Option<String> {
    runtime.map(|r| r.as_str().to_string())
}

fn function_descriptor(configuration: &FunctionConfiguration) -> FunctionDescriptor {
    FunctionDescriptor {
        name: text(configuration.function_name()),
        arn: text(configuration.function_arn()),
        role: text(configuration.role()),
        runtime: runtime_text(member::<Runtime>(configuration.runtime())),
        handler: optional_text(configuration.handler()),
    }
}

fn mapping_descriptor(mapping: &EventSourceMappingConfiguration) -> EventSourceMappingDescriptor {
    EventSourceMappingDescriptor {
        uuid: text(mapping.uuid()),
        function_arn: optional_text(mapping.function_arn()),
        event_source_arn: text(mapping.event_source_arn()),
        batch_size: mapping.batch_size(),
    }
}

#[async_trait]
impl FunctionApi for AwsProvider {
    async fn create_function(
        &self,
        spec: &FunctionSpec,
        package: Vec<u8>,
    ) -> ProviderResult<FunctionDescriptor> {
        let variables: HashMap<String, String> = spec
            .environment
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let output = self
            .lambda
            .create_function()
            .function_name(&spec.name)
            .runtime(Runtime::from(spec.runtime.as_str()))
            .handler(&spec.handler)
            .role(&spec.role_arn)
            .timeout(spec.timeout_seconds)
            .memory_size(spec.memory_mb)
            .code(FunctionCode::builder().zip_file(Blob::new(package)).build())
            .environment(Environment::builder().set_variables(Some(variables)).build())
            .send()
            .await
            .map_err(|e| sdk_error("CreateFunction", e))?;

        Ok(FunctionDescriptor {
            name: text(output.function_name()),
            arn: text(output.function_arn()),
            role: text(output.role()),
            runtime: runtime_text(member::<Runtime>(output.runtime())),
            handler: optional_text(output.handler()),
        })
    }

    async fn get_function(&self, name: &str) -> ProviderResult<FunctionDescriptor> {
        let output = self
            .lambda
            .get_function()
            .function_name(name)
            .send()
            .await
            .map_err(|e| sdk_error("GetFunction", e))?;
        output
            .configuration()
            .map(function_descriptor)
            .ok_or_else(|| ProviderError::missing_member("GetFunction", "Configuration"))
    }

    async fn add_permission(
        &self,
        function_name: &str,
        statement_id: &str,
        principal: &str,
        source_arn: &str,
    ) -> ProviderResult<()> {
        self.lambda
            .add_permission()
            .function_name(function_name)
            .statement_id(statement_id)
            .action("lambda:InvokeFunction")
            .principal(principal)
            .source_arn(source_arn)
            .send()
            .await
            .map_err(|e| sdk_error("AddPermission", e))?;
        Ok(())
    }

    async fn list_event_source_mappings(
        &self,
        function_name: &str,
        source_arn: &str,
    ) -> ProviderResult<Vec<EventSourceMappingDescriptor>> {
        let mut mappings = Vec::new();
        let mut marker: Option<String> = None;
        loop {
            let output = self
                .lambda
                .list_event_source_mappings()
                .function_name(function_name)
                .event_source_arn(source_arn)
                .set_marker(marker.take())
                .send()
                .await
                .map_err(|e| sdk_error("ListEventSourceMappings", e))?;
            mappings.extend(output.event_source_mappings().iter().map(mapping_descriptor));
            marker = optional_text(output.next_marker());
            if marker.is_none() {
                break;
            }
        }
        Ok(mappings)
    }

    async fn create_event_source_mapping(
        &self,
        function_name: &str,
        source_arn: &str,
        batch_size: i32,
    ) -> ProviderResult<EventSourceMappingDescriptor> {
        let output = self
            .lambda
            .create_event_source_mapping()
            .function_name(function_name)
            .event_source_arn(source_arn)
            .batch_size(batch_size)
            .send()
            .await
            .map_err(|e| sdk_error("CreateEventSourceMapping", e))?;
        Ok(EventSourceMappingDescriptor {
            uuid: text(output.uuid()),
            function_arn: optional_text(output.function_arn()),
            event_source_arn: text(output.event_source_arn()),
            batch_size: output.batch_size(),
        })
    }
}
