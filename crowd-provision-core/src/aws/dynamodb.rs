use async_trait::async_trait;
use aws_sdk_dynamodb::types::{
    AttributeDefinition, BillingMode, KeySchemaElement, KeyType, ScalarAttributeType,
    TableDescription,
};

use super::client::AwsProvider;
use super::provider::TableApi;
use super::{sdk_error, text, timestamp, ErrorKind, ProviderError, ProviderResult};
use crate::types::{TableDescriptor, TableSpec};

fn table_descriptor(table: &TableDescription) -> TableDescriptor {
    TableDescriptor {
        name: text(table.table_name()),
        arn: text(table.table_arn()),
        create_date: timestamp(table.creation_date_time()),
    }
}

/// String-typed key attribute plus its schema entry.
fn key_attribute(
    name: &str,
    key_type: KeyType,
) -> ProviderResult<(AttributeDefinition, KeySchemaElement)> {
    let invalid = |e: aws_sdk_dynamodb::error::BuildError| {
        ProviderError::new(ErrorKind::Other, "CreateTable", e.to_string())
    };
    let definition = AttributeDefinition::builder()
        .attribute_name(name)
        .attribute_type(ScalarAttributeType::S)
        .build()
        .map_err(invalid)?;
    let schema = KeySchemaElement::builder()
        .attribute_name(name)
        .key_type(key_type)
        .build()
        .map_err(invalid)?;
    Ok((definition, schema))
}

#[async_trait]
impl TableApi for AwsProvider {
    async fn create_table(&self, spec: &TableSpec) -> ProviderResult<TableDescriptor> {
        let mut request = self
            .dynamodb
            .create_table()
            .table_name(&spec.name)
            .billing_mode(BillingMode::PayPerRequest);

        let (definition, schema) = key_attribute(&spec.partition_key, KeyType::Hash)?;
        request = request.attribute_definitions(definition).key_schema(schema);
        if let Some(sort_key) = &spec.sort_key {
            let (definition, schema) = key_attribute(sort_key, KeyType::Range)?;
            request = request.attribute_definitions(definition).key_schema(schema);
        }

        let output = request
            .send()
            .await
            .map_err(|e| sdk_error("CreateTable", e))?;
        output
            .table_description()
            .map(table_descriptor)
            .ok_or_else(|| ProviderError::missing_member("CreateTable", "TableDescription"))
    }

    async fn describe_table(&self, name: &str) -> ProviderResult<TableDescriptor> {
        let output = self
            .dynamodb
            .describe_table()
            .table_name(name)
            .send()
            .await
            .map_err(|e| sdk_error("DescribeTable", e))?;
        output
            .table()
            .map(table_descriptor)
            .ok_or_else(|| ProviderError::missing_member("DescribeTable", "Table"))
    }
}
