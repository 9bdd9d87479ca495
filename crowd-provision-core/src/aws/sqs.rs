use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use aws_sdk_sqs::types::QueueAttributeName;

use super::client::AwsProvider;
use super::provider::QueueApi;
use super::{optional_text, sdk_error, ProviderError, ProviderResult};

#[async_trait]
impl QueueApi for AwsProvider {
    async fn list_queues(&self, prefix: &str) -> ProviderResult<Vec<String>> {
        let mut urls = Vec::new();
        let mut next_token: Option<String> = None;
        loop {
            let output = self
                .sqs
                .list_queues()
                .queue_name_prefix(prefix)
                .set_next_token(next_token.take())
                .send()
                .await
                .map_err(|e| sdk_error("ListQueues", e))?;
            urls.extend(output.queue_urls().iter().cloned());
            next_token = optional_text(output.next_token());
            if next_token.is_none() {
                break;
            }
        }
        Ok(urls)
    }

    async fn create_queue(
        &self,
        name: &str,
        attributes: &BTreeMap<String, String>,
    ) -> ProviderResult<String> {
        let attributes: HashMap<QueueAttributeName, String> = attributes
            .iter()
            .map(|(k, v)| (QueueAttributeName::from(k.as_str()), v.clone()))
            .collect();
        let output = self
            .sqs
            .create_queue()
            .queue_name(name)
            .set_attributes(Some(attributes))
            .send()
            .await
            .map_err(|e| sdk_error("CreateQueue", e))?;
        output
            .queue_url()
            .map(str::to_string)
            .ok_or_else(|| ProviderError::missing_member("CreateQueue", "QueueUrl"))
    }

    async fn queue_arn(&self, queue_url: &str) -> ProviderResult<String> {
        let output = self
            .sqs
            .get_queue_attributes()
            .queue_url(queue_url)
            .attribute_names(QueueAttributeName::QueueArn)
            .send()
            .await
            .map_err(|e| sdk_error("GetQueueAttributes", e))?;
        output
            .attributes()
            .and_then(|attributes| attributes.get(&QueueAttributeName::QueueArn))
            .cloned()
            .ok_or_else(|| ProviderError::missing_member("GetQueueAttributes", "QueueArn"))
    }
}
