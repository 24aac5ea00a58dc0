//! SNS notification topic with admin subscriptions

use crate::error::{has_code, missing_field, provider_error};
use async_trait::async_trait;
use aws_sdk_sns::Client;
use stackforge_cloud::{ProjectSettings, ResourceDescriptor, ResourceProvider, Result, StepInputs};

const RESOURCE: &str = "messaging-topic";
const NOT_FOUND: &[&str] = &["NotFound"];

/// Topic policy letting the request-handler functions publish
pub fn publish_policy(topic_arn: &str) -> String {
    serde_json::json!({
        "Version": "2012-10-17",
        "Statement": [{
            "Effect": "Allow",
            "Principal": { "Service": "lambda.amazonaws.com" },
            "Action": "sns:Publish",
            "Resource": topic_arn,
        }]
    })
    .to_string()
}

/// Topic `{project}-notifications`
pub struct TopicProvider {
    client: Client,
    settings: ProjectSettings,
}

impl TopicProvider {
    pub fn new(client: Client, settings: ProjectSettings) -> Self {
        Self { client, settings }
    }

    async fn find_topic(&self, name: &str) -> Result<Option<String>> {
        let suffix = format!(":{}", name);
        let mut next_token = None;

        loop {
            let output = self
                .client
                .list_topics()
                .set_next_token(next_token)
                .send()
                .await
                .map_err(|e| provider_error(RESOURCE, e))?;

            if let Some(arn) = output
                .topics()
                .iter()
                .filter_map(|topic| topic.topic_arn())
                .find(|arn| arn.ends_with(&suffix))
            {
                return Ok(Some(arn.to_string()));
            }

            next_token = output.next_token().map(str::to_string);
            if next_token.is_none() {
                return Ok(None);
            }
        }
    }

    async fn subscribe(&self, topic_arn: &str, protocol: &str, endpoint: &str) -> Result<()> {
        self.client
            .subscribe()
            .topic_arn(topic_arn)
            .protocol(protocol)
            .endpoint(endpoint)
            .send()
            .await
            .map_err(|e| provider_error(RESOURCE, e))?;

        tracing::info!("Subscribed {} ({}) to {}", endpoint, protocol, topic_arn);
        Ok(())
    }
}

#[async_trait]
impl ResourceProvider for TopicProvider {
    fn name(&self) -> &str {
        "sns-topic"
    }

    async fn ensure(&self, _inputs: &StepInputs) -> Result<ResourceDescriptor> {
        let name = self.settings.resource_name("notifications");

        if let Some(topic_arn) = self.find_topic(&name).await? {
            tracing::info!("Reusing topic {}", topic_arn);
            return Ok(ResourceDescriptor::new().with_attribute("topic_arn", topic_arn));
        }

        let output = self
            .client
            .create_topic()
            .name(&name)
            .send()
            .await
            .map_err(|e| provider_error(RESOURCE, e))?;

        let topic_arn = output
            .topic_arn()
            .ok_or_else(|| missing_field(RESOURCE, "TopicArn"))?
            .to_string();
        tracing::info!("Created topic {}", topic_arn);

        self.client
            .set_topic_attributes()
            .topic_arn(&topic_arn)
            .attribute_name("Policy")
            .attribute_value(publish_policy(&topic_arn))
            .send()
            .await
            .map_err(|e| provider_error(RESOURCE, e))?;

        let admin = &self.settings.admin;
        if let Some(email) = &admin.admin_email {
            self.subscribe(&topic_arn, "email", email).await?;
        }
        if let Some(phone) = &admin.admin_phone {
            self.subscribe(&topic_arn, "sms", phone).await?;
        }

        Ok(ResourceDescriptor::new().with_attribute("topic_arn", topic_arn))
    }

    async fn teardown(&self, descriptor: &ResourceDescriptor) -> Result<()> {
        let topic_arn = descriptor.require(RESOURCE, "topic_arn")?;
        let mut next_token = None;

        loop {
            let output = match self
                .client
                .list_subscriptions_by_topic()
                .topic_arn(topic_arn)
                .set_next_token(next_token)
                .send()
                .await
            {
                Ok(output) => output,
                Err(e) if has_code(&e, NOT_FOUND) => {
                    tracing::info!("Topic {} already gone", topic_arn);
                    return Ok(());
                }
                Err(e) => return Err(provider_error(RESOURCE, e)),
            };

            // unconfirmed subscriptions have no ARN yet and expire on their own
            for arn in output
                .subscriptions()
                .iter()
                .filter_map(|sub| sub.subscription_arn())
                .filter(|arn| arn.starts_with("arn:"))
            {
                match self.client.unsubscribe().subscription_arn(arn).send().await {
                    Ok(_) => tracing::info!("Removed subscription {}", arn),
                    Err(e) if has_code(&e, NOT_FOUND) => {}
                    Err(e) => return Err(provider_error(RESOURCE, e)),
                }
            }

            next_token = output.next_token().map(str::to_string);
            if next_token.is_none() {
                break;
            }
        }

        match self.client.delete_topic().topic_arn(topic_arn).send().await {
            Ok(_) => tracing::info!("Deleted topic {}", topic_arn),
            Err(e) if has_code(&e, NOT_FOUND) => {}
            Err(e) => return Err(provider_error(RESOURCE, e)),
        }
        Ok(())
    }
}
