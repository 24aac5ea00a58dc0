//! SQS queue subscribed to the notification topic

use crate::error::{has_code, missing_field, provider_error};
use async_trait::async_trait;
use aws_sdk_sqs::types::QueueAttributeName;
use stackforge_cloud::{ProjectSettings, ResourceDescriptor, ResourceProvider, Result, StepInputs};

const RESOURCE: &str = "messaging-queue";
const QUEUE_NOT_FOUND: &[&str] = &[
    "AWS.SimpleQueueService.NonExistentQueue",
    "QueueDoesNotExist",
];

/// Queue policy accepting messages from exactly one topic
pub fn topic_delivery_policy(queue_arn: &str, topic_arn: &str) -> String {
    serde_json::json!({
        "Version": "2012-10-17",
        "Statement": [{
            "Sid": "AllowSNSPublish",
            "Effect": "Allow",
            "Principal": { "Service": "sns.amazonaws.com" },
            "Action": "sqs:SendMessage",
            "Resource": queue_arn,
            "Condition": { "ArnEquals": { "aws:SourceArn": topic_arn } },
        }]
    })
    .to_string()
}

/// Queue `{project}-notifications-queue`
pub struct QueueProvider {
    sqs: aws_sdk_sqs::Client,
    sns: aws_sdk_sns::Client,
    settings: ProjectSettings,
}

impl QueueProvider {
    pub fn new(sqs: aws_sdk_sqs::Client, sns: aws_sdk_sns::Client, settings: ProjectSettings) -> Self {
        Self { sqs, sns, settings }
    }

    async fn find_queue(&self, name: &str) -> Result<Option<String>> {
        match self.sqs.get_queue_url().queue_name(name).send().await {
            Ok(output) => Ok(output.queue_url().map(str::to_string)),
            Err(e) if has_code(&e, QUEUE_NOT_FOUND) => Ok(None),
            Err(e) => Err(provider_error(RESOURCE, e)),
        }
    }

    async fn create_queue(&self, name: &str) -> Result<String> {
        let output = self
            .sqs
            .create_queue()
            .queue_name(name)
            .attributes(QueueAttributeName::VisibilityTimeout, "30")
            .attributes(QueueAttributeName::MessageRetentionPeriod, "86400")
            .attributes(QueueAttributeName::ReceiveMessageWaitTimeSeconds, "20")
            .send()
            .await
            .map_err(|e| provider_error(RESOURCE, e))?;

        let queue_url = output
            .queue_url()
            .ok_or_else(|| missing_field(RESOURCE, "QueueUrl"))?;
        tracing::info!("Created queue {}", queue_url);
        Ok(queue_url.to_string())
    }

    async fn queue_arn(&self, queue_url: &str) -> Result<String> {
        let output = self
            .sqs
            .get_queue_attributes()
            .queue_url(queue_url)
            .attribute_names(QueueAttributeName::QueueArn)
            .send()
            .await
            .map_err(|e| provider_error(RESOURCE, e))?;

        output
            .attributes()
            .and_then(|attrs| attrs.get(&QueueAttributeName::QueueArn))
            .cloned()
            .ok_or_else(|| missing_field(RESOURCE, "QueueArn"))
    }

    async fn find_subscription(&self, topic_arn: &str, queue_arn: &str) -> Result<Option<String>> {
        let mut next_token = None;
        loop {
            let output = self
                .sns
                .list_subscriptions_by_topic()
                .topic_arn(topic_arn)
                .set_next_token(next_token)
                .send()
                .await
                .map_err(|e| provider_error(RESOURCE, e))?;

            if let Some(arn) = output
                .subscriptions()
                .iter()
                .find(|sub| sub.endpoint() == Some(queue_arn))
                .and_then(|sub| sub.subscription_arn())
            {
                return Ok(Some(arn.to_string()));
            }

            next_token = output.next_token().map(str::to_string);
            if next_token.is_none() {
                return Ok(None);
            }
        }
    }

    async fn subscribe(&self, topic_arn: &str, queue_url: &str, queue_arn: &str) -> Result<String> {
        self.sqs
            .set_queue_attributes()
            .queue_url(queue_url)
            .attributes(
                QueueAttributeName::Policy,
                topic_delivery_policy(queue_arn, topic_arn),
            )
            .send()
            .await
            .map_err(|e| provider_error(RESOURCE, e))?;

        let output = self
            .sns
            .subscribe()
            .topic_arn(topic_arn)
            .protocol("sqs")
            .endpoint(queue_arn)
            .return_subscription_arn(true)
            .send()
            .await
            .map_err(|e| provider_error(RESOURCE, e))?;

        let subscription_arn = output
            .subscription_arn()
            .ok_or_else(|| missing_field(RESOURCE, "SubscriptionArn"))?;
        tracing::info!("Subscribed queue {} to {}", queue_arn, topic_arn);
        Ok(subscription_arn.to_string())
    }
}

#[async_trait]
impl ResourceProvider for QueueProvider {
    fn name(&self) -> &str {
        "sqs-queue"
    }

    async fn ensure(&self, inputs: &StepInputs) -> Result<ResourceDescriptor> {
        let topic_arn = inputs.require("topic_arn")?;
        let name = self.settings.resource_name("notifications-queue");

        let queue_url = match self.find_queue(&name).await? {
            Some(url) => {
                tracing::info!("Reusing queue {}", url);
                url
            }
            None => self.create_queue(&name).await?,
        };
        let queue_arn = self.queue_arn(&queue_url).await?;

        let subscription_arn = match self.find_subscription(topic_arn, &queue_arn).await? {
            Some(arn) => arn,
            None => self.subscribe(topic_arn, &queue_url, &queue_arn).await?,
        };

        Ok(ResourceDescriptor::new()
            .with_attribute("queue_url", queue_url)
            .with_attribute("queue_arn", queue_arn)
            .with_attribute("subscription_arn", subscription_arn))
    }

    async fn teardown(&self, descriptor: &ResourceDescriptor) -> Result<()> {
        let queue_url = descriptor.require(RESOURCE, "queue_url")?;

        if let Some(subscription_arn) = descriptor.get("subscription_arn") {
            match self
                .sns
                .unsubscribe()
                .subscription_arn(subscription_arn)
                .send()
                .await
            {
                Ok(_) => tracing::info!("Removed subscription {}", subscription_arn),
                Err(e) if has_code(&e, &["NotFound", "InvalidParameter"]) => {}
                Err(e) => return Err(provider_error(RESOURCE, e)),
            }
        }

        match self.sqs.delete_queue().queue_url(queue_url).send().await {
            Ok(_) => tracing::info!("Deleted queue {}", queue_url),
            Err(e) if has_code(&e, QUEUE_NOT_FOUND) => {}
            Err(e) => return Err(provider_error(RESOURCE, e)),
        }
        Ok(())
    }
}
