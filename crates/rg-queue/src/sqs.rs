use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_sqs::error::DisplayErrorContext;
use aws_sdk_sqs::types::{Message as SqsMessage, MessageAttributeValue};
use aws_sdk_sqs::Client;
use chrono::Utc;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use rg_config::aws::load_sdk_config;
use rg_config::{AwsConfig, QueueConfig};

use crate::{build_message_body, clamp_batch_size, QueueClient, QueueError, QueueMessage, Result, TOPIC_ATTRIBUTE};

/// AWS SQS queue client
pub struct SqsQueueClient {
    client: Client,
    queue_url: String,
    queue_name: String,
    wait_time_seconds: i32,
    visibility_timeout_seconds: Option<i32>,
}

impl SqsQueueClient {
    /// SQS maximum long-poll window.
    pub const MAX_WAIT_TIME_SECONDS: i32 = 20;

    pub fn new(client: Client, queue_url: String) -> Self {
        let queue_name = queue_url
            .rsplit('/')
            .find(|segment| !segment.is_empty())
            .unwrap_or("unknown")
            .to_string();

        Self {
            client,
            queue_url,
            queue_name,
            wait_time_seconds: Self::MAX_WAIT_TIME_SECONDS,
            visibility_timeout_seconds: None,
        }
    }

    /// Validate configuration and build a client.
    ///
    /// Fails with [`QueueError::Config`] before touching the network when the
    /// region, credentials or queue URL are missing. The SDK connects lazily
    /// on the first request.
    pub async fn connect(aws: &AwsConfig, queue: &QueueConfig) -> Result<Self> {
        aws.validate()?;
        queue.validate()?;

        let sdk_config = load_sdk_config(aws).await;
        let client = Client::new(&sdk_config);

        info!(
            queue = %queue.queue_name(),
            region = %aws.region,
            wait_time_seconds = queue.wait_time_seconds,
            "SQS queue client configured"
        );

        Ok(Self::new(client, queue.queue_url.clone())
            .with_wait_time_seconds(queue.wait_time_seconds as i32)
            .with_visibility_timeout(queue.visibility_timeout_seconds.map(|v| v as i32)))
    }

    /// Set the long poll wait time in seconds (max 20).
    pub fn with_wait_time_seconds(mut self, seconds: i32) -> Self {
        self.wait_time_seconds = seconds.clamp(0, Self::MAX_WAIT_TIME_SECONDS);
        self
    }

    pub fn with_visibility_timeout(mut self, seconds: Option<i32>) -> Self {
        self.visibility_timeout_seconds = seconds;
        self
    }

    fn is_fifo(&self) -> bool {
        self.queue_url.ends_with(".fifo")
    }

    fn to_queue_message(&self, sqs_msg: SqsMessage) -> Option<QueueMessage> {
        let Some(receipt_handle) = sqs_msg.receipt_handle().map(str::to_string) else {
            warn!(
                queue = %self.queue_name,
                message_id = ?sqs_msg.message_id(),
                "SQS message without receipt handle, skipping"
            );
            return None;
        };

        let attributes: HashMap<String, String> = sqs_msg
            .message_attributes()
            .map(|attrs| {
                attrs
                    .iter()
                    .filter_map(|(name, value)| {
                        value.string_value().map(|v| (name.clone(), v.to_string()))
                    })
                    .collect()
            })
            .unwrap_or_default();

        Some(QueueMessage {
            message_id: sqs_msg.message_id().map(str::to_string),
            body: sqs_msg.body().unwrap_or_default().to_string(),
            receipt_handle,
            attributes,
        })
    }
}

fn sqs_error(e: impl std::error::Error) -> QueueError {
    QueueError::Sqs(DisplayErrorContext(e).to_string())
}

#[async_trait]
impl QueueClient for SqsQueueClient {
    fn identifier(&self) -> &str {
        &self.queue_name
    }

    async fn send(&self, payload: Map<String, Value>, topic: &str) -> Result<String> {
        let body = build_message_body(payload, topic, Utc::now())?;

        let topic_attribute = MessageAttributeValue::builder()
            .data_type("String")
            .string_value(topic)
            .build()
            .map_err(sqs_error)?;

        let mut request = self
            .client
            .send_message()
            .queue_url(&self.queue_url)
            .message_body(body)
            .message_attributes(TOPIC_ATTRIBUTE, topic_attribute);

        // FIFO queues require message_group_id and message_deduplication_id
        if self.is_fifo() {
            request = request
                .message_group_id(topic)
                .message_deduplication_id(uuid::Uuid::new_v4().to_string());
        }

        let output = request.send().await.map_err(sqs_error)?;
        let message_id = output.message_id().unwrap_or_default().to_string();

        debug!(
            queue = %self.queue_name,
            message_id = %message_id,
            topic = %topic,
            "Message sent to SQS"
        );
        Ok(message_id)
    }

    async fn receive(&self, max_messages: u32) -> Result<Vec<QueueMessage>> {
        let mut request = self
            .client
            .receive_message()
            .queue_url(&self.queue_url)
            .max_number_of_messages(clamp_batch_size(max_messages) as i32)
            .wait_time_seconds(self.wait_time_seconds)
            .message_attribute_names("All");

        if let Some(visibility_timeout) = self.visibility_timeout_seconds {
            request = request.visibility_timeout(visibility_timeout);
        }

        let output = request.send().await.map_err(sqs_error)?;

        let messages: Vec<QueueMessage> = output
            .messages
            .unwrap_or_default()
            .into_iter()
            .filter_map(|sqs_msg| self.to_queue_message(sqs_msg))
            .collect();

        if !messages.is_empty() {
            debug!(
                queue = %self.queue_name,
                count = messages.len(),
                "Received messages from SQS"
            );
        }

        Ok(messages)
    }

    async fn delete(&self, receipt_handle: &str) -> Result<()> {
        self.client
            .delete_message()
            .queue_url(&self.queue_url)
            .receipt_handle(receipt_handle)
            .send()
            .await
            .map_err(sqs_error)?;

        debug!(
            receipt_handle = %receipt_handle,
            queue = %self.queue_name,
            "Message deleted from SQS"
        );
        Ok(())
    }
}
