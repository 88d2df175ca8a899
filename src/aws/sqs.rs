use crate::watcher::{QueueArn, QueueClient, QueueError, QueueMessage};
use async_trait::async_trait;
use aws_sdk_sqs::error::DisplayErrorContext;
use aws_sdk_sqs::Client;
use std::time::Duration;
use tracing::warn;

/// Longest long-poll the service accepts.
const MAX_WAIT_SECONDS: u64 = 20;

pub struct SqsQueue {
    client: Client,
}

impl SqsQueue {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl QueueClient for SqsQueue {
    async fn resolve_queue_url(&self, queue: &QueueArn) -> Result<String, QueueError> {
        let failed = |message: String| QueueError::Resolve {
            queue: queue.to_string(),
            message,
        };

        let response = self
            .client
            .get_queue_url()
            .queue_name(&queue.name)
            .queue_owner_aws_account_id(&queue.account_id)
            .send()
            .await
            .map_err(|e| failed(DisplayErrorContext(&e).to_string()))?;

        response
            .queue_url
            .ok_or_else(|| failed("response carried no queue URL".to_string()))
    }

    async fn receive(
        &self,
        queue_url: &str,
        max_messages: i32,
        wait_time: Duration,
    ) -> Result<Vec<QueueMessage>, QueueError> {
        let wait_seconds = wait_time.as_secs().min(MAX_WAIT_SECONDS) as i32;
        let response = self
            .client
            .receive_message()
            .queue_url(queue_url)
            .max_number_of_messages(max_messages.clamp(1, 10))
            .wait_time_seconds(wait_seconds)
            .send()
            .await
            .map_err(|e| QueueError::Receive(DisplayErrorContext(&e).to_string()))?;

        let messages = response
            .messages
            .unwrap_or_default()
            .into_iter()
            .filter_map(|message| {
                let id = message.message_id.unwrap_or_default();
                match message.receipt_handle {
                    Some(receipt_handle) => Some(QueueMessage {
                        id,
                        receipt_handle,
                        body: message.body.unwrap_or_default(),
                    }),
                    None => {
                        warn!(message = %id, "Ignoring message without receipt handle");
                        None
                    }
                }
            })
            .collect();
        Ok(messages)
    }

    async fn delete(&self, queue_url: &str, receipt_handle: &str) -> Result<(), QueueError> {
        self.client
            .delete_message()
            .queue_url(queue_url)
            .receipt_handle(receipt_handle)
            .send()
            .await
            .map_err(|e| QueueError::Delete(DisplayErrorContext(&e).to_string()))?;
        Ok(())
    }
}
