//! Queue polling and per-message log object processing.

pub mod envelope;
pub mod runner;
pub mod worker;

pub use envelope::{parse_envelope, EnvelopeError, ObjectRef};
pub use runner::{Backoff, BackoffConfig, WatchClients, WatchError, WatchSummary, Watcher, WatcherConfig};
pub use worker::{ObjectReport, WorkerContext, WorkerError};

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("invalid queue ARN '{arn}': {reason}")]
    InvalidArn { arn: String, reason: &'static str },

    #[error("failed to resolve queue URL for {queue}: {message}")]
    Resolve { queue: String, message: String },

    #[error("failed to receive messages: {0}")]
    Receive(String),

    #[error("failed to delete message: {0}")]
    Delete(String),
}

#[derive(Debug, Error)]
pub enum ObjectError {
    #[error("failed to download s3://{bucket}/{key}: {message}")]
    Download {
        bucket: String,
        key: String,
        message: String,
    },
}

/// One received queue message. Owns the receipt handle until deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMessage {
    pub id: String,
    pub receipt_handle: String,
    pub body: String,
}

/// Components of an SQS queue ARN, `arn:<partition>:sqs:<region>:<account>:<name>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueArn {
    pub partition: String,
    pub region: String,
    pub account_id: String,
    pub name: String,
}

impl QueueArn {
    pub fn parse(arn: &str) -> Result<Self, QueueError> {
        let invalid = |reason| QueueError::InvalidArn {
            arn: arn.to_string(),
            reason,
        };

        let parts: Vec<&str> = arn.splitn(6, ':').collect();
        if parts.len() != 6 {
            return Err(invalid("expected 6 colon-separated sections"));
        }
        if parts[0] != "arn" {
            return Err(invalid("missing 'arn' prefix"));
        }
        if parts[2] != "sqs" {
            return Err(invalid("not an sqs resource"));
        }
        if parts[5].is_empty() {
            return Err(invalid("empty queue name"));
        }

        Ok(Self {
            partition: parts[1].to_string(),
            region: parts[3].to_string(),
            account_id: parts[4].to_string(),
            name: parts[5].to_string(),
        })
    }
}

impl std::fmt::Display for QueueArn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "arn:{}:sqs:{}:{}:{}",
            self.partition, self.region, self.account_id, self.name
        )
    }
}

/// Access to the notification queue.
#[async_trait]
pub trait QueueClient: Send + Sync {
    async fn resolve_queue_url(&self, queue: &QueueArn) -> Result<String, QueueError>;

    /// Long-poll for up to `max_messages`, waiting at most `wait_time`.
    async fn receive(
        &self,
        queue_url: &str,
        max_messages: i32,
        wait_time: Duration,
    ) -> Result<Vec<QueueMessage>, QueueError>;

    async fn delete(&self, queue_url: &str, receipt_handle: &str) -> Result<(), QueueError>;
}

/// Read access to log objects.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn download(&self, bucket: &str, key: &str) -> Result<Vec<u8>, ObjectError>;
}
