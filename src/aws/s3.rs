use crate::discovery::{BucketNotifications, DiscoveryError};
use crate::watcher::{ObjectError, ObjectStore};
use async_trait::async_trait;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::Client;

/// Bucket notification lookups and log object downloads.
pub struct S3Buckets {
    client: Client,
}

impl S3Buckets {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl BucketNotifications for S3Buckets {
    async fn notification_queues(&self, bucket: &str) -> Result<Vec<String>, DiscoveryError> {
        let response = self
            .client
            .get_bucket_notification_configuration()
            .bucket(bucket)
            .send()
            .await
            .map_err(|e| DiscoveryError::Notifications {
                bucket: bucket.to_string(),
                message: DisplayErrorContext(&e).to_string(),
            })?;

        Ok(response
            .queue_configurations()
            .iter()
            .map(|queue| queue.queue_arn().to_string())
            .collect())
    }
}

#[async_trait]
impl ObjectStore for S3Buckets {
    async fn download(&self, bucket: &str, key: &str) -> Result<Vec<u8>, ObjectError> {
        let failed = |message: String| ObjectError::Download {
            bucket: bucket.to_string(),
            key: key.to_string(),
            message,
        };

        let response = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| failed(DisplayErrorContext(&e).to_string()))?;

        let body = response
            .body
            .collect()
            .await
            .map_err(|e| failed(e.to_string()))?;
        Ok(body.into_bytes().to_vec())
    }
}
