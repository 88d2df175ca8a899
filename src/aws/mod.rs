//! Capability implementations backed by the AWS SDK.

pub mod cloudfront;
pub mod logs;
pub mod s3;
pub mod sqs;

pub use cloudfront::CloudFrontCatalog;
pub use logs::CloudWatchLogsSink;
pub use s3::S3Buckets;
pub use sqs::SqsQueue;

use aws_config::BehaviorVersion;
use aws_types::region::Region;
use aws_types::SdkConfig;
use std::sync::Arc;
use tracing::debug;

/// Default region when neither flag, environment nor config file sets one.
pub const DEFAULT_REGION: &str = "ap-southeast-2";

/// One adapter per service, built from a single shared SDK configuration.
#[derive(Clone)]
pub struct AwsClients {
    pub catalog: Arc<CloudFrontCatalog>,
    pub buckets: Arc<S3Buckets>,
    pub queue: Arc<SqsQueue>,
    pub sink: Arc<CloudWatchLogsSink>,
}

impl AwsClients {
    pub async fn connect(region: &str) -> Self {
        let config = load_sdk_config(region).await;
        Self::from_sdk_config(&config)
    }

    pub fn from_sdk_config(config: &SdkConfig) -> Self {
        Self {
            catalog: Arc::new(CloudFrontCatalog::new(aws_sdk_cloudfront::Client::new(config))),
            buckets: Arc::new(S3Buckets::new(aws_sdk_s3::Client::new(config))),
            queue: Arc::new(SqsQueue::new(aws_sdk_sqs::Client::new(config))),
            sink: Arc::new(CloudWatchLogsSink::new(aws_sdk_cloudwatchlogs::Client::new(config))),
        }
    }
}

pub async fn load_sdk_config(region: &str) -> SdkConfig {
    debug!(region = %region, "Loading AWS configuration");
    aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(region.to_string()))
        .load()
        .await
}
