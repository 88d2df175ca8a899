//! Finds distributions configured for log shipping and the queues carrying
//! their new-log-object notifications.

pub mod types;

pub use types::{
    default_stream_name, Endpoint, EndpointRef, LogDestination, QueueBinding, TagNames,
    DEFAULT_STREAM_PREFIX, DEFAULT_TAG_GROUP, DEFAULT_TAG_STREAM,
};

use async_trait::async_trait;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("failed to list distributions: {0}")]
    List(String),

    #[error("failed to list tags for {resource}: {message}")]
    Tags { resource: String, message: String },

    #[error("failed to read configuration of distribution {id}: {message}")]
    DistributionConfig { id: String, message: String },

    #[error("distribution {0} has no log bucket configured")]
    LoggingDisabled(String),

    #[error("failed to read notification configuration of bucket {bucket}: {message}")]
    Notifications { bucket: String, message: String },

    #[error("no notification queues configured for bucket {0}")]
    NoQueue(String),
}

/// One page of a distribution listing.
#[derive(Debug, Clone, Default)]
pub struct EndpointPage {
    pub endpoints: Vec<EndpointRef>,
    /// Marker for the next page, `None` on the last page.
    pub next_marker: Option<String>,
}

/// Read access to the distributions and their configuration.
#[async_trait]
pub trait EndpointCatalog: Send + Sync {
    async fn list_endpoints(&self, marker: Option<&str>) -> Result<EndpointPage, DiscoveryError>;

    async fn list_tags(
        &self,
        endpoint: &EndpointRef,
    ) -> Result<BTreeMap<String, String>, DiscoveryError>;

    /// The configured log bucket as stored on the distribution, which is
    /// usually a bucket hostname such as `logs.s3.amazonaws.com`.
    async fn log_bucket(&self, endpoint_id: &str) -> Result<String, DiscoveryError>;
}

/// Read access to bucket event-notification configuration.
#[async_trait]
pub trait BucketNotifications: Send + Sync {
    /// ARNs of the queues notified on object creation, in configuration order.
    async fn notification_queues(&self, bucket: &str) -> Result<Vec<String>, DiscoveryError>;
}

/// List every distribution, following pagination to the end, and keep the
/// ones carrying at least one of `required_tags`.
///
/// A distribution whose tags cannot be read is skipped.
pub async fn find_tagged_endpoints(
    catalog: &dyn EndpointCatalog,
    required_tags: &[&str],
) -> Result<Vec<Endpoint>, DiscoveryError> {
    let mut endpoints = Vec::new();
    let mut marker: Option<String> = None;
    let mut pages = 0usize;

    loop {
        let page = catalog.list_endpoints(marker.as_deref()).await?;
        pages += 1;

        for candidate in page.endpoints {
            let tags = match catalog.list_tags(&candidate).await {
                Ok(tags) => tags,
                Err(e) => {
                    warn!(endpoint = %candidate.id, error = %e, "Skipping distribution, tags unavailable");
                    continue;
                }
            };

            if tags.keys().any(|key| required_tags.contains(&key.as_str())) {
                debug!(endpoint = %candidate.id, tags = ?tags, "Distribution carries log shipping tags");
                endpoints.push(Endpoint::with_tags(candidate.id, tags));
            }
        }

        match page.next_marker {
            Some(next) if marker.as_deref() != Some(next.as_str()) => marker = Some(next),
            Some(next) => {
                warn!(marker = %next, "Distribution listing returned the same marker twice, stopping");
                break;
            }
            None => break,
        }
    }

    debug!(pages, found = endpoints.len(), "Distribution listing complete");
    Ok(endpoints)
}

/// Strip a storage-service hostname suffix from a configured log bucket.
///
/// Handles both `bucket.s3.amazonaws.com` and regional hostnames such as
/// `bucket.s3.eu-west-1.amazonaws.com`.
pub fn bucket_name(configured: &str) -> &str {
    let Some(host) = configured.strip_suffix(".amazonaws.com") else {
        return configured;
    };
    if let Some(bucket) = host.strip_suffix(".s3") {
        return bucket;
    }

    // Bucket names may contain `.s3.` themselves, so the service label is the last one.
    match (host.rfind(".s3."), host.rfind(".s3-")) {
        (Some(a), Some(b)) => &configured[..a.max(b)],
        (Some(idx), None) | (None, Some(idx)) => &configured[..idx],
        (None, None) => configured,
    }
}

/// Resolve the queue notified when a new log object lands in the
/// distribution's log bucket.
///
/// Only the first configured queue is used.
pub async fn resolve_queue(
    catalog: &dyn EndpointCatalog,
    notifications: &dyn BucketNotifications,
    endpoint_id: &str,
) -> Result<String, DiscoveryError> {
    let configured = catalog.log_bucket(endpoint_id).await?;
    let bucket = bucket_name(&configured);
    if bucket.is_empty() {
        return Err(DiscoveryError::LoggingDisabled(endpoint_id.to_string()));
    }

    let queues = notifications.notification_queues(bucket).await?;
    let mut queues = queues.into_iter();
    let first = queues
        .next()
        .ok_or_else(|| DiscoveryError::NoQueue(bucket.to_string()))?;

    let ignored: Vec<String> = queues.collect();
    if !ignored.is_empty() {
        debug!(bucket = %bucket, queue = %first, ignored = ?ignored, "Bucket has several notification queues, using the first");
    }

    Ok(first)
}

/// Run one discovery pass.
///
/// Endpoints whose queue cannot be resolved are logged and left out; only a
/// failure to list distributions fails the pass.
pub async fn discover(
    catalog: &dyn EndpointCatalog,
    notifications: &dyn BucketNotifications,
    tag_names: &TagNames,
    stream_prefix: &str,
) -> Result<Vec<QueueBinding>, DiscoveryError> {
    let endpoints = find_tagged_endpoints(catalog, &tag_names.as_slice()).await?;

    let mut bindings = Vec::with_capacity(endpoints.len());
    for endpoint in endpoints {
        info!(endpoint = %endpoint.id, "Candidate distribution found");

        let queue = match resolve_queue(catalog, notifications, &endpoint.id).await {
            Ok(queue) => queue,
            Err(e) => {
                error!(endpoint = %endpoint.id, error = %e, "Couldn't find queue for distribution logs");
                continue;
            }
        };

        let binding = QueueBinding::from_tags(endpoint, queue, tag_names, stream_prefix);
        if binding.group.is_none() {
            debug!(endpoint = %binding.endpoint.id, "No group tag, group will follow object keys");
        }
        debug!(
            endpoint = %binding.endpoint.id,
            queue = %binding.queue_arn,
            stream = %binding.stream,
            "Queue for distribution logs resolved"
        );
        bindings.push(binding);
    }

    Ok(bindings)
}
