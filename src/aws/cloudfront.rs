use crate::discovery::{DiscoveryError, EndpointCatalog, EndpointPage, EndpointRef};
use async_trait::async_trait;
use aws_sdk_cloudfront::error::DisplayErrorContext;
use aws_sdk_cloudfront::types::LoggingConfig;
use aws_sdk_cloudfront::Client;
use std::collections::BTreeMap;

pub struct CloudFrontCatalog {
    client: Client,
}

impl CloudFrontCatalog {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl EndpointCatalog for CloudFrontCatalog {
    async fn list_endpoints(&self, marker: Option<&str>) -> Result<EndpointPage, DiscoveryError> {
        let response = self
            .client
            .list_distributions()
            .set_marker(marker.map(str::to_string))
            .send()
            .await
            .map_err(|e| DiscoveryError::List(DisplayErrorContext(&e).to_string()))?;

        let Some(list) = response.distribution_list else {
            return Ok(EndpointPage::default());
        };

        let items = list.items.unwrap_or_default();
        let next_marker = if list.is_truncated {
            // Some responses omit NextMarker; the last id continues the listing.
            list.next_marker
                .or_else(|| items.last().map(|summary| summary.id.clone()))
        } else {
            None
        };

        Ok(EndpointPage {
            endpoints: items
                .into_iter()
                .map(|summary| EndpointRef {
                    id: summary.id,
                    arn: summary.arn,
                })
                .collect(),
            next_marker,
        })
    }

    async fn list_tags(&self, endpoint: &EndpointRef) -> Result<BTreeMap<String, String>, DiscoveryError> {
        let response = self
            .client
            .list_tags_for_resource()
            .resource(&endpoint.arn)
            .send()
            .await
            .map_err(|e| DiscoveryError::Tags {
                resource: endpoint.arn.clone(),
                message: DisplayErrorContext(&e).to_string(),
            })?;

        let tags = response
            .tags
            .and_then(|tags| tags.items)
            .unwrap_or_default()
            .into_iter()
            .map(|tag| (tag.key, tag.value.unwrap_or_default()))
            .collect();
        Ok(tags)
    }

    async fn log_bucket(&self, endpoint_id: &str) -> Result<String, DiscoveryError> {
        let response = self
            .client
            .get_distribution_config()
            .id(endpoint_id)
            .send()
            .await
            .map_err(|e| DiscoveryError::DistributionConfig {
                id: endpoint_id.to_string(),
                message: DisplayErrorContext(&e).to_string(),
            })?;

        let logging = response
            .distribution_config
            .as_ref()
            .and_then(|config| config.logging.as_ref());
        Ok(configured_bucket(logging))
    }
}

/// The log bucket of a distribution, empty when logging is not configured.
fn configured_bucket(logging: Option<&LoggingConfig>) -> String {
    logging.map(|logging| logging.bucket()).unwrap_or_default().to_string()
}
