use crate::parser::log_group_from_key;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Default tag naming the destination log group.
pub const DEFAULT_TAG_GROUP: &str = "edge.skpr.io/loggroup";
/// Default tag naming the destination log stream.
pub const DEFAULT_TAG_STREAM: &str = "edge.skpr.io/logstream";
/// Default prefix of stream names derived from an endpoint identifier.
pub const DEFAULT_STREAM_PREFIX: &str = "cloudfront";

/// Reference to a candidate distribution as returned by a listing call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointRef {
    pub id: String,
    pub arn: String,
}

/// A distribution together with its resource tags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub id: String,
    pub tags: BTreeMap<String, String>,
}

impl Endpoint {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tags: BTreeMap::new(),
        }
    }

    pub fn with_tags(id: impl Into<String>, tags: BTreeMap<String, String>) -> Self {
        Self {
            id: id.into(),
            tags,
        }
    }

    pub fn tag(&self, name: &str) -> Option<&str> {
        self.tags.get(name).map(String::as_str)
    }
}

/// Names of the tags that configure log shipping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagNames {
    pub group: String,
    pub stream: String,
}

impl TagNames {
    pub fn as_slice(&self) -> [&str; 2] {
        [self.group.as_str(), self.stream.as_str()]
    }
}

impl Default for TagNames {
    fn default() -> Self {
        Self {
            group: DEFAULT_TAG_GROUP.to_string(),
            stream: DEFAULT_TAG_STREAM.to_string(),
        }
    }
}

/// Where records for one endpoint are appended.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LogDestination {
    pub group: String,
    pub stream: String,
}

impl LogDestination {
    pub fn new(group: impl Into<String>, stream: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            stream: stream.into(),
        }
    }
}

impl std::fmt::Display for LogDestination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.group, self.stream)
    }
}

/// An endpoint linked to the queue that receives its new-log-object events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueBinding {
    pub endpoint: Endpoint,
    pub queue_arn: String,
    /// Group from the endpoint's tags. When absent the group is derived
    /// from each object's key at processing time.
    pub group: Option<String>,
    pub stream: String,
}

impl QueueBinding {
    /// Build a binding from a tagged endpoint, falling back to
    /// `<stream_prefix>-<endpoint id>` when no stream tag is present.
    pub fn from_tags(
        endpoint: Endpoint,
        queue_arn: impl Into<String>,
        tag_names: &TagNames,
        stream_prefix: &str,
    ) -> Self {
        let group = endpoint.tag(&tag_names.group).map(str::to_string);
        let stream = endpoint
            .tag(&tag_names.stream)
            .map(str::to_string)
            .unwrap_or_else(|| default_stream_name(stream_prefix, &endpoint.id));

        Self {
            endpoint,
            queue_arn: queue_arn.into(),
            group,
            stream,
        }
    }

    /// Resolve the destination for one log object.
    pub fn destination_for_key(&self, key: &str) -> LogDestination {
        let group = match &self.group {
            Some(group) => group.clone(),
            None => log_group_from_key(key),
        };
        LogDestination::new(group, self.stream.clone())
    }
}

pub fn default_stream_name(prefix: &str, endpoint_id: &str) -> String {
    format!("{}-{}", prefix, endpoint_id)
}
