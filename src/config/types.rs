use crate::aws::DEFAULT_REGION;
use crate::discovery::{TagNames, DEFAULT_STREAM_PREFIX, DEFAULT_TAG_GROUP, DEFAULT_TAG_STREAM};
use crate::pusher::PusherConfig;
use crate::watcher::WatcherConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub aws: AwsConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub watcher: WatcherConfig,
    #[serde(default)]
    pub pusher: PusherConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AwsConfig {
    #[serde(default = "default_region")]
    pub region: String,
}

fn default_region() -> String {
    DEFAULT_REGION.to_string()
}

impl Default for AwsConfig {
    fn default() -> Self {
        Self {
            region: default_region(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Tag whose value names the destination log group.
    #[serde(default = "default_tag_group")]
    pub tag_group: String,
    /// Tag whose value names the destination log stream.
    #[serde(default = "default_tag_stream")]
    pub tag_stream: String,
    /// Prefix of the stream name used when the stream tag is missing.
    #[serde(default = "default_stream_prefix")]
    pub stream_prefix: String,
}

fn default_tag_group() -> String {
    DEFAULT_TAG_GROUP.to_string()
}

fn default_tag_stream() -> String {
    DEFAULT_TAG_STREAM.to_string()
}

fn default_stream_prefix() -> String {
    DEFAULT_STREAM_PREFIX.to_string()
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            tag_group: default_tag_group(),
            tag_stream: default_tag_stream(),
            stream_prefix: default_stream_prefix(),
        }
    }
}

impl DiscoveryConfig {
    pub fn tag_names(&self) -> TagNames {
        TagNames {
            group: self.tag_group.clone(),
            stream: self.tag_stream.clone(),
        }
    }
}
