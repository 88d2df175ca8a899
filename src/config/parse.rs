use super::types::Config;
use crate::config::{expand_env_vars, resolve_config_path, unexpanded_vars};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Upper bound of a single receive long-poll.
const MAX_WAIT_TIME: Duration = Duration::from_secs(20);
/// Upper bound of events in one append request.
const MAX_BATCH_SIZE: usize = 10_000;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("invalid placeholder pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("validation failed:\n{}", .0.join("\n"))]
    ValidationList(Vec<String>),

    #[error("validation failed: {0}")]
    Validation(String),
}

pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let yaml_string = std::fs::read_to_string(path).map_err(|e| {
        ConfigError::Io(std::io::Error::new(
            e.kind(),
            format!("failed to read config file '{}': {}", path.display(), e),
        ))
    })?;

    let config = parse_config(&yaml_string).map_err(|e| match e {
        ConfigError::YamlParse(e) => ConfigError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("in file '{}': {}", path.display(), e),
        )),
        other => other,
    })?;

    debug!(path = %path.display(), "Loaded configuration");
    Ok(config)
}

/// Load the first config file found, or the built-in defaults when there
/// is none.
pub fn load_or_default(explicit: Option<&Path>) -> Result<Config, ConfigError> {
    match resolve_config_path(explicit) {
        Some(path) => load_config(&path),
        None => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
    }
}

/// Expand placeholders, parse and validate a YAML document.
pub fn parse_config(yaml: &str) -> Result<Config, ConfigError> {
    let yaml_string = expand_env_vars(yaml)?;
    check_unexpanded_vars(&yaml_string)?;

    // An empty or comment-only document means all defaults.
    let config: Config = if yaml_string.trim().is_empty() {
        Config::default()
    } else {
        match serde_yaml::from_str::<serde_yaml::Value>(&yaml_string)? {
            serde_yaml::Value::Null => Config::default(),
            value => serde_yaml::from_value(value)?,
        }
    };

    validate_config(&config)?;
    Ok(config)
}

/// Checks for unexpanded environment variables and returns a helpful error
fn check_unexpanded_vars(yaml_string: &str) -> Result<(), ConfigError> {
    let names = unexpanded_vars(yaml_string)?;
    if names.is_empty() {
        return Ok(());
    }

    let error_msg = if names.len() == 1 {
        format!(
            "Environment variable $env{{{0}}} is not set.\n\
             \n\
             To fix this, either:\n\
             1. Set the environment variable: export {0}=...\n\
             2. Replace $env{{{0}}} in the config file with a literal value",
            names[0]
        )
    } else {
        format!(
            "Environment variables are not set: {}\n\
             \n\
             Set them or replace the placeholders in the config file with literal values",
            names.join(", ")
        )
    };

    Err(ConfigError::Validation(error_msg))
}

pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let mut errors = Vec::new();

    if config.aws.region.trim().is_empty() {
        errors.push("aws.region cannot be empty".to_string());
    }

    let discovery = &config.discovery;
    if discovery.tag_group.is_empty() {
        errors.push("discovery.tag_group cannot be empty".to_string());
    }
    if discovery.tag_stream.is_empty() {
        errors.push("discovery.tag_stream cannot be empty".to_string());
    }
    if discovery.stream_prefix.is_empty() {
        errors.push("discovery.stream_prefix cannot be empty".to_string());
    }

    let watcher = &config.watcher;
    if !(1..=10).contains(&watcher.max_messages) {
        errors.push(format!(
            "watcher.max_messages must be between 1 and 10, got {}",
            watcher.max_messages
        ));
    }
    if watcher.wait_time > MAX_WAIT_TIME {
        errors.push(format!(
            "watcher.wait_time must be at most {}s, got {:?}",
            MAX_WAIT_TIME.as_secs(),
            watcher.wait_time
        ));
    }
    if watcher.max_in_flight == 0 {
        errors.push("watcher.max_in_flight must be at least 1".to_string());
    }
    if watcher.object_timeout == Some(Duration::ZERO) {
        errors.push("watcher.object_timeout must be positive when set".to_string());
    }
    if watcher.backoff.initial > watcher.backoff.max {
        errors.push(format!(
            "watcher.backoff.initial ({:?}) cannot exceed watcher.backoff.max ({:?})",
            watcher.backoff.initial, watcher.backoff.max
        ));
    }

    let pusher = &config.pusher;
    if !(1..=MAX_BATCH_SIZE).contains(&pusher.batch_size) {
        errors.push(format!(
            "pusher.batch_size must be between 1 and {}, got {}",
            MAX_BATCH_SIZE, pusher.batch_size
        ));
    }
    if pusher.max_attempts == 0 {
        errors.push("pusher.max_attempts must be at least 1".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationList(errors))
    }
}
