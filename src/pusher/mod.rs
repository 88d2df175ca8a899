//! Batched appends to a log group/stream.

pub mod batch;

pub use batch::{BatchPusher, PushError, PusherConfig, RECORD_OVERHEAD_BYTES};

use crate::parser::LogRecord;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SinkError {
    #[error("resource already exists")]
    AlreadyExists,

    #[error("invalid sequence token, expected {expected:?}")]
    InvalidSequenceToken { expected: Option<String> },

    #[error("data already accepted, expected sequence token {expected:?}")]
    DataAlreadyAccepted { expected: Option<String> },

    #[error("log stream {group}:{stream} not found")]
    StreamNotFound { group: String, stream: String },

    #[error("{0}")]
    Service(String),
}

/// Write access to the log store.
#[async_trait]
pub trait LogSink: Send + Sync {
    /// Create a log group. Fails with [`SinkError::AlreadyExists`] if present.
    async fn create_group(&self, group: &str) -> Result<(), SinkError>;

    /// Create a log stream. Fails with [`SinkError::AlreadyExists`] if present.
    async fn create_stream(&self, group: &str, stream: &str) -> Result<(), SinkError>;

    /// Append records in the given order and return the next sequence token.
    async fn put_events(
        &self,
        group: &str,
        stream: &str,
        records: &[LogRecord],
        sequence_token: Option<&str>,
    ) -> Result<Option<String>, SinkError>;

    /// Current append cursor of a stream.
    async fn sequence_token(&self, group: &str, stream: &str) -> Result<Option<String>, SinkError>;
}
