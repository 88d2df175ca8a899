use super::{LogSink, SinkError};
use crate::discovery::LogDestination;
use crate::parser::LogRecord;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Per-event overhead the log store adds to the message size when sizing a
/// request.
pub const RECORD_OVERHEAD_BYTES: usize = 26;

/// Request size above which the log store rejects an append.
const MAX_REQUEST_BYTES: usize = 1_048_576;

#[derive(Debug, Error)]
pub enum PushError {
    #[error("failed to create log group {group}: {source}")]
    CreateGroup {
        group: String,
        #[source]
        source: SinkError,
    },

    #[error("failed to create log stream {destination}: {source}")]
    CreateStream {
        destination: LogDestination,
        #[source]
        source: SinkError,
    },

    #[error("failed to refresh sequence token for {destination}: {source}")]
    TokenRefresh {
        destination: LogDestination,
        #[source]
        source: SinkError,
    },

    #[error("failed to push {count} events to {destination}: {source}")]
    Put {
        destination: LogDestination,
        count: usize,
        #[source]
        source: SinkError,
    },

    #[error("gave up pushing {count} events to {destination} after {attempts} attempts: {last}")]
    RetriesExhausted {
        destination: LogDestination,
        count: usize,
        attempts: usize,
        last: SinkError,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PusherConfig {
    /// Number of buffered records that triggers a flush on the next add.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Append attempts per flush, counting the first one.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,
}

fn default_batch_size() -> usize {
    256
}

fn default_max_attempts() -> usize {
    3
}

impl Default for PusherConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            max_attempts: default_max_attempts(),
        }
    }
}

/// Everything a pusher mutates, guarded by one lock.
#[derive(Debug, Default)]
struct PushState {
    /// Records not yet appended, in arrival order until a flush sorts them.
    batch: Vec<LogRecord>,
    /// Sum of message lengths plus [`RECORD_OVERHEAD_BYTES`] per record.
    approx_bytes: usize,
    /// Append cursor adopted from the last successful or rejected append.
    sequence_token: Option<String>,
    flushes: u64,
}

/// Buffers records for one destination and appends them in batches.
///
/// `add` and `flush` share one lock, so appends from a pusher are totally
/// ordered and each one carries the token returned by the previous append.
pub struct BatchPusher {
    sink: Arc<dyn LogSink>,
    destination: LogDestination,
    config: PusherConfig,
    state: Mutex<PushState>,
}

impl BatchPusher {
    pub fn new(sink: Arc<dyn LogSink>, destination: LogDestination, config: PusherConfig) -> Self {
        Self {
            sink,
            destination,
            config: PusherConfig {
                batch_size: config.batch_size.max(1),
                max_attempts: config.max_attempts.max(1),
            },
            state: Mutex::new(PushState::default()),
        }
    }

    /// Create a pusher and make sure its group and stream exist.
    pub async fn connect(
        sink: Arc<dyn LogSink>,
        destination: LogDestination,
        config: PusherConfig,
    ) -> Result<Self, PushError> {
        let pusher = Self::new(sink, destination, config);
        pusher.ensure_destination().await?;
        Ok(pusher)
    }

    pub fn destination(&self) -> &LogDestination {
        &self.destination
    }

    /// Create the group, then the stream. Existing resources are fine.
    pub async fn ensure_destination(&self) -> Result<(), PushError> {
        let LogDestination { group, stream } = &self.destination;

        match self.sink.create_group(group).await {
            Ok(()) => debug!(group = %group, "Log group created"),
            Err(SinkError::AlreadyExists) => debug!(group = %group, "Log group already exists"),
            Err(source) => {
                return Err(PushError::CreateGroup {
                    group: group.clone(),
                    source,
                })
            }
        }

        match self.sink.create_stream(group, stream).await {
            Ok(()) => debug!(destination = %self.destination, "Log stream created"),
            Err(SinkError::AlreadyExists) => {
                debug!(destination = %self.destination, "Log stream already exists")
            }
            Err(source) => {
                return Err(PushError::CreateStream {
                    destination: self.destination.clone(),
                    source,
                })
            }
        }

        Ok(())
    }

    /// Buffer a record, flushing first when the batch is already full.
    ///
    /// If that flush fails the record is not buffered and the full batch is
    /// kept for the caller to retry or drop.
    pub async fn add(&self, record: LogRecord) -> Result<(), PushError> {
        let mut state = self.state.lock().await;

        if state.batch.len() >= self.config.batch_size {
            self.flush_locked(&mut state).await?;
        }

        state.approx_bytes += record.message.len() + RECORD_OVERHEAD_BYTES;
        state.batch.push(record);
        Ok(())
    }

    /// Append everything buffered. Does nothing when the batch is empty.
    pub async fn flush(&self) -> Result<(), PushError> {
        let mut state = self.state.lock().await;
        self.flush_locked(&mut state).await
    }

    /// Drop buffered records without appending them, returning how many were
    /// discarded.
    pub async fn discard(&self) -> usize {
        let mut state = self.state.lock().await;
        let count = state.batch.len();
        state.batch.clear();
        state.approx_bytes = 0;
        count
    }

    pub async fn buffered_len(&self) -> usize {
        self.state.lock().await.batch.len()
    }

    pub async fn approx_bytes(&self) -> usize {
        self.state.lock().await.approx_bytes
    }

    pub async fn flush_count(&self) -> u64 {
        self.state.lock().await.flushes
    }

    pub async fn sequence_token(&self) -> Option<String> {
        self.state.lock().await.sequence_token.clone()
    }

    async fn flush_locked(&self, state: &mut PushState) -> Result<(), PushError> {
        if state.batch.is_empty() {
            return Ok(());
        }

        // Stable: records sharing a timestamp keep their arrival order.
        state.batch.sort_by_key(|record| record.timestamp);

        if state.approx_bytes > MAX_REQUEST_BYTES {
            warn!(
                destination = %self.destination,
                approx_bytes = state.approx_bytes,
                "Batch exceeds the append request size limit"
            );
        }

        let LogDestination { group, stream } = &self.destination;
        let count = state.batch.len();
        let mut attempt = 0;

        loop {
            attempt += 1;
            let result = self
                .sink
                .put_events(group, stream, &state.batch, state.sequence_token.as_deref())
                .await;

            match result {
                Ok(next_token) => {
                    debug!(
                        destination = %self.destination,
                        count,
                        approx_bytes = state.approx_bytes,
                        attempt,
                        "Pushed events"
                    );
                    state.sequence_token = next_token;
                    state.batch.clear();
                    state.approx_bytes = 0;
                    state.flushes += 1;
                    return Ok(());
                }
                Err(
                    e @ (SinkError::InvalidSequenceToken { .. }
                    | SinkError::DataAlreadyAccepted { .. }),
                ) => {
                    if attempt >= self.config.max_attempts {
                        return Err(PushError::RetriesExhausted {
                            destination: self.destination.clone(),
                            count,
                            attempts: attempt,
                            last: e,
                        });
                    }

                    warn!(
                        destination = %self.destination,
                        attempt,
                        reason = %e,
                        "Refreshing sequence token"
                    );
                    state.sequence_token = match expected_token(&e) {
                        Some(token) => Some(token),
                        None => self
                            .sink
                            .sequence_token(group, stream)
                            .await
                            .map_err(|source| PushError::TokenRefresh {
                                destination: self.destination.clone(),
                                source,
                            })?,
                    };
                }
                Err(source) => {
                    return Err(PushError::Put {
                        destination: self.destination.clone(),
                        count,
                        source,
                    })
                }
            }
        }
    }
}

fn expected_token(error: &SinkError) -> Option<String> {
    match error {
        SinkError::InvalidSequenceToken { expected } | SinkError::DataAlreadyAccepted { expected } => {
            expected.clone()
        }
        _ => None,
    }
}
