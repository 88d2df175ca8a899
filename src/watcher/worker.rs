use super::envelope::{parse_envelope, EnvelopeError, ObjectRef};
use super::{ObjectError, ObjectStore, QueueClient, QueueMessage};
use crate::discovery::QueueBinding;
use crate::parser::{decompress, format_bytes, DecompressError, LogLines};
use crate::pusher::{BatchPusher, LogSink, PushError, PusherConfig};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("invalid message: {0}")]
    Envelope(#[from] EnvelopeError),

    #[error(transparent)]
    Download(#[from] ObjectError),

    #[error("failed to decompress {object}: {source}")]
    Decompress {
        object: String,
        #[source]
        source: DecompressError,
    },

    #[error(transparent)]
    Push(#[from] PushError),

    #[error("processing {object} exceeded {timeout:?}")]
    Timeout { object: String, timeout: Duration },
}

/// What a worker needs to process log objects for one binding.
#[derive(Clone)]
pub struct WorkerContext {
    pub binding: Arc<QueueBinding>,
    pub objects: Arc<dyn ObjectStore>,
    pub sink: Arc<dyn LogSink>,
    pub pusher: PusherConfig,
    /// Deadline for one object, unset means no deadline.
    pub object_timeout: Option<Duration>,
}

/// Outcome of shipping one log object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectReport {
    pub object: ObjectRef,
    pub bytes: usize,
    pub records: usize,
    /// Lines whose timestamp fell back to processing time.
    pub degraded: usize,
}

/// Download, parse and push one log object, flushing once at the end.
pub async fn process_object(ctx: &WorkerContext, object: &ObjectRef) -> Result<ObjectReport, WorkerError> {
    match ctx.object_timeout {
        Some(timeout) => tokio::time::timeout(timeout, ship_object(ctx, object))
            .await
            .map_err(|_| WorkerError::Timeout {
                object: object.to_string(),
                timeout,
            })?,
        None => ship_object(ctx, object).await,
    }
}

async fn ship_object(ctx: &WorkerContext, object: &ObjectRef) -> Result<ObjectReport, WorkerError> {
    let raw = ctx.objects.download(&object.bucket, &object.key).await?;
    info!(
        object = %object,
        size = %format_bytes(raw.len() as u64),
        "Downloaded log object"
    );

    let content = decompress(&raw).map_err(|source| WorkerError::Decompress {
        object: object.to_string(),
        source,
    })?;

    let destination = ctx.binding.destination_for_key(&object.key);
    let pusher = BatchPusher::connect(ctx.sink.clone(), destination, ctx.pusher).await?;

    let mut records = 0;
    let mut degraded = 0;
    for parsed in LogLines::new(&content) {
        if let Some(e) = &parsed.error {
            degraded += 1;
            debug!(object = %object, line = parsed.line_number, error = %e, "Using processing time for line");
        }
        pusher.add(parsed.record).await?;
        records += 1;
    }
    pusher.flush().await?;

    info!(
        object = %object,
        destination = %pusher.destination(),
        records,
        degraded,
        "Shipped log object"
    );

    Ok(ObjectReport {
        object: object.clone(),
        bytes: content.len(),
        records,
        degraded,
    })
}

/// Process every object referenced by a message body, stopping at the first
/// failure.
pub async fn process_message(ctx: &WorkerContext, body: &str) -> Result<Vec<ObjectReport>, WorkerError> {
    let objects = parse_envelope(body)?;
    if objects.is_empty() {
        debug!("Message references no log objects");
    }

    let mut reports = Vec::with_capacity(objects.len());
    for object in &objects {
        reports.push(process_object(ctx, object).await?);
    }
    Ok(reports)
}

/// Run one message through the pipeline and delete it from the queue.
///
/// On failure the message is deleted only when `delete_on_failure` is set,
/// otherwise it becomes visible again once its visibility timeout expires.
/// Returns whether processing succeeded.
pub async fn handle_message(
    ctx: &WorkerContext,
    queue: &dyn QueueClient,
    queue_url: &str,
    message: &QueueMessage,
    delete_on_failure: bool,
) -> bool {
    let succeeded = match process_message(ctx, &message.body).await {
        Ok(reports) => {
            let records: usize = reports.iter().map(|r| r.records).sum();
            debug!(objects = reports.len(), records, "Message processed");
            true
        }
        Err(e) => {
            error!(error = %e, "Failed to process message");
            false
        }
    };

    if !succeeded && !delete_on_failure {
        warn!("Leaving message on the queue for redelivery");
        return false;
    }
    if !succeeded {
        warn!("Deleting message after failure, its log object will not be shipped");
    }

    if let Err(e) = queue.delete(queue_url, &message.receipt_handle).await {
        error!(error = %e, "Failed to delete message");
    }

    succeeded
}
