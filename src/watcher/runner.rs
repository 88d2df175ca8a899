use super::worker::{handle_message, WorkerContext};
use super::{ObjectStore, QueueArn, QueueClient, QueueError};
use crate::discovery::QueueBinding;
use crate::pusher::{LogSink, PusherConfig};
use serde::{Deserialize, Serialize};
use std::future::pending;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{watch, Semaphore};
use tokio_util::task::TaskTracker;
use tracing::{debug, info, info_span, warn, Instrument};

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("cannot watch queue: {0}")]
    Queue(#[from] QueueError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// Delay after the first failed or empty poll. Zero polls again at once.
    #[serde(default, with = "humantime_serde")]
    pub initial: Duration,
    #[serde(default = "default_backoff_max", with = "humantime_serde")]
    pub max: Duration,
}

fn default_backoff_max() -> Duration {
    Duration::from_secs(60)
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial: Duration::ZERO,
            max: default_backoff_max(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatcherConfig {
    #[serde(default = "default_max_messages")]
    pub max_messages: i32,
    #[serde(default = "default_wait_time", with = "humantime_serde")]
    pub wait_time: Duration,
    /// Workers allowed to run at once per watcher.
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
    #[serde(default = "default_delete_on_failure")]
    pub delete_on_failure: bool,
    #[serde(default, with = "humantime_serde")]
    pub object_timeout: Option<Duration>,
    #[serde(default)]
    pub backoff: BackoffConfig,
}

fn default_max_messages() -> i32 {
    10
}

fn default_wait_time() -> Duration {
    Duration::from_secs(20)
}

fn default_max_in_flight() -> usize {
    32
}

fn default_delete_on_failure() -> bool {
    true
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            max_messages: default_max_messages(),
            wait_time: default_wait_time(),
            max_in_flight: default_max_in_flight(),
            delete_on_failure: default_delete_on_failure(),
            object_timeout: None,
            backoff: BackoffConfig::default(),
        }
    }
}

/// Capped exponential delay between unproductive polls.
#[derive(Debug, Clone)]
pub struct Backoff {
    config: BackoffConfig,
    current: Duration,
}

impl Backoff {
    pub fn new(config: BackoffConfig) -> Self {
        Self {
            config,
            current: config.initial.min(config.max),
        }
    }

    /// Delay to wait now. Doubles the next one, up to the cap.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = std::cmp::min(self.current * 2, self.config.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.config.initial.min(self.config.max);
    }
}

/// Clients a watcher talks to.
#[derive(Clone)]
pub struct WatchClients {
    pub queue: Arc<dyn QueueClient>,
    pub objects: Arc<dyn ObjectStore>,
    pub sink: Arc<dyn LogSink>,
}

/// Counters accumulated over one watcher run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatchSummary {
    pub polls: u64,
    pub failed_polls: u64,
    pub messages: u64,
    pub succeeded: u64,
    pub failed: u64,
}

#[derive(Debug, Default)]
struct WatchStats {
    polls: AtomicU64,
    failed_polls: AtomicU64,
    messages: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
}

impl WatchStats {
    fn summary(&self) -> WatchSummary {
        WatchSummary {
            polls: self.polls.load(Ordering::Relaxed),
            failed_polls: self.failed_polls.load(Ordering::Relaxed),
            messages: self.messages.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Long-polls the queue of one binding and dispatches a worker per message.
pub struct Watcher {
    binding: Arc<QueueBinding>,
    clients: WatchClients,
    config: WatcherConfig,
    pusher: PusherConfig,
    tracker: TaskTracker,
    permits: Arc<Semaphore>,
    stats: Arc<WatchStats>,
}

impl Watcher {
    pub fn new(binding: QueueBinding, clients: WatchClients, config: WatcherConfig, pusher: PusherConfig) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_in_flight.max(1)));
        Self {
            binding: Arc::new(binding),
            clients,
            config,
            pusher,
            tracker: TaskTracker::new(),
            permits,
            stats: Arc::new(WatchStats::default()),
        }
    }

    pub fn binding(&self) -> &QueueBinding {
        &self.binding
    }

    /// Workers dispatched and not yet finished.
    pub fn outstanding(&self) -> usize {
        self.tracker.len()
    }

    pub fn summary(&self) -> WatchSummary {
        self.stats.summary()
    }

    /// Poll until `shutdown` turns true, then wait for outstanding workers.
    ///
    /// Fails only when the queue address cannot be resolved. Poll errors
    /// and empty polls are logged and followed by the configured backoff.
    pub async fn run(&self, shutdown: Option<watch::Receiver<bool>>) -> Result<WatchSummary, WatchError> {
        let span = info_span!("watcher", endpoint = %self.binding.endpoint.id);
        self.run_inner(shutdown).instrument(span).await
    }

    async fn run_inner(&self, shutdown: Option<watch::Receiver<bool>>) -> Result<WatchSummary, WatchError> {
        let arn = QueueArn::parse(&self.binding.queue_arn)?;
        let queue_url = self.clients.queue.resolve_queue_url(&arn).await?;
        info!(queue = %queue_url, "Watching queue");

        let mut shutdown = shutdown;
        let mut backoff = Backoff::new(self.config.backoff);

        loop {
            if shutdown.as_ref().map(|rx| *rx.borrow()).unwrap_or(false) {
                break;
            }

            let received = tokio::select! {
                _ = shutdown_signal(&mut shutdown) => break,
                result = self.clients.queue.receive(&queue_url, self.config.max_messages, self.config.wait_time) => result,
            };
            self.stats.polls.fetch_add(1, Ordering::Relaxed);

            let messages = match received {
                Ok(messages) if !messages.is_empty() => messages,
                Ok(_) => {
                    debug!("No messages received");
                    if pause(backoff.next_delay(), &mut shutdown).await {
                        break;
                    }
                    continue;
                }
                Err(e) => {
                    self.stats.failed_polls.fetch_add(1, Ordering::Relaxed);
                    warn!(error = %e, "Failed to poll queue");
                    if pause(backoff.next_delay(), &mut shutdown).await {
                        break;
                    }
                    continue;
                }
            };

            backoff.reset();
            debug!(count = messages.len(), "Received messages");

            let mut stopping = false;
            for message in messages {
                // Undispatched messages stay on the queue and reappear after
                // their visibility timeout.
                let permit = tokio::select! {
                    _ = shutdown_signal(&mut shutdown) => {
                        stopping = true;
                        break;
                    }
                    permit = self.permits.clone().acquire_owned() => permit,
                };
                // The semaphore is never closed, so acquiring only waits.
                let Ok(permit) = permit else {
                    break;
                };
                self.stats.messages.fetch_add(1, Ordering::Relaxed);

                let ctx = WorkerContext {
                    binding: self.binding.clone(),
                    objects: self.clients.objects.clone(),
                    sink: self.clients.sink.clone(),
                    pusher: self.pusher,
                    object_timeout: self.config.object_timeout,
                };
                let queue = self.clients.queue.clone();
                let queue_url = queue_url.clone();
                let delete_on_failure = self.config.delete_on_failure;
                let stats = self.stats.clone();
                let span = info_span!("message", id = %message.id);

                self.tracker.spawn(
                    async move {
                        let _permit = permit;
                        let ok = handle_message(&ctx, queue.as_ref(), &queue_url, &message, delete_on_failure).await;
                        let counter = if ok { &stats.succeeded } else { &stats.failed };
                        counter.fetch_add(1, Ordering::Relaxed);
                    }
                    .instrument(span),
                );
            }

            if stopping {
                info!("Shutdown requested while waiting for a free worker");
                break;
            }
        }

        info!(outstanding = self.tracker.len(), "Stopped polling, waiting for workers");
        self.tracker.close();
        self.tracker.wait().await;

        let summary = self.stats.summary();
        info!(
            messages = summary.messages,
            succeeded = summary.succeeded,
            failed = summary.failed,
            "Watcher finished"
        );
        Ok(summary)
    }
}

/// Resolves once shutdown is requested. Never resolves without a receiver
/// or after the sender is gone.
async fn shutdown_signal(shutdown: &mut Option<watch::Receiver<bool>>) {
    if let Some(rx) = shutdown {
        let stopped = rx.wait_for(|&stop| stop).await.is_ok();
        if stopped {
            return;
        }
    }
    pending::<()>().await
}

/// Sleep for `delay` unless shutdown comes first. Returns true on shutdown.
async fn pause(delay: Duration, shutdown: &mut Option<watch::Receiver<bool>>) -> bool {
    if delay.is_zero() {
        return false;
    }
    debug!(delay_ms = delay.as_millis() as u64, "Backing off before next poll");
    tokio::select! {
        _ = shutdown_signal(shutdown) => true,
        _ = tokio::time::sleep(delay) => false,
    }
}
