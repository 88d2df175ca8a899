use crate::aws::AwsClients;
use crate::config::Config;
use crate::discovery::{
    default_stream_name, discover, resolve_queue, DiscoveryError, Endpoint, QueueBinding,
};
use crate::watcher::{WatchClients, WatchSummary, Watcher};
use std::sync::Arc;
use thiserror::Error;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum RunError {
    #[error("discovery error: {0}")]
    Discovery(#[from] DiscoveryError),

    #[error("failed to render output: {0}")]
    Json(#[from] serde_json::Error),

    #[error("no distributions to watch")]
    NothingToWatch,

    #[error("all {0} watchers failed to start")]
    AllWatchersFailed(usize),
}

/// A single distribution named on the command line.
#[derive(Debug, Clone)]
pub struct WatchTarget {
    pub distribution: String,
    /// Derived from each object key when unset.
    pub group: Option<String>,
    /// Defaults to `<stream_prefix>-<distribution>`.
    pub stream: Option<String>,
}

fn watch_clients(clients: &AwsClients) -> WatchClients {
    WatchClients {
        queue: clients.queue.clone(),
        objects: clients.buckets.clone(),
        sink: clients.sink.clone(),
    }
}

fn build_watchers(bindings: Vec<QueueBinding>, clients: &AwsClients, config: &Config) -> Vec<Watcher> {
    bindings
        .into_iter()
        .map(|binding| {
            Watcher::new(
                binding,
                watch_clients(clients),
                config.watcher.clone(),
                config.pusher,
            )
        })
        .collect()
}

/// Discover every tagged distribution and watch all of their queues.
pub async fn discover_watch(config: &Config) -> Result<(), RunError> {
    let clients = AwsClients::connect(&config.aws.region).await;
    let bindings = discover(
        clients.catalog.as_ref(),
        clients.buckets.as_ref(),
        &config.discovery.tag_names(),
        &config.discovery.stream_prefix,
    )
    .await?;
    info!(count = bindings.len(), "Discovery complete");

    supervise(build_watchers(bindings, &clients, config)).await
}

/// Watch one explicitly named distribution without tag discovery.
pub async fn watch_distribution(config: &Config, target: WatchTarget) -> Result<(), RunError> {
    let clients = AwsClients::connect(&config.aws.region).await;
    let queue_arn = resolve_queue(
        clients.catalog.as_ref(),
        clients.buckets.as_ref(),
        &target.distribution,
    )
    .await?;

    let stream = target
        .stream
        .unwrap_or_else(|| default_stream_name(&config.discovery.stream_prefix, &target.distribution));
    let binding = QueueBinding {
        endpoint: Endpoint::new(target.distribution),
        queue_arn,
        group: target.group,
        stream,
    };

    supervise(build_watchers(vec![binding], &clients, config)).await
}

/// Run each watcher on its own task until they all stop or Ctrl+C is
/// pressed, in which case polling stops and in-flight messages finish.
pub async fn supervise(watchers: Vec<Watcher>) -> Result<(), RunError> {
    if watchers.is_empty() {
        warn!("Nothing to watch, no distribution resolved to a queue");
        return Err(RunError::NothingToWatch);
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let total = watchers.len();

    let handles: Vec<_> = watchers
        .into_iter()
        .map(|watcher| {
            let watcher = Arc::new(watcher);
            let rx = shutdown_rx.clone();
            tokio::spawn(async move {
                let endpoint = watcher.binding().endpoint.id.clone();
                (endpoint, watcher.run(Some(rx)).await)
            })
        })
        .collect();

    info!(watchers = total, "Watching, press Ctrl+C to shutdown");

    let all = futures::future::join_all(handles);
    tokio::pin!(all);

    let results = tokio::select! {
        results = &mut all => results,
        _ = signal::ctrl_c() => {
            info!("Shutdown signal received");
            let _ = shutdown_tx.send(true);
            all.await
        }
    };

    let mut failed = 0;
    let mut totals = WatchSummary::default();
    for result in results {
        match result {
            Ok((endpoint, Ok(summary))) => {
                info!(endpoint = %endpoint, messages = summary.messages, failed = summary.failed, "Watcher stopped");
                totals.messages += summary.messages;
                totals.succeeded += summary.succeeded;
                totals.failed += summary.failed;
            }
            Ok((endpoint, Err(e))) => {
                failed += 1;
                error!(endpoint = %endpoint, error = %e, "Watcher failed");
            }
            Err(e) => {
                failed += 1;
                error!(error = %e, "Watcher task join error");
            }
        }
    }

    info!(
        messages = totals.messages,
        succeeded = totals.succeeded,
        failed = totals.failed,
        "Shutdown complete"
    );

    if failed == total {
        return Err(RunError::AllWatchersFailed(total));
    }
    Ok(())
}
