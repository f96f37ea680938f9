//! Sync service
//!
//! Consumes domain events from RabbitMQ and keeps MongoDB (source of truth), the
//! Elasticsearch content index and the audit/search-history sinks consistent with them.
//!
//! Delivery is at-least-once. Every handler converges on a target state, so redelivered
//! or reordered events are harmless.

pub mod broker;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod handlers;
pub mod infra;
pub mod metrics;
pub mod search;
pub mod store;

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::broker::{declare_topology, ConsumerGroup};
use crate::config::Config;
use crate::dispatcher::{Dispatcher, RetryPolicy};
use crate::error::SyncError;
use crate::infra::Infra;

pub use crate::error::{IndexError, StoreError};

/// Declare the broker topology and start one consumer group per queue.
///
/// Workers are spawned into `tasks` and stop when `shutdown_rx` turns `true`.
pub async fn start_consumers(
    infra: &Infra,
    config: &Config,
    shutdown_rx: watch::Receiver<bool>,
    tasks: &mut JoinSet<()>,
) -> Result<(), SyncError> {
    let topology = config.topology();

    let setup_channel = infra.broker.create_channel().await?;
    declare_topology(&setup_channel, &topology).await?;
    if let Err(err) = setup_channel.close(200, "Topology declared").await {
        warn!(error = %err, "Failed to close topology channel");
    }

    let ctx = infra.handler_context(config);
    let retry = RetryPolicy::new(config.sync.max_attempts, config.sync.retry_backoff);

    for queue in &topology.queues {
        let handler = handlers::handler_for(queue.route, ctx.clone());
        let dispatcher = Arc::new(Dispatcher::new(&queue.name, handler, retry));
        ConsumerGroup::start(
            &infra.broker,
            &queue.name,
            queue.workers,
            dispatcher,
            shutdown_rx.clone(),
            tasks,
        )
        .await?;
    }

    info!(queues = topology.queues.len(), "All consumer groups started");
    Ok(())
}
