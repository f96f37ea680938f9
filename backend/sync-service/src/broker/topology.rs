//! Exchange, dead-letter and queue declarations.
//!
//! Every declaration is idempotent, so repeated startups against the same broker are safe.
//! A failure here is fatal: the caller propagates it and the process exits.

use lapin::{
    options::{ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions},
    types::{AMQPValue, FieldTable},
    Channel, ExchangeKind,
};
use tracing::{debug, info};

use crate::error::SyncError;

/// Queue argument naming the exchange that receives rejected deliveries.
pub const DEAD_LETTER_EXCHANGE_ARG: &str = "x-dead-letter-exchange";

/// Which handler owns a queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueRoute {
    AuditLog,
    SearchHistory,
    IndexSync,
    UserPropagation,
}

#[derive(Debug, Clone)]
pub struct QueueSpec {
    pub name: String,
    pub bindings: Vec<String>,
    pub route: QueueRoute,
    pub workers: usize,
}

#[derive(Debug, Clone)]
pub struct TopologyConfig {
    pub exchange: String,
    pub dlx_exchange: String,
    pub dead_letter_queue: String,
    pub queues: Vec<QueueSpec>,
}

impl TopologyConfig {
    /// Arguments every consumed queue is declared with.
    pub fn queue_arguments(&self) -> FieldTable {
        let mut args = FieldTable::default();
        args.insert(
            DEAD_LETTER_EXCHANGE_ARG.to_string().into(),
            AMQPValue::LongString(self.dlx_exchange.clone().into()),
        );
        args
    }
}

pub async fn declare_topology(channel: &Channel, topology: &TopologyConfig) -> Result<(), SyncError> {
    let durable_exchange = ExchangeDeclareOptions {
        durable: true,
        ..Default::default()
    };
    let durable_queue = QueueDeclareOptions {
        durable: true,
        ..Default::default()
    };

    for exchange in [&topology.exchange, &topology.dlx_exchange] {
        channel
            .exchange_declare(
                exchange,
                ExchangeKind::Topic,
                durable_exchange,
                FieldTable::default(),
            )
            .await?;
        debug!(exchange = %exchange, "Exchange declared");
    }

    channel
        .queue_declare(&topology.dead_letter_queue, durable_queue, FieldTable::default())
        .await?;
    channel
        .queue_bind(
            &topology.dead_letter_queue,
            &topology.dlx_exchange,
            "#",
            QueueBindOptions::default(),
            FieldTable::default(),
        )
        .await?;
    debug!(queue = %topology.dead_letter_queue, "Dead-letter queue declared");

    for queue in &topology.queues {
        channel
            .queue_declare(&queue.name, durable_queue, topology.queue_arguments())
            .await?;

        for routing_key in &queue.bindings {
            channel
                .queue_bind(
                    &queue.name,
                    &topology.exchange,
                    routing_key,
                    QueueBindOptions::default(),
                    FieldTable::default(),
                )
                .await?;
            debug!(
                queue = %queue.name,
                exchange = %topology.exchange,
                routing_key = %routing_key,
                "Queue bound to exchange"
            );
        }
    }

    info!(
        exchange = %topology.exchange,
        dlx = %topology.dlx_exchange,
        queues = topology.queues.len(),
        "Broker topology declared"
    );
    Ok(())
}
