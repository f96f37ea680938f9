//! Worker pools competing on one delivery stream per queue.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use event_schema::TYPE_ID_HEADER;
use futures::{FutureExt, StreamExt};
use lapin::{
    message::Delivery,
    options::{BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicQosOptions},
    types::{AMQPValue, FieldTable},
    Channel, Connection, Consumer,
};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::dispatcher::{Dispatcher, Envelope, Outcome};
use crate::error::SyncError;

/// Entry point for starting a queue's workers.
pub struct ConsumerGroup;

impl ConsumerGroup {
    /// Open a channel on `queue` with prefetch `2 * worker_count` and manual acks, then spawn
    /// `worker_count` workers into `tasks`.
    ///
    /// Workers leave their loop when the shutdown flag flips to `true` or the delivery
    /// stream ends because the connection closed.
    pub async fn start(
        connection: &Connection,
        queue: &str,
        worker_count: usize,
        dispatcher: Arc<Dispatcher>,
        shutdown_rx: watch::Receiver<bool>,
        tasks: &mut JoinSet<()>,
    ) -> Result<(), SyncError> {
        let worker_count = worker_count.max(1);
        let channel = connection.create_channel().await?;

        channel
            .basic_qos(prefetch_for(worker_count), BasicQosOptions::default())
            .await?;

        let consumer_tag = format!("sync-service.{queue}");
        let consumer = channel
            .basic_consume(
                queue,
                &consumer_tag,
                BasicConsumeOptions {
                    no_ack: false,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;

        let stream = Arc::new(Mutex::new(consumer));
        for id in 0..worker_count {
            let worker = Worker {
                id,
                queue: queue.to_string(),
                channel: channel.clone(),
                stream: stream.clone(),
                dispatcher: dispatcher.clone(),
                shutdown_rx: shutdown_rx.clone(),
            };
            tasks.spawn(worker.run());
        }

        info!(
            queue,
            workers = worker_count,
            prefetch = prefetch_for(worker_count),
            "Consumer group started"
        );
        Ok(())
    }
}

fn prefetch_for(worker_count: usize) -> u16 {
    u16::try_from(worker_count.saturating_mul(2)).unwrap_or(u16::MAX)
}

struct Worker {
    id: usize,
    queue: String,
    channel: Channel,
    stream: Arc<Mutex<Consumer>>,
    dispatcher: Arc<Dispatcher>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Worker {
    async fn run(self) {
        let Worker {
            id,
            queue,
            channel,
            stream,
            dispatcher,
            mut shutdown_rx,
        } = self;

        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            let next = tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                    continue;
                }
                next = async { stream.lock().await.next().await } => next,
            };

            let delivery = match next {
                Some(Ok(delivery)) => delivery,
                Some(Err(err)) => {
                    error!(queue = %queue, worker = id, error = %err, "Delivery stream failed");
                    break;
                }
                None => {
                    debug!(queue = %queue, worker = id, "Delivery stream closed");
                    break;
                }
            };

            let envelope = envelope_from(&delivery);
            let outcome = process(&dispatcher, &envelope).await;
            acknowledge(&channel, &queue, envelope.delivery_tag, outcome).await;
        }

        debug!(queue = %queue, worker = id, "Worker stopped");
    }
}

/// Dispatch one delivery. A panicking handler is logged and turned into a Nack so the
/// worker keeps consuming.
pub async fn process(dispatcher: &Dispatcher, envelope: &Envelope) -> Outcome {
    let queue = dispatcher.queue();
    match AssertUnwindSafe(dispatcher.dispatch(envelope))
        .catch_unwind()
        .await
    {
        Ok(outcome) => outcome,
        Err(panic) => {
            error!(
                queue,
                delivery_tag = envelope.delivery_tag,
                type_id = envelope.type_id.as_deref().unwrap_or("-"),
                panic = %panic_message(panic.as_ref()),
                "Handler panicked, dead-lettering event"
            );
            Outcome::Nack
        }
    }
}

async fn acknowledge(channel: &Channel, queue: &str, delivery_tag: u64, outcome: Outcome) {
    let result = match outcome {
        Outcome::Ack => {
            channel
                .basic_ack(delivery_tag, BasicAckOptions::default())
                .await
        }
        Outcome::Nack => {
            channel
                .basic_nack(
                    delivery_tag,
                    BasicNackOptions {
                        requeue: false,
                        ..Default::default()
                    },
                )
                .await
        }
    };

    // The broker redelivers unacknowledged messages once the channel goes away.
    if let Err(err) = result {
        warn!(queue, delivery_tag, outcome = ?outcome, error = %err, "Failed to acknowledge delivery");
    }
}

/// Broker-independent envelope for a delivery.
pub fn envelope_from(delivery: &Delivery) -> Envelope {
    Envelope {
        type_id: type_header(delivery.properties.headers().as_ref()),
        body: delivery.data.clone(),
        delivery_tag: delivery.delivery_tag,
    }
}

/// String value of the type header. Non-string values count as missing.
pub fn type_header(headers: Option<&FieldTable>) -> Option<String> {
    headers?
        .inner()
        .iter()
        .find(|(key, _)| key.as_str() == TYPE_ID_HEADER)
        .and_then(|(_, value)| match value {
            AMQPValue::LongString(s) => Some(s.to_string()),
            AMQPValue::ShortString(s) => Some(s.as_str().to_string()),
            _ => None,
        })
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
