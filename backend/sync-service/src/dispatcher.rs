//! Per-delivery decode and routing.
//!
//! The dispatcher and the worker loop are the only places that turn results into broker
//! acknowledgements. Handlers just return `Ok` or `Err`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use event_schema::{DomainEvent, EventKind};
use tracing::{debug, error, warn};

use crate::error::SyncError;
use crate::handlers::EventHandler;
use crate::metrics;

const MAX_BACKOFF: Duration = Duration::from_secs(5);

/// Broker-independent view of one delivery.
#[derive(Debug, Clone)]
pub struct Envelope {
    /// Value of the `__TypeId__` header, if present and string-valued
    pub type_id: Option<String>,
    pub body: Vec<u8>,
    pub delivery_tag: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Done, or permanently undeliverable: drop.
    Ack,
    /// Failed: reject without requeue so the broker dead-letters it.
    Nack,
}

/// In-process retries for transient handler failures before dead-lettering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    /// Single attempt, no retry.
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Exponential delay after the given failed attempt (1-based), capped at five seconds.
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        self.backoff.saturating_mul(factor).min(MAX_BACKOFF)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(200))
    }
}

pub struct Dispatcher {
    queue: String,
    handler: Arc<dyn EventHandler>,
    retry: RetryPolicy,
}

impl Dispatcher {
    pub fn new(queue: impl Into<String>, handler: Arc<dyn EventHandler>, retry: RetryPolicy) -> Self {
        Self {
            queue: queue.into(),
            handler,
            retry,
        }
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    pub async fn dispatch(&self, envelope: &Envelope) -> Outcome {
        let queue = self.queue.as_str();
        let delivery_tag = envelope.delivery_tag;

        let Some(type_id) = envelope
            .type_id
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
        else {
            warn!(queue, delivery_tag, "Dropping delivery without type header");
            metrics::record_event(queue, "unknown", "dropped_malformed");
            return Outcome::Ack;
        };

        let Some(kind) = EventKind::from_type_id(type_id) else {
            debug!(queue, delivery_tag, type_id, "Dropping unknown event kind");
            metrics::record_event(queue, "unknown", "dropped_unknown");
            return Outcome::Ack;
        };

        if !self.handler.accepts(kind) {
            debug!(
                queue,
                delivery_tag,
                event_kind = %kind,
                handler = self.handler.name(),
                "Event kind not handled on this queue"
            );
            metrics::record_event(queue, kind.as_str(), "skipped");
            return Outcome::Ack;
        }

        let event = match DomainEvent::decode(kind, &envelope.body) {
            Ok(event) => event,
            Err(err) => {
                warn!(
                    queue,
                    delivery_tag,
                    event_kind = %kind,
                    error = %err,
                    "Dropping undecodable event body"
                );
                metrics::record_event(queue, kind.as_str(), "dropped_undecodable");
                return Outcome::Ack;
            }
        };

        let started = Instant::now();
        let result = self.handle_with_retry(&event, delivery_tag).await;
        metrics::observe_handler(queue, kind.as_str(), started.elapsed());

        match result {
            Ok(()) => {
                metrics::record_event(queue, kind.as_str(), "ack");
                Outcome::Ack
            }
            Err(err) => {
                error!(
                    queue,
                    delivery_tag,
                    event_kind = %kind,
                    handler = self.handler.name(),
                    transient = err.is_transient(),
                    error = %err,
                    "Handler failed, dead-lettering event"
                );
                metrics::record_event(queue, kind.as_str(), "nack");
                Outcome::Nack
            }
        }
    }

    async fn handle_with_retry(&self, event: &DomainEvent, delivery_tag: u64) -> Result<(), SyncError> {
        let mut attempt = 1;
        loop {
            match self.handler.handle(event).await {
                Ok(()) => return Ok(()),
                Err(err) if err.is_transient() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.delay(attempt);
                    warn!(
                        queue = %self.queue,
                        delivery_tag,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Transient handler failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{IndexError, StoreError};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Accepts deletes only; fails the first `failures` calls with `error`.
    struct ScriptedHandler {
        calls: AtomicUsize,
        failures: usize,
        transient: bool,
    }

    impl ScriptedHandler {
        fn new(failures: usize, transient: bool) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                failures,
                transient,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl EventHandler for ScriptedHandler {
        fn name(&self) -> &'static str {
            "scripted"
        }

        fn accepts(&self, kind: EventKind) -> bool {
            kind == EventKind::ContentDeleted
        }

        async fn handle(&self, _event: &DomainEvent) -> Result<(), SyncError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call >= self.failures {
                return Ok(());
            }
            if self.transient {
                Err(StoreError::Unavailable("connection reset".into()).into())
            } else {
                Err(IndexError::Status {
                    status: 400,
                    body: "bad request".into(),
                }
                .into())
            }
        }
    }

    fn envelope(type_id: Option<&str>, body: &str) -> Envelope {
        Envelope {
            type_id: type_id.map(str::to_string),
            body: body.as_bytes().to_vec(),
            delivery_tag: 1,
        }
    }

    fn dispatcher(handler: Arc<ScriptedHandler>, attempts: u32) -> Dispatcher {
        Dispatcher::new(
            "test.queue",
            handler,
            RetryPolicy::new(attempts, Duration::ZERO),
        )
    }

    #[tokio::test]
    async fn test_missing_header_is_acked_without_handler() {
        let handler = ScriptedHandler::new(0, false);
        let dispatcher = dispatcher(handler.clone(), 1);
        assert_eq!(dispatcher.dispatch(&envelope(None, "{}")).await, Outcome::Ack);
        assert_eq!(dispatcher.dispatch(&envelope(Some("  "), "{}")).await, Outcome::Ack);
        assert_eq!(handler.calls(), 0);
    }

    #[tokio::test]
    async fn test_unknown_and_foreign_kinds_are_acked() {
        let handler = ScriptedHandler::new(0, false);
        let dispatcher = dispatcher(handler.clone(), 1);
        let unknown = envelope(Some("com.acme.PostPinnedEvent"), r#"{"postId":"p1"}"#);
        let foreign = envelope(Some("com.acme.UserSearchEvent"), r#"{"userId":1}"#);
        assert_eq!(dispatcher.dispatch(&unknown).await, Outcome::Ack);
        assert_eq!(dispatcher.dispatch(&foreign).await, Outcome::Ack);
        assert_eq!(handler.calls(), 0);
    }

    #[tokio::test]
    async fn test_undecodable_body_is_acked() {
        let handler = ScriptedHandler::new(0, false);
        let dispatcher = dispatcher(handler.clone(), 1);
        let broken = envelope(Some("a.PostDeleteEvent"), "{not json");
        assert_eq!(dispatcher.dispatch(&broken).await, Outcome::Ack);
        assert_eq!(handler.calls(), 0);
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried_then_acked() {
        let handler = ScriptedHandler::new(2, true);
        let dispatcher = dispatcher(handler.clone(), 3);
        let delete = envelope(Some("a.PostDeleteEvent"), r#"{"postId":"p1"}"#);
        assert_eq!(dispatcher.dispatch(&delete).await, Outcome::Ack);
        assert_eq!(handler.calls(), 3);
    }

    #[tokio::test]
    async fn test_retries_exhausted_is_nacked() {
        let handler = ScriptedHandler::new(10, true);
        let dispatcher = dispatcher(handler.clone(), 3);
        let delete = envelope(Some("a.PostDeleteEvent"), r#"{"postId":"p1"}"#);
        assert_eq!(dispatcher.dispatch(&delete).await, Outcome::Nack);
        assert_eq!(handler.calls(), 3);
    }

    #[tokio::test]
    async fn test_permanent_failure_is_not_retried() {
        let handler = ScriptedHandler::new(1, false);
        let dispatcher = dispatcher(handler.clone(), 3);
        let delete = envelope(Some("a.PostDeleteEvent"), r#"{"postId":"p1"}"#);
        assert_eq!(dispatcher.dispatch(&delete).await, Outcome::Nack);
        assert_eq!(handler.calls(), 1);
    }

    #[test]
    fn test_retry_delay_grows_and_caps() {
        let policy = RetryPolicy::new(5, Duration::from_millis(200));
        assert_eq!(policy.delay(1), Duration::from_millis(200));
        assert_eq!(policy.delay(2), Duration::from_millis(400));
        assert_eq!(policy.delay(10), MAX_BACKOFF);
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts, 1);
    }
}
