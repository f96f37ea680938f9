//! Event handlers, one per consumed queue.
//!
//! Handlers share no mutable state. Each one reaches the stores only through the trait
//! objects in [`HandlerContext`], so tests run them against in-memory fakes.

pub mod audit_log;
pub mod index_sync;
pub mod search_history;
pub mod user_propagation;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};
use event_schema::{DomainEvent, EventKind};

use crate::broker::topology::QueueRoute;
use crate::config::Placeholder;
use crate::error::SyncError;
use crate::search::SearchIndex;
use crate::store::DocumentStore;

pub use audit_log::AuditLogHandler;
pub use index_sync::IndexSyncHandler;
pub use search_history::SearchHistoryHandler;
pub use user_propagation::UserPropagationHandler;

#[async_trait]
pub trait EventHandler: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether events of `kind` belong to this handler. Others are acknowledged untouched.
    fn accepts(&self, kind: EventKind) -> bool;

    async fn handle(&self, event: &DomainEvent) -> Result<(), SyncError>;
}

/// Everything a handler may touch.
#[derive(Clone)]
pub struct HandlerContext {
    pub documents: Arc<dyn DocumentStore>,
    pub index: Arc<dyn SearchIndex>,
    pub time_zone: FixedOffset,
    pub post_audit_enabled: bool,
    pub deleted_user: Placeholder,
}

impl HandlerContext {
    /// Current time in the configured offset.
    pub fn now(&self) -> DateTime<FixedOffset> {
        Utc::now().with_timezone(&self.time_zone)
    }
}

/// Handler owning the queue with the given route.
pub fn handler_for(route: QueueRoute, ctx: HandlerContext) -> Arc<dyn EventHandler> {
    match route {
        QueueRoute::AuditLog => Arc::new(AuditLogHandler::new(ctx)),
        QueueRoute::SearchHistory => Arc::new(SearchHistoryHandler::new(ctx)),
        QueueRoute::IndexSync => Arc::new(IndexSyncHandler::new(ctx)),
        QueueRoute::UserPropagation => Arc::new(UserPropagationHandler::new(ctx)),
    }
}
