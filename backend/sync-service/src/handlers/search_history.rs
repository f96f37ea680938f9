use async_trait::async_trait;
use event_schema::{DomainEvent, EventKind};
use tracing::debug;

use super::{EventHandler, HandlerContext};
use crate::error::SyncError;

/// Keeps one record per `(userId, keyword)` with the latest query time.
pub struct SearchHistoryHandler {
    ctx: HandlerContext,
}

impl SearchHistoryHandler {
    pub fn new(ctx: HandlerContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl EventHandler for SearchHistoryHandler {
    fn name(&self) -> &'static str {
        "search-history"
    }

    fn accepts(&self, kind: EventKind) -> bool {
        kind == EventKind::SearchQueryIssued
    }

    async fn handle(&self, event: &DomainEvent) -> Result<(), SyncError> {
        let query = match event {
            DomainEvent::SearchQueryIssued(query) => query,
            DomainEvent::ContentCreated(_)
            | DomainEvent::ContentAuditPassed(_)
            | DomainEvent::ContentUpdated(_)
            | DomainEvent::ContentDeleted(_)
            | DomainEvent::IdentityUpdated(_)
            | DomainEvent::IdentityDeleted(_)
            | DomainEvent::AuditLogEntry(_) => return Ok(()),
        };

        // Blank check only; the key is the keyword exactly as typed.
        let keyword = query.keyword.as_str();
        if query.user_id <= 0 || keyword.trim().is_empty() {
            debug!(user_id = query.user_id, "Skipping anonymous or empty search query");
            return Ok(());
        }

        self.ctx
            .documents
            .upsert_search_history(query.user_id, keyword, self.ctx.now())
            .await?;
        debug!(user_id = query.user_id, keyword = %keyword, "Search history recorded");
        Ok(())
    }
}
