use async_trait::async_trait;
use event_schema::{DomainEvent, EventKind};
use tracing::{debug, warn};

use super::{EventHandler, HandlerContext};
use crate::error::SyncError;

/// Append-only sink for gateway access records.
///
/// Redelivery may store an entry twice; the log tolerates duplicates.
pub struct AuditLogHandler {
    ctx: HandlerContext,
}

impl AuditLogHandler {
    pub fn new(ctx: HandlerContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl EventHandler for AuditLogHandler {
    fn name(&self) -> &'static str {
        "audit-log"
    }

    fn accepts(&self, kind: EventKind) -> bool {
        kind == EventKind::AuditLogEntry
    }

    async fn handle(&self, event: &DomainEvent) -> Result<(), SyncError> {
        let entry = match event {
            DomainEvent::AuditLogEntry(entry) => entry,
            DomainEvent::ContentCreated(_)
            | DomainEvent::ContentAuditPassed(_)
            | DomainEvent::ContentUpdated(_)
            | DomainEvent::ContentDeleted(_)
            | DomainEvent::IdentityUpdated(_)
            | DomainEvent::IdentityDeleted(_)
            | DomainEvent::SearchQueryIssued(_) => return Ok(()),
        };

        let timestamp = match entry.timestamp.as_ref() {
            Some(raw) => raw.resolve(self.ctx.time_zone).unwrap_or_else(|| {
                warn!(trace_id = %entry.trace_id, raw = ?raw, "Unparseable audit timestamp, using now");
                self.ctx.now()
            }),
            None => self.ctx.now(),
        };

        self.ctx.documents.insert_audit_log(entry, timestamp).await?;
        debug!(
            trace_id = %entry.trace_id,
            resource = %entry.resource,
            outcome = entry.outcome,
            "Audit log stored"
        );
        Ok(())
    }
}
