//! Keeps the search index consistent with the document store.
//!
//! Create events are self-sufficient and go straight to the index. Update events are
//! pointers: the record is read back from the document store and either re-projected or,
//! when no longer eligible, removed. Deletes are idempotent, so replays and reordering
//! converge on the same index state.

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};
use event_schema::{ContentCreated, DomainEvent, EventKind, IdentityUpdated};
use tracing::{debug, info};

use super::{EventHandler, HandlerContext};
use crate::error::SyncError;
use crate::search::{AuthorUpdate, ContentDocument, DeleteOutcome};
use crate::store::{self, ContentRecord};

/// Timestamp layout stored in `createdAt`, local to the configured offset.
pub const INDEX_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f";

pub struct IndexSyncHandler {
    ctx: HandlerContext,
}

impl IndexSyncHandler {
    pub fn new(ctx: HandlerContext) -> Self {
        Self { ctx }
    }

    /// Index a created or approved record, but only while the stored record is still
    /// eligible. A create overtaken by its delete finds the record gone and removes instead.
    async fn index_created(&self, created: &ContentCreated) -> Result<(), SyncError> {
        let record = match self.ctx.documents.find_content(&created.id).await? {
            Some(record) if record.is_indexable() => record,
            Some(record) => {
                debug!(
                    content_id = %created.id,
                    status = record.status,
                    is_deleted = record.is_deleted,
                    "Created content not eligible for the index"
                );
                return self.remove(&created.id).await;
            }
            None => {
                debug!(content_id = %created.id, "Created content already gone from document store");
                return self.remove(&created.id).await;
            }
        };

        let document = document_from_event(created, &record, self.ctx.time_zone);
        self.ctx.index.upsert(&document).await?;
        info!(content_id = %created.id, user_id = created.author_id, "Content indexed");
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<(), SyncError> {
        match self.ctx.index.delete(id).await? {
            DeleteOutcome::Deleted => info!(content_id = %id, "Content removed from index"),
            DeleteOutcome::NotFound => debug!(content_id = %id, "Content already absent from index"),
        }
        Ok(())
    }

    async fn reconcile(&self, id: &str) -> Result<(), SyncError> {
        match self.ctx.documents.find_content(id).await? {
            Some(record) if record.is_indexable() => {
                let document = document_from_record(&record, self.ctx.time_zone);
                self.ctx.index.upsert(&document).await?;
                info!(content_id = %id, "Content re-indexed from document store");
                Ok(())
            }
            Some(record) => {
                debug!(
                    content_id = %id,
                    status = record.status,
                    is_deleted = record.is_deleted,
                    "Content no longer eligible for the index"
                );
                self.remove(id).await
            }
            None => {
                debug!(content_id = %id, "Content missing from document store");
                self.remove(id).await
            }
        }
    }

    async fn rewrite_author(&self, user_id: i64, update: AuthorUpdate) -> Result<(), SyncError> {
        if update.is_empty() {
            debug!(user_id, "Identity update carries no author fields");
            return Ok(());
        }
        let updated = self.ctx.index.update_author(user_id, &update).await?;
        info!(user_id, updated, "Author fields rewritten in index");
        Ok(())
    }
}

#[async_trait]
impl EventHandler for IndexSyncHandler {
    fn name(&self) -> &'static str {
        "index-sync"
    }

    fn accepts(&self, kind: EventKind) -> bool {
        match kind {
            EventKind::ContentCreated
            | EventKind::ContentAuditPassed
            | EventKind::ContentUpdated
            | EventKind::ContentDeleted
            | EventKind::IdentityUpdated
            | EventKind::IdentityDeleted => true,
            EventKind::AuditLogEntry | EventKind::SearchQueryIssued => false,
        }
    }

    async fn handle(&self, event: &DomainEvent) -> Result<(), SyncError> {
        match event {
            DomainEvent::ContentCreated(created) => {
                if self.ctx.post_audit_enabled {
                    debug!(content_id = %created.id, "Awaiting review before indexing");
                    return Ok(());
                }
                self.index_created(created).await
            }
            DomainEvent::ContentAuditPassed(created) => self.index_created(created).await,
            DomainEvent::ContentUpdated(updated) => self.reconcile(&updated.id).await,
            DomainEvent::ContentDeleted(deleted) => self.remove(&deleted.id).await,
            DomainEvent::IdentityUpdated(update) => {
                self.rewrite_author(update.user_id, author_update(update)).await
            }
            DomainEvent::IdentityDeleted(deleted) => {
                let placeholder = &self.ctx.deleted_user;
                let update = AuthorUpdate {
                    nickname: Some(placeholder.nickname.clone()),
                    avatar: Some(placeholder.avatar.clone()),
                };
                self.rewrite_author(deleted.user_id, update).await
            }
            DomainEvent::AuditLogEntry(_) | DomainEvent::SearchQueryIssued(_) => Ok(()),
        }
    }
}

fn author_update(update: &IdentityUpdated) -> AuthorUpdate {
    AuthorUpdate {
        nickname: update.display_name().map(str::to_string),
        avatar: update.avatar_ref().map(str::to_string),
    }
}

/// Index document for freshly created content. Engagement counters start at zero.
///
/// The payload wins for every field it carries; `createdAt` falls back to the stored record.
pub fn document_from_event(
    created: &ContentCreated,
    record: &ContentRecord,
    time_zone: FixedOffset,
) -> ContentDocument {
    let created_at = created
        .created_at
        .as_ref()
        .and_then(|raw| raw.resolve(time_zone))
        .map(|at| at.with_timezone(&Utc))
        .or_else(|| record_created_at(record));

    ContentDocument {
        id: created.id.clone(),
        user_id: created.author_id,
        title: created.title.clone(),
        content: created.body.clone(),
        tags: created.tags.clone(),
        content_type: created.content_type,
        resources: created.resources(),
        cover: created.cover_ref.clone().unwrap_or_default(),
        cover_width: created.cover_width,
        cover_height: created.cover_height,
        user_nickname: created.author_name.clone().unwrap_or_default(),
        user_avatar: created.author_avatar.clone().unwrap_or_default(),
        like_count: 0,
        collect_count: 0,
        comment_count: 0,
        created_at: created_at.map(|at| index_time(at, time_zone)),
    }
}

/// Index document projected from the authoritative record.
pub fn document_from_record(record: &ContentRecord, time_zone: FixedOffset) -> ContentDocument {
    ContentDocument {
        id: record.id.clone(),
        user_id: record.author_id,
        title: record.title.clone(),
        content: record.body.clone(),
        tags: record.tags.clone(),
        content_type: record.content_type,
        resources: record.resources.clone(),
        cover: record.cover.clone(),
        cover_width: record.cover_width,
        cover_height: record.cover_height,
        user_nickname: record.author_name.clone(),
        user_avatar: record.author_avatar.clone(),
        like_count: record.like_count,
        collect_count: record.collect_count,
        comment_count: record.comment_count,
        created_at: record_created_at(record).map(|at| index_time(at, time_zone)),
    }
}

/// Stored creation time, else the time embedded in an ObjectId. Never "now", so replays
/// project the same document.
fn record_created_at(record: &ContentRecord) -> Option<DateTime<Utc>> {
    record
        .created_at
        .or_else(|| store::id_timestamp(&record.id))
}

fn index_time(at: DateTime<Utc>, time_zone: FixedOffset) -> String {
    at.with_timezone(&time_zone).format(INDEX_TIME_FORMAT).to_string()
}
