//! Document store access.
//!
//! Handlers only see [`DocumentStore`]; the MongoDB adapter lives in [`mongo`].

pub mod mongo;

use async_trait::async_trait;
use bson::oid::ObjectId;
use chrono::{DateTime, FixedOffset, Utc};
use event_schema::AuditLogEntry;

use crate::error::StoreError;

pub use mongo::MongoDocumentStore;

/// `status` value of a published content record.
pub const STATUS_PUBLISHED: i32 = 1;

/// Collections touched by the handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Posts,
    Comments,
    UserFollows,
    PostLikes,
    CommentLikes,
    PostCollects,
    PostRatings,
    Notifications,
    SearchHistories,
    PostViewHistories,
    ApiLogs,
}

impl Collection {
    pub fn name(&self) -> &'static str {
        match self {
            Collection::Posts => "posts",
            Collection::Comments => "comments",
            Collection::UserFollows => "user_follows",
            Collection::PostLikes => "post_likes",
            Collection::CommentLikes => "comment_likes",
            Collection::PostCollects => "post_collects",
            Collection::PostRatings => "post_ratings",
            Collection::Notifications => "notifications",
            Collection::SearchHistories => "search_histories",
            Collection::PostViewHistories => "post_view_histories",
            Collection::ApiLogs => "api_logs",
        }
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Creation time embedded in an ObjectId-shaped content id.
pub fn id_timestamp(id: &str) -> Option<DateTime<Utc>> {
    ObjectId::parse_str(id)
        .ok()
        .map(|oid| oid.timestamp().to_chrono())
}

/// Authoritative content record, reduced to what the index projection needs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContentRecord {
    pub id: String,
    pub author_id: i64,
    pub author_name: String,
    pub author_avatar: String,
    pub title: String,
    pub body: String,
    pub tags: Vec<String>,
    pub content_type: i32,
    pub resources: Vec<String>,
    pub cover: String,
    pub cover_width: i32,
    pub cover_height: i32,
    pub like_count: i64,
    pub collect_count: i64,
    pub comment_count: i64,
    pub status: i32,
    pub is_deleted: bool,
    pub created_at: Option<DateTime<Utc>>,
}

impl ContentRecord {
    /// Only published, non-deleted records may appear in the index.
    pub fn is_indexable(&self) -> bool {
        !self.is_deleted && self.status == STATUS_PUBLISHED
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn ping(&self) -> Result<(), StoreError>;

    /// Close connections. Called once, after every handler has stopped.
    async fn shutdown(&self);

    async fn find_content(&self, id: &str) -> Result<Option<ContentRecord>, StoreError>;

    /// `$set` each `(field, value)` pair on every document whose `field` equals `user_id`.
    ///
    /// Returns the number of modified documents.
    async fn update_by_user(
        &self,
        collection: Collection,
        field: &str,
        user_id: i64,
        updates: &[(&str, &str)],
    ) -> Result<u64, StoreError>;

    /// Delete every document whose `field` equals `user_id`. Returns the deleted count.
    async fn delete_by_user(
        &self,
        collection: Collection,
        field: &str,
        user_id: i64,
    ) -> Result<u64, StoreError>;

    async fn insert_audit_log(
        &self,
        entry: &AuditLogEntry,
        timestamp: DateTime<FixedOffset>,
    ) -> Result<(), StoreError>;

    /// Upsert on `(user_id, keyword)`; `createdAt` is only written on insert.
    async fn upsert_search_history(
        &self,
        user_id: i64,
        keyword: &str,
        now: DateTime<FixedOffset>,
    ) -> Result<(), StoreError>;
}
