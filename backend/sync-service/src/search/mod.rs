//! Search index access.
//!
//! The index holds a flattened copy of each published content record, keyed by the
//! content id. Field names match what the query side reads (camelCase).

pub mod elasticsearch;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::IndexError;

pub use self::elasticsearch::ElasticsearchIndex;

/// One indexed content record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentDocument {
    pub id: String,
    pub user_id: i64,
    pub title: String,
    pub content: String,
    pub tags: Vec<String>,
    #[serde(rename = "type")]
    pub content_type: i32,
    pub resources: Vec<String>,
    pub cover: String,
    pub cover_width: i32,
    pub cover_height: i32,
    pub user_nickname: String,
    pub user_avatar: String,
    pub like_count: i64,
    pub collect_count: i64,
    pub comment_count: i64,
    /// Local time in the configured offset, `%Y-%m-%dT%H:%M:%S%.3f`. Omitted when the
    /// creation time is unknown.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

/// Author fields to rewrite across every document of one user. `None` leaves a field as is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorUpdate {
    pub nickname: Option<String>,
    pub avatar: Option<String>,
}

impl AuthorUpdate {
    pub fn is_empty(&self) -> bool {
        self.nickname.is_none() && self.avatar.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    NotFound,
}

#[async_trait]
pub trait SearchIndex: Send + Sync {
    async fn ping(&self) -> Result<(), IndexError>;

    /// Create the content index with its mapping when it does not exist yet.
    async fn ensure_index(&self) -> Result<(), IndexError>;

    async fn upsert(&self, document: &ContentDocument) -> Result<(), IndexError>;

    /// Delete by id. An absent document is [`DeleteOutcome::NotFound`], not an error.
    async fn delete(&self, id: &str) -> Result<DeleteOutcome, IndexError>;

    /// Update-by-query on `userId`. Returns the number of rewritten documents.
    async fn update_author(&self, user_id: i64, update: &AuthorUpdate) -> Result<u64, IndexError>;
}
