//! In-memory DocumentStore
//!
//! Documents are JSON objects grouped by collection. Failures can be injected per
//! collection or for every call, and each write is appended to an operation log so
//! tests can assert ordering.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};
use event_schema::AuditLogEntry;
use serde_json::{Map, Value};
use sync_service::store::{Collection, ContentRecord, DocumentStore};
use sync_service::StoreError;

pub type Document = Map<String, Value>;

#[derive(Debug, Clone, PartialEq)]
pub struct SearchHistoryRecord {
    pub created_at: DateTime<FixedOffset>,
    pub updated_at: DateTime<FixedOffset>,
}

#[derive(Default)]
struct State {
    collections: HashMap<Collection, Vec<Document>>,
    audit_logs: Vec<(AuditLogEntry, DateTime<FixedOffset>)>,
    search_history: HashMap<(i64, String), SearchHistoryRecord>,
    failing: HashSet<Collection>,
    fail_everything: bool,
    shut_down: bool,
    operations: Vec<String>,
}

#[derive(Clone, Default)]
pub struct MemoryDocumentStore {
    state: Arc<Mutex<State>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, collection: Collection, document: Value) {
        let Value::Object(document) = document else {
            panic!("documents must be JSON objects");
        };
        let mut state = self.state.lock().unwrap();
        state
            .collections
            .entry(collection)
            .or_default()
            .push(document);
    }

    /// Replace the `posts` document with the same `_id`, or insert it.
    pub fn put_post(&self, post: Value) {
        let id = post["_id"].clone();
        {
            let mut state = self.state.lock().unwrap();
            let posts = state.collections.entry(Collection::Posts).or_default();
            posts.retain(|doc| doc.get("_id") != Some(&id));
        }
        self.insert(Collection::Posts, post);
    }

    pub fn documents(&self, collection: Collection) -> Vec<Document> {
        let state = self.state.lock().unwrap();
        state
            .collections
            .get(&collection)
            .cloned()
            .unwrap_or_default()
    }

    /// Documents in `collection` whose `field` equals `user_id`.
    pub fn matching(&self, collection: Collection, field: &str, user_id: i64) -> Vec<Document> {
        self.documents(collection)
            .into_iter()
            .filter(|doc| doc.get(field).and_then(Value::as_i64) == Some(user_id))
            .collect()
    }

    pub fn audit_logs(&self) -> Vec<(AuditLogEntry, DateTime<FixedOffset>)> {
        self.state.lock().unwrap().audit_logs.clone()
    }

    pub fn search_history(&self) -> HashMap<(i64, String), SearchHistoryRecord> {
        self.state.lock().unwrap().search_history.clone()
    }

    pub fn operations(&self) -> Vec<String> {
        self.state.lock().unwrap().operations.clone()
    }

    pub fn fail_collection(&self, collection: Collection) {
        self.state.lock().unwrap().failing.insert(collection);
    }

    pub fn fail_everything(&self, fail: bool) {
        self.state.lock().unwrap().fail_everything = fail;
    }

    fn check(state: &State, collection: Collection) -> Result<(), StoreError> {
        if state.fail_everything || state.shut_down || state.failing.contains(&collection) {
            return Err(StoreError::Unavailable(format!("{collection} is down")));
        }
        Ok(())
    }
}

fn text(document: &Document, key: &str) -> String {
    document
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn number(document: &Document, key: &str) -> i64 {
    document.get(key).and_then(Value::as_i64).unwrap_or_default()
}

fn record_from(document: &Document) -> ContentRecord {
    let strings = |key: &str| -> Vec<String> {
        document
            .get(key)
            .and_then(Value::as_array)
            .map(|values| {
                values
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    };

    ContentRecord {
        id: text(document, "_id"),
        author_id: number(document, "userId"),
        author_name: text(document, "userNickname"),
        author_avatar: text(document, "userAvatar"),
        title: text(document, "title"),
        body: text(document, "content"),
        tags: strings("tags"),
        content_type: number(document, "type") as i32,
        resources: strings("resources"),
        cover: text(document, "cover"),
        cover_width: number(document, "coverWidth") as i32,
        cover_height: number(document, "coverHeight") as i32,
        like_count: number(document, "likeCount"),
        collect_count: number(document, "collectCount"),
        comment_count: number(document, "commentCount"),
        status: number(document, "status") as i32,
        is_deleted: number(document, "isDeleted") != 0,
        created_at: document
            .get("createdAt")
            .and_then(Value::as_str)
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|at| at.with_timezone(&Utc)),
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn ping(&self) -> Result<(), StoreError> {
        let state = self.state.lock().unwrap();
        if state.fail_everything {
            return Err(StoreError::Unavailable("ping failed".into()));
        }
        Ok(())
    }

    async fn shutdown(&self) {
        self.state.lock().unwrap().shut_down = true;
    }

    async fn find_content(&self, id: &str) -> Result<Option<ContentRecord>, StoreError> {
        let state = self.state.lock().unwrap();
        Self::check(&state, Collection::Posts)?;
        Ok(state
            .collections
            .get(&Collection::Posts)
            .and_then(|posts| {
                posts
                    .iter()
                    .find(|doc| doc.get("_id").and_then(Value::as_str) == Some(id))
            })
            .map(record_from))
    }

    async fn update_by_user(
        &self,
        collection: Collection,
        field: &str,
        user_id: i64,
        updates: &[(&str, &str)],
    ) -> Result<u64, StoreError> {
        let mut state = self.state.lock().unwrap();
        state
            .operations
            .push(format!("update {collection}.{field}"));
        Self::check(&state, collection)?;

        let mut modified = 0;
        if let Some(documents) = state.collections.get_mut(&collection) {
            for document in documents.iter_mut() {
                if document.get(field).and_then(Value::as_i64) != Some(user_id) {
                    continue;
                }
                for (name, value) in updates {
                    document.insert(name.to_string(), Value::String(value.to_string()));
                }
                modified += 1;
            }
        }
        Ok(modified)
    }

    async fn delete_by_user(
        &self,
        collection: Collection,
        field: &str,
        user_id: i64,
    ) -> Result<u64, StoreError> {
        let mut state = self.state.lock().unwrap();
        state
            .operations
            .push(format!("delete {collection}.{field}"));
        Self::check(&state, collection)?;

        let Some(documents) = state.collections.get_mut(&collection) else {
            return Ok(0);
        };
        let before = documents.len();
        documents.retain(|doc| doc.get(field).and_then(Value::as_i64) != Some(user_id));
        Ok((before - documents.len()) as u64)
    }

    async fn insert_audit_log(
        &self,
        entry: &AuditLogEntry,
        timestamp: DateTime<FixedOffset>,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        Self::check(&state, Collection::ApiLogs)?;
        state.audit_logs.push((entry.clone(), timestamp));
        Ok(())
    }

    async fn upsert_search_history(
        &self,
        user_id: i64,
        keyword: &str,
        now: DateTime<FixedOffset>,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        Self::check(&state, Collection::SearchHistories)?;
        state
            .search_history
            .entry((user_id, keyword.to_string()))
            .and_modify(|record| record.updated_at = now)
            .or_insert(SearchHistoryRecord {
                created_at: now,
                updated_at: now,
            });
        Ok(())
    }
}
