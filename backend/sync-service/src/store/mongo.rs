//! MongoDB implementation of [`DocumentStore`].

use async_trait::async_trait;
use bson::{doc, oid::ObjectId, Bson, Document};
use chrono::{DateTime, FixedOffset, Utc};
use event_schema::AuditLogEntry;
use mongodb::{options::ClientOptions, Client, Database};
use std::time::Duration;
use tracing::{debug, info};

use super::{Collection, ContentRecord, DocumentStore};
use crate::error::StoreError;

const SERVER_SELECTION_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct MongoDocumentStore {
    client: Client,
    database: Database,
}

impl MongoDocumentStore {
    pub async fn connect(uri: &str, database: &str) -> Result<Self, StoreError> {
        info!(database = %database, "Connecting to MongoDB");

        let mut options = ClientOptions::parse(uri).await?;
        // Fail fast on unreachable servers unless the URI sets its own limit.
        options
            .server_selection_timeout
            .get_or_insert(SERVER_SELECTION_TIMEOUT);
        options.app_name.get_or_insert_with(|| "sync-service".to_string());

        let client = Client::with_options(options)?;
        Ok(Self {
            database: client.database(database),
            client,
        })
    }

    fn collection(&self, collection: Collection) -> mongodb::Collection<Document> {
        self.database.collection::<Document>(collection.name())
    }
}

#[async_trait]
impl DocumentStore for MongoDocumentStore {
    async fn ping(&self) -> Result<(), StoreError> {
        self.database.run_command(doc! { "ping": 1 }).await?;
        Ok(())
    }

    async fn shutdown(&self) {
        self.client.clone().shutdown().await;
        info!("MongoDB client shut down");
    }

    async fn find_content(&self, id: &str) -> Result<Option<ContentRecord>, StoreError> {
        let filter = match ObjectId::parse_str(id) {
            Ok(oid) => doc! { "_id": oid },
            Err(_) => doc! { "_id": id },
        };

        match self.collection(Collection::Posts).find_one(filter).await? {
            Some(document) => project_record(&document).map(Some),
            None => Ok(None),
        }
    }

    async fn update_by_user(
        &self,
        collection: Collection,
        field: &str,
        user_id: i64,
        updates: &[(&str, &str)],
    ) -> Result<u64, StoreError> {
        if updates.is_empty() {
            return Ok(0);
        }

        let mut set = Document::new();
        for (name, value) in updates {
            set.insert(*name, *value);
        }

        let result = self
            .collection(collection)
            .update_many(user_filter(field, user_id), doc! { "$set": set })
            .await?;
        debug!(
            collection = %collection,
            field = %field,
            user_id,
            modified = result.modified_count,
            "Updated embedded identity"
        );
        Ok(result.modified_count)
    }

    async fn delete_by_user(
        &self,
        collection: Collection,
        field: &str,
        user_id: i64,
    ) -> Result<u64, StoreError> {
        let result = self
            .collection(collection)
            .delete_many(user_filter(field, user_id))
            .await?;
        debug!(
            collection = %collection,
            field = %field,
            user_id,
            deleted = result.deleted_count,
            "Purged user documents"
        );
        Ok(result.deleted_count)
    }

    async fn insert_audit_log(
        &self,
        entry: &AuditLogEntry,
        timestamp: DateTime<FixedOffset>,
    ) -> Result<(), StoreError> {
        let document = doc! {
            "traceId": entry.trace_id.as_str(),
            "logType": entry.category.as_str(),
            "module": entry.module.clone(),
            "bizId": entry.biz_id.clone(),
            "userId": entry.actor_id,
            "username": entry.actor_name.clone(),
            "role": entry.role.clone(),
            "method": entry.action.as_str(),
            "uri": entry.resource.as_str(),
            "ip": entry.ip.clone(),
            "params": entry.params.clone(),
            "status": entry.outcome,
            "timeCost": entry.latency_ms,
            "description": entry.description.clone(),
            "errorMsg": entry.error_msg.clone(),
            "createdAt": bson_time(timestamp),
        };

        self.collection(Collection::ApiLogs)
            .insert_one(document)
            .await?;
        Ok(())
    }

    async fn upsert_search_history(
        &self,
        user_id: i64,
        keyword: &str,
        now: DateTime<FixedOffset>,
    ) -> Result<(), StoreError> {
        let now = bson_time(now);
        self.collection(Collection::SearchHistories)
            .update_one(
                doc! { "userId": user_id, "keyword": keyword },
                doc! {
                    "$set": { "updatedAt": now },
                    "$setOnInsert": { "userId": user_id, "keyword": keyword, "createdAt": now },
                },
            )
            .upsert(true)
            .await?;
        Ok(())
    }
}

fn user_filter(field: &str, user_id: i64) -> Document {
    let mut filter = Document::new();
    filter.insert(field, user_id);
    filter
}

fn bson_time(at: DateTime<FixedOffset>) -> bson::DateTime {
    bson::DateTime::from_chrono(at.with_timezone(&Utc))
}

/// Map a raw `posts` document onto [`ContentRecord`].
///
/// Producers have written numbers as int32, int64 and double over time, so numeric
/// fields are read leniently. Missing fields take their zero value.
pub(crate) fn project_record(document: &Document) -> Result<ContentRecord, StoreError> {
    let id = match document.get("_id") {
        Some(Bson::ObjectId(oid)) => oid.to_hex(),
        Some(Bson::String(id)) => id.clone(),
        Some(Bson::Int64(id)) => id.to_string(),
        Some(Bson::Int32(id)) => id.to_string(),
        _ => {
            return Err(StoreError::InvalidDocument(
                "posts document without usable _id".to_string(),
            ))
        }
    };

    Ok(ContentRecord {
        id,
        author_id: number(document, "userId"),
        author_name: text(document, "userNickname"),
        author_avatar: text(document, "userAvatar"),
        title: text(document, "title"),
        body: text(document, "content"),
        tags: texts(document, "tags"),
        content_type: number(document, "type") as i32,
        resources: texts(document, "resources"),
        cover: text(document, "cover"),
        cover_width: number(document, "coverWidth") as i32,
        cover_height: number(document, "coverHeight") as i32,
        like_count: number(document, "likeCount"),
        collect_count: number(document, "collectCount"),
        comment_count: number(document, "commentCount"),
        status: number(document, "status") as i32,
        is_deleted: flag(document, "isDeleted"),
        created_at: match document.get("createdAt") {
            Some(Bson::DateTime(at)) => Some(at.to_chrono()),
            _ => None,
        },
    })
}

fn number(document: &Document, key: &str) -> i64 {
    match document.get(key) {
        Some(Bson::Int32(v)) => i64::from(*v),
        Some(Bson::Int64(v)) => *v,
        Some(Bson::Double(v)) => *v as i64,
        _ => 0,
    }
}

fn text(document: &Document, key: &str) -> String {
    match document.get(key) {
        Some(Bson::String(v)) => v.clone(),
        _ => String::new(),
    }
}

fn texts(document: &Document, key: &str) -> Vec<String> {
    match document.get(key) {
        Some(Bson::Array(values)) => values
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    }
}

fn flag(document: &Document, key: &str) -> bool {
    match document.get(key) {
        Some(Bson::Boolean(v)) => *v,
        Some(_) => number(document, key) != 0,
        None => false,
    }
}
