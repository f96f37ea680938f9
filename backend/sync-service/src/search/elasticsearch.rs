use ::elasticsearch::{
    http::{
        response::Response,
        transport::{SingleNodeConnectionPool, TransportBuilder},
    },
    indices::{IndicesCreateParts, IndicesExistsParts},
    DeleteParts, Elasticsearch, IndexParts, UpdateByQueryParts,
};
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, info};
use url::Url;

use super::{AuthorUpdate, ContentDocument, DeleteOutcome, SearchIndex};
use crate::error::IndexError;

#[derive(Clone)]
pub struct ElasticsearchIndex {
    client: Elasticsearch,
    index: String,
}

impl ElasticsearchIndex {
    pub fn new(url: &str, index: &str) -> Result<Self, IndexError> {
        let parsed = Url::parse(url)?;
        let pool = SingleNodeConnectionPool::new(parsed);
        let transport = TransportBuilder::new(pool).build()?;

        Ok(Self {
            client: Elasticsearch::new(transport),
            index: index.to_string(),
        })
    }

    pub fn index_name(&self) -> &str {
        &self.index
    }
}

/// Mapping for the content index. Text fields use the default analyzer; ids and tags are
/// exact-match keywords.
fn content_mapping() -> Value {
    json!({
        "mappings": {
            "properties": {
                "id": { "type": "keyword" },
                "userId": { "type": "long" },
                "title": { "type": "text" },
                "content": { "type": "text" },
                "tags": { "type": "keyword" },
                "type": { "type": "integer" },
                "resources": { "type": "keyword", "index": false },
                "cover": { "type": "keyword", "index": false },
                "coverWidth": { "type": "integer" },
                "coverHeight": { "type": "integer" },
                "userNickname": { "type": "text", "fields": { "keyword": { "type": "keyword" } } },
                "userAvatar": { "type": "keyword", "index": false },
                "likeCount": { "type": "long" },
                "collectCount": { "type": "long" },
                "commentCount": { "type": "long" },
                "createdAt": {
                    "type": "date",
                    "format": "yyyy-MM-dd'T'HH:mm:ss.SSS||strict_date_optional_time||epoch_millis"
                }
            }
        }
    })
}

/// Painless script and params rewriting only the supplied author fields.
fn author_script(update: &AuthorUpdate) -> Value {
    let mut source = String::new();
    let mut params = serde_json::Map::new();
    if let Some(nickname) = &update.nickname {
        source.push_str("ctx._source.userNickname = params.nickname;");
        params.insert("nickname".to_string(), Value::String(nickname.clone()));
    }
    if let Some(avatar) = &update.avatar {
        source.push_str("ctx._source.userAvatar = params.avatar;");
        params.insert("avatar".to_string(), Value::String(avatar.clone()));
    }
    json!({ "source": source, "lang": "painless", "params": params })
}

async fn fail(response: Response) -> IndexError {
    let status = response.status_code().as_u16();
    let body = response.text().await.unwrap_or_default();
    IndexError::Status { status, body }
}

#[async_trait]
impl SearchIndex for ElasticsearchIndex {
    async fn ping(&self) -> Result<(), IndexError> {
        let response = self.client.ping().send().await?;
        if response.status_code().is_success() {
            Ok(())
        } else {
            Err(fail(response).await)
        }
    }

    async fn ensure_index(&self) -> Result<(), IndexError> {
        let exists_response = self
            .client
            .indices()
            .exists(IndicesExistsParts::Index(&[self.index.as_str()]))
            .send()
            .await?;

        if exists_response.status_code().is_success() {
            debug!(index = %self.index, "Content index already exists");
            return Ok(());
        }

        let response = self
            .client
            .indices()
            .create(IndicesCreateParts::Index(&self.index))
            .body(content_mapping())
            .send()
            .await?;

        if response.status_code().is_success() {
            info!(index = %self.index, "Content index created");
            return Ok(());
        }

        // Another replica may have created it between the two calls.
        match fail(response).await {
            IndexError::Status { body, .. } if body.contains("resource_already_exists_exception") => {
                Ok(())
            }
            error => Err(error),
        }
    }

    async fn upsert(&self, document: &ContentDocument) -> Result<(), IndexError> {
        let response = self
            .client
            .index(IndexParts::IndexId(&self.index, document.id.as_str()))
            .body(document)
            .send()
            .await?;

        if response.status_code().is_success() {
            Ok(())
        } else {
            Err(fail(response).await)
        }
    }

    async fn delete(&self, id: &str) -> Result<DeleteOutcome, IndexError> {
        let response = self
            .client
            .delete(DeleteParts::IndexId(&self.index, id))
            .send()
            .await?;

        let status = response.status_code();
        if status.is_success() {
            Ok(DeleteOutcome::Deleted)
        } else if status.as_u16() == 404 {
            Ok(DeleteOutcome::NotFound)
        } else {
            Err(fail(response).await)
        }
    }

    async fn update_author(&self, user_id: i64, update: &AuthorUpdate) -> Result<u64, IndexError> {
        if update.is_empty() {
            return Ok(0);
        }

        let body = json!({
            "script": author_script(update),
            "query": { "term": { "userId": user_id } },
            "conflicts": "proceed"
        });

        let response = self
            .client
            .update_by_query(UpdateByQueryParts::Index(&[self.index.as_str()]))
            .body(body)
            .send()
            .await?;

        if !response.status_code().is_success() {
            return Err(fail(response).await);
        }

        let summary: Value = response.json().await?;
        Ok(summary.get("updated").and_then(Value::as_u64).unwrap_or(0))
    }
}
