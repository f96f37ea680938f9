//! Shared infrastructure handles.
//!
//! Built once at startup and passed by reference; nothing here is a global.

use std::sync::Arc;

use lapin::{Connection, ConnectionProperties};
use tracing::{info, warn};

use crate::config::Config;
use crate::error::SyncError;
use crate::handlers::HandlerContext;
use crate::search::{ElasticsearchIndex, SearchIndex};
use crate::store::{DocumentStore, MongoDocumentStore};

pub struct Infra {
    pub documents: Arc<dyn DocumentStore>,
    pub index: Arc<dyn SearchIndex>,
    pub broker: Connection,
}

impl Infra {
    /// Connect to MongoDB, Elasticsearch and RabbitMQ, ping the stores and make sure the
    /// content index exists.
    pub async fn connect(config: &Config) -> Result<Self, SyncError> {
        let documents = MongoDocumentStore::connect(&config.mongo.uri, &config.mongo.database).await?;
        documents.ping().await?;
        info!(database = %config.mongo.database, "Connected to MongoDB");

        let index = ElasticsearchIndex::new(&config.elasticsearch.url, &config.elasticsearch.index)?;
        index.ping().await?;
        index.ensure_index().await?;
        info!(index = %index.index_name(), "Connected to Elasticsearch");

        let broker = Connection::connect(&config.broker.url, ConnectionProperties::default()).await?;
        info!("Connected to RabbitMQ");

        Ok(Self {
            documents: Arc::new(documents),
            index: Arc::new(index),
            broker,
        })
    }

    /// Context handed to every handler.
    pub fn handler_context(&self, config: &Config) -> HandlerContext {
        HandlerContext {
            documents: self.documents.clone(),
            index: self.index.clone(),
            time_zone: config.sync.time_zone,
            post_audit_enabled: config.sync.post_audit_enabled,
            deleted_user: config.sync.deleted_user.clone(),
        }
    }

    /// Close the broker connection, which ends every delivery stream, then the document
    /// store. Unacknowledged deliveries go back to their queues.
    pub async fn close(&self) {
        if let Err(err) = self.broker.close(200, "Normal shutdown").await {
            warn!(error = %err, "Error closing RabbitMQ connection");
        }
        self.documents.shutdown().await;
    }
}
