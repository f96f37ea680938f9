//! Shared fixtures for sync-service integration tests.
//!
//! The fakes stand in for MongoDB and Elasticsearch so handler and dispatcher behaviour
//! can be checked without containers.

#![allow(dead_code)]

pub mod memory_index;
pub mod memory_store;

use std::sync::Arc;
use std::time::Duration;

use chrono::FixedOffset;
use serde_json::Value;
use sync_service::broker::QueueRoute;
use sync_service::config::Placeholder;
use sync_service::dispatcher::{Dispatcher, Envelope, RetryPolicy};
use sync_service::handlers::{handler_for, HandlerContext};

pub use memory_index::MemorySearchIndex;
pub use memory_store::MemoryDocumentStore;

pub fn cst() -> FixedOffset {
    FixedOffset::east_opt(8 * 3600).unwrap()
}

pub fn context(store: &MemoryDocumentStore, index: &MemorySearchIndex) -> HandlerContext {
    HandlerContext {
        documents: Arc::new(store.clone()),
        index: Arc::new(index.clone()),
        time_zone: cst(),
        post_audit_enabled: false,
        deleted_user: Placeholder::default(),
    }
}

/// Dispatcher for `route` with zero-delay retries.
pub fn dispatcher(route: QueueRoute, ctx: HandlerContext, max_attempts: u32) -> Dispatcher {
    Dispatcher::new(
        format!("test.{route:?}"),
        handler_for(route, ctx),
        RetryPolicy::new(max_attempts, Duration::ZERO),
    )
}

pub fn envelope(type_id: &str, body: Value) -> Envelope {
    Envelope {
        type_id: Some(type_id.to_string()),
        body: serde_json::to_vec(&body).unwrap(),
        delivery_tag: 1,
    }
}
