//! In-memory SearchIndex with injectable failures.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use sync_service::search::{AuthorUpdate, ContentDocument, DeleteOutcome, SearchIndex};
use sync_service::IndexError;

#[derive(Default)]
struct State {
    documents: HashMap<String, ContentDocument>,
    /// Remaining calls that fail with 503
    failures: usize,
    calls: usize,
}

#[derive(Clone, Default)]
pub struct MemorySearchIndex {
    state: Arc<Mutex<State>>,
}

impl MemorySearchIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<ContentDocument> {
        self.state.lock().unwrap().documents.get(id).cloned()
    }

    pub fn put(&self, document: ContentDocument) {
        self.state
            .lock()
            .unwrap()
            .documents
            .insert(document.id.clone(), document);
    }

    pub fn len(&self) -> usize {
        self.state.lock().unwrap().documents.len()
    }

    pub fn snapshot(&self) -> HashMap<String, ContentDocument> {
        self.state.lock().unwrap().documents.clone()
    }

    /// Fail the next `count` calls with a 503.
    pub fn fail_next(&self, count: usize) {
        self.state.lock().unwrap().failures = count;
    }

    pub fn calls(&self) -> usize {
        self.state.lock().unwrap().calls
    }

    fn enter(state: &mut State) -> Result<(), IndexError> {
        state.calls += 1;
        if state.failures > 0 {
            state.failures -= 1;
            return Err(IndexError::Status {
                status: 503,
                body: "service unavailable".into(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl SearchIndex for MemorySearchIndex {
    async fn ping(&self) -> Result<(), IndexError> {
        Self::enter(&mut self.state.lock().unwrap())
    }

    async fn ensure_index(&self) -> Result<(), IndexError> {
        Self::enter(&mut self.state.lock().unwrap())
    }

    async fn upsert(&self, document: &ContentDocument) -> Result<(), IndexError> {
        let mut state = self.state.lock().unwrap();
        Self::enter(&mut state)?;
        state
            .documents
            .insert(document.id.clone(), document.clone());
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<DeleteOutcome, IndexError> {
        let mut state = self.state.lock().unwrap();
        Self::enter(&mut state)?;
        Ok(match state.documents.remove(id) {
            Some(_) => DeleteOutcome::Deleted,
            None => DeleteOutcome::NotFound,
        })
    }

    async fn update_author(&self, user_id: i64, update: &AuthorUpdate) -> Result<u64, IndexError> {
        let mut state = self.state.lock().unwrap();
        Self::enter(&mut state)?;
        let mut updated = 0;
        for document in state.documents.values_mut() {
            if document.user_id != user_id {
                continue;
            }
            if let Some(nickname) = &update.nickname {
                document.user_nickname = nickname.clone();
            }
            if let Some(avatar) = &update.avatar {
                document.user_avatar = avatar.clone();
            }
            updated += 1;
        }
        Ok(updated)
    }
}
