//! In-memory session store.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{SessionStore, SessionStoreError, ThreadSession};

/// Session store that lives only as long as the process.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: Mutex<HashMap<String, ThreadSession>>,
}

impl MemorySessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self, key: &str) -> Result<Option<ThreadSession>, SessionStoreError> {
        Ok(self.sessions.lock().await.get(key).cloned())
    }

    async fn save(&self, key: &str, session: &ThreadSession) -> Result<(), SessionStoreError> {
        self.sessions
            .lock()
            .await
            .insert(key.to_string(), session.clone());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, SessionStoreError> {
        Ok(self.sessions.lock().await.remove(key).is_some())
    }
}
