//! Session record and store contract.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What a conversation remembers between invocations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadSession {
    /// Name of the workspace the conversation runs in.
    pub workspace_name: String,
    /// Directory the agent was started in.
    pub workspace_path: PathBuf,
    /// Agent session to resume. Empty when the agent never announced one.
    pub session_id: String,
    pub updated_at: DateTime<Utc>,
}

impl ThreadSession {
    #[must_use]
    pub fn new(
        workspace_name: impl Into<String>,
        workspace_path: impl Into<PathBuf>,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            workspace_name: workspace_name.into(),
            workspace_path: workspace_path.into(),
            session_id: session_id.into(),
            updated_at: Utc::now(),
        }
    }

    /// Session id to resume, if one was recorded.
    #[must_use]
    pub fn resumable_session(&self) -> Option<&str> {
        if self.session_id.is_empty() {
            None
        } else {
            Some(&self.session_id)
        }
    }
}

/// Errors from session stores.
#[derive(thiserror::Error, Debug)]
pub enum SessionStoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Keyed storage for conversation sessions.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Fetch the session stored under `key`.
    async fn load(&self, key: &str) -> Result<Option<ThreadSession>, SessionStoreError>;

    /// Store `session` under `key`, replacing any previous record.
    async fn save(&self, key: &str, session: &ThreadSession) -> Result<(), SessionStoreError>;

    /// Remove the record under `key`. Returns whether one existed.
    async fn delete(&self, key: &str) -> Result<bool, SessionStoreError>;
}
