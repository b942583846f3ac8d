//! JSON file backed session store.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::Mutex;

use super::{SessionStore, SessionStoreError, ThreadSession};

/// Current session file format version.
const SESSIONS_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct SessionDocument {
    version: u32,
    #[serde(default)]
    sessions: HashMap<String, ThreadSession>,
}

impl Default for SessionDocument {
    fn default() -> Self {
        Self {
            version: SESSIONS_VERSION,
            sessions: HashMap::new(),
        }
    }
}

/// Session store persisted as a single JSON document.
///
/// Every operation re-reads the file so several processes sharing one file
/// see each other's writes. Writes go to a temporary file that is renamed
/// over the existing file.
#[derive(Debug)]
pub struct FileSessionStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileSessionStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_document(&self) -> Result<SessionDocument, SessionStoreError> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(SessionDocument::default()),
            Err(e) => return Err(e.into()),
        };

        if content.trim().is_empty() {
            return Ok(SessionDocument::default());
        }

        let document: SessionDocument = serde_json::from_str(&content)?;
        if document.version != SESSIONS_VERSION {
            tracing::warn!(
                path = %self.path.display(),
                version = document.version,
                "Unexpected session file version"
            );
        }
        Ok(document)
    }

    async fn write_document(&self, document: &SessionDocument) -> Result<(), SessionStoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let temp_path = self.path.with_extension("tmp");
        let content = serde_json::to_string_pretty(document)?;
        fs::write(&temp_path, content).await?;
        fs::rename(&temp_path, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn load(&self, key: &str) -> Result<Option<ThreadSession>, SessionStoreError> {
        let _guard = self.lock.lock().await;
        let mut document = self.read_document().await?;
        Ok(document.sessions.remove(key))
    }

    async fn save(&self, key: &str, session: &ThreadSession) -> Result<(), SessionStoreError> {
        let _guard = self.lock.lock().await;
        let mut document = self.read_document().await?;
        document.version = SESSIONS_VERSION;
        document.sessions.insert(key.to_string(), session.clone());
        self.write_document(&document).await?;
        tracing::debug!(key, session_id = %session.session_id, "Saved session");
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, SessionStoreError> {
        let _guard = self.lock.lock().await;
        let mut document = self.read_document().await?;
        if document.sessions.remove(key).is_none() {
            return Ok(false);
        }
        self.write_document(&document).await?;
        Ok(true)
    }
}
