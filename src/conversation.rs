//! Conversation orchestration on top of the supervisor.
//!
//! A conversation is identified by a caller-chosen key (a chat thread, a
//! terminal session). Each successful run records the workspace and agent
//! session so the next task in the same conversation resumes it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::RelayConfig;
use crate::session::{SessionStore, SessionStoreError, ThreadSession};
use crate::supervisor::{InvocationRequest, InvocationResult, ProgressSink, Supervisor};

/// Errors from conversation bookkeeping.
///
/// Invocation failures are not errors here; they are carried in the
/// returned `InvocationResult`.
#[derive(thiserror::Error, Debug)]
pub enum ConversationError {
    #[error("Unknown workspace '{name}'. Available: {}", .available.join(", "))]
    UnknownWorkspace { name: String, available: Vec<String> },

    #[error("No workspace selected and none remembered for this conversation")]
    NoWorkspace,

    #[error("Workspace directory does not exist: {0}")]
    MissingDirectory(PathBuf),

    #[error("Session store error: {0}")]
    Store(#[from] SessionStoreError),
}

/// How the caller picks a workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkspaceRef {
    /// A workspace from the `workspaces` table.
    Named(String),
    /// An arbitrary directory.
    Path(PathBuf),
}

/// Workspace and session a run will use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRun {
    pub workspace_name: String,
    pub workspace_path: PathBuf,
    /// Session to resume, if any.
    pub session_id: Option<String>,
}

/// Runs tasks for keyed conversations, resuming sessions between them.
pub struct Conversation {
    config: RelayConfig,
    supervisor: Supervisor,
    store: Arc<dyn SessionStore>,
}

impl Conversation {
    #[must_use]
    pub fn new(config: RelayConfig, store: Arc<dyn SessionStore>) -> Self {
        let supervisor = Supervisor::new(&config);
        Self {
            config,
            supervisor,
            store,
        }
    }

    /// Replace the supervisor built from the config.
    #[must_use]
    pub fn with_supervisor(mut self, supervisor: Supervisor) -> Self {
        self.supervisor = supervisor;
        self
    }

    #[must_use]
    pub fn supervisor(&self) -> &Supervisor {
        &self.supervisor
    }

    /// Configured workspaces, sorted by name.
    pub fn workspaces(&self) -> impl Iterator<Item = (&str, &Path)> {
        self.config
            .workspaces
            .iter()
            .map(|(name, path)| (name.as_str(), path.as_path()))
    }

    /// Decide where the next task for `key` runs and what it resumes.
    ///
    /// An explicit workspace resumes the stored session only if that session
    /// ran in the same directory. Without one, the stored workspace is reused.
    ///
    /// # Errors
    ///
    /// Fails for unknown or missing workspaces, when there is nothing to
    /// fall back on, or when the store cannot be read.
    pub async fn resolve(
        &self,
        key: &str,
        workspace: Option<&WorkspaceRef>,
    ) -> Result<ResolvedRun, ConversationError> {
        let stored = self.store.load(key).await?;

        let resolved = match workspace {
            Some(WorkspaceRef::Named(name)) => {
                let path = self.config.workspace_path(name).ok_or_else(|| {
                    ConversationError::UnknownWorkspace {
                        name: name.clone(),
                        available: self.config.workspace_names(),
                    }
                })?;
                ResolvedRun {
                    workspace_name: name.clone(),
                    workspace_path: path.to_path_buf(),
                    session_id: resumable_in(stored.as_ref(), path),
                }
            }
            Some(WorkspaceRef::Path(path)) => ResolvedRun {
                workspace_name: path.display().to_string(),
                workspace_path: path.clone(),
                session_id: resumable_in(stored.as_ref(), path),
            },
            None => {
                let session = stored.ok_or(ConversationError::NoWorkspace)?;
                ResolvedRun {
                    session_id: session.resumable_session().map(str::to_string),
                    workspace_name: session.workspace_name,
                    workspace_path: session.workspace_path,
                }
            }
        };

        if !resolved.workspace_path.is_dir() {
            return Err(ConversationError::MissingDirectory(resolved.workspace_path));
        }

        tracing::debug!(
            key,
            workspace = %resolved.workspace_name,
            resume = ?resolved.session_id,
            "Resolved conversation"
        );
        Ok(resolved)
    }

    /// Resolve and run one task.
    ///
    /// # Errors
    ///
    /// See [`Conversation::resolve`]. A failed invocation is not an error.
    pub async fn run(
        &self,
        key: &str,
        workspace: Option<&WorkspaceRef>,
        task: &str,
        sink: &mut dyn ProgressSink,
        cancel: Option<CancellationToken>,
    ) -> Result<InvocationResult, ConversationError> {
        let resolved = self.resolve(key, workspace).await?;
        Ok(self.execute(key, &resolved, task, sink, cancel).await)
    }

    /// Run one task in an already resolved workspace.
    ///
    /// Successful runs are recorded under `key`; failures leave the store as
    /// it was.
    pub async fn execute(
        &self,
        key: &str,
        resolved: &ResolvedRun,
        task: &str,
        sink: &mut dyn ProgressSink,
        cancel: Option<CancellationToken>,
    ) -> InvocationResult {
        let mut request = InvocationRequest::new(task, &resolved.workspace_path);
        if let Some(session_id) = &resolved.session_id {
            request = request.resume(session_id.clone());
        }
        if let Some(cancel) = cancel {
            request = request.with_cancellation(cancel);
        }

        let result = self.supervisor.invoke(&request, sink).await;

        if result.is_success() {
            let record = ThreadSession::new(
                resolved.workspace_name.clone(),
                resolved.workspace_path.clone(),
                result.session_id.clone().unwrap_or_default(),
            );
            if let Err(e) = self.store.save(key, &record).await {
                tracing::warn!(key, error = %e, "Failed to save session");
            }
        }

        result
    }

    /// Forget the session for `key`. Returns whether one existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be updated.
    pub async fn reset(&self, key: &str) -> Result<bool, ConversationError> {
        Ok(self.store.delete(key).await?)
    }
}

fn resumable_in(stored: Option<&ThreadSession>, path: &Path) -> Option<String> {
    stored
        .filter(|session| session.workspace_path == path)
        .and_then(ThreadSession::resumable_session)
        .map(str::to_string)
}
