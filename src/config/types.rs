//! Configuration types.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cli::DEFAULT_BINARY;
use crate::supervisor::DEFAULT_TERMINATE_TIMEOUT;

/// Relay configuration, usually loaded from TOML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Executable to run.
    #[serde(default = "default_binary")]
    pub binary: String,
    /// Arguments placed before the generated ones (e.g. `["@anthropic-ai/claude-code"]`
    /// with `binary = "npx"`).
    #[serde(default)]
    pub binary_args: Vec<String>,
    /// Maximum number of agent turns per invocation.
    #[serde(default = "default_max_turns")]
    pub max_turns: u32,
    /// Wall-clock limit for one invocation, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Time between SIGTERM and SIGKILL when terminating, in seconds.
    #[serde(default = "default_terminate_grace_secs")]
    pub terminate_grace_secs: u64,
    /// Named workspaces the agent may run in.
    #[serde(default)]
    pub workspaces: BTreeMap<String, PathBuf>,
    /// Where conversation sessions are stored.
    #[serde(default)]
    pub session_file: Option<PathBuf>,
}

fn default_binary() -> String {
    DEFAULT_BINARY.to_string()
}

fn default_max_turns() -> u32 {
    30
}

fn default_timeout_secs() -> u64 {
    600
}

fn default_terminate_grace_secs() -> u64 {
    DEFAULT_TERMINATE_TIMEOUT.as_secs()
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            binary: default_binary(),
            binary_args: Vec::new(),
            max_turns: default_max_turns(),
            timeout_secs: default_timeout_secs(),
            terminate_grace_secs: default_terminate_grace_secs(),
            workspaces: BTreeMap::new(),
            session_file: None,
        }
    }
}

impl RelayConfig {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    #[must_use]
    pub fn terminate_grace(&self) -> Duration {
        Duration::from_secs(self.terminate_grace_secs)
    }

    /// Path of a named workspace.
    #[must_use]
    pub fn workspace_path(&self, name: &str) -> Option<&Path> {
        self.workspaces.get(name).map(PathBuf::as_path)
    }

    /// Names of all configured workspaces, sorted.
    #[must_use]
    pub fn workspace_names(&self) -> Vec<String> {
        self.workspaces.keys().cloned().collect()
    }

    /// Session file to use, falling back to the user data directory.
    #[must_use]
    pub fn session_file_path(&self) -> PathBuf {
        self.session_file.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("claude-relay")
                .join("sessions.json")
        })
    }
}
