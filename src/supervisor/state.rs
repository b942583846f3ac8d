//! Invocation state: the lifecycle phase and the running fold over events.

use crate::cli::{tool_detail, StreamEvent};
use crate::supervisor::ProgressEvent;

/// Lifecycle phase of one invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InvocationPhase {
    #[default]
    Running,
    Succeeded,
    Failed,
    TimedOut,
    Cancelled,
}

impl InvocationPhase {
    /// Every phase except `Running` is terminal.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Running)
    }
}

/// Phase tracker that accepts exactly one terminal transition.
#[derive(Debug, Clone, Default)]
pub struct InvocationPhaseMachine {
    phase: InvocationPhase,
}

impl InvocationPhaseMachine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn phase(&self) -> InvocationPhase {
        self.phase
    }

    /// Move to a terminal phase. Returns `false`, leaving the phase
    /// untouched, if already resolved or if `terminal` is `Running`.
    pub fn finish(&mut self, terminal: InvocationPhase) -> bool {
        if self.phase.is_terminal() {
            tracing::warn!(
                current = ?self.phase,
                rejected = ?terminal,
                "Invocation already resolved"
            );
            return false;
        }
        if !terminal.is_terminal() {
            return false;
        }
        tracing::debug!(from = ?self.phase, to = ?terminal, "State transition");
        self.phase = terminal;
        true
    }
}

/// Everything learned from the stream so far.
///
/// `latest_result` is last-write-wins: assistant text fills it as a
/// fallback, a final result always replaces it.
#[derive(Debug, Clone, Default)]
pub struct RunningState {
    max_turns: u32,
    session_id: Option<String>,
    latest_result: Option<String>,
    tool_uses: u32,
}

impl RunningState {
    #[must_use]
    pub fn new(max_turns: u32) -> Self {
        Self {
            max_turns,
            ..Default::default()
        }
    }

    /// Fold one event into the state, returning what to tell the caller.
    pub fn apply(&mut self, event: StreamEvent) -> Option<ProgressEvent> {
        match event {
            StreamEvent::SessionAnnounce { session_id } => {
                if self.session_id.as_deref() != Some(session_id.as_str()) {
                    tracing::debug!(%session_id, "Session announced");
                }
                self.session_id = Some(session_id);
                None
            }
            StreamEvent::ToolUse {
                tool_name,
                tool_input,
            } => {
                self.tool_uses = self.tool_uses.saturating_add(1);
                let detail = tool_detail(&tool_name, &tool_input);
                Some(ProgressEvent::Status(format_status(
                    self.tool_uses,
                    self.max_turns,
                    &tool_name,
                    detail.as_deref(),
                )))
            }
            StreamEvent::AssistantMessage { text } => {
                if text.is_empty() {
                    return None;
                }
                self.latest_result = Some(text.clone());
                Some(ProgressEvent::AssistantMessage(text))
            }
            StreamEvent::FinalResult { text } => {
                self.latest_result = Some(text);
                None
            }
            StreamEvent::Unrecognized => None,
        }
    }

    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    #[must_use]
    pub fn latest_result(&self) -> Option<&str> {
        self.latest_result.as_deref()
    }

    #[must_use]
    pub fn tool_uses(&self) -> u32 {
        self.tool_uses
    }

    /// Consume the state into `(session_id, latest_result)`.
    #[must_use]
    pub fn into_parts(self) -> (Option<String>, Option<String>) {
        (self.session_id, self.latest_result)
    }
}

/// Format a tool status line: `[n/max] Tool → detail`.
#[must_use]
pub fn format_status(n: u32, max_turns: u32, tool_name: &str, detail: Option<&str>) -> String {
    match detail {
        Some(detail) => format!("[{n}/{max_turns}] {tool_name} → {detail}"),
        None => format!("[{n}/{max_turns}] {tool_name}"),
    }
}
