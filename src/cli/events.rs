//! Record and event types for Claude Code `stream-json` output.
//!
//! Claude Code writes one JSON record per stdout line when run with
//! `--output-format stream-json`. Each record is classified by its `type`
//! field into the closed [`StreamEvent`] set. The `session_id` field is
//! honored on every record, whatever its type, so a single record can
//! both announce a session and carry a result.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Maximum number of characters of a shell command shown as tool detail.
pub const COMMAND_DETAIL_LEN: usize = 50;

/// Tool name used when a `tool_use` record does not name its tool.
pub const UNKNOWN_TOOL: &str = "unknown";

/// Wire shape of a record, keyed by its `type` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WireRecord {
    /// Top-level tool invocation.
    ToolUse {
        /// Kept loose so a malformed name still counts as a tool use.
        #[serde(default)]
        tool_name: Option<Value>,
        #[serde(default)]
        tool_input: Option<Value>,
    },
    /// Assistant turn carrying typed content segments.
    Assistant {
        #[serde(default)]
        message: Option<AssistantPayload>,
    },
    /// Final result of the run.
    Result {
        #[serde(default)]
        result: Option<String>,
    },
    /// Catch-all for record types this crate does not interpret.
    #[serde(other)]
    Other,
}

/// The `message` object of an assistant record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssistantPayload {
    /// Raw content segments; each is classified on its own so one odd
    /// segment cannot hide the others.
    #[serde(default)]
    pub content: Vec<Value>,
}

/// A single content segment inside an assistant message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentSegment {
    /// Plain text.
    Text {
        #[serde(default)]
        text: Option<String>,
    },
    /// Tool call embedded in the assistant turn.
    ToolUse {
        #[serde(default)]
        name: Option<Value>,
        #[serde(default)]
        input: Option<Value>,
    },
    /// Thinking blocks, images and anything newer.
    #[serde(other)]
    Other,
}

impl ContentSegment {
    fn from_value(value: Value) -> Self {
        serde_json::from_value(value).unwrap_or(Self::Other)
    }
}

/// Events produced by decoding the stream.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StreamEvent {
    /// The process announced (or re-announced) its session identifier.
    SessionAnnounce {
        /// Opaque, conversation-scoped token.
        session_id: String,
    },
    /// The agent invoked a tool.
    ToolUse {
        /// Name of the tool, e.g. `Read` or `Bash`.
        tool_name: String,
        /// Tool input parameters.
        tool_input: Map<String, Value>,
    },
    /// Interim assistant text: all text segments of one record, newline-joined.
    AssistantMessage {
        /// The joined text.
        text: String,
    },
    /// The authoritative final result.
    FinalResult {
        /// Result text, possibly empty.
        text: String,
    },
    /// Valid JSON matching no known kind, or a line that is not JSON.
    Unrecognized,
}

impl StreamEvent {
    /// Returns true if this is a [`StreamEvent::FinalResult`].
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::FinalResult { .. })
    }

    /// Returns the tool name if this is a `ToolUse` event.
    #[must_use]
    pub fn tool_name(&self) -> Option<&str> {
        match self {
            Self::ToolUse { tool_name, .. } => Some(tool_name),
            _ => None,
        }
    }

    /// Returns the session ID if this is a `SessionAnnounce` event.
    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        match self {
            Self::SessionAnnounce { session_id } => Some(session_id),
            _ => None,
        }
    }
}

/// A decoded JSON record: the cross-cutting session id plus its typed body.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Non-empty `session_id` carried by the record, if any.
    pub session_id: Option<String>,
    /// Type-specific body.
    pub body: WireRecord,
}

impl Record {
    /// Classify a parsed JSON value.
    ///
    /// Returns `None` if the value is not a JSON object.
    #[must_use]
    pub fn from_value(value: Value) -> Option<Self> {
        if !value.is_object() {
            return None;
        }

        let session_id = value
            .get("session_id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .map(str::to_string);
        let body = serde_json::from_value(value).unwrap_or(WireRecord::Other);

        Some(Self { session_id, body })
    }

    /// Expand the record into stream events, in the order they should be applied.
    ///
    /// A session announcement always comes first. A record that yields
    /// nothing else becomes a single [`StreamEvent::Unrecognized`].
    #[must_use]
    pub fn into_events(self) -> Vec<StreamEvent> {
        let mut events = Vec::new();

        if let Some(session_id) = self.session_id {
            events.push(StreamEvent::SessionAnnounce { session_id });
        }

        match self.body {
            WireRecord::ToolUse {
                tool_name,
                tool_input,
            } => events.push(tool_use_event(tool_name, tool_input)),
            WireRecord::Assistant {
                message: Some(message),
            } => {
                let mut texts = Vec::new();
                for segment in message.content.into_iter().map(ContentSegment::from_value) {
                    match segment {
                        ContentSegment::Text { text: Some(text) } if !text.is_empty() => {
                            texts.push(text);
                        }
                        ContentSegment::ToolUse { name, input } => {
                            events.push(tool_use_event(name, input));
                        }
                        _ => {}
                    }
                }
                if !texts.is_empty() {
                    events.push(StreamEvent::AssistantMessage {
                        text: texts.join("\n"),
                    });
                }
            }
            WireRecord::Result { result: Some(text) } => {
                events.push(StreamEvent::FinalResult { text });
            }
            WireRecord::Assistant { message: None }
            | WireRecord::Result { result: None }
            | WireRecord::Other => {}
        }

        if events.is_empty() {
            events.push(StreamEvent::Unrecognized);
        }
        events
    }
}

fn tool_use_event(name: Option<Value>, input: Option<Value>) -> StreamEvent {
    let tool_input = match input {
        Some(Value::Object(map)) => map,
        _ => Map::new(),
    };
    StreamEvent::ToolUse {
        tool_name: name
            .as_ref()
            .and_then(Value::as_str)
            .filter(|n| !n.is_empty())
            .map_or_else(|| UNKNOWN_TOOL.to_string(), str::to_string),
        tool_input,
    }
}

/// Describe what a tool call is working on, for progress lines.
///
/// File tools report their path, search tools their pattern (quoted for
/// `Grep`), and `Bash` a truncated command. Other tools have no detail.
#[must_use]
pub fn tool_detail(tool_name: &str, input: &Map<String, Value>) -> Option<String> {
    let field = |key: &str| {
        input
            .get(key)
            .and_then(Value::as_str)
            .filter(|value| !value.is_empty())
    };

    match tool_name {
        "Read" | "Edit" | "Write" | "MultiEdit" => field("file_path").map(str::to_string),
        "NotebookEdit" => field("notebook_path").map(str::to_string),
        "Grep" => field("pattern").map(|pattern| format!("\"{pattern}\"")),
        "Glob" => field("pattern").map(str::to_string),
        "Bash" => field("command").map(truncate_command),
        _ => None,
    }
}

/// Keep the first [`COMMAND_DETAIL_LEN`] characters, marking the cut with `...`.
fn truncate_command(command: &str) -> String {
    match command.char_indices().nth(COMMAND_DETAIL_LEN) {
        Some((cut, _)) => format!("{}...", &command[..cut]),
        None => command.to_string(),
    }
}
