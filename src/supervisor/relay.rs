//! Progress relay between a running invocation and its caller.
//!
//! The supervisor calls a [`ProgressSink`] inline from its event loop for
//! every tool status and every assistant message. Sinks must return
//! quickly; anything slow belongs on the other side of a channel, which is
//! what the `UnboundedSender` implementation is for. Rate limiting is the
//! caller's job, see [`ProgressBoard`].

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use tokio::sync::mpsc::UnboundedSender;

/// Number of status lines kept by a [`ProgressBoard`].
pub const DEFAULT_BOARD_LINES: usize = 5;

/// Minimum delay between two board renders.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(2);

/// A notification pushed to the caller while the process runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    /// Tool status line, `[n/max] Tool → detail`.
    Status(String),
    /// Interim assistant text. Later messages replace earlier ones.
    AssistantMessage(String),
}

/// Observer for progress of one invocation.
pub trait ProgressSink: Send {
    /// A tool status line.
    fn on_progress(&mut self, status: &str);

    /// Interim assistant text, delivered once per assistant record.
    fn on_assistant_message(&mut self, text: &str);

    /// Dispatch a [`ProgressEvent`] to the matching method.
    fn deliver(&mut self, event: &ProgressEvent) {
        match event {
            ProgressEvent::Status(status) => self.on_progress(status),
            ProgressEvent::AssistantMessage(text) => self.on_assistant_message(text),
        }
    }
}

/// Sink that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn on_progress(&mut self, _status: &str) {}

    fn on_assistant_message(&mut self, _text: &str) {}
}

impl ProgressSink for UnboundedSender<ProgressEvent> {
    fn on_progress(&mut self, status: &str) {
        if self.send(ProgressEvent::Status(status.to_string())).is_err() {
            tracing::trace!("Progress receiver dropped");
        }
    }

    fn on_assistant_message(&mut self, text: &str) {
        if self
            .send(ProgressEvent::AssistantMessage(text.to_string()))
            .is_err()
        {
            tracing::trace!("Progress receiver dropped");
        }
    }
}

/// Sink built from two closures.
pub struct FnSink<P, A> {
    progress: P,
    assistant: A,
}

impl<P, A> FnSink<P, A>
where
    P: FnMut(&str) + Send,
    A: FnMut(&str) + Send,
{
    /// Wrap a progress callback and an assistant-message callback.
    pub fn new(progress: P, assistant: A) -> Self {
        Self {
            progress,
            assistant,
        }
    }
}

impl<P, A> ProgressSink for FnSink<P, A>
where
    P: FnMut(&str) + Send,
    A: FnMut(&str) + Send,
{
    fn on_progress(&mut self, status: &str) {
        (self.progress)(status);
    }

    fn on_assistant_message(&mut self, text: &str) {
        (self.assistant)(text);
    }
}

/// Caller-side throttle for status lines.
///
/// Keeps the most recent lines and hands back a rendered view at most once
/// per refresh interval. Lines pushed between renders still show up in the
/// next one.
#[derive(Debug, Clone)]
pub struct ProgressBoard {
    lines: VecDeque<String>,
    capacity: usize,
    interval: Duration,
    last_render: Option<Instant>,
    pending: bool,
}

impl Default for ProgressBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressBoard {
    /// Board with [`DEFAULT_BOARD_LINES`] lines and [`DEFAULT_REFRESH_INTERVAL`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_settings(DEFAULT_BOARD_LINES, DEFAULT_REFRESH_INTERVAL)
    }

    /// Board with custom line capacity and refresh interval.
    #[must_use]
    pub fn with_settings(capacity: usize, interval: Duration) -> Self {
        Self {
            lines: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
            interval,
            last_render: None,
            pending: false,
        }
    }

    /// Record a status line; returns the rendered board if a refresh is due.
    pub fn push(&mut self, status: &str) -> Option<String> {
        self.push_at(status, Instant::now())
    }

    /// [`push`](Self::push) with an explicit clock reading.
    pub fn push_at(&mut self, status: &str, now: Instant) -> Option<String> {
        self.lines.push_back(status.to_string());
        while self.lines.len() > self.capacity {
            self.lines.pop_front();
        }

        if let Some(last) = self.last_render {
            if now.saturating_duration_since(last) < self.interval {
                self.pending = true;
                return None;
            }
        }

        self.last_render = Some(now);
        self.pending = false;
        Some(self.render())
    }

    /// Rendered board if lines arrived since the last render.
    pub fn flush(&mut self) -> Option<String> {
        if !self.pending {
            return None;
        }
        self.pending = false;
        Some(self.render())
    }

    /// Current lines, oldest first, newline-joined.
    #[must_use]
    pub fn render(&self) -> String {
        self.lines.iter().map(String::as_str).collect::<Vec<_>>().join("\n")
    }
}
