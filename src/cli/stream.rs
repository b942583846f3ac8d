//! Incremental decoder for Claude Code stdout.
//!
//! Stdout arrives in chunks whose boundaries have nothing to do with line
//! boundaries. [`LineDecoder`] reassembles lines from raw bytes and
//! [`EventDecoder`] turns each complete line into [`StreamEvent`]s. Bad
//! lines become [`StreamEvent::Unrecognized`] and never stop decoding.

use std::collections::VecDeque;

use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::cli::{Record, StreamEvent};

/// Size of the read buffer used when draining a pipe.
pub const DEFAULT_READ_CHUNK: usize = 8 * 1024;

/// Error type for decoding a single line.
#[derive(thiserror::Error, Debug)]
pub enum StreamError {
    /// The line was empty or whitespace only.
    #[error("Empty line")]
    Empty,
    /// The line was not valid JSON.
    #[error("Failed to parse JSON: {reason}")]
    Parse { input: String, reason: String },
}

/// Decode one line of stream-json output.
///
/// # Errors
///
/// Returns `StreamError::Empty` for blank lines and `StreamError::Parse`
/// if the line is not valid JSON.
pub fn parse_line(line: &str) -> Result<Vec<StreamEvent>, StreamError> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Err(StreamError::Empty);
    }

    let value: Value = serde_json::from_str(trimmed).map_err(|e| StreamError::Parse {
        input: line.to_string(),
        reason: e.to_string(),
    })?;

    Ok(Record::from_value(value).map_or_else(|| vec![StreamEvent::Unrecognized], Record::into_events))
}

/// Reassembles newline-terminated lines from arbitrary byte chunks.
///
/// Buffers bytes rather than text, so a UTF-8 sequence split across two
/// chunks decodes correctly once its line is complete.
#[derive(Debug, Default)]
pub struct LineDecoder {
    pending: Vec<u8>,
}

impl LineDecoder {
    /// Create an empty decoder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every line it completes.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);

        let Some(last_newline) = self.pending.iter().rposition(|&b| b == b'\n') else {
            return Vec::new();
        };

        let rest = self.pending.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.pending, rest);

        complete[..last_newline]
            .split(|&b| b == b'\n')
            .map(|line| String::from_utf8_lossy(line).into_owned())
            .collect()
    }

    /// Take the trailing unterminated segment, if any.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.pending);
        Some(String::from_utf8_lossy(&rest).into_owned())
    }

    /// Number of buffered bytes not yet terminated by a newline.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

/// Byte chunks in, stream events out.
#[derive(Debug, Default)]
pub struct EventDecoder {
    lines: LineDecoder,
}

impl EventDecoder {
    /// Create an empty decoder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of stdout and return the events of every completed line.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        for line in self.lines.push(chunk) {
            decode_into(&line, &mut events);
        }
        events
    }

    /// Give the unterminated tail one last parse attempt.
    ///
    /// Call this once the stream has closed (or is being abandoned) so a
    /// final record written without a trailing newline is not lost.
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        if let Some(line) = self.lines.finish() {
            decode_into(&line, &mut events);
        }
        events
    }
}

fn decode_into(line: &str, events: &mut Vec<StreamEvent>) {
    match parse_line(line) {
        Ok(decoded) => events.extend(decoded),
        Err(StreamError::Empty) => {}
        Err(e) => {
            tracing::trace!(error = %e, "Dropping undecodable stream line");
            events.push(StreamEvent::Unrecognized);
        }
    }
}

struct DecodeState<R> {
    reader: R,
    decoder: EventDecoder,
    buf: Vec<u8>,
    queue: VecDeque<StreamEvent>,
    done: bool,
}

/// Lazily decode every event from an async byte source until EOF.
///
/// A read error ends the stream after flushing what was already buffered.
pub fn decode_stream<R>(reader: R) -> impl futures_core::Stream<Item = StreamEvent>
where
    R: AsyncRead + Unpin,
{
    let state = DecodeState {
        reader,
        decoder: EventDecoder::new(),
        buf: vec![0; DEFAULT_READ_CHUNK],
        queue: VecDeque::new(),
        done: false,
    };

    futures_util::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(event) = state.queue.pop_front() {
                return Some((event, state));
            }
            if state.done {
                return None;
            }

            match state.reader.read(&mut state.buf).await {
                Ok(0) => {
                    state.done = true;
                    let tail = state.decoder.finish();
                    state.queue.extend(tail);
                }
                Ok(n) => {
                    let events = state.decoder.push(&state.buf[..n]);
                    state.queue.extend(events);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Stream read failed, ending decode");
                    state.done = true;
                    let tail = state.decoder.finish();
                    state.queue.extend(tail);
                }
            }
        }
    })
}
