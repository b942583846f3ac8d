//! Colored terminal output for relayed runs.

use std::io::{self, Write};
use std::path::Path;

use chrono::Utc;
use owo_colors::OwoColorize;

use crate::supervisor::InvocationResult;

/// Get current timestamp in the same format as tracing.
fn timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

/// Maximum length for truncated display strings.
const DEFAULT_MAX_LEN: usize = 80;

/// Truncate a string to at most `max_len` characters, adding an ellipsis if truncated.
#[must_use]
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else if max_len <= 3 {
        "...".to_string()
    } else {
        let kept: String = s.chars().take(max_len - 3).collect();
        format!("{kept}...")
    }
}

/// Print the start of a run.
pub fn print_run_start(workspace: &str, resume: Option<&str>) {
    let session = resume.map_or_else(
        || "new session".to_string(),
        |id| format!("resume={}", truncate(id, 20)),
    );
    println!(
        "{} {} workspace={} {}",
        timestamp().dimmed(),
        "[RUN]".blue().bold(),
        workspace.cyan(),
        session.dimmed()
    );
    let _ = io::stdout().flush();
}

/// Print the rolling progress board.
pub fn print_progress(board: &str) {
    for line in board.lines() {
        println!(
            "{} {} {}",
            timestamp().dimmed(),
            "[TOOL]".cyan().bold(),
            truncate(line, DEFAULT_MAX_LEN)
        );
    }
    let _ = io::stdout().flush();
}

/// Print an intermediate assistant message.
pub fn print_assistant(text: &str) {
    println!(
        "{} {} {}",
        timestamp().dimmed(),
        "[ASSISTANT]".magenta().bold(),
        truncate(text.trim(), 200).dimmed()
    );
    let _ = io::stdout().flush();
}

/// Print the final outcome of a run.
pub fn print_result(result: &InvocationResult) {
    let session = result
        .session_id
        .as_deref()
        .map_or(String::new(), |id| format!("session_id={id}"));

    match result.text() {
        Some(text) => {
            println!(
                "{} {} {}",
                timestamp().dimmed(),
                "[DONE]".green().bold(),
                session.dimmed()
            );
            println!("{text}");
        }
        None => {
            let message = result
                .error()
                .map_or_else(String::new, ToString::to_string);
            println!(
                "{} {} {} {}",
                timestamp().dimmed(),
                "[FAILED]".red().bold(),
                message.red(),
                session.dimmed()
            );
        }
    }
    let _ = io::stdout().flush();
}

/// Print configured workspaces.
pub fn print_workspaces<'a>(workspaces: impl IntoIterator<Item = (&'a str, &'a Path)>) {
    let mut any = false;
    for (name, path) in workspaces {
        any = true;
        println!("{} {}", name.cyan().bold(), path.display().dimmed());
    }
    if !any {
        println!("{}", "No workspaces configured".dimmed());
    }
    let _ = io::stdout().flush();
}

/// Print an error message.
pub fn print_error(message: &str) {
    eprintln!("{} {}", "[ERROR]".red().bold(), message);
}
