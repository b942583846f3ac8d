//! Tests for Claude process spawning and control.

use claude_relay::cli::{ClaudeProcess, ClaudeProcessBuilder, SpawnError};

#[test]
fn builder_new_creates_with_prompt() {
    let builder = ClaudeProcessBuilder::new("Fix the bug");
    let args = builder.build_args();

    assert_eq!(
        &args[..6],
        &[
            "-p",
            "Fix the bug",
            "--output-format",
            "stream-json",
            "--verbose",
            "--dangerously-skip-permissions",
        ]
    );
}

#[test]
fn builder_resume_session() {
    let builder = ClaudeProcessBuilder::new("continue").resume("session_abc123");
    let args = builder.build_args();

    let pos = args.iter().position(|a| a == "--resume").unwrap();
    assert_eq!(args[pos + 1], "session_abc123");
}

#[test]
fn builder_empty_resume_is_ignored() {
    let builder = ClaudeProcessBuilder::new("continue").resume("");
    assert!(!builder.build_args().contains(&"--resume".to_string()));
    assert_eq!(builder.resume_session(), None);
}

#[test]
fn builder_max_turns() {
    let builder = ClaudeProcessBuilder::new("task").max_turns(5);
    let args = builder.build_args();

    let pos = args.iter().position(|a| a == "--max-turns").unwrap();
    assert_eq!(args[pos + 1], "5");
}

#[test]
fn builder_prompt_is_one_argument() {
    let prompt = "fix it; rm -rf / && echo \"quoted\"";
    let args = ClaudeProcessBuilder::new(prompt).build_args();
    assert_eq!(args[1], prompt);
}

#[test]
fn spawn_missing_binary_is_not_found() {
    let builder = ClaudeProcessBuilder::new("task");
    let err = ClaudeProcess::spawn_with_binary("claude-relay-missing-binary", &[], &builder)
        .unwrap_err();
    assert!(matches!(err, SpawnError::NotFound(name) if name == "claude-relay-missing-binary"));
}

#[cfg(unix)]
#[tokio::test]
async fn spawn_passes_prefix_and_generated_args() {
    use tokio::io::AsyncReadExt;

    let builder = ClaudeProcessBuilder::new("hello world").resume("s-1");
    let prefix = vec![
        "-c".to_string(),
        r#"printf '%s\n' "$@""#.to_string(),
        "claude".to_string(),
    ];
    let mut process = ClaudeProcess::spawn_with_binary("sh", &prefix, &builder).unwrap();

    let mut stdout = process.take_stdout().unwrap();
    let mut output = String::new();
    stdout.read_to_string(&mut output).await.unwrap();
    let status = process.wait().await.unwrap();

    assert!(status.success());
    let lines: Vec<&str> = output.lines().collect();
    assert_eq!(lines, builder.build_args());
}

#[cfg(unix)]
#[tokio::test]
async fn spawn_runs_in_working_dir() {
    use tokio::io::AsyncReadExt;

    let dir = tempfile::TempDir::new().unwrap();
    let builder = ClaudeProcessBuilder::new("task").working_dir(dir.path());
    let prefix = vec!["-c".to_string(), "pwd".to_string(), "claude".to_string()];
    let mut process = ClaudeProcess::spawn_with_binary("sh", &prefix, &builder).unwrap();

    let mut output = String::new();
    process
        .take_stdout()
        .unwrap()
        .read_to_string(&mut output)
        .await
        .unwrap();
    process.wait().await.unwrap();

    let expected = dir.path().canonicalize().unwrap();
    let actual = std::path::PathBuf::from(output.trim()).canonicalize().unwrap();
    assert_eq!(actual, expected);
}

#[cfg(unix)]
#[tokio::test]
async fn graceful_terminate_stops_long_running_process() {
    use std::time::{Duration, Instant};

    let builder = ClaudeProcessBuilder::new("task");
    let prefix = vec![
        "-c".to_string(),
        "exec sleep 30".to_string(),
        "claude".to_string(),
    ];
    let mut process = ClaudeProcess::spawn_with_binary("sh", &prefix, &builder).unwrap();
    assert!(process.id().is_some());

    let start = Instant::now();
    process
        .graceful_terminate(Duration::from_secs(2))
        .await
        .unwrap();
    assert!(start.elapsed() < Duration::from_secs(10));
    assert!(process.try_wait().unwrap().is_some());
}
