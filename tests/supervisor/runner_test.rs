//! Integration tests for the supervisor runner.
//!
//! A shell script stands in for Claude Code: it receives the generated
//! arguments as `"$@"` and writes stream-json to stdout.

use std::time::Duration;

use claude_relay::cli::SpawnError;
use claude_relay::config::RelayConfig;
use claude_relay::supervisor::{
    InvocationError, InvocationPhase, InvocationRequest, InvocationResult, NullSink,
    ProgressEvent, Supervisor, DEFAULT_TERMINATE_TIMEOUT, NO_OUTPUT_PLACEHOLDER,
};
use tempfile::TempDir;
use tokio::sync::mpsc;

#[test]
fn default_terminate_timeout_is_reasonable() {
    assert!(DEFAULT_TERMINATE_TIMEOUT.as_secs() >= 1);
    assert!(DEFAULT_TERMINATE_TIMEOUT.as_secs() <= 30);
}

#[test]
fn invocation_error_display() {
    let timeout = InvocationError::TimedOut {
        timeout: Duration::from_secs(600),
    };
    assert_eq!(timeout.to_string(), "Timeout after 600 seconds");

    let launch = InvocationError::Launch(SpawnError::NotFound("claude".to_string()));
    assert!(launch.to_string().starts_with("Process error:"));
}

#[tokio::test]
async fn missing_binary_is_launch_error() {
    let dir = TempDir::new().unwrap();
    let supervisor = Supervisor::new(&RelayConfig::default())
        .with_binary("claude-relay-missing-binary", Vec::new());

    let result = supervisor
        .invoke(&InvocationRequest::new("task", dir.path()), &mut NullSink)
        .await;

    assert!(matches!(
        result.error(),
        Some(InvocationError::Launch(SpawnError::NotFound(_)))
    ));
    assert_eq!(result.session_id, None);
}

#[cfg(unix)]
mod fake_agent {
    use super::*;
    use std::time::Instant;
    use tokio_util::sync::CancellationToken;

    fn supervisor(script: &str) -> Supervisor {
        Supervisor::new(&RelayConfig::default()).with_binary(
            "sh",
            vec!["-c".to_string(), script.to_string(), "claude".to_string()],
        )
    }

    /// Shell command that prints each JSON line on stdout.
    fn emit(lines: &[&str]) -> String {
        let quoted: Vec<String> = lines.iter().map(|l| format!("'{l}'")).collect();
        format!("printf '%s\\n' {}", quoted.join(" "))
    }

    async fn invoke_collecting(
        supervisor: &Supervisor,
        request: &InvocationRequest,
    ) -> (InvocationResult, Vec<ProgressEvent>) {
        let (mut tx, mut rx) = mpsc::unbounded_channel::<ProgressEvent>();
        let result = supervisor.invoke(request, &mut tx).await;
        drop(tx);

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        (result, events)
    }

    #[tokio::test]
    async fn end_to_end_tool_use_and_result() {
        let dir = TempDir::new().unwrap();
        let script = emit(&[
            r#"{"type":"tool_use","tool_name":"Read","tool_input":{"file_path":"a.txt"}}"#,
            r#"{"type":"result","result":"done","session_id":"abc123"}"#,
        ]);

        let (result, events) =
            invoke_collecting(&supervisor(&script), &InvocationRequest::new("task", dir.path()))
                .await;

        assert_eq!(events.len(), 1);
        match &events[0] {
            ProgressEvent::Status(status) => assert!(status.ends_with("Read → a.txt")),
            other => panic!("unexpected progress: {other:?}"),
        }
        assert!(result.is_success());
        assert_eq!(result.text(), Some("done"));
        assert_eq!(result.session_id.as_deref(), Some("abc123"));
        assert_eq!(result.phase(), InvocationPhase::Succeeded);
    }

    #[tokio::test]
    async fn empty_final_result_beats_assistant_text() {
        let dir = TempDir::new().unwrap();
        let script = emit(&[
            r#"{"type":"assistant","message":{"content":[{"type":"text","text":"thinking out loud"}]}}"#,
            r#"{"type":"result","result":""}"#,
        ]);

        let (result, events) =
            invoke_collecting(&supervisor(&script), &InvocationRequest::new("task", dir.path()))
                .await;

        assert_eq!(
            events,
            vec![ProgressEvent::AssistantMessage(
                "thinking out loud".to_string()
            )]
        );
        assert_eq!(result.text(), Some(""));
    }

    #[tokio::test]
    async fn last_assistant_message_is_fallback_result() {
        let dir = TempDir::new().unwrap();
        let script = emit(&[
            r#"{"type":"assistant","message":{"content":[{"type":"text","text":"first"}]}}"#,
            r#"{"type":"assistant","message":{"content":[{"type":"text","text":"second"},{"type":"text","text":"part"}]}}"#,
        ]);

        let (result, _) =
            invoke_collecting(&supervisor(&script), &InvocationRequest::new("task", dir.path()))
                .await;

        assert_eq!(result.text(), Some("second\npart"));
    }

    #[tokio::test]
    async fn clean_exit_without_output_uses_placeholder() {
        let dir = TempDir::new().unwrap();
        let (result, events) =
            invoke_collecting(&supervisor("exit 0"), &InvocationRequest::new("task", dir.path()))
                .await;

        assert!(events.is_empty());
        assert!(result.is_success());
        assert_eq!(result.text(), Some(NO_OUTPUT_PLACEHOLDER));
    }

    #[tokio::test]
    async fn garbage_output_is_ignored() {
        let dir = TempDir::new().unwrap();
        let script = format!(
            "echo 'Warming up...'; {}; echo '{{broken'",
            emit(&[r#"{"type":"result","result":"ok"}"#])
        );

        let (result, _) =
            invoke_collecting(&supervisor(&script), &InvocationRequest::new("task", dir.path()))
                .await;

        assert_eq!(result.text(), Some("ok"));
    }

    #[tokio::test]
    async fn result_without_trailing_newline_is_captured() {
        let dir = TempDir::new().unwrap();
        let script = r#"printf '%s' '{"type":"result","result":"tail"}'"#;

        let (result, _) =
            invoke_collecting(&supervisor(script), &InvocationRequest::new("task", dir.path()))
                .await;

        assert_eq!(result.text(), Some("tail"));
    }

    #[tokio::test]
    async fn nonzero_exit_reports_stderr() {
        let dir = TempDir::new().unwrap();
        let (result, _) = invoke_collecting(
            &supervisor("echo 'API key missing' >&2; exit 2"),
            &InvocationRequest::new("task", dir.path()),
        )
        .await;

        match result.error() {
            Some(InvocationError::ProcessExit { code, stderr }) => {
                assert_eq!(*code, Some(2));
                assert_eq!(stderr, "API key missing");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(result.error().unwrap().to_string(), "API key missing");
        assert_eq!(result.phase(), InvocationPhase::Failed);
    }

    #[tokio::test]
    async fn nonzero_exit_with_result_is_success() {
        let dir = TempDir::new().unwrap();
        let script = format!(
            "{}; exit 1",
            emit(&[r#"{"type":"result","result":"partial but useful"}"#])
        );

        let (result, _) =
            invoke_collecting(&supervisor(&script), &InvocationRequest::new("task", dir.path()))
                .await;

        assert_eq!(result.text(), Some("partial but useful"));
    }

    #[tokio::test]
    async fn timeout_terminates_process_once() {
        let dir = TempDir::new().unwrap();
        let script = format!(
            "{}; exec sleep 30",
            emit(&[r#"{"type":"system","subtype":"init","session_id":"slow-1"}"#])
        );
        let supervisor = supervisor(&script)
            .with_timeout(Duration::from_secs(1))
            .with_terminate_grace(Duration::from_secs(1));

        let start = Instant::now();
        let (result, _) =
            invoke_collecting(&supervisor, &InvocationRequest::new("task", dir.path())).await;
        let elapsed = start.elapsed();

        assert!(elapsed >= Duration::from_secs(1));
        assert!(elapsed < Duration::from_secs(10), "took {elapsed:?}");
        assert!(matches!(
            result.error(),
            Some(InvocationError::TimedOut { timeout }) if *timeout == Duration::from_secs(1)
        ));
        assert_eq!(result.error().unwrap().to_string(), "Timeout after 1 seconds");
        assert_eq!(result.session_id.as_deref(), Some("slow-1"));
        assert_eq!(result.phase(), InvocationPhase::TimedOut);
    }

    /// Exits cleanly while a background child keeps stdout open.
    fn exit_leaving_pipe_open() -> String {
        format!(
            "{}; (sleep 5) & exit 0",
            emit(&[r#"{"type":"result","result":"done","session_id":"s1"}"#])
        )
    }

    #[tokio::test]
    async fn exit_with_lingering_pipe_resolves_after_grace() {
        let dir = TempDir::new().unwrap();

        let start = Instant::now();
        let (result, _) = invoke_collecting(
            &supervisor(&exit_leaving_pipe_open()),
            &InvocationRequest::new("task", dir.path()),
        )
        .await;
        let elapsed = start.elapsed();

        assert!(result.is_success());
        assert_eq!(result.text(), Some("done"));
        assert_eq!(result.session_id.as_deref(), Some("s1"));
        assert!(elapsed < Duration::from_secs(5), "took {elapsed:?}");
    }

    #[tokio::test]
    async fn timeout_after_exit_does_not_override_result() {
        let dir = TempDir::new().unwrap();
        let supervisor =
            supervisor(&exit_leaving_pipe_open()).with_timeout(Duration::from_secs(1));

        let (result, _) =
            invoke_collecting(&supervisor, &InvocationRequest::new("task", dir.path())).await;

        assert!(result.is_success(), "got {:?}", result.error());
        assert_eq!(result.text(), Some("done"));
        assert_eq!(result.phase(), InvocationPhase::Succeeded);
    }

    #[tokio::test]
    async fn cancel_after_exit_does_not_override_result() {
        let dir = TempDir::new().unwrap();
        let cancel = CancellationToken::new();
        let request = InvocationRequest::new("task", dir.path()).with_cancellation(cancel.clone());

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            cancel.cancel();
        });

        let (result, _) =
            invoke_collecting(&supervisor(&exit_leaving_pipe_open()), &request).await;
        canceller.await.unwrap();

        assert!(result.is_success(), "got {:?}", result.error());
        assert_eq!(result.text(), Some("done"));
    }

    #[tokio::test]
    async fn cancellation_stops_process() {
        let dir = TempDir::new().unwrap();
        let cancel = CancellationToken::new();
        let request = InvocationRequest::new("task", dir.path()).with_cancellation(cancel.clone());
        let supervisor = supervisor("exec sleep 30").with_terminate_grace(Duration::from_secs(1));

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            cancel.cancel();
        });

        let start = Instant::now();
        let (result, _) = invoke_collecting(&supervisor, &request).await;
        canceller.await.unwrap();

        assert!(start.elapsed() < Duration::from_secs(10));
        assert!(matches!(result.error(), Some(InvocationError::Cancelled)));
        assert_eq!(result.phase(), InvocationPhase::Cancelled);
    }

    #[tokio::test]
    async fn announced_session_is_resumed_verbatim() {
        let dir = TempDir::new().unwrap();
        let session_id = "sess 42/α-\"quoted\"";
        let announce = serde_json::json!({
            "type": "result",
            "result": "first",
            "session_id": session_id,
        })
        .to_string();
        let script = format!("cat <<'EOF'\n{announce}\nEOF");

        let (first, _) =
            invoke_collecting(&supervisor(&script), &InvocationRequest::new("task", dir.path()))
                .await;
        let discovered = first.session_id.clone().unwrap();
        assert_eq!(discovered, session_id);

        let args_file = dir.path().join("args.txt");
        let record_args = format!(r#"printf '%s\n' "$@" > '{}'"#, args_file.display());
        let request = InvocationRequest::new("next", dir.path()).resume(discovered);
        let (second, _) = invoke_collecting(&supervisor(&record_args), &request).await;
        assert!(second.is_success());

        let args = std::fs::read_to_string(&args_file).unwrap();
        let args: Vec<&str> = args.lines().collect();
        let pos = args.iter().position(|a| *a == "--resume").unwrap();
        assert_eq!(args[pos + 1], session_id);
        assert_eq!(args[1], "next");
    }

    #[tokio::test]
    async fn runs_in_working_dir() {
        let dir = TempDir::new().unwrap();
        let script = r#"printf '{"type":"result","result":"%s"}\n' "$(pwd)""#;

        let (result, _) =
            invoke_collecting(&supervisor(script), &InvocationRequest::new("task", dir.path()))
                .await;

        let reported = std::path::PathBuf::from(result.text().unwrap());
        assert_eq!(
            reported.canonicalize().unwrap(),
            dir.path().canonicalize().unwrap()
        );
    }

    #[tokio::test]
    async fn tool_progress_counts_against_max_turns() {
        let dir = TempDir::new().unwrap();
        let script = emit(&[
            r#"{"type":"tool_use","tool_name":"Bash","tool_input":{"command":"cargo fmt"}}"#,
            r#"{"type":"tool_use","tool_name":"Grep","tool_input":{"pattern":"TODO"}}"#,
            r#"{"type":"result","result":"ok"}"#,
        ]);
        let config = RelayConfig {
            max_turns: 7,
            ..Default::default()
        };
        let supervisor = Supervisor::new(&config).with_binary(
            "sh",
            vec!["-c".to_string(), script, "claude".to_string()],
        );

        let (_, events) =
            invoke_collecting(&supervisor, &InvocationRequest::new("task", dir.path())).await;

        assert_eq!(
            events,
            vec![
                ProgressEvent::Status("[1/7] Bash → cargo fmt".to_string()),
                ProgressEvent::Status("[2/7] Grep → \"TODO\"".to_string()),
            ]
        );
    }
}
