//! Supervisor module tests.

mod runner_test;

/// Verify the public supervisor types are exported from the library.
#[test]
fn test_all_supervisor_types_exported() {
    use claude_relay::config::RelayConfig;
    use claude_relay::supervisor::{
        InvocationError, InvocationPhase, InvocationPhaseMachine, InvocationRequest, NullSink,
        ProgressBoard, ProgressEvent, RunningState, Supervisor, NO_OUTPUT_PLACEHOLDER,
    };

    let supervisor = Supervisor::new(&RelayConfig::default());
    assert_eq!(supervisor.max_turns(), 30);

    let _ = InvocationRequest::new("task", "/tmp");
    let _ = InvocationPhaseMachine::new();
    let _ = RunningState::new(10);
    let _ = ProgressBoard::new();
    let _ = NullSink;

    let _: fn() -> InvocationError = || InvocationError::Cancelled;
    let _ = ProgressEvent::Status(String::new());
    assert_eq!(InvocationPhase::default(), InvocationPhase::Running);
    assert_eq!(NO_OUTPUT_PLACEHOLDER, "(no output)");
}
