//! Supervisor for one headless Claude Code invocation.
//!
//! [`Supervisor::invoke`] spawns the process, decodes its stdout while it
//! runs, relays progress to the caller and turns whichever comes first of
//! exit, timeout or cancellation into a single [`InvocationResult`].
//!
//! Callers must not run two invocations for the same conversation at
//! once; this module does not serialize them.

use std::future::pending;
use std::path::PathBuf;
use std::pin::Pin;
use std::process::ExitStatus;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::ChildStdout;
use tokio::time::{sleep, Sleep};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::cli::{
    ClaudeProcess, ClaudeProcessBuilder, EventDecoder, SpawnError, StreamEvent,
    DEFAULT_READ_CHUNK,
};
use crate::config::RelayConfig;
use crate::supervisor::{
    InvocationPhase, InvocationPhaseMachine, ProgressSink, RunningState,
};

/// Default timeout for graceful process termination.
pub const DEFAULT_TERMINATE_TIMEOUT: Duration = Duration::from_secs(5);

/// How long to keep reading stdout after a forced termination.
pub const DRAIN_GRACE: Duration = Duration::from_millis(500);

/// How long output pipes may stay open after the process itself exited
/// (e.g. held by a background child it spawned).
pub const PIPE_LINGER: Duration = Duration::from_secs(2);

/// Result text for a clean exit that produced no result.
pub const NO_OUTPUT_PLACEHOLDER: &str = "(no output)";

/// Upper bound on captured stderr.
const MAX_STDERR_BYTES: usize = 64 * 1024;

/// Why an invocation failed.
#[derive(thiserror::Error, Debug)]
pub enum InvocationError {
    /// The process could not be started.
    #[error("Process error: {0}")]
    Launch(#[from] SpawnError),
    /// The process outlived the configured timeout and was terminated.
    #[error("Timeout after {} seconds", .timeout.as_secs_f64())]
    TimedOut { timeout: Duration },
    /// The process exited non-zero without producing a result.
    #[error("{}", exit_message(.code, .stderr))]
    ProcessExit { code: Option<i32>, stderr: String },
    /// The caller cancelled the invocation.
    #[error("Invocation cancelled")]
    Cancelled,
    /// Process pipes were not available after spawning.
    #[error("Process stdout not available")]
    NoStdout,
    /// Waiting on the process failed.
    #[error("Failed to wait for process: {0}")]
    Wait(#[source] std::io::Error),
}

#[allow(clippy::ref_option)]
fn exit_message(code: &Option<i32>, stderr: &str) -> String {
    if !stderr.is_empty() {
        return stderr.to_string();
    }
    match code {
        Some(code) => format!("Exit code: {code}"),
        None => "Terminated by signal".to_string(),
    }
}

/// One task for the agent.
#[derive(Debug, Clone)]
pub struct InvocationRequest {
    /// Task text passed as the prompt.
    pub task: String,
    /// Workspace the process runs in.
    pub working_dir: PathBuf,
    /// Session to resume; ignored when empty.
    pub prior_session_id: Option<String>,
    cancel: Option<CancellationToken>,
}

impl InvocationRequest {
    /// Create a request for a fresh session.
    #[must_use]
    pub fn new(task: impl Into<String>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            task: task.into(),
            working_dir: working_dir.into(),
            prior_session_id: None,
            cancel: None,
        }
    }

    /// Resume a previous session.
    #[must_use]
    pub fn resume(mut self, session_id: impl Into<String>) -> Self {
        self.prior_session_id = Some(session_id.into());
        self
    }

    /// Allow the caller to stop the invocation early.
    ///
    /// Cancelling terminates the process the same way a timeout does.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }
}

/// Terminal outcome of an invocation.
#[derive(Debug)]
pub enum Outcome {
    /// The run produced a result (or exited cleanly without one).
    Succeeded {
        /// Final result text.
        text: String,
    },
    /// The run failed.
    Failed(InvocationError),
}

/// Result of an invocation, produced exactly once per call.
#[derive(Debug)]
pub struct InvocationResult {
    /// What happened.
    pub outcome: Outcome,
    /// Last session ID the process announced, on success or failure.
    pub session_id: Option<String>,
}

impl InvocationResult {
    fn failed(error: InvocationError, session_id: Option<String>) -> Self {
        Self {
            outcome: Outcome::Failed(error),
            session_id,
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Succeeded { .. })
    }

    /// Result text, if successful.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        match &self.outcome {
            Outcome::Succeeded { text } => Some(text),
            Outcome::Failed(_) => None,
        }
    }

    /// Failure, if not successful.
    #[must_use]
    pub fn error(&self) -> Option<&InvocationError> {
        match &self.outcome {
            Outcome::Succeeded { .. } => None,
            Outcome::Failed(e) => Some(e),
        }
    }

    /// Terminal phase this result represents.
    #[must_use]
    pub fn phase(&self) -> InvocationPhase {
        match &self.outcome {
            Outcome::Succeeded { .. } => InvocationPhase::Succeeded,
            Outcome::Failed(InvocationError::TimedOut { .. }) => InvocationPhase::TimedOut,
            Outcome::Failed(InvocationError::Cancelled) => InvocationPhase::Cancelled,
            Outcome::Failed(_) => InvocationPhase::Failed,
        }
    }
}

/// How the supervision loop ended.
enum LoopEnd {
    Exited(ExitStatus),
    TimedOut,
    Cancelled,
    WaitFailed(std::io::Error),
}

/// Launches and supervises Claude Code invocations.
///
/// Holds configuration only; every [`invoke`](Self::invoke) owns its own
/// child process and timer.
#[derive(Debug, Clone)]
pub struct Supervisor {
    binary: String,
    binary_args: Vec<String>,
    max_turns: u32,
    timeout: Duration,
    terminate_grace: Duration,
}

impl Supervisor {
    /// Create a supervisor from configuration.
    #[must_use]
    pub fn new(config: &RelayConfig) -> Self {
        Self {
            binary: config.binary.clone(),
            binary_args: config.binary_args.clone(),
            max_turns: config.max_turns,
            timeout: config.timeout(),
            terminate_grace: config.terminate_grace(),
        }
    }

    /// Use a different executable, with arguments placed before the generated ones.
    #[must_use]
    pub fn with_binary(mut self, binary: impl Into<String>, binary_args: Vec<String>) -> Self {
        self.binary = binary.into();
        self.binary_args = binary_args;
        self
    }

    /// Override the wall-clock timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Override the SIGTERM-to-SIGKILL grace period.
    #[must_use]
    pub fn with_terminate_grace(mut self, grace: Duration) -> Self {
        self.terminate_grace = grace;
        self
    }

    #[must_use]
    pub fn max_turns(&self) -> u32 {
        self.max_turns
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// The process configuration a request maps to.
    #[must_use]
    pub fn builder_for(&self, request: &InvocationRequest) -> ClaudeProcessBuilder {
        let mut builder = ClaudeProcessBuilder::new(request.task.clone())
            .max_turns(self.max_turns)
            .working_dir(request.working_dir.clone());
        if let Some(session_id) = &request.prior_session_id {
            builder = builder.resume(session_id.clone());
        }
        builder
    }

    /// Run one invocation to completion.
    ///
    /// Never returns early with a partial result: progress reaches the
    /// caller only through `sink`, which is called inline and must not
    /// block.
    pub async fn invoke(
        &self,
        request: &InvocationRequest,
        sink: &mut dyn ProgressSink,
    ) -> InvocationResult {
        let span = tracing::info_span!("invocation", id = %Uuid::new_v4());
        self.run(request, sink).instrument(span).await
    }

    async fn run(&self, request: &InvocationRequest, sink: &mut dyn ProgressSink) -> InvocationResult {
        let builder = self.builder_for(request);
        tracing::info!(
            binary = %self.binary,
            cwd = %request.working_dir.display(),
            resume = ?builder.resume_session(),
            max_turns = self.max_turns,
            timeout_secs = self.timeout.as_secs(),
            "Spawning Claude Code"
        );

        let mut process =
            match ClaudeProcess::spawn_with_binary(&self.binary, &self.binary_args, &builder) {
                Ok(process) => process,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to launch Claude Code");
                    return InvocationResult::failed(e.into(), None);
                }
            };
        tracing::debug!(pid = ?process.id(), "Process spawned");

        let (Some(mut stdout), Some(mut stderr)) = (process.take_stdout(), process.take_stderr())
        else {
            if let Err(e) = process.kill().await {
                tracing::warn!(error = %e, "Failed to kill process without pipes");
            }
            return InvocationResult::failed(InvocationError::NoStdout, None);
        };

        let mut phase = InvocationPhaseMachine::new();
        let mut state = RunningState::new(self.max_turns);
        let mut decoder = EventDecoder::new();
        let mut stderr_bytes: Vec<u8> = Vec::new();
        let mut out_buf = vec![0u8; DEFAULT_READ_CHUNK];
        let mut err_buf = vec![0u8; DEFAULT_READ_CHUNK];
        let mut stdout_open = true;
        let mut stderr_open = true;
        let mut exit_status: Option<ExitStatus> = None;
        let mut linger: Option<Pin<Box<Sleep>>> = None;

        let deadline = sleep(self.timeout);
        tokio::pin!(deadline);

        let end = loop {
            tokio::select! {
                biased;

                // Disarmed once the process has exited; only the linger timer
                // or closing pipes end the loop from then on.
                () = cancelled(request.cancel.as_ref()), if exit_status.is_none() => {
                    break LoopEnd::Cancelled;
                }
                () = &mut deadline, if exit_status.is_none() => break LoopEnd::TimedOut,
                read = stdout.read(&mut out_buf), if stdout_open => {
                    match read {
                        Ok(0) => stdout_open = false,
                        Ok(n) => relay(&mut state, decoder.push(&out_buf[..n]), sink),
                        Err(e) => {
                            tracing::warn!(error = %e, "Failed to read stdout");
                            stdout_open = false;
                        }
                    }
                    if let (Some(status), false, false) = (exit_status, stdout_open, stderr_open) {
                        break LoopEnd::Exited(status);
                    }
                }
                read = stderr.read(&mut err_buf), if stderr_open => {
                    match read {
                        Ok(0) => stderr_open = false,
                        Ok(n) => {
                            let chunk = &err_buf[..n];
                            tracing::debug!(chunk = %String::from_utf8_lossy(chunk).trim_end(), "stderr");
                            let room = MAX_STDERR_BYTES.saturating_sub(stderr_bytes.len());
                            stderr_bytes.extend_from_slice(&chunk[..n.min(room)]);
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "Failed to read stderr");
                            stderr_open = false;
                        }
                    }
                    if let (Some(status), false, false) = (exit_status, stdout_open, stderr_open) {
                        break LoopEnd::Exited(status);
                    }
                }
                status = process.wait(), if exit_status.is_none() => {
                    match status {
                        Ok(status) => {
                            tracing::debug!(code = ?status.code(), "Process exited");
                            if !stdout_open && !stderr_open {
                                break LoopEnd::Exited(status);
                            }
                            exit_status = Some(status);
                            linger = Some(Box::pin(sleep(PIPE_LINGER)));
                        }
                        Err(e) => break LoopEnd::WaitFailed(e),
                    }
                }
                () = sleep_or_pending(&mut linger) => {
                    linger = None;
                    tracing::warn!("Output pipes still open after exit, finalizing");
                    if let Some(status) = exit_status {
                        break LoopEnd::Exited(status);
                    }
                }
            }
        };

        if matches!(end, LoopEnd::TimedOut | LoopEnd::Cancelled) {
            tracing::warn!(
                timed_out = matches!(end, LoopEnd::TimedOut),
                "Terminating Claude Code"
            );
            if let Err(e) = process.graceful_terminate(self.terminate_grace).await {
                tracing::warn!(error = %e, "Failed to terminate process");
            }
            if stdout_open {
                drain_stdout(&mut stdout, &mut out_buf, &mut decoder, &mut state, sink).await;
            }
        }

        relay(&mut state, decoder.finish(), sink);

        let (session_id, latest_result) = state.into_parts();
        let outcome = match end {
            LoopEnd::Exited(status) => {
                exit_outcome(status, latest_result, &String::from_utf8_lossy(&stderr_bytes))
            }
            LoopEnd::TimedOut => Outcome::Failed(InvocationError::TimedOut {
                timeout: self.timeout,
            }),
            LoopEnd::Cancelled => Outcome::Failed(InvocationError::Cancelled),
            LoopEnd::WaitFailed(e) => Outcome::Failed(InvocationError::Wait(e)),
        };

        let result = InvocationResult {
            outcome,
            session_id,
        };
        phase.finish(result.phase());

        match result.error() {
            None => tracing::info!(
                session_id = ?result.session_id,
                "Invocation succeeded"
            ),
            Some(error) => tracing::info!(
                session_id = ?result.session_id,
                error = %error,
                "Invocation failed"
            ),
        }

        result
    }
}

/// Map a process exit to an outcome.
///
/// Captured output wins over a non-zero exit code: the agent may print a
/// usable result and still exit non-zero.
fn exit_outcome(status: ExitStatus, latest_result: Option<String>, stderr: &str) -> Outcome {
    match (status.success(), latest_result) {
        (true, latest_result) => Outcome::Succeeded {
            text: latest_result.unwrap_or_else(|| NO_OUTPUT_PLACEHOLDER.to_string()),
        },
        (false, Some(text)) => {
            tracing::warn!(
                code = ?status.code(),
                "Non-zero exit with captured output, reporting success"
            );
            Outcome::Succeeded { text }
        }
        (false, None) => Outcome::Failed(InvocationError::ProcessExit {
            code: status.code(),
            stderr: stderr.trim().to_string(),
        }),
    }
}

fn relay(state: &mut RunningState, events: Vec<StreamEvent>, sink: &mut dyn ProgressSink) {
    for event in events {
        if matches!(event, StreamEvent::Unrecognized) {
            tracing::trace!("Ignoring unrecognized record");
            continue;
        }
        if let Some(progress) = state.apply(event) {
            tracing::debug!(?progress, "Relaying progress");
            sink.deliver(&progress);
        }
    }
}

/// Read whatever the terminated process left in its stdout pipe.
async fn drain_stdout(
    stdout: &mut ChildStdout,
    buf: &mut [u8],
    decoder: &mut EventDecoder,
    state: &mut RunningState,
    sink: &mut dyn ProgressSink,
) {
    let drain = async {
        loop {
            match stdout.read(buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => relay(&mut *state, decoder.push(&buf[..n]), &mut *sink),
            }
        }
    };
    if tokio::time::timeout(DRAIN_GRACE, drain).await.is_err() {
        tracing::debug!("Stdout still open after drain grace");
    }
}

async fn cancelled(token: Option<&CancellationToken>) {
    match token {
        Some(token) => token.cancelled().await,
        None => pending().await,
    }
}

async fn sleep_or_pending(sleep: &mut Option<Pin<Box<Sleep>>>) {
    match sleep {
        Some(sleep) => sleep.as_mut().await,
        None => pending().await,
    }
}
