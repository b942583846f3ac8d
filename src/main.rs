//! Claude Relay - Run Claude Code headlessly and relay its progress.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use futures_util::StreamExt;
use tokio::io::AsyncRead;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use claude_relay::cli::decode_stream;
use claude_relay::config::{ConfigError, ConfigLoader, RelayConfig};
use claude_relay::conversation::{Conversation, ConversationError, WorkspaceRef};
use claude_relay::display;
use claude_relay::session::FileSessionStore;
use claude_relay::supervisor::{ProgressBoard, ProgressEvent, RunningState};

#[derive(Parser)]
#[command(
    name = "claude-relay",
    about = "Run Claude Code headlessly and relay its progress",
    version
)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Config file to use instead of the default search paths.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a task, resuming the conversation's session when possible.
    Run(RunArgs),
    /// List configured workspaces.
    Workspaces,
    /// Forget the stored session of a conversation.
    Reset {
        /// Conversation key.
        #[arg(short, long, default_value = "default")]
        conversation: String,
    },
    /// Decode a captured stream-json transcript and print the interpreted events.
    Replay {
        /// Transcript file. Reads stdin when omitted.
        file: Option<PathBuf>,
    },
}

#[derive(Args)]
struct RunArgs {
    /// The task to execute.
    task: String,
    /// Conversation key.
    #[arg(short, long, default_value = "default")]
    conversation: String,
    /// Named workspace from the config.
    #[arg(short, long, conflicts_with = "dir")]
    workspace: Option<String>,
    /// Run in this directory instead of a named workspace.
    #[arg(long)]
    dir: Option<PathBuf>,
    /// Resume this session instead of the stored one.
    #[arg(long)]
    resume: Option<String>,
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Conversation(#[from] ConversationError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match dispatch(cli).await {
        Ok(code) => code,
        Err(e) => {
            display::print_error(&e.to_string());
            ExitCode::FAILURE
        }
    }
}

async fn dispatch(cli: Cli) -> Result<ExitCode, CliError> {
    match cli.command {
        Commands::Run(args) => run(load_config(cli.config)?, args).await,
        Commands::Workspaces => {
            let config = load_config(cli.config)?;
            display::print_workspaces(
                config
                    .workspaces
                    .iter()
                    .map(|(name, path)| (name.as_str(), path.as_path())),
            );
            Ok(ExitCode::SUCCESS)
        }
        Commands::Reset { conversation } => {
            let conversations = open_conversations(load_config(cli.config)?);
            if conversations.reset(&conversation).await? {
                println!("Forgot session for '{conversation}'");
            } else {
                println!("No session stored for '{conversation}'");
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Replay { file } => replay(file).await,
    }
}

fn load_config(path: Option<PathBuf>) -> Result<RelayConfig, ConfigError> {
    path.map_or_else(ConfigLoader::new, ConfigLoader::with_path)
        .load()
}

fn open_conversations(config: RelayConfig) -> Conversation {
    let store = Arc::new(FileSessionStore::new(config.session_file_path()));
    tracing::debug!(path = %store.path().display(), "Using session file");
    Conversation::new(config, store)
}

async fn run(config: RelayConfig, args: RunArgs) -> Result<ExitCode, CliError> {
    let conversations = open_conversations(config);

    let workspace = match (args.workspace, args.dir) {
        (Some(name), _) => Some(WorkspaceRef::Named(name)),
        (None, Some(dir)) => Some(WorkspaceRef::Path(dir.canonicalize().unwrap_or(dir))),
        (None, None) => None,
    };

    let mut resolved = conversations
        .resolve(&args.conversation, workspace.as_ref())
        .await?;
    if let Some(session_id) = args.resume {
        resolved.session_id = Some(session_id);
    }
    display::print_run_start(&resolved.workspace_name, resolved.session_id.as_deref());

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, stopping Claude Code");
            interrupt.cancel();
        }
    });

    let (mut tx, rx) = mpsc::unbounded_channel();
    let printer = tokio::spawn(print_progress(rx));

    let result = conversations
        .execute(&args.conversation, &resolved, &args.task, &mut tx, Some(cancel))
        .await;

    drop(tx);
    if let Err(e) = printer.await {
        tracing::debug!(error = %e, "Progress printer ended abnormally");
    }

    display::print_result(&result);
    Ok(if result.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn print_progress(mut rx: UnboundedReceiver<ProgressEvent>) {
    let mut board = ProgressBoard::new();
    while let Some(event) = rx.recv().await {
        match event {
            ProgressEvent::Status(status) => {
                if let Some(rendered) = board.push(&status) {
                    display::print_progress(&rendered);
                }
            }
            ProgressEvent::AssistantMessage(text) => display::print_assistant(&text),
        }
    }
    if let Some(rendered) = board.flush() {
        display::print_progress(&rendered);
    }
}

async fn replay(file: Option<PathBuf>) -> Result<ExitCode, CliError> {
    let reader: Box<dyn AsyncRead + Unpin + Send> = match file {
        Some(path) => Box::new(tokio::fs::File::open(path).await?),
        None => Box::new(tokio::io::stdin()),
    };

    let mut state = RunningState::new(0);
    let events = decode_stream(reader);
    tokio::pin!(events);
    while let Some(event) = events.next().await {
        println!("{}", serde_json::to_string(&event)?);
        state.apply(event);
    }

    tracing::info!(
        session_id = ?state.session_id(),
        tool_uses = state.tool_uses(),
        has_result = state.latest_result().is_some(),
        "Replay finished"
    );
    Ok(ExitCode::SUCCESS)
}
