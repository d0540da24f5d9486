//! # wirebench
//!
//! Terminal workbench for HTTP, GraphQL and WebSocket endpoints. Each
//! subcommand submits one session to the engine and streams its activity
//! log until the session finishes.

#![deny(unsafe_code)]

mod render;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, warn};
use wirebench_core::{BodyMode, SessionId, SessionState};
use wirebench_engine::{Engine, GraphQlForm, HttpForm, WebSocketForm};
use wirebench_settings::WorkbenchSettings;

/// How long one poll waits for events before checking input again.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Line typed in `ws` mode that disconnects.
const CLOSE_COMMAND: &str = "/close";

/// Request/response workbench.
#[derive(Parser, Debug)]
#[command(name = "wirebench", version, about = "Exercise HTTP, GraphQL and WebSocket endpoints")]
struct Cli {
    /// Settings file (defaults to `~/.wirebench/settings.json`).
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Log level filter; `RUST_LOG` takes precedence.
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Print activity log entries as JSON lines.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Send one HTTP request.
    Http(HttpArgs),
    /// Run one GraphQL query.
    Graphql(GraphQlArgs),
    /// Open a WebSocket; each stdin line is sent as a text frame.
    Ws(WsArgs),
}

#[derive(Args, Debug)]
struct HttpArgs {
    /// Target URL.
    url: String,
    /// HTTP method.
    #[arg(short = 'X', long, default_value = "GET")]
    method: String,
    /// Header as `Key: Value`; repeatable.
    #[arg(short = 'H', long = "header")]
    headers: Vec<String>,
    /// Request body.
    #[arg(short = 'd', long)]
    data: Option<String>,
    /// Parse the body as JSON and send it with a JSON content type.
    #[arg(long)]
    json_body: bool,
}

#[derive(Args, Debug)]
struct GraphQlArgs {
    /// Endpoint URL.
    url: String,
    /// Query document.
    #[arg(short, long)]
    query: String,
    /// Variables as a JSON object.
    #[arg(long)]
    variables: Option<String>,
    /// Operation to run.
    #[arg(long)]
    operation: Option<String>,
    /// Header as `Key: Value`; repeatable.
    #[arg(short = 'H', long = "header")]
    headers: Vec<String>,
}

#[derive(Args, Debug)]
struct WsArgs {
    /// Socket URL.
    url: String,
    /// Handshake header as `Key: Value`; repeatable.
    #[arg(short = 'H', long = "header")]
    headers: Vec<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run(Cli::parse()).await {
        Ok(SessionState::Failed) => ExitCode::from(2),
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<SessionState> {
    let settings = load_settings(cli.settings.as_deref())?;
    init_logging(&settings, cli.log_level.as_deref(), matches!(cli.command, Command::Ws(_)))?;

    let engine = Engine::new(settings);
    let mut printer = Printer { json: cli.json, shown: 0 };

    let state = match cli.command {
        Command::Http(args) => {
            let id = engine.submit_http_request(HttpForm {
                method: args.method,
                url: args.url,
                headers: args.headers.join("\n"),
                body: args.data.unwrap_or_default(),
                body_mode: if args.json_body { BodyMode::Json } else { BodyMode::Raw },
            })?;
            follow(&engine, &id, &mut printer).await?
        }
        Command::Graphql(args) => {
            let id = engine.submit_graphql_query(GraphQlForm {
                url: args.url,
                headers: args.headers.join("\n"),
                query: args.query,
                variables: args.variables.unwrap_or_default(),
                operation_name: args.operation.unwrap_or_default(),
            })?;
            follow(&engine, &id, &mut printer).await?
        }
        Command::Ws(args) => {
            let id = engine.open_websocket(WebSocketForm {
                url: args.url,
                headers: args.headers.join("\n"),
            })?;
            interact(&engine, &id, &mut printer).await?
        }
    };

    engine.shutdown().await;
    printer.flush(&engine)?;
    Ok(state)
}

fn load_settings(path: Option<&std::path::Path>) -> Result<WorkbenchSettings> {
    match path {
        Some(path) => wirebench_settings::load_settings_from_path(path)
            .with_context(|| format!("failed to load settings from {}", path.display())),
        None => wirebench_settings::load_settings().context("failed to load settings"),
    }
}

fn init_logging(settings: &WorkbenchSettings, level: Option<&str>, interactive: bool) -> Result<()> {
    let level = level.unwrap_or(settings.logging.level.as_str());
    match &settings.logging.file {
        Some(file) => {
            let path = PathBuf::from(file);
            wirebench_core::logging::init_file_subscriber(level, &path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
        }
        None if interactive => {
            let path = wirebench_settings::config_dir().join("wirebench.log");
            wirebench_core::logging::init_file_subscriber(level, &path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
        }
        None => wirebench_core::logging::init_subscriber(level),
    }
    Ok(())
}

/// Prints log entries not yet shown.
struct Printer {
    json: bool,
    shown: u64,
}

impl Printer {
    fn flush(&mut self, engine: &Engine) -> Result<()> {
        for entry in engine.since(self.shown) {
            if self.json {
                println!("{}", serde_json::to_string(entry.as_ref())?);
            } else {
                println!("{}", render::entry(&entry));
            }
            self.shown = entry.log_seq;
        }
        Ok(())
    }
}

/// Whether `id` is done and its adapter has let go.
fn finished(engine: &Engine, id: &SessionId) -> Option<SessionState> {
    engine
        .session(id)
        .filter(|s| s.state.is_terminal() && !s.attached)
        .map(|s| s.state)
}

/// Stream a one-shot session until it finishes. Ctrl-C cancels it.
async fn follow(engine: &Engine, id: &SessionId, printer: &mut Printer) -> Result<SessionState> {
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut interrupted = false;
    loop {
        tokio::select! {
            _ = &mut ctrl_c, if !interrupted => {
                interrupted = true;
                let outcome = engine.cancel_session(id)?;
                debug!(?outcome, "interrupted");
            }
            _ = engine.poll(POLL_INTERVAL) => {}
        }
        printer.flush(engine)?;
        if let Some(state) = finished(engine, id) {
            return Ok(state);
        }
    }
}

/// Whether stdin lines can go out yet. Lines wait in the pipe until the
/// handshake completes.
fn accepts_input(engine: &Engine, id: &SessionId) -> bool {
    engine
        .session(id)
        .is_some_and(|s| s.state == SessionState::Open)
}

/// Stream a WebSocket session, sending stdin lines as text frames.
async fn interact(engine: &Engine, id: &SessionId, printer: &mut Printer) -> Result<SessionState> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut interrupted = false;

    loop {
        let open = accepts_input(engine, id);
        tokio::select! {
            _ = &mut ctrl_c, if !interrupted => {
                interrupted = true;
                let _ = engine.close_session(id)?;
            }
            line = lines.next_line(), if stdin_open && open => match line.context("failed to read stdin")? {
                Some(line) if line.trim() == CLOSE_COMMAND => {
                    let _ = engine.close_session(id)?;
                }
                Some(line) if line.is_empty() => {}
                Some(line) => {
                    if let Err(e) = engine.send_websocket_message(id, line) {
                        warn!(error = %e, "send rejected");
                        eprintln!("{e}");
                    }
                }
                None => {
                    stdin_open = false;
                    let _ = engine.close_session(id)?;
                }
            },
            _ = engine.poll(POLL_INTERVAL) => {}
        }
        printer.flush(engine)?;
        if let Some(state) = finished(engine, id) {
            if let Some(session) = engine.session(id) {
                eprintln!("{}", render::session(&session));
            }
            return Ok(state);
        }
    }
}
