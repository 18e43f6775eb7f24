//! Tether Terminal Demo
//!
//! Line-mode client for a remote terminal session. Each line typed on stdin
//! is sent as input; output is printed as it arrives.
//!
//! # Usage
//!
//! ```bash
//! cargo run -p tether-term -- --endpoint https://dev.example --session sess-1 --token "$TOKEN"
//! cargo run -p tether-term -- --profiles profiles.toml --profile dev
//! ```
//!
//! A profiles file holds one `[[profiles]]` table per saved connection:
//!
//! ```toml
//! [[profiles]]
//! id = "dev"
//! endpoint = "https://dev.example"
//! session_id = "sess-1"
//! token = "..."
//! ```
//!
//! Commands: `:resize COLS ROWS`, `:reconnect`, `:clear`, `:quit`.
//!
//! Logging is controlled by `TETHER_LOG` (default `warn`).

use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use clap::Parser;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

use tether::client::{
    ConnectionManager, ConnectionProfile, MemoryProfileStore, ProfileStore, TerminalMessage,
    resolve_profile,
};
use tether::connectivity::TcpProbe;
use tether::core::ErrorReporter;
use tether::resilience::RetryPolicy;
use tether::transport::{ConnectionConfig, ConnectionState, WebSocketConnector};

#[derive(Debug, Parser)]
#[command(name = "tether-term", about = "Attach to a remote terminal session")]
struct Cli {
    /// Server base URL.
    #[arg(long, env = "TETHER_ENDPOINT")]
    endpoint: Option<String>,

    /// Terminal session id.
    #[arg(long, env = "TETHER_SESSION")]
    session: Option<String>,

    /// Bearer token.
    #[arg(long, env = "TETHER_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Basic-auth username.
    #[arg(long, env = "TETHER_USERNAME")]
    username: Option<String>,

    /// Basic-auth password.
    #[arg(long, env = "TETHER_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// TOML file of saved profiles.
    #[arg(long)]
    profiles: Option<PathBuf>,

    /// Profile id to use from `--profiles`.
    #[arg(long, requires = "profiles")]
    profile: Option<String>,

    /// Maximum reconnection attempts.
    #[arg(long, default_value_t = 3)]
    max_attempts: u32,

    /// Seconds between reachability probes.
    #[arg(long, default_value_t = 5)]
    probe_interval: u64,
}

#[derive(Debug, Deserialize)]
struct ProfilesFile {
    #[serde(default)]
    profiles: Vec<ConnectionProfile>,
}

enum Input {
    Line(String),
    Resize(u16, u16),
    Reconnect,
    Clear,
    Quit,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("TETHER_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(cli: &Cli) -> Result<ConnectionConfig> {
    if let Some(path) = &cli.profiles {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let file: ProfilesFile = toml::from_str(&text).context("parsing profiles file")?;
        let store: MemoryProfileStore = file.profiles.into_iter().collect();
        let id = match &cli.profile {
            Some(id) => id.clone(),
            None => match store.ids().as_slice() {
                [only] => only.clone(),
                ids => bail!("choose a profile with --profile (available: {})", ids.join(", ")),
            },
        };
        return Ok(resolve_profile(&store, &id)?);
    }

    let endpoint = cli.endpoint.as_deref().ok_or_else(|| anyhow!("--endpoint is required"))?;
    let session = cli.session.clone().ok_or_else(|| anyhow!("--session is required"))?;
    Ok(ConnectionConfig::from_parts(
        endpoint,
        session,
        cli.token.clone(),
        cli.username.clone(),
        cli.password.clone(),
    )?)
}

fn parse_input(line: String) -> Result<Input> {
    let Some(command) = line.strip_prefix(':') else {
        return Ok(Input::Line(line));
    };
    let mut parts = command.split_whitespace();
    match parts.next() {
        Some("resize") => {
            let cols = parts.next().ok_or_else(|| anyhow!("usage: :resize COLS ROWS"))?;
            let rows = parts.next().ok_or_else(|| anyhow!("usage: :resize COLS ROWS"))?;
            Ok(Input::Resize(cols.parse()?, rows.parse()?))
        }
        Some("reconnect") => Ok(Input::Reconnect),
        Some("clear") => Ok(Input::Clear),
        Some("quit") | Some("q") => Ok(Input::Quit),
        _ => bail!("unknown command: {line}"),
    }
}

fn print_state(state: &ConnectionState) {
    match state {
        ConnectionState::Connecting => eprintln!("[connecting]"),
        ConnectionState::Connected { session_id } => eprintln!("[connected to {session_id}]"),
        ConnectionState::Reconnecting {
            attempt,
            max_attempts,
            next_retry_delay,
        } => eprintln!(
            "[reconnecting in {:.1}s, attempt {attempt}/{max_attempts}]",
            next_retry_delay.as_secs_f32()
        ),
        ConnectionState::Failed {
            message, can_retry, ..
        } => {
            let hint = if *can_retry { " (:reconnect to retry)" } else { "" };
            eprintln!("[failed: {message}{hint}]");
        }
        ConnectionState::Disconnected => eprintln!("[disconnected]"),
        ConnectionState::Destroyed => eprintln!("[closed]"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    let endpoint = config.endpoint();
    let probe_target = format!(
        "{}:{}",
        endpoint.host_str().unwrap_or("localhost"),
        endpoint.port_or_known_default().unwrap_or(443)
    );

    let reporter = ErrorReporter::default();
    let mut reports = reporter.subscribe();
    let monitor = TcpProbe::new(probe_target)
        .interval(Duration::from_secs(cli.probe_interval.max(1)))
        .spawn(Some(reporter.clone()));

    let policy = RetryPolicy::builder().max_attempts(cli.max_attempts).build()?;
    let manager = ConnectionManager::builder(WebSocketConnector::new())
        .connectivity(Arc::new(monitor))
        .error_reporter(reporter)
        .retry_policy(policy)
        .build();

    let mut states = manager.state_changes();
    let mut messages = manager.messages();
    manager.connect(config);

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = std::io::stdout();
    let mut reporting = true;

    loop {
        tokio::select! {
            line = stdin.next_line() => {
                let Some(line) = line? else { break };
                match parse_input(line) {
                    Ok(Input::Line(text)) => {
                        if let Err(e) = manager.send(&format!("{text}\n")) {
                            eprintln!("[not sent: {e}]");
                        }
                    }
                    Ok(Input::Resize(cols, rows)) => {
                        if let Err(e) = manager.resize(cols, rows) {
                            eprintln!("[not sent: {e}]");
                        }
                    }
                    Ok(Input::Reconnect) => manager.reconnect(),
                    Ok(Input::Clear) => manager.clear_output(),
                    Ok(Input::Quit) => break,
                    Err(e) => eprintln!("[{e}]"),
                }
            }
            message = messages.recv() => match message {
                Ok(TerminalMessage::Output(text)) => {
                    print!("{text}");
                    stdout.flush()?;
                }
                Ok(TerminalMessage::Closed { reason }) => {
                    eprintln!("[session ended: {}]", reason.as_deref().unwrap_or("no reason"));
                }
                Ok(TerminalMessage::Error { message }) => eprintln!("[server error: {message}]"),
                Err(RecvError::Lagged(n)) => eprintln!("[skipped {n} messages]"),
                Err(RecvError::Closed) => break,
            },
            state = states.recv() => match state {
                Ok(state) => print_state(&state),
                Err(RecvError::Lagged(_)) => print_state(&manager.state()),
                Err(RecvError::Closed) => break,
            },
            report = reports.recv(), if reporting => match report {
                Ok(report) => {
                    tracing::debug!(context = %report.context, kind = ?report.kind, "reported");
                }
                Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => reporting = false,
            },
        }
    }

    manager.disconnect();
    Ok(())
}
