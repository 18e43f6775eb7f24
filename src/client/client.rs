//! Connection manager handle.
//!
//! [`ConnectionManager`] is a cheap handle to a background task that owns
//! one terminal session's link, state machine, output buffer and
//! reconnection loop.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::{broadcast, mpsc, watch};

use super::actor::{Actor, Command, LinkSlot, Shared};
use crate::connectivity::{ConnectivityHandle, ConnectivityMonitor};
use crate::core::ErrorReporter;
use crate::core::constants::{DEFAULT_CONNECT_TIMEOUT, DEFAULT_EVENT_CAPACITY, OUTPUT_BUFFER_CAPACITY};
use crate::resilience::RetryPolicy;
use crate::transport::{
    ClientMessage, ConnectionConfig, ConnectionState, Connector, SendError, SharedOutput,
};

/// Message surfaced to observers of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalMessage {
    /// Terminal output, also appended to the output buffer.
    Output(String),
    /// The server ended the session.
    Closed {
        /// Why the session ended.
        reason: Option<String>,
    },
    /// The server reported an error.
    Error {
        /// Error description.
        message: String,
    },
}

/// Manager configuration.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Backoff and attempt budget for automatic reconnection.
    pub retry_policy: RetryPolicy,

    /// Timeout for a single connection attempt.
    pub connect_timeout: Duration,

    /// Characters of output to retain.
    pub buffer_capacity: usize,

    /// Capacity of the state and message broadcast channels.
    pub event_capacity: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            retry_policy: RetryPolicy::default(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            buffer_capacity: OUTPUT_BUFFER_CAPACITY,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

/// Builder for a [`ConnectionManager`].
pub struct ConnectionManagerBuilder {
    connector: Arc<dyn Connector>,
    connectivity: Option<Arc<dyn ConnectivityMonitor>>,
    reporter: Option<ErrorReporter>,
    config: ManagerConfig,
}

impl ConnectionManagerBuilder {
    /// Start a builder around a connector.
    pub fn new(connector: impl Connector) -> Self {
        Self::with_connector(Arc::new(connector))
    }

    /// Start a builder around a shared connector.
    pub fn with_connector(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            connectivity: None,
            reporter: None,
            config: ManagerConfig::default(),
        }
    }

    /// Reachability source. Defaults to an always-online handle.
    pub fn connectivity(mut self, monitor: Arc<dyn ConnectivityMonitor>) -> Self {
        self.connectivity = Some(monitor);
        self
    }

    /// Where connection failures are reported.
    pub fn error_reporter(mut self, reporter: ErrorReporter) -> Self {
        self.reporter = Some(reporter);
        self
    }

    /// Retry policy for automatic reconnection.
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.config.retry_policy = policy;
        self
    }

    /// Timeout for a single connection attempt.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Characters of output to retain.
    pub fn buffer_capacity(mut self, capacity: usize) -> Self {
        self.config.buffer_capacity = capacity;
        self
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: ManagerConfig) -> Self {
        self.config = config;
        self
    }

    /// Spawn the connection task and return its handle.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn build(self) -> ConnectionManager {
        let capacity = self.config.event_capacity.max(1);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let (transitions, _) = broadcast::channel(capacity);
        let (messages, _) = broadcast::channel(capacity);
        let output = SharedOutput::new(self.config.buffer_capacity);
        let link = Arc::new(RwLock::new(LinkSlot::default()));
        let (commands, commands_rx) = mpsc::unbounded_channel();

        let connectivity = self
            .connectivity
            .unwrap_or_else(|| Arc::new(ConnectivityHandle::online()));

        let shared = Shared {
            state: state_tx,
            transitions: transitions.clone(),
            messages: messages.clone(),
            output: output.clone(),
            link: Arc::clone(&link),
        };
        let actor = Actor::new(self.connector, connectivity, self.reporter, self.config, shared);
        tokio::spawn(actor.run(commands_rx));

        ConnectionManager {
            commands,
            state: state_rx,
            transitions,
            messages,
            output,
            link,
        }
    }
}

/// Handle to a terminal session's connection.
///
/// Dropping the handle destroys the session.
///
/// # Example
///
/// ```ignore
/// use tether::prelude::*;
///
/// let manager = ConnectionManager::builder(WebSocketConnector::new()).build();
/// manager.connect(ConnectionConfig::parse(
///     "https://dev.example",
///     "sess-1",
///     Credentials::Token(token),
/// )?);
///
/// let mut messages = manager.messages();
/// manager.send("ls\n")?;
/// while let Ok(TerminalMessage::Output(text)) = messages.recv().await {
///     print!("{text}");
/// }
/// ```
pub struct ConnectionManager {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<ConnectionState>,
    transitions: broadcast::Sender<ConnectionState>,
    messages: broadcast::Sender<TerminalMessage>,
    output: SharedOutput,
    link: Arc<RwLock<LinkSlot>>,
}

impl ConnectionManager {
    /// Start building a manager around a connector.
    pub fn builder(connector: impl Connector) -> ConnectionManagerBuilder {
        ConnectionManagerBuilder::new(connector)
    }

    /// Open a session. Ignored while already connecting or connected.
    ///
    /// Resets the attempt counter and retains `config` for automatic
    /// reconnection.
    pub fn connect(&self, config: ConnectionConfig) {
        self.command(Command::Connect(config));
    }

    /// Drop the current link (without a `Closed` message), clear the output
    /// and connect again with the retained config.
    pub fn reconnect(&self) {
        self.command(Command::Reconnect);
    }

    /// Close the link normally, clear the output, forget the config and go to
    /// `Disconnected`.
    pub fn disconnect(&self) {
        self.link.write().revoke();
        self.output.clear();
        self.command(Command::Disconnect);
    }

    /// Release every resource. No transitions follow `Destroyed`.
    pub fn destroy(&self) {
        self.link.write().revoke();
        self.command(Command::Destroy);
    }

    /// Clear the output buffer.
    pub fn clear_output(&self) {
        self.output.clear();
        self.command(Command::ClearOutput);
    }

    /// Send keystrokes. Fails if no link is open.
    pub fn send(&self, data: &str) -> Result<(), SendError> {
        self.write(&ClientMessage::Input {
            data: data.to_string(),
        })
    }

    /// Report new terminal dimensions. Fails if no link is open.
    pub fn resize(&self, cols: u16, rows: u16) -> Result<(), SendError> {
        self.write(&ClientMessage::Resize { cols, rows })
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        self.state.borrow().clone()
    }

    /// Whether the link is open.
    pub fn is_connected(&self) -> bool {
        self.state.borrow().is_connected()
    }

    /// Receiver for the latest state.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Every state transition made after this call, in order.
    pub fn state_changes(&self) -> broadcast::Receiver<ConnectionState> {
        self.transitions.subscribe()
    }

    /// Every terminal message received after this call.
    pub fn messages(&self) -> broadcast::Receiver<TerminalMessage> {
        self.messages.subscribe()
    }

    /// Copy of the buffered output.
    pub fn output(&self) -> String {
        self.output.snapshot()
    }

    /// Buffered output length in characters.
    pub fn output_len(&self) -> usize {
        self.output.len()
    }

    /// Wait until the state satisfies `predicate`. Returns `None` if the
    /// connection task is gone.
    pub async fn wait_for_state(
        &self,
        predicate: impl FnMut(&ConnectionState) -> bool,
    ) -> Option<ConnectionState> {
        let mut rx = self.state.clone();
        rx.wait_for(predicate).await.ok().map(|state| state.clone())
    }

    fn write(&self, message: &ClientMessage) -> Result<(), SendError> {
        let text = message.to_json()?;
        let slot = self.link.read();
        slot.sender
            .as_ref()
            .ok_or(SendError::NotConnected)?
            .try_send_text(text)
    }

    fn command(&self, command: Command) {
        // The task only stops after Destroy; later commands are moot.
        let _ = self.commands.send(command);
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("state", &*self.state.borrow())
            .field("output_len", &self.output.len())
            .finish()
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        let _ = self.commands.send(Command::Destroy);
    }
}
