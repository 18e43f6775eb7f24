//! Connection task.
//!
//! One task per manager owns the link, the attempt counter and the retained
//! config. Commands from the handle, link events, retry timers and
//! connectivity changes are all funnelled into this task, so transitions are
//! applied one at a time. Every spawned attempt, timer and link reader is
//! tagged with a generation; events from an older generation are dropped.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::client::{ManagerConfig, TerminalMessage};
use crate::connectivity::{ConnectivityMonitor, ConnectivityStatus};
use crate::core::constants::CLOSE_NORMAL;
use crate::core::{ErrorKind, ErrorReporter};
use crate::resilience::RetryCondition;
use crate::transport::{
    ConnectionConfig, ConnectionState, Connector, InboundFrame, LinkEvent, LinkSender,
    ServerMessage, SharedOutput, TransportError, TransportLink, TransportResult, parse_inbound,
};

/// Requests from the handle.
#[derive(Debug)]
pub(crate) enum Command {
    Connect(ConnectionConfig),
    Reconnect,
    Disconnect,
    ClearOutput,
    Destroy,
}

#[derive(Debug)]
enum Event {
    Attempt {
        generation: u64,
        result: TransportResult<TransportLink>,
    },
    Link {
        generation: u64,
        event: LinkEvent,
    },
    RetryDue {
        generation: u64,
    },
}

/// What the task is doing right now. The retained config lives here, so
/// dropping to `Idle` is the only way to forget it.
#[derive(Debug)]
enum Phase {
    Idle,
    Connecting {
        config: ConnectionConfig,
        task: JoinHandle<()>,
    },
    Connected {
        config: ConnectionConfig,
        sender: LinkSender,
        reader: JoinHandle<()>,
    },
    Waiting {
        config: ConnectionConfig,
        timer: JoinHandle<()>,
    },
    /// Failed while offline; resumes when connectivity returns.
    Parked {
        config: ConnectionConfig,
    },
    Failed {
        config: ConnectionConfig,
    },
}

impl Phase {
    fn config(&self) -> Option<&ConnectionConfig> {
        match self {
            Self::Idle => None,
            Self::Connecting { config, .. }
            | Self::Connected { config, .. }
            | Self::Waiting { config, .. }
            | Self::Parked { config }
            | Self::Failed { config } => Some(config),
        }
    }
}

/// Write half of the open link, as seen by the handle.
///
/// The handle empties the slot synchronously on `disconnect`/`destroy` and
/// bumps `revoked`; the task only publishes a sender when it has already
/// processed every such revocation.
#[derive(Debug, Default)]
pub(crate) struct LinkSlot {
    pub(crate) sender: Option<LinkSender>,
    pub(crate) revoked: u64,
}

impl LinkSlot {
    /// Empty the slot and invalidate any publish still in flight.
    pub(crate) fn revoke(&mut self) {
        self.sender = None;
        self.revoked += 1;
    }
}

/// Channels shared between the task and its handle.
pub(crate) struct Shared {
    pub(crate) state: watch::Sender<ConnectionState>,
    pub(crate) transitions: broadcast::Sender<ConnectionState>,
    pub(crate) messages: broadcast::Sender<TerminalMessage>,
    pub(crate) output: SharedOutput,
    pub(crate) link: Arc<RwLock<LinkSlot>>,
}

pub(crate) struct Actor {
    connector: Arc<dyn Connector>,
    connectivity: Arc<dyn ConnectivityMonitor>,
    reporter: Option<ErrorReporter>,
    config: ManagerConfig,
    shared: Shared,
    phase: Phase,
    attempts: u32,
    generation: u64,
    /// Revocations already handled, compared with `LinkSlot::revoked`.
    revocations_seen: u64,
    events_tx: mpsc::UnboundedSender<Event>,
    events_rx: mpsc::UnboundedReceiver<Event>,
}

impl Actor {
    pub(crate) fn new(
        connector: Arc<dyn Connector>,
        connectivity: Arc<dyn ConnectivityMonitor>,
        reporter: Option<ErrorReporter>,
        config: ManagerConfig,
        shared: Shared,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            connector,
            connectivity,
            reporter,
            config,
            shared,
            phase: Phase::Idle,
            attempts: 0,
            generation: 0,
            revocations_seen: 0,
            events_tx,
            events_rx,
        }
    }

    pub(crate) async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        let mut connectivity = self.connectivity.subscribe();
        let mut watching = true;

        loop {
            tokio::select! {
                biased;

                command = commands.recv() => match command {
                    Some(Command::Destroy) | None => break,
                    Some(command) => self.on_command(command),
                },
                Some(event) = self.events_rx.recv() => self.on_event(event),
                changed = connectivity.changed(), if watching => match changed {
                    Ok(()) => {
                        let status = *connectivity.borrow_and_update();
                        self.on_connectivity(status);
                    }
                    Err(_) => watching = false,
                },
            }
        }

        self.teardown(Some("destroyed"));
        self.shared.output.clear();
        self.transition(ConnectionState::Destroyed);
        debug!("connection task stopped");
    }

    fn on_command(&mut self, command: Command) {
        match command {
            Command::Connect(config) => self.connect(config),
            Command::Reconnect => self.reconnect(),
            Command::Disconnect => self.disconnect(),
            Command::ClearOutput => self.shared.output.clear(),
            // Handled by the run loop.
            Command::Destroy => {}
        }
    }

    fn connect(&mut self, config: ConnectionConfig) {
        if matches!(self.phase, Phase::Connecting { .. } | Phase::Connected { .. }) {
            debug!("connect ignored, already connecting or connected");
            return;
        }
        self.teardown(None);
        self.attempts = 0;
        self.start_attempt(config);
    }

    fn reconnect(&mut self) {
        if self.phase.config().is_none() {
            debug!("reconnect ignored, no retained config");
            return;
        }
        let Some(config) = self.teardown(None) else {
            return;
        };
        self.attempts = 0;
        self.shared.output.clear();
        self.start_attempt(config);
    }

    fn disconnect(&mut self) {
        self.revocations_seen += 1;
        self.teardown(Some("client disconnect"));
        self.attempts = 0;
        self.shared.output.clear();
        self.transition(ConnectionState::Disconnected);
    }

    /// Stop whatever is running and return the retained config. Leaves the
    /// phase `Idle` and invalidates all in-flight events.
    fn teardown(&mut self, close_reason: Option<&str>) -> Option<ConnectionConfig> {
        self.generation += 1;
        match std::mem::replace(&mut self.phase, Phase::Idle) {
            Phase::Idle => None,
            Phase::Connecting { config, task } => {
                task.abort();
                Some(config)
            }
            Phase::Connected {
                config,
                sender,
                reader,
            } => {
                self.shared.link.write().sender = None;
                if let Some(reason) = close_reason {
                    sender.close(CLOSE_NORMAL, reason);
                }
                reader.abort();
                Some(config)
            }
            Phase::Waiting { config, timer } => {
                timer.abort();
                Some(config)
            }
            Phase::Parked { config } | Phase::Failed { config } => Some(config),
        }
    }

    fn start_attempt(&mut self, config: ConnectionConfig) {
        self.generation += 1;
        let generation = self.generation;
        let connector = Arc::clone(&self.connector);
        let events = self.events_tx.clone();
        let timeout = self.config.connect_timeout;
        let attempt_config = config.clone();

        debug!(attempt = self.attempts + 1, session_id = config.session_id(), "connecting");
        let task = tokio::spawn(async move {
            let result = match tokio::time::timeout(timeout, connector.connect(&attempt_config)).await {
                Ok(result) => result,
                Err(_) => Err(TransportError::Timeout),
            };
            let _ = events.send(Event::Attempt { generation, result });
        });

        self.phase = Phase::Connecting { config, task };
        self.transition(ConnectionState::Connecting);
    }

    fn on_event(&mut self, event: Event) {
        match event {
            Event::Attempt { generation, result } if generation == self.generation => {
                match result {
                    Ok(link) => self.on_open(link),
                    Err(error) => self.on_failure(error),
                }
            }
            Event::Link { generation, event } if generation == self.generation => {
                self.on_link_event(event)
            }
            Event::RetryDue { generation } if generation == self.generation => self.on_retry_due(),
            stale => debug!(?stale, "dropping stale event"),
        }
    }

    fn on_open(&mut self, link: TransportLink) {
        let Phase::Connecting { config, .. } = std::mem::replace(&mut self.phase, Phase::Idle)
        else {
            return;
        };

        self.attempts = 0;
        let session_id = link.session_id().to_string();
        let (sender, mut link_events) = link.into_parts();
        {
            let mut slot = self.shared.link.write();
            if slot.revoked == self.revocations_seen {
                slot.sender = Some(sender.clone());
            } else {
                // A disconnect is queued behind this event and will tear the
                // link down.
                debug!("link opened after revocation, not publishing");
            }
        }

        let generation = self.generation;
        let events = self.events_tx.clone();
        let reader = tokio::spawn(async move {
            loop {
                let event = link_events.recv().await.unwrap_or(LinkEvent::Failed(TransportError::Eof));
                let last = !matches!(event, LinkEvent::Frame(_));
                if events.send(Event::Link { generation, event }).is_err() || last {
                    break;
                }
            }
        });

        self.phase = Phase::Connected {
            config,
            sender,
            reader,
        };
        self.transition(ConnectionState::Connected { session_id });
    }

    fn on_link_event(&mut self, event: LinkEvent) {
        if !matches!(self.phase, Phase::Connected { .. }) {
            return;
        }
        match event {
            LinkEvent::Frame(text) => self.on_frame(&text),
            LinkEvent::Closed { code, reason } => {
                self.on_failure(TransportError::ClosedByPeer { code, reason })
            }
            LinkEvent::Failed(error) => self.on_failure(error),
        }
    }

    fn on_frame(&mut self, text: &str) {
        match parse_inbound(text) {
            InboundFrame::Message(ServerMessage::Output { data }) => {
                self.shared.output.append(&data);
                self.publish(TerminalMessage::Output(data));
            }
            InboundFrame::Message(ServerMessage::Closed { reason }) => {
                info!(reason = reason.as_deref().unwrap_or(""), "session closed by server");
                let message = reason
                    .clone()
                    .unwrap_or_else(|| "The session has ended.".to_string());
                self.publish(TerminalMessage::Closed { reason });
                self.fail(
                    ErrorKind::TransportClosed {
                        can_reconnect: false,
                    },
                    message,
                    false,
                );
            }
            InboundFrame::Message(ServerMessage::Error { message }) => {
                warn!(%message, "server reported an error");
                self.publish(TerminalMessage::Error {
                    message: message.clone(),
                });
                self.fail(
                    ErrorKind::TransportClosed {
                        can_reconnect: true,
                    },
                    message,
                    true,
                );
            }
            InboundFrame::Unrecognized(raw) => {
                debug!(frame = %raw, "ignoring unrecognized frame");
            }
        }
    }

    /// Tear down and enter `Failed`, keeping the config for `reconnect`.
    fn fail(&mut self, error: ErrorKind, message: String, can_retry: bool) {
        let Some(config) = self.teardown(None) else {
            return;
        };
        self.phase = Phase::Failed { config };
        self.report(&error, false);
        self.transition(ConnectionState::Failed {
            error,
            message,
            can_retry,
        });
    }

    fn on_failure(&mut self, error: TransportError) {
        let kind = error.kind();

        if error.is_terminal() {
            warn!(%error, "connection failed permanently");
            self.fail(kind, error.failure_message(), false);
            return;
        }

        let Some(config) = self.teardown(None) else {
            return;
        };
        self.attempts += 1;
        self.report(&kind, true);

        let policy = self.config.retry_policy;
        let condition = RetryCondition::from_kind(&kind).unwrap_or(RetryCondition::NetworkError);
        if !policy.should_retry(condition, self.attempts) {
            warn!(%error, attempts = self.attempts, "giving up");
            self.phase = Phase::Failed { config };
            self.report(&kind, false);
            self.transition(ConnectionState::Failed {
                error: kind,
                message: format!(
                    "{} Gave up after {} attempts.",
                    error.failure_message(),
                    self.attempts
                ),
                can_retry: false,
            });
            return;
        }

        let delay = policy.delay_for_attempt(self.attempts);
        info!(%error, attempt = self.attempts, ?delay, "scheduling reconnect");
        self.generation += 1;
        let generation = self.generation;
        let events = self.events_tx.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = events.send(Event::RetryDue { generation });
        });
        self.phase = Phase::Waiting { config, timer };
        self.transition(ConnectionState::Reconnecting {
            attempt: self.attempts,
            max_attempts: policy.max_attempts(),
            next_retry_delay: delay,
        });
    }

    fn on_retry_due(&mut self) {
        if !matches!(self.phase, Phase::Waiting { .. }) {
            return;
        }
        let Some(config) = self.teardown(None) else {
            return;
        };
        if self.connectivity.is_connected() {
            self.start_attempt(config);
        } else {
            self.park(config);
        }
    }

    fn on_connectivity(&mut self, status: ConnectivityStatus) {
        debug!(?status, phase = ?self.phase_name(), "connectivity changed");
        match (&self.phase, status.is_online()) {
            (Phase::Waiting { .. }, false) => {
                if let Some(config) = self.teardown(None) {
                    self.park(config);
                }
            }
            (Phase::Parked { .. }, true) => {
                if let Some(config) = self.teardown(None) {
                    info!("network is back, resuming");
                    self.start_attempt(config);
                }
            }
            _ => {}
        }
    }

    /// Wait for the network without spending an attempt.
    fn park(&mut self, config: ConnectionConfig) {
        info!(attempts = self.attempts, "offline, waiting for network");
        self.phase = Phase::Parked { config };
        self.transition(ConnectionState::Failed {
            error: ErrorKind::no_connection(),
            message: "No network connection. Will reconnect when the network returns.".to_string(),
            can_retry: true,
        });
    }

    fn phase_name(&self) -> &'static str {
        match self.phase {
            Phase::Idle => "idle",
            Phase::Connecting { .. } => "connecting",
            Phase::Connected { .. } => "connected",
            Phase::Waiting { .. } => "waiting",
            Phase::Parked { .. } => "parked",
            Phase::Failed { .. } => "failed",
        }
    }

    fn report(&self, kind: &ErrorKind, silent: bool) {
        if let Some(reporter) = &self.reporter {
            reporter.report("terminal.connection", kind.clone(), silent);
        }
    }

    fn publish(&self, message: TerminalMessage) {
        // No subscribers is fine.
        let _ = self.shared.messages.send(message);
    }

    fn transition(&self, next: ConnectionState) {
        let from = self.shared.state.borrow().label();
        if *self.shared.state.borrow() == next {
            return;
        }
        info!(from, to = next.label(), "connection state changed");
        self.shared.state.send_replace(next.clone());
        let _ = self.shared.transitions.send(next);
    }
}
