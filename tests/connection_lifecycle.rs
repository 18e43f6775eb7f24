//! Connection manager lifecycle tests against a scripted connector.

#![cfg(feature = "client")]

use std::collections::VecDeque;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::broadcast;

use tether::client::{ConnectionManager, TerminalMessage};
use tether::connectivity::{ConnectivityHandle, ConnectivityStatus};
use tether::core::ErrorKind;
use tether::resilience::RetryPolicy;
use tether::transport::{
    ConnectionConfig, ConnectionState, Connector, Credentials, Outbound, RemoteEnd, SendError,
    TransportError, TransportLink, TransportResult,
};

enum Outcome {
    Fail(TransportError),
    Open,
}

/// Connector that plays back a script of outcomes, then keeps opening links.
#[derive(Clone, Default)]
struct ScriptedConnector {
    script: Arc<Mutex<VecDeque<Outcome>>>,
    always_fail: Arc<Mutex<bool>>,
    attempts: Arc<AtomicU32>,
    remotes: Arc<Mutex<Vec<RemoteEnd>>>,
}

impl ScriptedConnector {
    fn new(script: impl IntoIterator<Item = Outcome>) -> Self {
        let connector = Self::default();
        connector.script.lock().extend(script);
        connector
    }

    fn failing() -> Self {
        let connector = Self::default();
        *connector.always_fail.lock() = true;
        connector
    }

    fn set_failing(&self, failing: bool) {
        *self.always_fail.lock() = failing;
    }

    fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    fn take_remote(&self) -> RemoteEnd {
        self.remotes.lock().pop().expect("no open link")
    }
}

fn refused() -> TransportError {
    TransportError::Io(io::Error::from(io::ErrorKind::ConnectionRefused))
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self, config: &ConnectionConfig) -> TransportResult<TransportLink> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let outcome = self.script.lock().pop_front();
        let outcome = match outcome {
            Some(outcome) => outcome,
            None if *self.always_fail.lock() => Outcome::Fail(refused()),
            None => Outcome::Open,
        };
        match outcome {
            Outcome::Fail(error) => Err(error),
            Outcome::Open => {
                let (link, remote) = TransportLink::pair(config.session_id());
                self.remotes.lock().push(remote);
                Ok(link)
            }
        }
    }
}

fn config() -> ConnectionConfig {
    ConnectionConfig::parse("https://term.example", "sess-1", Credentials::Token("tok".into()))
        .unwrap()
}

fn policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy::builder().max_attempts(max_attempts).build().unwrap()
}

async fn next_state(rx: &mut broadcast::Receiver<ConnectionState>) -> ConnectionState {
    tokio::time::timeout(Duration::from_secs(60), rx.recv())
        .await
        .expect("timed out waiting for a state")
        .expect("state channel closed")
}

async fn collect_until(
    rx: &mut broadcast::Receiver<ConnectionState>,
    done: impl Fn(&ConnectionState) -> bool,
) -> Vec<ConnectionState> {
    let mut seen = Vec::new();
    loop {
        let state = next_state(rx).await;
        let stop = done(&state);
        seen.push(state);
        if stop {
            return seen;
        }
    }
}

fn reconnecting(attempt: u32, max_attempts: u32, secs: u64) -> ConnectionState {
    ConnectionState::Reconnecting {
        attempt,
        max_attempts,
        next_retry_delay: Duration::from_secs(secs),
    }
}

fn connected() -> ConnectionState {
    ConnectionState::Connected {
        session_id: "sess-1".into(),
    }
}

#[tokio::test(start_paused = true)]
async fn test_recovers_after_two_failures() {
    let connector = ScriptedConnector::new([Outcome::Fail(refused()), Outcome::Fail(refused())]);
    let manager = ConnectionManager::builder(connector.clone())
        .retry_policy(policy(3))
        .build();
    let mut states = manager.state_changes();

    manager.connect(config());
    let seen = collect_until(&mut states, ConnectionState::is_connected).await;

    assert_eq!(
        seen,
        vec![
            ConnectionState::Connecting,
            reconnecting(1, 3, 1),
            ConnectionState::Connecting,
            reconnecting(2, 3, 2),
            ConnectionState::Connecting,
            connected(),
        ]
    );
    assert_eq!(connector.attempts(), 3);
    assert!(manager.is_connected());
}

#[tokio::test(start_paused = true)]
async fn test_gives_up_when_budget_is_spent() {
    let connector = ScriptedConnector::failing();
    let manager = ConnectionManager::builder(connector.clone())
        .retry_policy(policy(2))
        .build();
    let mut states = manager.state_changes();

    manager.connect(config());
    let seen = collect_until(&mut states, |s| matches!(s, ConnectionState::Failed { .. })).await;

    assert_eq!(seen.len(), 4);
    assert_eq!(seen[1], reconnecting(1, 2, 1));
    assert!(matches!(
        seen.last(),
        Some(ConnectionState::Failed {
            can_retry: false,
            ..
        })
    ));
    assert_eq!(connector.attempts(), 2);

    // Nothing else is scheduled.
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(connector.attempts(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_offline_parks_without_spending_attempts() {
    let connector = ScriptedConnector::failing();
    let network = ConnectivityHandle::online();
    let manager = ConnectionManager::builder(connector.clone())
        .connectivity(Arc::new(network.clone()))
        .retry_policy(policy(3))
        .build();
    let mut states = manager.state_changes();

    manager.connect(config());
    assert_eq!(next_state(&mut states).await, ConnectionState::Connecting);
    assert_eq!(next_state(&mut states).await, reconnecting(1, 3, 1));

    network.set(ConnectivityStatus::Lost);
    match next_state(&mut states).await {
        ConnectionState::Failed {
            error, can_retry, ..
        } => {
            assert_eq!(error, ErrorKind::no_connection());
            assert!(can_retry);
        }
        other => panic!("expected parked failure, got {other:?}"),
    }

    // The cancelled timer never fires.
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(connector.attempts(), 1);

    connector.set_failing(false);
    network.set(ConnectivityStatus::Available);
    assert_eq!(next_state(&mut states).await, ConnectionState::Connecting);
    assert_eq!(next_state(&mut states).await, connected());
    assert_eq!(connector.attempts(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_offline_when_timer_fires() {
    let connector = ScriptedConnector::failing();
    let network = ConnectivityHandle::new(ConnectivityStatus::Unavailable);
    let manager = ConnectionManager::builder(connector.clone())
        .connectivity(Arc::new(network.clone()))
        .build();
    let mut states = manager.state_changes();

    manager.connect(config());
    assert_eq!(next_state(&mut states).await, ConnectionState::Connecting);
    assert_eq!(next_state(&mut states).await, reconnecting(1, 3, 1));
    assert!(matches!(
        next_state(&mut states).await,
        ConnectionState::Failed {
            can_retry: true,
            ..
        }
    ));
    assert_eq!(connector.attempts(), 1);

    // Exactly one attempt when the network comes back; it fails and counts
    // as the second attempt.
    network.set(ConnectivityStatus::Available);
    assert_eq!(next_state(&mut states).await, ConnectionState::Connecting);
    assert_eq!(next_state(&mut states).await, reconnecting(2, 3, 2));
    assert_eq!(connector.attempts(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_inbound_frames() {
    let connector = ScriptedConnector::default();
    let manager = ConnectionManager::builder(connector.clone()).build();
    let mut messages = manager.messages();

    manager.connect(config());
    manager.wait_for_state(ConnectionState::is_connected).await.unwrap();
    let remote = connector.take_remote();

    remote.send_frame(r#"{"type":"output","data":"hello "}"#).await;
    remote.send_frame("raw text").await;
    remote.send_frame(r#"{"type":"heartbeat"}"#).await;

    assert_eq!(
        messages.recv().await.unwrap(),
        TerminalMessage::Output("hello ".into())
    );
    assert_eq!(
        messages.recv().await.unwrap(),
        TerminalMessage::Output("raw text".into())
    );

    remote.send_frame(r#"{"type":"closed","reason":"exit 0"}"#).await;
    assert_eq!(
        messages.recv().await.unwrap(),
        TerminalMessage::Closed {
            reason: Some("exit 0".into())
        }
    );
    let state = manager
        .wait_for_state(|s| matches!(s, ConnectionState::Failed { .. }))
        .await
        .unwrap();
    assert!(matches!(
        state,
        ConnectionState::Failed {
            error: ErrorKind::TransportClosed {
                can_reconnect: false
            },
            can_retry: false,
            ..
        }
    ));
    assert_eq!(manager.output(), "hello raw text");
}

#[tokio::test(start_paused = true)]
async fn test_server_error_message() {
    let connector = ScriptedConnector::default();
    let manager = ConnectionManager::builder(connector.clone()).build();
    let mut messages = manager.messages();

    manager.connect(config());
    manager.wait_for_state(ConnectionState::is_connected).await.unwrap();
    let remote = connector.take_remote();

    remote.send_frame(r#"{"type":"error","message":"pty died"}"#).await;
    assert_eq!(
        messages.recv().await.unwrap(),
        TerminalMessage::Error {
            message: "pty died".into()
        }
    );
    let state = manager
        .wait_for_state(|s| matches!(s, ConnectionState::Failed { .. }))
        .await
        .unwrap();
    assert!(matches!(
        state,
        ConnectionState::Failed {
            can_retry: true,
            ..
        }
    ));
}

#[tokio::test(start_paused = true)]
async fn test_peer_drop_triggers_reconnect() {
    let connector = ScriptedConnector::default();
    let manager = ConnectionManager::builder(connector.clone()).build();
    let mut states = manager.state_changes();

    manager.connect(config());
    collect_until(&mut states, ConnectionState::is_connected).await;
    let remote = connector.take_remote();
    remote.fail(TransportError::Eof).await;

    assert_eq!(next_state(&mut states).await, reconnecting(1, 3, 1));
    assert_eq!(next_state(&mut states).await, ConnectionState::Connecting);
    assert_eq!(next_state(&mut states).await, connected());
    assert_eq!(connector.attempts(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_terminal_failure_is_not_retried() {
    let connector = ScriptedConnector::new([Outcome::Fail(TransportError::SessionNotFound {
        session_id: "sess-1".into(),
    })]);
    let manager = ConnectionManager::builder(connector.clone()).build();
    let mut states = manager.state_changes();

    manager.connect(config());
    assert_eq!(next_state(&mut states).await, ConnectionState::Connecting);
    match next_state(&mut states).await {
        ConnectionState::Failed {
            error,
            message,
            can_retry,
        } => {
            assert!(matches!(error, ErrorKind::NotFound { .. }));
            assert!(message.contains("no longer exists"));
            assert!(!can_retry);
        }
        other => panic!("expected failure, got {other:?}"),
    }
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(connector.attempts(), 1);

    // An explicit reconnect uses the retained config.
    manager.reconnect();
    assert_eq!(next_state(&mut states).await, ConnectionState::Connecting);
    assert_eq!(next_state(&mut states).await, connected());
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_clears_everything() {
    let connector = ScriptedConnector::default();
    let manager = ConnectionManager::builder(connector.clone()).build();

    manager.connect(config());
    manager.wait_for_state(ConnectionState::is_connected).await.unwrap();
    let mut remote = connector.take_remote();
    let mut messages = manager.messages();
    remote.send_frame("some output").await;
    messages.recv().await.unwrap();
    assert_eq!(manager.output_len(), 11);

    manager.disconnect();
    assert!(matches!(manager.send("ls\n"), Err(SendError::NotConnected)));
    assert!(matches!(manager.resize(80, 24), Err(SendError::NotConnected)));
    assert_eq!(manager.output_len(), 0);

    manager
        .wait_for_state(|s| *s == ConnectionState::Disconnected)
        .await
        .unwrap();
    assert_eq!(
        remote.recv_outbound().await,
        Some(Outbound::Close {
            code: 1000,
            reason: "client disconnect".into()
        })
    );

    // The retained config is gone; reconnect does nothing.
    manager.reconnect();
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(manager.state(), ConnectionState::Disconnected);
    assert_eq!(connector.attempts(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_while_reconnecting() {
    let connector = ScriptedConnector::failing();
    let manager = ConnectionManager::builder(connector.clone())
        .retry_policy(policy(3))
        .build();
    let mut states = manager.state_changes();

    manager.connect(config());
    assert_eq!(next_state(&mut states).await, ConnectionState::Connecting);
    assert_eq!(next_state(&mut states).await, reconnecting(1, 3, 1));

    manager.disconnect();
    assert_eq!(next_state(&mut states).await, ConnectionState::Disconnected);

    // The pending retry timer was cancelled along with the config.
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(manager.state(), ConnectionState::Disconnected);
    assert_eq!(connector.attempts(), 1);
    assert!(states.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_while_reconnecting() {
    let connector = ScriptedConnector::failing();
    let manager = ConnectionManager::builder(connector.clone())
        .retry_policy(policy(3))
        .build();
    let mut states = manager.state_changes();

    manager.connect(config());
    assert_eq!(next_state(&mut states).await, ConnectionState::Connecting);
    assert_eq!(next_state(&mut states).await, reconnecting(1, 3, 1));

    // A manual reconnect starts over with a fresh budget.
    manager.reconnect();
    let seen = collect_until(&mut states, |s| matches!(s, ConnectionState::Failed { .. })).await;
    assert_eq!(
        &seen[..5],
        &[
            ConnectionState::Connecting,
            reconnecting(1, 3, 1),
            ConnectionState::Connecting,
            reconnecting(2, 3, 2),
            ConnectionState::Connecting,
        ]
    );
    assert!(matches!(
        seen.get(5),
        Some(ConnectionState::Failed {
            can_retry: false,
            ..
        })
    ));
    assert_eq!(seen.len(), 6);
    assert_eq!(connector.attempts(), 4);

    // The timer from before the reconnect never fires.
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(connector.attempts(), 4);
    assert!(states.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_clears_output() {
    let connector = ScriptedConnector::default();
    let manager = ConnectionManager::builder(connector.clone()).build();
    let mut states = manager.state_changes();
    let mut messages = manager.messages();

    manager.connect(config());
    collect_until(&mut states, ConnectionState::is_connected).await;
    let remote = connector.take_remote();
    remote.send_frame("before").await;
    messages.recv().await.unwrap();
    assert_eq!(manager.output(), "before");

    manager.reconnect();
    assert_eq!(next_state(&mut states).await, ConnectionState::Connecting);
    assert_eq!(next_state(&mut states).await, connected());
    assert_eq!(manager.output(), "");
    assert_eq!(connector.attempts(), 2);
    // Teardown did not surface a Closed message.
    assert!(messages.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn test_connect_is_idempotent() {
    let connector = ScriptedConnector::default();
    let manager = ConnectionManager::builder(connector.clone()).build();

    manager.connect(config());
    manager.connect(config());
    manager.wait_for_state(ConnectionState::is_connected).await.unwrap();
    manager.connect(config());
    tokio::time::sleep(Duration::from_secs(5)).await;

    assert_eq!(connector.attempts(), 1);
    assert!(manager.is_connected());
}

#[tokio::test(start_paused = true)]
async fn test_destroy_is_final() {
    let connector = ScriptedConnector::default();
    let manager = ConnectionManager::builder(connector.clone()).build();

    manager.connect(config());
    manager.wait_for_state(ConnectionState::is_connected).await.unwrap();
    let mut remote = connector.take_remote();

    manager.destroy();
    manager
        .wait_for_state(ConnectionState::is_destroyed)
        .await
        .unwrap();
    assert!(matches!(
        remote.recv_outbound().await,
        Some(Outbound::Close { code: 1000, .. })
    ));

    manager.connect(config());
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(manager.state(), ConnectionState::Destroyed);
    assert_eq!(connector.attempts(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_connect_timeout_counts_as_transient() {
    struct Hanging;

    #[async_trait]
    impl Connector for Hanging {
        async fn connect(&self, _: &ConnectionConfig) -> TransportResult<TransportLink> {
            std::future::pending().await
        }
    }

    let manager = ConnectionManager::builder(Hanging)
        .connect_timeout(Duration::from_secs(2))
        .build();
    let mut states = manager.state_changes();

    manager.connect(config());
    assert_eq!(next_state(&mut states).await, ConnectionState::Connecting);
    assert_eq!(next_state(&mut states).await, reconnecting(1, 3, 1));
}
