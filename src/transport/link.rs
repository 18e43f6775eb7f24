//! Transport-agnostic terminal link.
//!
//! A [`Connector`] opens a [`TransportLink`]: a pair of channels fed by a
//! background I/O task. The connection manager never touches the socket
//! directly, so tests can drive it through [`TransportLink::pair`].

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::endpoint::ConnectionConfig;
use super::error::{SendError, TransportError, TransportResult};
use crate::core::constants::{DEFAULT_INBOUND_CAPACITY, DEFAULT_OUTBOUND_CAPACITY};

/// Frame queued for the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// JSON text frame.
    Text(String),
    /// Close the link with the given code.
    Close {
        /// WebSocket close code.
        code: u16,
        /// Close reason.
        reason: String,
    },
}

/// Event produced by the I/O task.
#[derive(Debug)]
pub enum LinkEvent {
    /// A text frame arrived.
    Frame(String),
    /// The peer closed the link.
    Closed {
        /// Close code (1005 when the peer sent none).
        code: u16,
        /// Close reason.
        reason: String,
    },
    /// The link failed.
    Failed(TransportError),
}

/// An open link to a terminal session.
#[derive(Debug)]
pub struct TransportLink {
    session_id: String,
    outbound: mpsc::Sender<Outbound>,
    events: mpsc::Receiver<LinkEvent>,
}

impl TransportLink {
    /// Wrap the channels of an I/O task.
    pub fn new(
        session_id: impl Into<String>,
        outbound: mpsc::Sender<Outbound>,
        events: mpsc::Receiver<LinkEvent>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            outbound,
            events,
        }
    }

    /// In-memory link and the [`RemoteEnd`] that plays the server.
    pub fn pair(session_id: impl Into<String>) -> (Self, RemoteEnd) {
        let (out_tx, out_rx) = mpsc::channel(DEFAULT_OUTBOUND_CAPACITY);
        let (ev_tx, ev_rx) = mpsc::channel(DEFAULT_INBOUND_CAPACITY);
        (
            Self::new(session_id, out_tx, ev_rx),
            RemoteEnd {
                outbound: out_rx,
                events: ev_tx,
            },
        )
    }

    /// Session this link is attached to.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Next event, or `None` once the I/O task is gone.
    pub async fn recv(&mut self) -> Option<LinkEvent> {
        self.events.recv().await
    }

    /// Split into a cloneable sender and the event receiver.
    pub fn into_parts(self) -> (LinkSender, mpsc::Receiver<LinkEvent>) {
        (LinkSender { tx: self.outbound }, self.events)
    }
}

/// Cloneable write half of a link.
#[derive(Debug, Clone)]
pub struct LinkSender {
    tx: mpsc::Sender<Outbound>,
}

impl LinkSender {
    /// Queue a text frame without waiting.
    pub fn try_send_text(&self, text: String) -> Result<(), SendError> {
        self.tx.try_send(Outbound::Text(text)).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SendError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => SendError::NotConnected,
        })
    }

    /// Ask the I/O task to close the link. Ignored if it is already gone.
    pub fn close(&self, code: u16, reason: impl Into<String>) {
        let _ = self.tx.try_send(Outbound::Close {
            code,
            reason: reason.into(),
        });
    }

    /// Whether the I/O task has stopped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Server side of an in-memory link.
#[derive(Debug)]
pub struct RemoteEnd {
    outbound: mpsc::Receiver<Outbound>,
    events: mpsc::Sender<LinkEvent>,
}

impl RemoteEnd {
    /// Deliver a text frame to the client.
    pub async fn send_frame(&self, text: impl Into<String>) -> bool {
        self.events.send(LinkEvent::Frame(text.into())).await.is_ok()
    }

    /// Close the link from the server side.
    pub async fn close(&self, code: u16, reason: impl Into<String>) -> bool {
        self.events
            .send(LinkEvent::Closed {
                code,
                reason: reason.into(),
            })
            .await
            .is_ok()
    }

    /// Fail the link.
    pub async fn fail(&self, error: TransportError) -> bool {
        self.events.send(LinkEvent::Failed(error)).await.is_ok()
    }

    /// Next frame written by the client.
    pub async fn recv_outbound(&mut self) -> Option<Outbound> {
        self.outbound.recv().await
    }
}

/// Opens links to terminal sessions.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Open a link. Resolves once the link is ready for traffic.
    async fn connect(&self, config: &ConnectionConfig) -> TransportResult<TransportLink>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pair_round_trip() {
        let (link, mut remote) = TransportLink::pair("s1");
        assert_eq!(link.session_id(), "s1");
        let (sender, mut events) = link.into_parts();

        sender.try_send_text("hello".into()).unwrap();
        assert_eq!(
            remote.recv_outbound().await,
            Some(Outbound::Text("hello".into()))
        );

        assert!(remote.send_frame("out").await);
        assert!(matches!(events.recv().await, Some(LinkEvent::Frame(f)) if f == "out"));

        sender.close(1000, "bye");
        assert_eq!(
            remote.recv_outbound().await,
            Some(Outbound::Close {
                code: 1000,
                reason: "bye".into()
            })
        );
    }

    #[tokio::test]
    async fn test_send_after_remote_dropped() {
        let (link, remote) = TransportLink::pair("s1");
        let (sender, _events) = link.into_parts();
        drop(remote);
        assert!(sender.is_closed());
        assert!(matches!(
            sender.try_send_text("x".into()),
            Err(SendError::NotConnected)
        ));
    }
}
