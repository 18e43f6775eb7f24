//! WebSocket connector.
//!
//! Opens `ws(s)://…/api/sessions/{id}/terminal` with an `Authorization`
//! header and runs one pump task per link that moves frames between the
//! socket and the link channels.

use std::io;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::error::ProtocolError;
use tokio_tungstenite::tungstenite::http::header::{AUTHORIZATION, HeaderValue};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, trace, warn};

use super::endpoint::ConnectionConfig;
use super::error::{TransportError, TransportResult};
use super::link::{Connector, LinkEvent, Outbound, TransportLink};
use crate::core::constants::{CLOSE_NO_STATUS, DEFAULT_INBOUND_CAPACITY, DEFAULT_OUTBOUND_CAPACITY};
use crate::core::is_resolution_failure;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// [`Connector`] backed by `tokio-tungstenite`.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    outbound_capacity: usize,
    inbound_capacity: usize,
}

impl WebSocketConnector {
    /// Connector with default queue sizes.
    pub fn new() -> Self {
        Self {
            outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
            inbound_capacity: DEFAULT_INBOUND_CAPACITY,
        }
    }

    /// Frames that may be queued for sending before `send` reports a full
    /// queue.
    pub fn outbound_capacity(mut self, capacity: usize) -> Self {
        self.outbound_capacity = capacity.max(1);
        self
    }

    /// Inbound events buffered before the pump stops reading.
    pub fn inbound_capacity(mut self, capacity: usize) -> Self {
        self.inbound_capacity = capacity.max(1);
        self
    }
}

impl Default for WebSocketConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, config: &ConnectionConfig) -> TransportResult<TransportLink> {
        let url = config.websocket_url()?;
        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| map_handshake_error(&e, config.session_id()))?;
        let auth = HeaderValue::from_str(&config.credentials().authorization_header())
            .map_err(|_| TransportError::Protocol("credentials are not a valid header value".into()))?;
        request.headers_mut().insert(AUTHORIZATION, auth);

        debug!(%url, session_id = config.session_id(), "opening terminal websocket");
        let (ws, response) = connect_async(request)
            .await
            .map_err(|e| map_handshake_error(&e, config.session_id()))?;
        trace!(status = %response.status(), "upgrade accepted");

        let (out_tx, out_rx) = mpsc::channel(self.outbound_capacity);
        let (ev_tx, ev_rx) = mpsc::channel(self.inbound_capacity);
        tokio::spawn(pump(ws, out_rx, ev_tx));

        Ok(TransportLink::new(config.session_id(), out_tx, ev_rx))
    }
}

/// Map a failed upgrade to a [`TransportError`].
pub(crate) fn map_handshake_error(error: &WsError, session_id: &str) -> TransportError {
    match error {
        WsError::Http(response) => {
            let status = response.status().as_u16();
            match status {
                401 | 403 => TransportError::Unauthorized { status },
                404 => TransportError::SessionNotFound {
                    session_id: session_id.to_string(),
                },
                429 | 500..=599 => TransportError::ServerUnavailable { status },
                _ => TransportError::UpgradeRejected { status },
            }
        }
        WsError::Io(e) if is_resolution_failure(e) => TransportError::Resolve(e.to_string()),
        WsError::Io(e) => TransportError::Io(io::Error::new(e.kind(), e.to_string())),
        WsError::Url(e) => TransportError::Protocol(e.to_string()),
        WsError::HttpFormat(e) => TransportError::Protocol(e.to_string()),
        other => map_stream_error(other),
    }
}

/// Map an error raised after the upgrade.
fn map_stream_error(error: &WsError) -> TransportError {
    match error {
        WsError::ConnectionClosed
        | WsError::AlreadyClosed
        | WsError::Protocol(ProtocolError::ResetWithoutClosingHandshake) => TransportError::Eof,
        WsError::Io(e) => TransportError::Io(io::Error::new(e.kind(), e.to_string())),
        other => TransportError::Stream(other.to_string()),
    }
}

async fn pump(ws: WsStream, mut outbound: mpsc::Receiver<Outbound>, events: mpsc::Sender<LinkEvent>) {
    let (mut sink, mut stream) = ws.split();

    loop {
        tokio::select! {
            frame = outbound.recv() => match frame {
                Some(Outbound::Text(text)) => {
                    if let Err(e) = sink.send(Message::Text(text)).await {
                        let _ = events.send(LinkEvent::Failed(map_stream_error(&e))).await;
                        break;
                    }
                }
                Some(Outbound::Close { code, reason }) => {
                    let frame = CloseFrame {
                        code: CloseCode::from(code),
                        reason: reason.into(),
                    };
                    if let Err(e) = sink.send(Message::Close(Some(frame))).await {
                        debug!(error = %e, "close frame not delivered");
                    }
                    break;
                }
                None => {
                    // Link dropped without an explicit close.
                    let _ = sink.close().await;
                    break;
                }
            },
            message = stream.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    if events.send(LinkEvent::Frame(text)).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Binary(data))) => {
                    let text = String::from_utf8_lossy(&data).into_owned();
                    if events.send(LinkEvent::Frame(text)).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    let (code, reason) = frame
                        .map(|f| (u16::from(f.code), f.reason.to_string()))
                        .unwrap_or((CLOSE_NO_STATUS, String::new()));
                    debug!(code, %reason, "peer closed terminal websocket");
                    let _ = events.send(LinkEvent::Closed { code, reason }).await;
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(error = %e, "terminal websocket failed");
                    let _ = events.send(LinkEvent::Failed(map_stream_error(&e))).await;
                    break;
                }
                None => {
                    let _ = events.send(LinkEvent::Failed(TransportError::Eof)).await;
                    break;
                }
            },
        }
    }
    trace!("websocket pump stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_tungstenite::tungstenite::http::Response;

    fn http_error(status: u16) -> WsError {
        let response = Response::builder().status(status).body(None).unwrap();
        WsError::Http(response.into())
    }

    #[test]
    fn test_handshake_status_mapping() {
        assert!(matches!(
            map_handshake_error(&http_error(401), "s"),
            TransportError::Unauthorized { status: 401 }
        ));
        assert!(matches!(
            map_handshake_error(&http_error(404), "s"),
            TransportError::SessionNotFound { session_id } if session_id == "s"
        ));
        assert!(matches!(
            map_handshake_error(&http_error(503), "s"),
            TransportError::ServerUnavailable { status: 503 }
        ));
        assert!(matches!(
            map_handshake_error(&http_error(400), "s"),
            TransportError::UpgradeRejected { status: 400 }
        ));
    }

    #[test]
    fn test_io_mapping() {
        let dns = WsError::Io(io::Error::other("failed to lookup address information"));
        assert!(matches!(map_handshake_error(&dns, "s"), TransportError::Resolve(_)));

        let refused = WsError::Io(io::Error::from(io::ErrorKind::ConnectionRefused));
        let mapped = map_handshake_error(&refused, "s");
        assert!(mapped.is_transient());

        assert!(matches!(
            map_stream_error(&WsError::ConnectionClosed),
            TransportError::Eof
        ));
        assert!(matches!(
            map_stream_error(&WsError::Protocol(
                ProtocolError::ResetWithoutClosingHandshake
            )),
            TransportError::Eof
        ));
    }
}
