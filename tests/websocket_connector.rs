//! WebSocket connector against a local tungstenite server.

#![cfg(feature = "websocket")]

use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

use tether::transport::{
    ConnectionConfig, Connector, Credentials, LinkEvent, TransportError, WebSocketConnector,
};

fn config(addr: std::net::SocketAddr, session_id: &str) -> ConnectionConfig {
    ConnectionConfig::parse(
        &format!("http://{addr}"),
        session_id,
        Credentials::Token("secret".into()),
    )
    .unwrap()
}

#[tokio::test]
async fn test_exchanges_frames_with_server() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (seen_tx, seen_rx) = oneshot::channel();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_hdr_async(stream, |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
            let auth = req
                .headers()
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let _ = seen_tx.send((req.uri().path().to_string(), auth));
            Ok(resp)
        })
        .await
        .unwrap();

        ws.send(Message::Text(r#"{"type":"output","data":"$ "}"#.into()))
            .await
            .unwrap();
        let input = ws.next().await.unwrap().unwrap();
        ws.close(Some(CloseFrame {
            code: CloseCode::Normal,
            reason: "bye".into(),
        }))
        .await
        .unwrap();
        input
    });

    let link = WebSocketConnector::new()
        .connect(&config(addr, "sess 1"))
        .await
        .unwrap();
    assert_eq!(link.session_id(), "sess 1");

    let (path, auth) = seen_rx.await.unwrap();
    assert_eq!(path, "/api/sessions/sess%201/terminal");
    assert_eq!(auth.as_deref(), Some("Bearer secret"));

    let (sender, mut events) = link.into_parts();
    assert!(matches!(
        events.recv().await,
        Some(LinkEvent::Frame(text)) if text == r#"{"type":"output","data":"$ "}"#
    ));

    sender
        .try_send_text(r#"{"type":"input","data":"ls\n"}"#.into())
        .unwrap();
    assert_eq!(
        server.await.unwrap(),
        Message::Text(r#"{"type":"input","data":"ls\n"}"#.into())
    );

    assert!(matches!(
        events.recv().await,
        Some(LinkEvent::Closed { code: 1000, reason }) if reason == "bye"
    ));
}

#[tokio::test]
async fn test_rejected_upgrade_is_classified() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let _ = accept_hdr_async(stream, |_: &Request, _: Response| -> Result<Response, ErrorResponse> {
            let mut reject = ErrorResponse::new(Some("no such session".into()));
            *reject.status_mut() = StatusCode::NOT_FOUND;
            Err(reject)
        })
        .await;
    });

    let error = WebSocketConnector::new()
        .connect(&config(addr, "gone"))
        .await
        .unwrap_err();
    assert!(matches!(
        &error,
        TransportError::SessionNotFound { session_id } if session_id == "gone"
    ));
    assert!(error.is_terminal());
}

#[tokio::test]
async fn test_refused_connection_is_transient() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let error = WebSocketConnector::new()
        .connect(&config(addr, "s1"))
        .await
        .unwrap_err();
    assert!(error.is_transient(), "unexpected error: {error:?}");
}
