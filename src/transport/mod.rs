//! Tether - Transport Layer
//!
//! Everything between the connection manager and the socket:
//!
//! - **Endpoints**: [`ConnectionConfig`] and [`Credentials`], building the
//!   terminal WebSocket URL
//! - **Wire format**: [`ClientMessage`] / [`ServerMessage`] JSON frames with a
//!   raw-text fallback
//! - **Links**: the [`Connector`] seam and the channel-based [`TransportLink`]
//! - **WebSocket**: [`WebSocketConnector`] over `tokio-tungstenite`
//! - **State**: [`ConnectionState`] and the bounded [`OutputBuffer`]
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │         Connection manager              │
//! ├─────────────────────────────────────────┤
//! │         Transport layer                 │  ← This module
//! │   wire codec, links, output buffer      │
//! ├─────────────────────────────────────────┤
//! │         WebSocket (TCP / TLS)           │
//! └─────────────────────────────────────────┘
//! ```

mod buffer;
mod connection;
mod endpoint;
mod error;
mod link;
mod wire;
#[cfg(feature = "websocket")]
mod websocket;

pub use buffer::*;
pub use connection::*;
pub use endpoint::*;
pub use error::*;
pub use link::*;
pub use wire::*;
#[cfg(feature = "websocket")]
#[cfg_attr(docsrs, doc(cfg(feature = "websocket")))]
pub use websocket::WebSocketConnector;

#[cfg(feature = "websocket")]
pub(crate) use websocket::map_handshake_error;
