//! # Tether
//!
//! Resilient client for remote terminal sessions over flaky mobile networks.
//!
//! Tether keeps one persistent WebSocket per terminal session alive across
//! network loss. It provides:
//!
//! - **Lifecycle**: a single-owner connection state machine with bounded,
//!   exponential reconnection
//! - **Offline awareness**: no attempts are spent while the device is offline;
//!   reconnection resumes when the network returns
//! - **Error taxonomy**: every fault is classified into one [`ErrorKind`] with
//!   a fixed user message and a suggested action
//! - **Resilience primitives**: [`RetryPolicy`], [`retry`] and
//!   [`CircuitBreaker`] for one-shot operations
//! - **Output buffering**: the last 100,000 characters of terminal output
//!
//! ## Feature Flags
//!
//! - `websocket` (default): [`transport::WebSocketConnector`] over `tokio-tungstenite`
//! - `client` (default): the [`client::ConnectionManager`]
//!
//! ## Modules
//!
//! - [`core`]: Error taxonomy, classification, result envelopes, constants
//! - [`resilience`]: Retry policies and circuit breaking
//! - [`connectivity`]: Network reachability monitoring
//! - [`transport`]: Endpoints, wire format, links and the WebSocket connector
//! - [`client`]: Connection manager and saved profiles (requires `client` feature)
//!
//! ## Example Usage
//!
//! ```ignore
//! use tether::prelude::*;
//!
//! let manager = ConnectionManager::builder(WebSocketConnector::new())
//!     .retry_policy(RetryPolicy::AGGRESSIVE)
//!     .build();
//!
//! manager.connect(ConnectionConfig::parse(
//!     "https://dev.example",
//!     "sess-1",
//!     Credentials::Token(token),
//! )?);
//!
//! let mut states = manager.state_changes();
//! while let Ok(state) = states.recv().await {
//!     if let ConnectionState::Failed { error, .. } = &state {
//!         eprintln!("{}", error.user_message());
//!     }
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

// Core module (always included)
pub mod core;

// Retry and circuit breaking
pub mod resilience;

// Network reachability
pub mod connectivity;

// Transport layer
pub mod transport;

// Connection manager (feature-gated)
#[cfg(feature = "client")]
#[cfg_attr(docsrs, doc(cfg(feature = "client")))]
pub mod client;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::core::{
        ErrorKind, ErrorReport, ErrorReporter, ResultEnvelope, StatusFault, SuggestedAction,
        classify, envelope_stream,
    };

    pub use crate::resilience::{
        CircuitBreaker, CircuitState, RetryCondition, RetryPolicy, condition_for, retry,
        retry_with_breaker,
    };

    pub use crate::connectivity::{
        ConnectivityHandle, ConnectivityMonitor, ConnectivityStatus, TcpProbe,
    };

    pub use crate::transport::{
        ConnectionConfig, ConnectionState, Connector, Credentials, SendError, TransportError,
        TransportResult,
    };

    #[cfg(feature = "websocket")]
    pub use crate::transport::WebSocketConnector;

    #[cfg(feature = "client")]
    pub use crate::client::{
        ConnectionManager, ConnectionManagerBuilder, ConnectionProfile, ManagerConfig,
        ProfileStore, TerminalMessage,
    };
}

// Re-export commonly used items at crate root
pub use crate::core::{ErrorKind, ResultEnvelope, classify};
pub use crate::resilience::{CircuitBreaker, RetryPolicy, retry};
pub use crate::transport::{ConnectionConfig, ConnectionState, TransportError};

#[cfg(feature = "client")]
pub use crate::client::ConnectionManager;
