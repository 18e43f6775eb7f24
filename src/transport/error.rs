//! Transport errors.

use std::io;

use thiserror::Error;

use super::endpoint::EndpointError;
use crate::core::{ErrorKind, classify_io};

/// Errors raised while opening or running a terminal link.
#[derive(Debug, Error)]
pub enum TransportError {
    /// I/O error on the underlying socket.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The host name could not be resolved.
    #[error("name resolution failed: {0}")]
    Resolve(String),

    /// The connection attempt took too long.
    #[error("connection attempt timed out")]
    Timeout,

    /// The server rejected the credentials.
    #[error("unauthorized (HTTP {status})")]
    Unauthorized {
        /// 401 or 403.
        status: u16,
    },

    /// The terminal session does not exist.
    #[error("terminal session not found: {session_id}")]
    SessionNotFound {
        /// Session that was requested.
        session_id: String,
    },

    /// The server is overloaded or failing (5xx, 429).
    #[error("server unavailable (HTTP {status})")]
    ServerUnavailable {
        /// Status of the upgrade response.
        status: u16,
    },

    /// The server answered the upgrade with an unexpected status.
    #[error("upgrade rejected (HTTP {status})")]
    UpgradeRejected {
        /// Status of the upgrade response.
        status: u16,
    },

    /// The peer violated the WebSocket protocol.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The stream failed mid-session (TLS, framing).
    #[error("stream error: {0}")]
    Stream(String),

    /// The peer closed the connection.
    #[error("closed by peer ({code}): {reason}")]
    ClosedByPeer {
        /// Close code.
        code: u16,
        /// Close reason, possibly empty.
        reason: String,
    },

    /// The stream ended without a close frame.
    #[error("connection ended unexpectedly")]
    Eof,

    /// The endpoint configuration is invalid.
    #[error("invalid endpoint: {0}")]
    Endpoint(#[from] EndpointError),
}

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

impl TransportError {
    /// Whether retrying cannot help.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Unauthorized { .. }
                | Self::SessionNotFound { .. }
                | Self::UpgradeRejected { .. }
                | Self::Protocol(_)
                | Self::Endpoint(_)
        )
    }

    /// Whether a later attempt may succeed.
    pub fn is_transient(&self) -> bool {
        !self.is_terminal()
    }

    /// Classify into the shared taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Io(e) => classify_io(e),
            Self::Resolve(_) => ErrorKind::no_connection(),
            Self::Timeout => ErrorKind::timeout(),
            Self::Unauthorized { status } => ErrorKind::Auth { code: *status },
            Self::SessionNotFound { session_id } => ErrorKind::NotFound {
                resource_type: "terminal session".to_string(),
                id: session_id.clone(),
            },
            Self::ServerUnavailable { status: 429 } => ErrorKind::ApiError {
                code: 429,
                details: None,
            },
            Self::ServerUnavailable { status } => ErrorKind::Server { code: *status },
            Self::UpgradeRejected { status } => ErrorKind::ApiError {
                code: *status,
                details: Some("upgrade rejected".to_string()),
            },
            Self::Protocol(_) => ErrorKind::TransportClosed {
                can_reconnect: false,
            },
            Self::Stream(_) | Self::ClosedByPeer { .. } => ErrorKind::TransportClosed {
                can_reconnect: true,
            },
            Self::Eof => ErrorKind::network(),
            Self::Endpoint(e) => e.kind(),
        }
    }

    /// Human-readable explanation for a failed state.
    pub fn failure_message(&self) -> String {
        match self {
            Self::SessionNotFound { session_id } => {
                format!("Terminal session {session_id} no longer exists.")
            }
            Self::Unauthorized { .. } => "The server rejected the credentials.".to_string(),
            Self::UpgradeRejected { status } => format!(
                "The server refused the terminal connection (HTTP {status}). The session is probably not running."
            ),
            Self::Resolve(_) => "The server address could not be resolved.".to_string(),
            other => other.to_string(),
        }
    }
}

/// Errors returned by `send` and `resize`.
#[derive(Debug, Error)]
pub enum SendError {
    /// No link is open.
    #[error("not connected")]
    NotConnected,

    /// The outbound queue is full.
    #[error("outbound queue is full")]
    QueueFull,

    /// The message could not be encoded.
    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_errors() {
        assert!(TransportError::Unauthorized { status: 401 }.is_terminal());
        assert!(
            TransportError::SessionNotFound {
                session_id: "s1".into()
            }
            .is_terminal()
        );
        assert!(TransportError::UpgradeRejected { status: 400 }.is_terminal());
        assert!(TransportError::Endpoint(EndpointError::EmptySessionId).is_terminal());

        assert!(TransportError::Timeout.is_transient());
        assert!(TransportError::Eof.is_transient());
        assert!(TransportError::ServerUnavailable { status: 503 }.is_transient());
        assert!(
            TransportError::ClosedByPeer {
                code: 1000,
                reason: String::new()
            }
            .is_transient()
        );
    }

    #[test]
    fn test_kinds() {
        assert_eq!(
            TransportError::SessionNotFound {
                session_id: "abc".into()
            }
            .kind(),
            ErrorKind::NotFound {
                resource_type: "terminal session".into(),
                id: "abc".into()
            }
        );
        assert_eq!(
            TransportError::ServerUnavailable { status: 429 }.kind(),
            ErrorKind::ApiError {
                code: 429,
                details: None
            }
        );
        assert_eq!(
            TransportError::Resolve("example.invalid".into()).kind(),
            ErrorKind::no_connection()
        );
        assert_eq!(
            TransportError::Stream("tls".into()).kind(),
            ErrorKind::TransportClosed {
                can_reconnect: true
            }
        );
        // Transient errors must classify as retry-relevant.
        assert!(TransportError::Eof.kind().is_recoverable());
        assert!(TransportError::Timeout.kind().is_recoverable());
    }

    #[test]
    fn test_failure_messages() {
        let msg = TransportError::UpgradeRejected { status: 400 }.failure_message();
        assert!(msg.contains("not running"));
        let msg = TransportError::SessionNotFound {
            session_id: "s-9".into(),
        }
        .failure_message();
        assert!(msg.contains("s-9"));
    }
}
