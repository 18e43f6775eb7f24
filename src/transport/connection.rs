//! Connection lifecycle state.
//!
//! ```text
//! Disconnected --connect--> Connecting --open--> Connected
//! Connecting / Connected --transient fault--> Reconnecting --timer--> Connecting
//! Connecting / Connected --terminal fault or budget spent--> Failed
//! Reconnecting --timer while offline--> Failed(can_retry = true)
//! Failed --connect / reconnect--> Connecting
//! any --disconnect--> Disconnected
//! any --destroy--> Destroyed
//! ```

use std::time::Duration;

use crate::core::ErrorKind;

/// State published by the connection manager.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ConnectionState {
    /// No link and nothing scheduled.
    #[default]
    Disconnected,
    /// A connection attempt is in flight.
    Connecting,
    /// The link is open.
    Connected {
        /// Session the link is attached to.
        session_id: String,
    },
    /// Waiting before the next attempt.
    Reconnecting {
        /// Failed attempts so far (1-based).
        attempt: u32,
        /// Attempt budget.
        max_attempts: u32,
        /// Delay until the next attempt.
        next_retry_delay: Duration,
    },
    /// No further automatic attempts will be made, except on network
    /// recovery when `can_retry` is set.
    Failed {
        /// Classified cause.
        error: ErrorKind,
        /// Human-readable explanation.
        message: String,
        /// Whether `reconnect` (or regained connectivity) may succeed.
        can_retry: bool,
    },
    /// The manager was destroyed. Final.
    Destroyed,
}

impl ConnectionState {
    /// Whether the link is open.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected { .. })
    }

    /// Whether an attempt is running or scheduled.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            Self::Connecting | Self::Connected { .. } | Self::Reconnecting { .. }
        )
    }

    /// Whether the state is terminal for the manager.
    pub fn is_destroyed(&self) -> bool {
        matches!(self, Self::Destroyed)
    }

    /// Short name for logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected { .. } => "connected",
            Self::Reconnecting { .. } => "reconnecting",
            Self::Failed { .. } => "failed",
            Self::Destroyed => "destroyed",
        }
    }
}
