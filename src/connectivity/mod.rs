//! Network reachability.
//!
//! The connection manager only needs to know whether the device is online
//! and to be told when that changes. [`ConnectivityMonitor`] is the seam;
//! platforms push updates through a [`ConnectivityHandle`], and
//! [`TcpProbe`] provides a portable fallback.

mod probe;

pub use probe::*;

use tokio::sync::watch;

/// Reachability as reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectivityStatus {
    /// A usable network is present.
    Available,
    /// No usable network.
    Unavailable,
    /// The network is degrading but still usable.
    Losing,
    /// A previously available network went away.
    Lost,
}

impl ConnectivityStatus {
    /// Whether traffic can currently flow.
    pub fn is_online(self) -> bool {
        matches!(self, Self::Available | Self::Losing)
    }
}

/// Source of reachability information.
pub trait ConnectivityMonitor: Send + Sync {
    /// Status right now.
    fn current_status(&self) -> ConnectivityStatus;

    /// Receiver that is notified on every status change.
    fn subscribe(&self) -> watch::Receiver<ConnectivityStatus>;

    /// Shorthand for `current_status().is_online()`.
    fn is_connected(&self) -> bool {
        self.current_status().is_online()
    }
}

/// Push-driven monitor.
///
/// Platform glue calls [`set`](Self::set) whenever the OS reports a change.
/// Clones share the same status.
#[derive(Debug, Clone)]
pub struct ConnectivityHandle {
    tx: watch::Sender<ConnectivityStatus>,
}

impl ConnectivityHandle {
    /// Create a handle with an initial status.
    pub fn new(initial: ConnectivityStatus) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { tx }
    }

    /// Handle that reports `Available`.
    pub fn online() -> Self {
        Self::new(ConnectivityStatus::Available)
    }

    /// Publish a status. Subscribers are only woken when the status changes.
    pub fn set(&self, status: ConnectivityStatus) {
        self.tx.send_if_modified(|current| {
            if *current == status {
                return false;
            }
            tracing::debug!(from = ?*current, to = ?status, "connectivity changed");
            *current = status;
            true
        });
    }
}

impl Default for ConnectivityHandle {
    fn default() -> Self {
        Self::online()
    }
}

impl ConnectivityMonitor for ConnectivityHandle {
    fn current_status(&self) -> ConnectivityStatus {
        *self.tx.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<ConnectivityStatus> {
        self.tx.subscribe()
    }
}
