//! Periodic TCP reachability probe.

use std::time::Duration;

use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::trace;

use super::{ConnectivityMonitor, ConnectivityStatus};
use crate::core::constants::{
    DEFAULT_PROBE_FAILURES_BEFORE_LOST, DEFAULT_PROBE_INTERVAL, DEFAULT_PROBE_TIMEOUT,
};
use crate::core::{ErrorKind, ErrorReporter, classify_io};

/// Probe that opens a TCP connection to `target` every `interval`.
///
/// Used where no platform reachability API is available, such as the
/// terminal demo.
#[derive(Debug, Clone)]
pub struct TcpProbe {
    target: String,
    interval: Duration,
    timeout: Duration,
    failures_before_lost: u32,
}

impl TcpProbe {
    /// Probe `target` (`host:port`) with default timings.
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            interval: DEFAULT_PROBE_INTERVAL,
            timeout: DEFAULT_PROBE_TIMEOUT,
            failures_before_lost: DEFAULT_PROBE_FAILURES_BEFORE_LOST,
        }
    }

    /// Time between probes.
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Timeout for a single probe.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Consecutive failures before the network is reported lost.
    pub fn failures_before_lost(mut self, failures: u32) -> Self {
        self.failures_before_lost = failures.max(1);
        self
    }

    /// Start probing. The monitor stops probing when dropped.
    ///
    /// Probe failures go to `reporter` as silent reports.
    pub fn spawn(self, reporter: Option<ErrorReporter>) -> ProbeMonitor {
        let (tx, rx) = watch::channel(ConnectivityStatus::Available);
        let task = tokio::spawn(self.run(tx, reporter));
        ProbeMonitor { rx, task }
    }

    async fn probe_once(&self) -> Result<(), ErrorKind> {
        match tokio::time::timeout(self.timeout, TcpStream::connect(&self.target)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(classify_io(&e)),
            Err(_) => Err(ErrorKind::timeout()),
        }
    }

    async fn run(self, tx: watch::Sender<ConnectivityStatus>, reporter: Option<ErrorReporter>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut tracker = ProbeTracker::new(self.failures_before_lost);

        loop {
            ticker.tick().await;
            let outcome = self.probe_once().await;
            if let (Err(kind), Some(reporter)) = (&outcome, &reporter) {
                reporter.report("connectivity.probe", kind.clone(), true);
            }
            let status = tracker.observe(outcome.is_ok());
            trace!(addr = %self.target, ?status, "probe finished");
            tx.send_if_modified(|current| {
                let changed = *current != status;
                *current = status;
                changed
            });
            if tx.is_closed() {
                break;
            }
        }
    }
}

/// Maps a sequence of probe outcomes to a status.
#[derive(Debug)]
struct ProbeTracker {
    failures_before_lost: u32,
    consecutive_failures: u32,
    ever_reachable: bool,
}

impl ProbeTracker {
    fn new(failures_before_lost: u32) -> Self {
        Self {
            failures_before_lost: failures_before_lost.max(1),
            consecutive_failures: 0,
            ever_reachable: false,
        }
    }

    fn observe(&mut self, reachable: bool) -> ConnectivityStatus {
        if reachable {
            self.consecutive_failures = 0;
            self.ever_reachable = true;
            return ConnectivityStatus::Available;
        }
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        if !self.ever_reachable {
            ConnectivityStatus::Unavailable
        } else if self.consecutive_failures >= self.failures_before_lost {
            ConnectivityStatus::Lost
        } else {
            ConnectivityStatus::Losing
        }
    }
}

/// Handle to a running [`TcpProbe`].
#[derive(Debug)]
pub struct ProbeMonitor {
    rx: watch::Receiver<ConnectivityStatus>,
    task: JoinHandle<()>,
}

impl ConnectivityMonitor for ProbeMonitor {
    fn current_status(&self) -> ConnectivityStatus {
        *self.rx.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<ConnectivityStatus> {
        self.rx.clone()
    }
}

impl Drop for ProbeMonitor {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn test_tracker_transitions() {
        let mut tracker = ProbeTracker::new(3);
        assert_eq!(tracker.observe(false), ConnectivityStatus::Unavailable);
        assert_eq!(tracker.observe(true), ConnectivityStatus::Available);
        assert_eq!(tracker.observe(false), ConnectivityStatus::Losing);
        assert_eq!(tracker.observe(false), ConnectivityStatus::Losing);
        assert_eq!(tracker.observe(false), ConnectivityStatus::Lost);
        assert_eq!(tracker.observe(false), ConnectivityStatus::Lost);
        assert_eq!(tracker.observe(true), ConnectivityStatus::Available);
    }

    #[tokio::test]
    async fn test_probe_reports_reachable_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let monitor = TcpProbe::new(addr.to_string())
            .interval(Duration::from_millis(20))
            .spawn(None);
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(monitor.current_status(), ConnectivityStatus::Available);
        assert!(monitor.is_connected());
    }

    #[tokio::test]
    async fn test_probe_reports_unreachable_target() {
        // Bind then drop so the port is closed.
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };

        let monitor = TcpProbe::new(addr.to_string())
            .interval(Duration::from_millis(20))
            .spawn(None);
        let mut rx = monitor.subscribe();
        tokio::time::timeout(Duration::from_secs(2), rx.wait_for(|s| !s.is_online()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(monitor.current_status(), ConnectivityStatus::Unavailable);
    }
}
