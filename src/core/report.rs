//! Global error reporting.
//!
//! Components report classified faults to an [`ErrorReporter`]. Silent
//! reports are only logged; visible reports are also broadcast to every
//! subscriber (typically the UI layer).

use tokio::sync::broadcast;
use tracing::{debug, warn};

use super::classify::classify;
use super::constants::DEFAULT_EVENT_CAPACITY;
use super::error::ErrorKind;

/// A fault reported for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorReport {
    /// Classified fault.
    pub kind: ErrorKind,
    /// Where the fault happened, e.g. `"terminal.connect"`.
    pub context: String,
}

/// Fan-out point for user-visible errors.
///
/// Cheap to clone; all clones share the same subscribers.
#[derive(Debug, Clone)]
pub struct ErrorReporter {
    tx: broadcast::Sender<ErrorReport>,
}

impl ErrorReporter {
    /// Create a reporter buffering up to `capacity` undelivered reports per
    /// subscriber.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Receive every visible report made after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<ErrorReport> {
        self.tx.subscribe()
    }

    /// Report an already classified fault.
    pub fn report(&self, context: &str, kind: ErrorKind, silent: bool) {
        if silent {
            debug!(context, error = %kind, "suppressed error");
            return;
        }
        warn!(context, error = %kind, recoverable = kind.is_recoverable(), "error reported");
        // No subscribers is fine.
        let _ = self.tx.send(ErrorReport {
            kind,
            context: context.to_string(),
        });
    }

    /// Classify and report a fault, returning its kind.
    pub fn report_fault(&self, context: &str, fault: &anyhow::Error, silent: bool) -> ErrorKind {
        let kind = classify(fault);
        self.report(context, kind.clone(), silent);
        kind
    }
}

impl Default for ErrorReporter {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::StatusFault;

    #[tokio::test]
    async fn test_visible_reports_are_broadcast() {
        let reporter = ErrorReporter::default();
        let mut rx = reporter.subscribe();

        reporter.report("projects.load", ErrorKind::Server { code: 500 }, false);

        let report = rx.recv().await.unwrap();
        assert_eq!(report.context, "projects.load");
        assert_eq!(report.kind, ErrorKind::Server { code: 500 });
    }

    #[tokio::test]
    async fn test_silent_reports_are_not_broadcast() {
        let reporter = ErrorReporter::default();
        let mut rx = reporter.subscribe();

        reporter.report("probe", ErrorKind::no_connection(), true);
        let kind = reporter.report_fault("auth", &StatusFault::new(401).into(), false);

        assert_eq!(kind, ErrorKind::Auth { code: 401 });
        let report = rx.recv().await.unwrap();
        assert_eq!(report.context, "auth");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_report_without_subscribers() {
        ErrorReporter::new(0).report("idle", ErrorKind::Unknown, false);
    }
}
