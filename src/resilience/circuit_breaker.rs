//! Circuit breaker.
//!
//! Opens after `failure_threshold` consecutive failures and rejects calls
//! until `reset_timeout` has passed. The first call after that runs as a
//! half-open trial and every other caller is rejected while it is in
//! flight. Success closes the circuit, failure re-opens it immediately. A
//! trial whose outcome is never recorded is replaced after another
//! `reset_timeout`.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::core::constants::{DEFAULT_FAILURE_THRESHOLD, DEFAULT_RESET_TIMEOUT};

/// Observable breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Calls pass through.
    Closed,
    /// Calls are rejected.
    Open,
    /// A single trial call is allowed.
    HalfOpen,
}

#[derive(Debug, Default)]
struct BreakerInner {
    failure_count: u32,
    last_failure: Option<Instant>,
    is_open: bool,
    half_open: bool,
    trial_started: Option<Instant>,
}

/// Thread-safe circuit breaker.
#[derive(Debug)]
pub struct CircuitBreaker {
    failure_threshold: u32,
    reset_timeout: Duration,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    /// Create a breaker. A threshold of zero is treated as one.
    pub fn new(failure_threshold: u32, reset_timeout: Duration) -> Self {
        Self {
            failure_threshold: failure_threshold.max(1),
            reset_timeout,
            inner: Mutex::new(BreakerInner::default()),
        }
    }

    /// Consecutive failures that open the circuit.
    pub fn failure_threshold(&self) -> u32 {
        self.failure_threshold
    }

    /// How long the circuit stays open.
    pub fn reset_timeout(&self) -> Duration {
        self.reset_timeout
    }

    /// Record a successful call and close the circuit.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        if inner.is_open || inner.half_open {
            debug!("circuit closed");
        }
        inner.failure_count = 0;
        inner.is_open = false;
        inner.half_open = false;
        inner.trial_started = None;
    }

    /// Record a failed call.
    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        inner.failure_count = inner.failure_count.saturating_add(1);
        inner.last_failure = Some(Instant::now());
        inner.half_open = false;
        inner.trial_started = None;
        if !inner.is_open && inner.failure_count >= self.failure_threshold {
            inner.is_open = true;
            warn!(
                failures = inner.failure_count,
                reset_after = ?self.reset_timeout,
                "circuit opened"
            );
        }
    }

    /// Whether a call may run now.
    ///
    /// Moves an open circuit to half-open once the reset timeout has passed
    /// and admits exactly one trial call.
    pub fn can_proceed(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.half_open {
            let stalled = inner
                .trial_started
                .is_none_or(|at| at.elapsed() >= self.reset_timeout);
            if stalled {
                inner.trial_started = Some(Instant::now());
            }
            return stalled;
        }
        if !inner.is_open {
            return true;
        }
        let expired = inner
            .last_failure
            .is_none_or(|at| at.elapsed() >= self.reset_timeout);
        if expired {
            inner.is_open = false;
            inner.half_open = true;
            inner.trial_started = Some(Instant::now());
            // One more failure re-opens the circuit.
            inner.failure_count = self.failure_threshold - 1;
            debug!("circuit half-open");
        }
        expired
    }

    /// Current state.
    pub fn state(&self) -> CircuitState {
        let inner = self.inner.lock();
        if inner.is_open {
            CircuitState::Open
        } else if inner.half_open {
            CircuitState::HalfOpen
        } else {
            CircuitState::Closed
        }
    }

    /// Consecutive failures recorded.
    pub fn failure_count(&self) -> u32 {
        self.inner.lock().failure_count
    }

    /// Whether calls are currently rejected.
    pub fn is_open(&self) -> bool {
        self.inner.lock().is_open
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(DEFAULT_FAILURE_THRESHOLD, DEFAULT_RESET_TIMEOUT)
    }
}
