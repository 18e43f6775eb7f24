//! Protocol and client constants.
//!
//! Defaults used when a caller does not override them through a builder.

use std::time::Duration;

// =============================================================================
// OUTPUT BUFFER
// =============================================================================

/// Maximum number of characters retained in the output buffer.
pub const OUTPUT_BUFFER_CAPACITY: usize = 100_000;

// =============================================================================
// RETRY DEFAULTS
// =============================================================================

/// Default attempt budget for reconnection.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Delay before the first retry.
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_millis(1000);

/// Upper bound on any single retry delay.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(10_000);

/// Growth factor between consecutive retry delays.
pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;

// =============================================================================
// CIRCUIT BREAKER DEFAULTS
// =============================================================================

/// Consecutive failures that open a circuit.
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;

/// How long an open circuit rejects calls before allowing a probe.
pub const DEFAULT_RESET_TIMEOUT: Duration = Duration::from_secs(30);

// =============================================================================
// TRANSPORT
// =============================================================================

/// Give up on a single connection attempt after this long.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// WebSocket close code for a normal, intentional closure.
pub const CLOSE_NORMAL: u16 = 1000;

/// WebSocket close code reported when the peer sent no status.
pub const CLOSE_NO_STATUS: u16 = 1005;

/// Outbound frames queued per link before `send` reports backpressure.
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 256;

/// Inbound link events queued before the reader task waits.
pub const DEFAULT_INBOUND_CAPACITY: usize = 256;

/// Capacity of the state-transition and message broadcast channels.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Path segments appended to the base endpoint; the session id goes between
/// `sessions` and `terminal`.
pub const TERMINAL_PATH_PREFIX: [&str; 2] = ["api", "sessions"];

/// Final path segment of the terminal resource.
pub const TERMINAL_PATH_SUFFIX: &str = "terminal";

// =============================================================================
// CONNECTIVITY PROBE
// =============================================================================

/// Interval between reachability probes.
pub const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_secs(5);

/// Timeout for a single reachability probe.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Consecutive probe failures before the network is reported lost.
pub const DEFAULT_PROBE_FAILURES_BEFORE_LOST: u32 = 3;
