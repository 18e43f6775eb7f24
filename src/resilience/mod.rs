//! Retry policies and circuit breaking.
//!
//! - [`RetryPolicy`]: bounded exponential backoff over classified faults
//! - [`CircuitBreaker`]: fast-fail after repeated failures
//! - [`retry`] / [`retry_with_breaker`]: drive an async operation under both
//! - [`condition_for`]: stock classifier for `anyhow` faults

mod circuit_breaker;
mod retry;

pub use circuit_breaker::*;
pub use retry::*;
