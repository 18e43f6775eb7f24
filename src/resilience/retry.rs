//! Retry policies with exponential backoff.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

use super::circuit_breaker::CircuitBreaker;
use crate::core::constants::{
    DEFAULT_BACKOFF_MULTIPLIER, DEFAULT_INITIAL_DELAY, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_DELAY,
};
use crate::core::{ErrorKind, classify};

/// Category of fault a policy may retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RetryCondition {
    /// Connection-level failure.
    NetworkError,
    /// 5xx response.
    ServerError,
    /// The operation timed out.
    Timeout,
    /// 429 response.
    RateLimited,
    /// 401/403 response. Not retried by any preset.
    Unauthorized,
}

impl RetryCondition {
    /// Condition matching an error kind, if the kind is retry-relevant.
    pub fn from_kind(kind: &ErrorKind) -> Option<Self> {
        match kind {
            ErrorKind::Network { timeout: true, .. } => Some(Self::Timeout),
            ErrorKind::Network { .. } => Some(Self::NetworkError),
            ErrorKind::Server { .. } => Some(Self::ServerError),
            ErrorKind::ApiError { code: 429, .. } => Some(Self::RateLimited),
            ErrorKind::ApiError { code: 408, .. } => Some(Self::Timeout),
            ErrorKind::Auth { .. } => Some(Self::Unauthorized),
            ErrorKind::TransportClosed {
                can_reconnect: true,
            } => Some(Self::NetworkError),
            _ => None,
        }
    }

    const fn bit(self) -> u8 {
        match self {
            Self::NetworkError => 1 << 0,
            Self::ServerError => 1 << 1,
            Self::Timeout => 1 << 2,
            Self::RateLimited => 1 << 3,
            Self::Unauthorized => 1 << 4,
        }
    }

    const ALL: [Self; 5] = [
        Self::NetworkError,
        Self::ServerError,
        Self::Timeout,
        Self::RateLimited,
        Self::Unauthorized,
    ];
}

/// Condition for an arbitrary fault.
///
/// Pass as the classifier to [`retry`] when the operation fails with
/// `anyhow::Error`.
pub fn condition_for(fault: &anyhow::Error) -> Option<RetryCondition> {
    RetryCondition::from_kind(&classify(fault))
}

/// Set of [`RetryCondition`]s.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ConditionSet(u8);

impl ConditionSet {
    /// No conditions.
    pub const EMPTY: Self = Self(0);

    /// Network, server, timeout and rate-limit faults.
    pub const TRANSIENT: Self = Self::EMPTY
        .with(RetryCondition::NetworkError)
        .with(RetryCondition::ServerError)
        .with(RetryCondition::Timeout)
        .with(RetryCondition::RateLimited);

    /// Every condition.
    pub const ALL: Self = Self::TRANSIENT.with(RetryCondition::Unauthorized);

    /// This set plus `condition`.
    pub const fn with(self, condition: RetryCondition) -> Self {
        Self(self.0 | condition.bit())
    }

    /// Whether `condition` is in the set.
    pub const fn contains(self, condition: RetryCondition) -> bool {
        self.0 & condition.bit() != 0
    }

    /// Whether the set is empty.
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl FromIterator<RetryCondition> for ConditionSet {
    fn from_iter<I: IntoIterator<Item = RetryCondition>>(iter: I) -> Self {
        iter.into_iter().fold(Self::EMPTY, Self::with)
    }
}

impl fmt::Debug for ConditionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set()
            .entries(RetryCondition::ALL.iter().filter(|c| self.contains(**c)))
            .finish()
    }
}

/// Invalid retry policy parameters.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PolicyError {
    /// `max_attempts` was zero.
    #[error("max_attempts must be at least 1, got {0}")]
    InvalidMaxAttempts(u32),

    /// The initial delay exceeds the cap.
    #[error("initial_delay ({initial:?}) must not exceed max_delay ({max:?})")]
    InvalidDelayRange {
        /// Configured initial delay.
        initial: Duration,
        /// Configured cap.
        max: Duration,
    },

    /// The multiplier is not a finite number above 1.
    #[error("backoff_multiplier must be finite and greater than 1.0, got {0}")]
    InvalidMultiplier(f64),
}

/// Immutable retry policy.
///
/// `max_attempts` counts every attempt, including the first. The delay
/// before retry `n` (1-based) is
/// `min(initial_delay * multiplier^(n-1), max_delay)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_delay: Duration,
    max_delay: Duration,
    backoff_multiplier: f64,
    retry_on: ConditionSet,
}

impl RetryPolicy {
    /// Three attempts, 1 s doubling up to 10 s, transient faults.
    pub const DEFAULT: Self = Self {
        max_attempts: DEFAULT_MAX_ATTEMPTS,
        initial_delay: DEFAULT_INITIAL_DELAY,
        max_delay: DEFAULT_MAX_DELAY,
        backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
        retry_on: ConditionSet::TRANSIENT,
    };

    /// Five attempts, 500 ms growing by 1.5 up to 5 s, transient faults.
    pub const AGGRESSIVE: Self = Self {
        max_attempts: 5,
        initial_delay: Duration::from_millis(500),
        max_delay: Duration::from_secs(5),
        backoff_multiplier: 1.5,
        retry_on: ConditionSet::TRANSIENT,
    };

    /// Two attempts, 2 s tripling up to 30 s, network and timeout faults only.
    pub const CONSERVATIVE: Self = Self {
        max_attempts: 2,
        initial_delay: Duration::from_secs(2),
        max_delay: Duration::from_secs(30),
        backoff_multiplier: 3.0,
        retry_on: ConditionSet::EMPTY
            .with(RetryCondition::NetworkError)
            .with(RetryCondition::Timeout),
    };

    /// A single attempt.
    pub const NONE: Self = Self {
        max_attempts: 1,
        initial_delay: Duration::ZERO,
        max_delay: Duration::ZERO,
        backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
        retry_on: ConditionSet::EMPTY,
    };

    /// Start building a policy from [`RetryPolicy::DEFAULT`].
    pub fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder {
            policy: Self::DEFAULT,
        }
    }

    /// Total attempts allowed, including the first.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before the first retry.
    pub fn initial_delay(&self) -> Duration {
        self.initial_delay
    }

    /// Cap on any single delay.
    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    /// Growth factor between delays.
    pub fn backoff_multiplier(&self) -> f64 {
        self.backoff_multiplier
    }

    /// Conditions this policy retries.
    pub fn retry_on(&self) -> ConditionSet {
        self.retry_on
    }

    /// Delay before retry number `attempt` (1-based). Zero for attempt 0.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 || self.initial_delay.is_zero() {
            return Duration::ZERO;
        }
        let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
        let raw = self.initial_delay.as_millis() as f64 * self.backoff_multiplier.powi(exponent);
        let capped = raw.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }

    /// Whether another attempt is allowed after `attempts` failed ones.
    pub fn should_retry(&self, condition: RetryCondition, attempts: u32) -> bool {
        attempts < self.max_attempts && self.retry_on.contains(condition)
    }

    /// [`should_retry`](Self::should_retry) for an error kind. Kinds with no
    /// matching condition are never retried.
    pub fn should_retry_kind(&self, kind: &ErrorKind, attempts: u32) -> bool {
        RetryCondition::from_kind(kind).is_some_and(|c| self.should_retry(c, attempts))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Builder for a custom [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct RetryPolicyBuilder {
    policy: RetryPolicy,
}

impl RetryPolicyBuilder {
    /// Total attempts, including the first.
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.policy.max_attempts = attempts;
        self
    }

    /// Delay before the first retry.
    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.policy.initial_delay = delay;
        self
    }

    /// Cap on any single delay.
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.policy.max_delay = delay;
        self
    }

    /// Growth factor between delays.
    pub fn backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.policy.backoff_multiplier = multiplier;
        self
    }

    /// Conditions to retry.
    pub fn retry_on(mut self, conditions: impl IntoIterator<Item = RetryCondition>) -> Self {
        self.policy.retry_on = conditions.into_iter().collect();
        self
    }

    /// Validate and build.
    pub fn build(self) -> Result<RetryPolicy, PolicyError> {
        let p = self.policy;
        if p.max_attempts == 0 {
            return Err(PolicyError::InvalidMaxAttempts(p.max_attempts));
        }
        if p.initial_delay > p.max_delay {
            return Err(PolicyError::InvalidDelayRange {
                initial: p.initial_delay,
                max: p.max_delay,
            });
        }
        if !p.backoff_multiplier.is_finite() || p.backoff_multiplier <= 1.0 {
            return Err(PolicyError::InvalidMultiplier(p.backoff_multiplier));
        }
        Ok(p)
    }
}

/// Run `operation` until it succeeds, fails with a fault the policy does not
/// retry, or the attempt budget is spent. The last error is returned as is.
pub async fn retry<T, E, F, Fut, C>(policy: &RetryPolicy, classify: C, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    C: Fn(&E) -> Option<RetryCondition>,
    E: fmt::Display,
{
    let mut attempts = 0;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(error) => {
                attempts += 1;
                let Some(condition) = classify(&error) else {
                    debug!(%error, "fault is not retryable");
                    return Err(error);
                };
                if !policy.should_retry(condition, attempts) {
                    warn!(%error, attempts, ?condition, "giving up");
                    return Err(error);
                }
                let delay = policy.delay_for_attempt(attempts);
                debug!(%error, attempts, ?delay, "retrying");
                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// Failure of [`retry_with_breaker`].
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// The circuit was open, so the operation was not run.
    #[error("circuit breaker is open")]
    CircuitOpen,

    /// The operation failed.
    #[error(transparent)]
    Operation(E),
}

/// [`retry`] guarded by a circuit breaker.
///
/// Each attempt first asks the breaker for permission. Retryable failures are
/// recorded against the breaker; successes reset it. If the breaker trips
/// partway through, the last fault is returned; `CircuitOpen` means no
/// attempt ran.
pub async fn retry_with_breaker<T, E, F, Fut, C>(
    policy: &RetryPolicy,
    breaker: &CircuitBreaker,
    classify: C,
    mut operation: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    C: Fn(&E) -> Option<RetryCondition>,
    E: fmt::Display,
{
    let mut attempts = 0;
    let mut last_error = None;
    loop {
        if !breaker.can_proceed() {
            debug!(attempts, "circuit open, not attempting");
            return Err(last_error.map_or(RetryError::CircuitOpen, RetryError::Operation));
        }
        match operation().await {
            Ok(value) => {
                breaker.record_success();
                return Ok(value);
            }
            Err(error) => {
                attempts += 1;
                let Some(condition) = classify(&error) else {
                    return Err(RetryError::Operation(error));
                };
                breaker.record_failure();
                if !policy.should_retry(condition, attempts) {
                    warn!(%error, attempts, ?condition, "giving up");
                    return Err(RetryError::Operation(error));
                }
                tokio::time::sleep(policy.delay_for_attempt(attempts)).await;
                last_error = Some(error);
            }
        }
    }
}
