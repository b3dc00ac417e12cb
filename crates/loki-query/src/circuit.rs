//! Circuit breaker guarding the store.
//!
//! After [`CircuitConfig::failure_threshold`] consecutive failures the
//! breaker opens and calls are refused without touching the network. Once
//! [`CircuitConfig::recovery_timeout`] has elapsed the breaker turns
//! half-open and admits at most [`CircuitConfig::success_threshold`] trial
//! calls at a time; that many successes close it again, any failure reopens it.
//! Trial slots that are never settled are reclaimed after another
//! recovery timeout.

use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{info, warn};

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Calls pass through.
    Closed,
    /// Calls are refused.
    Open,
    /// Probing whether the store recovered.
    HalfOpen,
}

/// Breaker thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitConfig {
    /// Consecutive failures that open the breaker.
    pub failure_threshold: u32,
    /// Time spent open before probing.
    pub recovery_timeout: Duration,
    /// Half-open successes needed to close.
    pub success_threshold: u32,
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
            success_threshold: 3,
        }
    }
}

/// Point-in-time view of a breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitStatus {
    /// Current state.
    pub state: CircuitState,
    /// Consecutive failures while closed.
    pub failure_count: u32,
    /// Successes while half-open.
    pub success_count: u32,
    /// Half-open trial calls admitted and not yet settled.
    pub trials_in_flight: u32,
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    failures: u32,
    successes: u32,
    trials: u32,
    opened_at: Option<Instant>,
    half_open_at: Option<Instant>,
}

/// A thread-safe circuit breaker.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitConfig,
    inner: Mutex<Inner>,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitConfig::default())
    }
}

impl CircuitBreaker {
    /// Creates a closed breaker.
    #[must_use]
    pub fn new(config: CircuitConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                failures: 0,
                successes: 0,
                trials: 0,
                opened_at: None,
                half_open_at: None,
            }),
        }
    }

    /// Whether a call may proceed. Moves an expired open breaker to half-open.
    ///
    /// A `true` while half-open takes a trial slot, which the caller settles
    /// with [`record_success`](Self::record_success),
    /// [`record_failure`](Self::record_failure) or
    /// [`release`](Self::release).
    #[must_use]
    pub fn can_execute(&self) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => true,
            CircuitState::HalfOpen => self.admit_trial(&mut inner),
            CircuitState::Open => {
                let expired = inner
                    .opened_at
                    .is_none_or(|at| at.elapsed() >= self.config.recovery_timeout);
                if !expired {
                    return false;
                }
                info!("circuit breaker half-open, trying the store again");
                inner.state = CircuitState::HalfOpen;
                inner.successes = 0;
                inner.trials = 0;
                inner.half_open_at = Some(Instant::now());
                self.admit_trial(&mut inner)
            }
        }
    }

    fn admit_trial(&self, inner: &mut Inner) -> bool {
        if inner.trials < self.config.success_threshold.max(1) {
            inner.trials += 1;
            return true;
        }
        let stale = inner
            .half_open_at
            .is_none_or(|at| at.elapsed() >= self.config.recovery_timeout);
        if stale {
            warn!(
                trials = inner.trials,
                "half-open trials never settled, reclaiming slots"
            );
            inner.trials = 1;
            inner.half_open_at = Some(Instant::now());
        }
        stale
    }

    /// Gives back a trial slot for a call whose outcome says nothing about
    /// the store's health.
    pub fn release(&self) {
        let mut inner = self.inner.lock();
        if inner.state == CircuitState::HalfOpen {
            inner.trials = inner.trials.saturating_sub(1);
        }
    }

    /// Records a successful call.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::HalfOpen => {
                inner.successes += 1;
                inner.trials = inner.trials.saturating_sub(1);
                if inner.successes >= self.config.success_threshold {
                    info!("circuit breaker closed");
                    inner.state = CircuitState::Closed;
                    inner.failures = 0;
                    inner.successes = 0;
                    inner.trials = 0;
                    inner.opened_at = None;
                    inner.half_open_at = None;
                }
            }
            CircuitState::Closed => inner.failures = 0,
            CircuitState::Open => {}
        }
    }

    /// Records a failed call.
    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::HalfOpen => {
                warn!("trial call failed, circuit breaker reopened");
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Instant::now());
                inner.successes = 0;
                inner.trials = 0;
                inner.half_open_at = None;
            }
            CircuitState::Closed => {
                inner.failures += 1;
                if inner.failures >= self.config.failure_threshold {
                    warn!(failures = inner.failures, "circuit breaker opened");
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(Instant::now());
                }
            }
            CircuitState::Open => {}
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Snapshot of the breaker.
    #[must_use]
    pub fn status(&self) -> CircuitStatus {
        let inner = self.inner.lock();
        CircuitStatus {
            state: inner.state,
            failure_count: inner.failures,
            success_count: inner.successes,
            trials_in_flight: inner.trials,
        }
    }
}
