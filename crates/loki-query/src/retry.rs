//! Retry with exponential backoff, classified failures and a deadline.
//!
//! [`RetryExecutor::execute`] runs an operation until it succeeds, its
//! failure is not worth retrying, the attempt or per-kind budget runs out,
//! or the overall deadline is reached.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::time::{Instant, sleep, timeout_at};
use tracing::{debug, warn};

use crate::circuit::CircuitBreaker;
use crate::classify::{ErrorClassifier, ErrorKind, Failure, TransportFailure};
use crate::error::{QueryError, Result};
use crate::stats::ErrorStatistics;

/// Jitter applied to each delay, as a fraction of it.
pub const JITTER_FRACTION: f64 = 0.25;

/// Retry configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Upper bound on a single delay.
    pub max_delay: Duration,
    /// Budget across all attempts and delays.
    pub deadline: Option<Duration>,
    /// Whether to randomize delays by up to ±25%.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            deadline: Some(Duration::from_secs(30)),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Delay after the failed attempt with zero-based index `attempt`,
    /// before jitter.
    #[must_use]
    pub fn delay_for_attempt(
        &self,
        attempt: u32,
        kind: ErrorKind,
        retry_after: Option<Duration>,
    ) -> Duration {
        if let Some(hint) = retry_after {
            return hint.min(self.max_delay);
        }
        let base = self.base_delay.max(kind.suggested_backoff());
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        base.checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    fn jittered(&self, delay: Duration) -> Duration {
        if !self.jitter || delay.is_zero() {
            return delay;
        }
        let factor = 1.0 + rand::thread_rng().gen_range(-JITTER_FRACTION..=JITTER_FRACTION);
        delay.mul_f64(factor).min(self.max_delay)
    }
}

/// Runs fallible store operations under a [`RetryPolicy`].
#[derive(Debug, Clone, Default)]
pub struct RetryExecutor {
    policy: RetryPolicy,
    breaker: Option<Arc<CircuitBreaker>>,
    stats: Option<Arc<ErrorStatistics>>,
}

impl RetryExecutor {
    /// Creates an executor without breaker or statistics.
    #[must_use]
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            breaker: None,
            stats: None,
        }
    }

    /// Attaches a circuit breaker.
    #[must_use]
    pub fn with_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.breaker = Some(breaker);
        self
    }

    /// Attaches failure statistics.
    #[must_use]
    pub fn with_stats(mut self, stats: Arc<ErrorStatistics>) -> Self {
        self.stats = Some(stats);
        self
    }

    /// The active policy.
    #[must_use]
    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Runs `op` until it succeeds or retrying stops.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::CircuitOpen`] without calling `op` when the
    /// attached breaker is open, otherwise [`QueryError::Failed`] carrying
    /// the last failure's kind and message and the number of attempts made.
    pub async fn execute<T, F, Fut>(
        &self,
        operation: &str,
        classifier: &ErrorClassifier,
        mut op: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, Failure>>,
    {
        if self.breaker.as_ref().is_some_and(|b| !b.can_execute()) {
            warn!(operation, "circuit breaker open, call refused");
            self.record_outcome(operation, false);
            return Err(QueryError::CircuitOpen);
        }

        let deadline = self.policy.deadline.map(|d| Instant::now() + d);
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempts = 0u32;

        loop {
            attempts += 1;

            let outcome = match deadline {
                Some(at) => timeout_at(at, op()).await.unwrap_or_else(|_| {
                    Err(Failure::transport(
                        TransportFailure::Timeout,
                        "deadline exceeded while waiting for the store",
                    ))
                }),
                None => op().await,
            };

            let failure = match outcome {
                Ok(value) => {
                    debug!(operation, attempts, "operation succeeded");
                    if let Some(breaker) = &self.breaker {
                        breaker.record_success();
                    }
                    self.record_outcome(operation, true);
                    return Ok(value);
                }
                Err(failure) => failure,
            };

            let class = classifier.classify(&failure);
            let message = failure.message();
            if let Some(stats) = &self.stats {
                stats.record_attempt_failure(operation, class.kind, &message);
            }

            let deadline_hit = deadline.is_some_and(|at| Instant::now() >= at);
            let retries_done = attempts - 1;
            let budget_spent = class
                .kind
                .retry_budget()
                .is_some_and(|budget| retries_done >= budget);

            let mut stop = !class.retryable || budget_spent || attempts >= max_attempts;
            let mut deadline_exceeded = deadline_hit;

            let delay = self.policy.jittered(self.policy.delay_for_attempt(
                retries_done,
                class.kind,
                class.retry_after,
            ));
            if !stop && deadline.is_some_and(|at| Instant::now() + delay >= at) {
                deadline_exceeded = true;
            }
            stop |= deadline_exceeded;

            if stop {
                warn!(
                    operation,
                    attempts,
                    kind = %class.kind,
                    deadline_exceeded,
                    error = %message,
                    "operation failed"
                );
                if let Some(breaker) = &self.breaker {
                    if class.kind.is_retryable() {
                        breaker.record_failure();
                    } else {
                        breaker.release();
                    }
                }
                self.record_outcome(operation, false);
                return Err(QueryError::Failed {
                    kind: class.kind,
                    attempts,
                    message,
                    deadline_exceeded,
                });
            }

            warn!(
                operation,
                attempt = attempts,
                kind = %class.kind,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %message,
                "retrying after failure"
            );
            if let Some(stats) = &self.stats {
                stats.record_retry(operation);
            }
            sleep(delay).await;
        }
    }

    fn record_outcome(&self, operation: &str, success: bool) {
        if let Some(stats) = &self.stats {
            stats.record_outcome(operation, success);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use crate::circuit::{CircuitConfig, CircuitState};

    fn policy() -> RetryPolicy {
        RetryPolicy {
            jitter: false,
            ..RetryPolicy::default()
        }
    }

    async fn run<T: Send>(
        executor: &RetryExecutor,
        calls: &AtomicU32,
        outcome: impl Fn(u32) -> std::result::Result<T, Failure>,
    ) -> Result<T> {
        executor
            .execute("test", &ErrorClassifier::new(), || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                let result = outcome(n);
                async move { result }
            })
            .await
    }

    // ===========================================
    // Policy Tests
    // ===========================================

    #[test]
    fn policy_defaults() {
        let p = RetryPolicy::default();
        assert_eq!(p.max_attempts, 3);
        assert_eq!(p.base_delay, Duration::from_secs(1));
        assert_eq!(p.max_delay, Duration::from_secs(60));
        assert_eq!(p.deadline, Some(Duration::from_secs(30)));
        assert!(p.jitter);
    }

    #[test]
    fn delays_double_and_cap() {
        let p = policy();
        assert_eq!(p.delay_for_attempt(0, ErrorKind::ServerError, None), Duration::from_secs(1));
        assert_eq!(p.delay_for_attempt(1, ErrorKind::ServerError, None), Duration::from_secs(2));
        assert_eq!(p.delay_for_attempt(2, ErrorKind::ServerError, None), Duration::from_secs(4));
        assert_eq!(p.delay_for_attempt(10, ErrorKind::ServerError, None), Duration::from_secs(60));
        assert_eq!(p.delay_for_attempt(40, ErrorKind::ServerError, None), Duration::from_secs(60));
    }

    #[test]
    fn kind_backoff_raises_small_base() {
        let p = RetryPolicy {
            base_delay: Duration::from_millis(10),
            ..policy()
        };
        assert_eq!(p.delay_for_attempt(0, ErrorKind::RateLimit, None), Duration::from_secs(1));
        assert_eq!(p.delay_for_attempt(0, ErrorKind::Connection, None), Duration::from_millis(250));
    }

    #[test]
    fn retry_after_hint_wins_but_is_capped() {
        let p = policy();
        let hint = Some(Duration::from_secs(7));
        assert_eq!(p.delay_for_attempt(0, ErrorKind::RateLimit, hint), Duration::from_secs(7));
        let huge = Some(Duration::from_secs(600));
        assert_eq!(p.delay_for_attempt(0, ErrorKind::RateLimit, huge), Duration::from_secs(60));
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let p = RetryPolicy::default();
        for _ in 0..100 {
            let d = p.jittered(Duration::from_secs(4));
            assert!(d >= Duration::from_secs(3) && d <= Duration::from_secs(5), "{d:?}");
        }
    }

    // ===========================================
    // Executor Tests
    // ===========================================

    #[tokio::test(start_paused = true)]
    async fn succeeds_first_try() {
        let calls = AtomicU32::new(0);
        let result = run(&RetryExecutor::new(policy()), &calls, |_| Ok(42)).await;
        assert_eq!(result, Ok(42));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_after_server_errors() {
        let calls = AtomicU32::new(0);
        let result = run(&RetryExecutor::new(policy()), &calls, |n| {
            if n < 2 { Err(Failure::status(503, "")) } else { Ok("ok") }
        })
        .await;
        assert_eq!(result, Ok("ok"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn stops_at_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = run(&RetryExecutor::new(policy()), &calls, |_| {
            Err(Failure::status(500, "boom"))
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match result {
            Err(QueryError::Failed { kind, attempts, message, deadline_exceeded }) => {
                assert_eq!(kind, ErrorKind::ServerError);
                assert_eq!(attempts, 3);
                assert_eq!(message, "HTTP 500: boom");
                assert!(!deadline_exceeded);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn authentication_is_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = run(&RetryExecutor::new(policy()), &calls, |_| {
            Err(Failure::status(401, "unauthorized"))
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let err = result.expect_err("should fail");
        assert_eq!(err.attempts(), 1);
        assert!(!err.is_retryable());
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_is_retried_once() {
        let calls = AtomicU32::new(0);
        let executor = RetryExecutor::new(RetryPolicy {
            max_attempts: 5,
            ..policy()
        });
        let result: Result<()> = run(&executor, &calls, |_| Err(Failure::status(404, "")))
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(result.expect_err("should fail").attempts(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn honors_retry_after() {
        let calls = AtomicU32::new(0);
        let started = Instant::now();
        let result = run(&RetryExecutor::new(policy()), &calls, |n| {
            if n == 0 {
                Err(Failure::Status {
                    code: 429,
                    message: String::new(),
                    retry_after: Some(Duration::from_secs(7)),
                })
            } else {
                Ok(())
            }
        })
        .await;

        assert!(result.is_ok());
        assert_eq!(started.elapsed(), Duration::from_secs(7));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_attempt_is_cut_off_by_deadline() {
        let executor = RetryExecutor::new(policy());
        let calls = AtomicU32::new(0);
        let result: Result<()> = executor
            .execute("slow", &ErrorClassifier::new(), || {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    sleep(Duration::from_secs(40)).await;
                    Ok(())
                }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        match result {
            Err(QueryError::Failed { kind, deadline_exceeded, .. }) => {
                assert_eq!(kind, ErrorKind::Connection);
                assert!(deadline_exceeded);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_crossing_deadline_stops_early() {
        let executor = RetryExecutor::new(RetryPolicy {
            max_attempts: 10,
            deadline: Some(Duration::from_secs(2)),
            ..policy()
        });
        let calls = AtomicU32::new(0);
        let started = Instant::now();
        let result: Result<()> =
            run(&executor, &calls, |_| Err(Failure::status(503, ""))).await;

        // Attempt at t=0, retry at t=1, next delay (2s) would cross t=2.
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(started.elapsed(), Duration::from_secs(1));
        assert!(matches!(
            result,
            Err(QueryError::Failed { deadline_exceeded: true, .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn open_breaker_refuses_without_calling() {
        let breaker = Arc::new(CircuitBreaker::new(CircuitConfig {
            failure_threshold: 1,
            ..CircuitConfig::default()
        }));
        let executor = RetryExecutor::new(RetryPolicy {
            max_attempts: 1,
            ..policy()
        })
        .with_breaker(Arc::clone(&breaker));

        let calls = AtomicU32::new(0);
        let _: Result<()> = run(&executor, &calls, |_| Err(Failure::status(500, ""))).await;
        assert_eq!(breaker.state(), CircuitState::Open);

        let result: Result<()> = run(&executor, &calls, |_| Ok(())).await;
        assert_eq!(result, Err(QueryError::CircuitOpen));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(QueryError::CircuitOpen.attempts(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn non_retryable_failure_gives_back_half_open_slot() {
        let breaker = Arc::new(CircuitBreaker::new(CircuitConfig {
            failure_threshold: 1,
            recovery_timeout: Duration::from_secs(10),
            success_threshold: 1,
        }));
        let executor = RetryExecutor::new(RetryPolicy {
            max_attempts: 1,
            ..policy()
        })
        .with_breaker(Arc::clone(&breaker));

        let calls = AtomicU32::new(0);
        let _: Result<()> = run(&executor, &calls, |_| Err(Failure::status(500, ""))).await;
        tokio::time::advance(Duration::from_secs(11)).await;

        let denied: Result<()> = run(&executor, &calls, |_| Err(Failure::status(401, ""))).await;
        assert!(matches!(denied, Err(QueryError::Failed { .. })));
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        assert_eq!(breaker.status().trials_in_flight, 0);

        let result: Result<()> = run(&executor, &calls, |_| Ok(())).await;
        assert_eq!(result, Ok(()));
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn statistics_are_recorded() {
        let stats = Arc::new(ErrorStatistics::new());
        let executor = RetryExecutor::new(policy()).with_stats(Arc::clone(&stats));
        let calls = AtomicU32::new(0);
        let _ = run(&executor, &calls, |n| {
            if n == 0 { Err(Failure::status(502, "")) } else { Ok(()) }
        })
        .await;

        let op = stats.operation("test").expect("recorded");
        assert_eq!(op.successes, 1);
        assert_eq!(op.retries, 1);
        assert_eq!(op.by_kind.get(&ErrorKind::ServerError), Some(&1));
    }
}
