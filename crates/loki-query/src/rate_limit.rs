//! Client-side request rate limiting.
//!
//! A sliding window of request timestamps shared by every call made through
//! one client. [`RateLimiter::acquire`] waits until a slot frees up.

use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::{Instant, sleep};
use tracing::debug;

/// Sliding-window request timestamps.
#[derive(Debug)]
struct SlidingWindow {
    timestamps: VecDeque<Instant>,
    window_size: Duration,
    max_requests: u32,
}

impl SlidingWindow {
    fn new(max_requests: u32, window_size: Duration) -> Self {
        Self {
            timestamps: VecDeque::with_capacity(max_requests as usize + 1),
            window_size,
            max_requests,
        }
    }

    fn prune(&mut self, now: Instant) {
        while self
            .timestamps
            .front()
            .is_some_and(|t| now.duration_since(*t) >= self.window_size)
        {
            self.timestamps.pop_front();
        }
    }

    /// Records a request if allowed, otherwise returns how long to wait.
    fn try_request(&mut self, now: Instant) -> Result<(), Duration> {
        self.prune(now);
        if self.timestamps.len() < self.max_requests as usize {
            self.timestamps.push_back(now);
            return Ok(());
        }
        let wait = self
            .timestamps
            .front()
            .map_or(Duration::ZERO, |oldest| {
                (*oldest + self.window_size).saturating_duration_since(now)
            });
        Err(wait)
    }

    fn current_count(&mut self, now: Instant) -> usize {
        self.prune(now);
        self.timestamps.len()
    }
}

/// Limits outgoing requests to `max_requests` per `window`.
#[derive(Debug)]
pub struct RateLimiter {
    window: Mutex<SlidingWindow>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(100, Duration::from_secs(60))
    }
}

impl RateLimiter {
    /// Creates a limiter. `max_requests` is clamped to at least one.
    #[must_use]
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            window: Mutex::new(SlidingWindow::new(max_requests.max(1), window)),
        }
    }

    /// Records a request if a slot is free.
    #[must_use]
    pub fn try_acquire(&self) -> bool {
        self.window.lock().try_request(Instant::now()).is_ok()
    }

    /// Waits for a free slot, then records the request.
    pub async fn acquire(&self) {
        loop {
            let outcome = self.window.lock().try_request(Instant::now());
            match outcome {
                Ok(()) => return,
                Err(wait) => {
                    debug!(wait_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX), "rate limit reached, waiting");
                    sleep(wait).await;
                }
            }
        }
    }

    /// Requests recorded in the current window.
    #[must_use]
    pub fn current_count(&self) -> usize {
        self.window.lock().current_count(Instant::now())
    }
}
