//! Sliding-window rate limiting for outbound API calls
//!
//! Keeps a log of dispatch instants and admits a caller only when fewer than
//! `max_requests` dispatches fall inside the trailing window. Callers that
//! would exceed the budget wait; nobody is rejected.

use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};
use tracing::debug;

/// Process-wide request budget shared by every job through an `Arc`
///
/// Waiters queue on a fair mutex, so slots are handed out in arrival order
/// and no job can starve another.
#[derive(Debug)]
pub struct SlidingWindowLimiter {
    max_requests: usize,
    window: Duration,
    dispatched: Mutex<VecDeque<Instant>>,
}

impl SlidingWindowLimiter {
    /// `max_requests` below 1 is treated as 1
    pub fn new(max_requests: usize, window: Duration) -> Self {
        let max_requests = max_requests.max(1);
        Self {
            max_requests,
            window,
            dispatched: Mutex::new(VecDeque::with_capacity(max_requests)),
        }
    }

    pub fn max_requests(&self) -> usize {
        self.max_requests
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Wait until a slot is free and claim it
    ///
    /// The lock is held while sleeping so later callers stay queued behind
    /// the current one.
    pub async fn acquire(&self) {
        let mut log = self.dispatched.lock().await;

        loop {
            let now = Instant::now();
            self.evict_expired(&mut log, now);

            if log.len() < self.max_requests {
                log.push_back(now);
                return;
            }

            if let Some(&oldest) = log.front() {
                let ready_at = oldest + self.window;
                debug!(
                    wait_ms = ready_at.saturating_duration_since(now).as_millis() as u64,
                    in_window = log.len(),
                    "Rate limit reached, waiting for a slot"
                );
                sleep_until(ready_at).await;
            }
        }
    }

    /// Claim a slot only if one is free right now
    pub fn try_acquire(&self) -> bool {
        let Ok(mut log) = self.dispatched.try_lock() else {
            return false;
        };

        let now = Instant::now();
        self.evict_expired(&mut log, now);
        if log.len() < self.max_requests {
            log.push_back(now);
            true
        } else {
            false
        }
    }

    /// Dispatches counted against the current window
    pub async fn in_window(&self) -> usize {
        let mut log = self.dispatched.lock().await;
        self.evict_expired(&mut log, Instant::now());
        log.len()
    }

    fn evict_expired(&self, log: &mut VecDeque<Instant>, now: Instant) {
        while let Some(&front) = log.front() {
            if now.duration_since(front) >= self.window {
                log.pop_front();
            } else {
                break;
            }
        }
    }
}
