//! Request pacing for file fetches
//!
//! Datacenters throttle aggressive downloaders with FLOOD_WAIT errors. The
//! limiter caps in-flight `getFile` calls and spaces them out; the backoff
//! drives the optional fetch retry.

use crate::error::{Error, Result};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::{sleep, Instant};

/// Longest gap pacing will put between two requests
pub const MAX_REQUEST_GAP: Duration = Duration::from_secs(3600);

/// Concurrency cap plus a minimum gap between requests
pub struct RateLimiter {
    concurrency: Semaphore,
    /// Zero disables spacing
    min_delay: Duration,
    last_op: parking_lot::Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// Create a new rate limiter
    ///
    /// # Arguments
    /// * `max_concurrent` - Maximum requests in flight
    /// * `requests_per_second` - Target rate (0 = unpaced)
    pub fn new(max_concurrent: usize, requests_per_second: f64) -> Self {
        let min_delay = if requests_per_second > 0.0 {
            Duration::try_from_secs_f64(1.0 / requests_per_second)
                .map_or(MAX_REQUEST_GAP, |gap| gap.min(MAX_REQUEST_GAP))
        } else {
            Duration::ZERO
        };

        RateLimiter {
            concurrency: Semaphore::new(max_concurrent.max(1)),
            min_delay,
            last_op: parking_lot::Mutex::new(None),
        }
    }

    /// Wait for a slot; the slot is released when the guard drops
    pub async fn acquire(&self) -> Result<RateLimitGuard<'_>> {
        let permit = self
            .concurrency
            .acquire()
            .await
            .map_err(|e| Error::Internal(format!("rate limiter closed: {}", e)))?;

        if !self.min_delay.is_zero() {
            let wait = {
                let mut last_op = self.last_op.lock();
                let now = Instant::now();
                // Reserve the next slot before sleeping so concurrent callers queue up
                let slot = match *last_op {
                    Some(prev) if prev + self.min_delay > now => prev + self.min_delay,
                    _ => now,
                };
                *last_op = Some(slot);
                slot.saturating_duration_since(now)
            };
            if !wait.is_zero() {
                sleep(wait).await;
            }
        }

        Ok(RateLimitGuard { _permit: permit })
    }

    /// Slots currently free
    pub fn available(&self) -> usize {
        self.concurrency.available_permits()
    }
}

/// Holds a limiter slot
pub struct RateLimitGuard<'a> {
    _permit: tokio::sync::SemaphorePermit<'a>,
}

/// Exponential backoff helper
pub struct ExponentialBackoff {
    base_delay: Duration,
    max_delay: Duration,
    max_attempts: u32,
    current_attempt: u32,
}

impl ExponentialBackoff {
    pub fn new(base_delay_ms: u64, max_attempts: u32) -> Self {
        ExponentialBackoff {
            base_delay: Duration::from_millis(base_delay_ms),
            max_delay: Duration::from_secs(60),
            max_attempts,
            current_attempt: 0,
        }
    }

    /// Next delay, or None once the attempts are used up
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.current_attempt >= self.max_attempts {
            return None;
        }

        let delay = self.base_delay * 2u32.saturating_pow(self.current_attempt);
        self.current_attempt += 1;

        Some(delay.min(self.max_delay))
    }

    /// Consume an attempt but wait `delay` instead (server-mandated waits)
    pub fn next_fixed(&mut self, delay: Duration) -> Option<Duration> {
        self.next_delay().map(|_| delay.min(self.max_delay))
    }

    pub fn attempts(&self) -> u32 {
        self.current_attempt
    }
}
