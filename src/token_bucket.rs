use crate::quota::QuotaSpec;
use std::time::Duration;
use tokio::time::Instant;

/// Token bucket state for a single action.
///
/// The bucket never reads the clock itself; callers pass `now` so the gate
/// decides when time is observed and tests can drive it directly.
#[derive(Debug, Clone)]
pub struct TokenBucket {
    capacity: u32,
    tokens: f64,
    restore_period: Duration,
    last_refill: Instant,
}

impl TokenBucket {
    /// A full bucket, as after an idle period.
    pub fn new(quota: &QuotaSpec, now: Instant) -> Self {
        Self {
            capacity: quota.burst_capacity(),
            tokens: quota.burst_capacity() as f64,
            restore_period: quota.restore_period(),
            last_refill: now,
        }
    }

    /// Take one token, or report how long until one is available.
    pub fn try_consume(&mut self, now: Instant) -> Result<(), Duration> {
        self.refill(now);

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Ok(())
        } else {
            let deficit = 1.0 - self.tokens;
            Err(self.restore_period.mul_f64(deficit))
        }
    }

    /// Record an admission granted after waiting until `deadline`.
    ///
    /// The token regenerated during the wait is handed to the waiter, so the
    /// bucket is empty as of the deadline.
    pub fn settle(&mut self, deadline: Instant) {
        self.tokens = 0.0;
        self.last_refill = deadline;
    }

    pub fn available_tokens(&mut self, now: Instant) -> f64 {
        self.refill(now);
        self.tokens
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn restore_period(&self) -> Duration {
        self.restore_period
    }

    pub fn last_refill(&self) -> Instant {
        self.last_refill
    }

    fn refill(&mut self, now: Instant) {
        // last_refill can sit slightly ahead of `now` right after a settle
        if now <= self.last_refill {
            return;
        }

        let elapsed = now.duration_since(self.last_refill);
        let tokens_to_add = elapsed.as_secs_f64() / self.restore_period.as_secs_f64();

        self.tokens = (self.tokens + tokens_to_add).min(self.capacity as f64);
        self.last_refill = now;
    }
}
