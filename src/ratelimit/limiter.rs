//! Rate limiting implementation
//!
//! Token bucket guarding dispatches to the exchange. The bucket starts full,
//! holds at most `capacity` tokens and refills continuously at `capacity`
//! tokens per second. Fractional tokens carry over between calls, so a
//! drained bucket recovers smoothly instead of resetting on second boundaries.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::error::{OmsError, OmsResult};

/// Token bucket rate limiter
///
/// Not synchronized; it lives inside the order ledger's critical section.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    tokens: f64,
    capacity: u32,
    last_refill: Instant,
}

impl RateLimiter {
    /// Create a full bucket allowing `orders_per_second` dispatches per second
    pub fn new(orders_per_second: u32) -> Self {
        Self::new_at(orders_per_second, Instant::now())
    }

    /// Create a full bucket whose refill clock starts at `now`
    pub fn new_at(orders_per_second: u32, now: Instant) -> Self {
        Self {
            tokens: orders_per_second as f64,
            capacity: orders_per_second,
            last_refill: now,
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        let capacity = self.capacity as f64;
        self.tokens = (self.tokens + elapsed * capacity).min(capacity);
        // a `now` older than the last refill must not rewind the clock
        if now > self.last_refill {
            self.last_refill = now;
        }
    }

    /// Take `n` tokens if available, without waiting
    pub fn try_consume(&mut self, n: u32) -> bool {
        self.try_consume_at(n, Instant::now())
    }

    /// Take `n` tokens if available at `now`
    pub fn try_consume_at(&mut self, n: u32, now: Instant) -> bool {
        self.refill(now);

        let wanted = n as f64;
        if self.tokens >= wanted {
            self.tokens -= wanted;
            true
        } else {
            false
        }
    }

    /// Take one token or report starvation
    pub fn try_acquire(&mut self) -> OmsResult<()> {
        if self.try_consume(1) {
            Ok(())
        } else {
            Err(OmsError::RateLimiterStarved {
                capacity: self.capacity,
            })
        }
    }

    /// Return tokens taken for work that did not happen
    pub fn refund(&mut self, n: u32) {
        self.tokens = (self.tokens + n as f64).min(self.capacity as f64);
    }

    /// Tokens available right now
    pub fn available(&mut self) -> f64 {
        self.available_at(Instant::now())
    }

    /// Tokens available at `now`
    pub fn available_at(&mut self, now: Instant) -> f64 {
        self.refill(now);
        self.tokens
    }

    /// Time until one token is available, zero if one already is
    pub fn time_until_ready(&mut self) -> Duration {
        self.refill(Instant::now());
        if self.tokens >= 1.0 || self.capacity == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64((1.0 - self.tokens) / self.capacity as f64)
    }

    /// Get orders per second limit
    pub fn capacity(&self) -> u32 {
        self.capacity
    }
}

/// Rate limiter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimiterConfig {
    /// Orders dispatched per second; also the burst size
    #[serde(default = "default_orders_per_second")]
    pub orders_per_second: u32,
}

impl RateLimiterConfig {
    /// Create a new rate limiter configuration
    pub fn new(orders_per_second: u32) -> Self {
        Self { orders_per_second }
    }

    /// Build a rate limiter with this configuration
    pub fn build(&self) -> RateLimiter {
        RateLimiter::new(self.orders_per_second)
    }
}

fn default_orders_per_second() -> u32 {
    5
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            orders_per_second: default_orders_per_second(),
        }
    }
}
