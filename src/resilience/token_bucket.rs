//! Token bucket shared by the query limiter and the work queue's global
//! requeue ceiling.

use std::time::{Duration, Instant};

/// A simple token bucket rate limiter.
#[derive(Debug)]
pub struct TokenBucket {
    tokens: f64,
    capacity: f64,
    refill_rate: f64,
    last_update: Instant,
}

impl TokenBucket {
    /// A full bucket holding `capacity` tokens, refilled at `refill_rate` per second.
    pub fn new(capacity: f64, refill_rate: f64) -> Self {
        Self {
            tokens: capacity,
            capacity,
            refill_rate,
            last_update: Instant::now(),
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_update).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.capacity);
        self.last_update = now;
    }

    /// Take one token if available.
    pub fn try_acquire(&mut self) -> bool {
        self.refill();

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Reserve one token and return how long the caller must wait before
    /// using it. The balance may go negative; later reservations queue up
    /// behind earlier ones.
    pub fn reserve(&mut self) -> Duration {
        self.refill();
        self.tokens -= 1.0;

        if self.tokens >= 0.0 || self.refill_rate <= 0.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(-self.tokens / self.refill_rate)
        }
    }
}
