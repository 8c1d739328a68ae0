//! Exponential backoff with jitter.

use rand::Rng;
use std::time::Duration;

/// Calculate exponential backoff delay with jitter.
///
/// `attempt` is 1-based; attempt 0 yields no delay.
pub fn calculate_backoff(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    if attempt == 0 {
        return Duration::from_millis(0);
    }

    let exponential_base = 2u64.saturating_pow(attempt - 1);
    let delay_ms = base_ms.saturating_mul(exponential_base);
    let capped_delay = delay_ms.min(max_ms);

    // Apply jitter (0 to 10% of the delay)
    let jitter_range = capped_delay / 10;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };

    Duration::from_millis(capped_delay + jitter)
}

/// A stepped backoff schedule: `duration * factor^n`, each step jittered by up
/// to `jitter * delay`, optionally capped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    /// Initial delay.
    pub duration: Duration,
    /// Multiplier applied after every step.
    pub factor: f64,
    /// Random extra delay as a fraction of the current delay.
    pub jitter: f64,
    /// Number of attempts allowed, including the first.
    pub steps: u32,
    /// Upper bound for a single delay.
    pub cap: Option<Duration>,
}

impl Backoff {
    /// Schedule used for optimistic-concurrency retries on status writes.
    pub const fn conflict_retry() -> Self {
        Self {
            duration: Duration::from_millis(10),
            factor: 1.0,
            jitter: 0.1,
            steps: 5,
            cap: None,
        }
    }

    /// Schedule used when the query server fetches a declaration.
    pub const fn fetch_retry() -> Self {
        Self {
            duration: Duration::from_millis(100),
            factor: 3.0,
            jitter: 1.0,
            steps: 5,
            cap: None,
        }
    }

    /// Delay to wait after the given 1-based failed attempt.
    /// Saturates at `Duration::MAX` instead of overflowing.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let mut delay = scale(self.duration, self.factor.max(1.0).powi(exponent));
        if let Some(cap) = self.cap {
            delay = delay.min(cap);
        }
        if self.jitter > 0.0 {
            let extra = rand::thread_rng().gen_range(0.0..=self.jitter);
            delay = delay.saturating_add(scale(delay, extra));
        }
        delay
    }
}

fn scale(duration: Duration, by: f64) -> Duration {
    Duration::try_from_secs_f64(duration.as_secs_f64() * by).unwrap_or(Duration::MAX)
}
