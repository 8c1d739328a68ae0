//! Requeue throttling for failed work items.
//!
//! The delay for an item is the larger of its per-item exponential backoff
//! and the wait imposed by a global token bucket, so one hot key cannot
//! starve the others and a mass failure cannot flood the workers.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use crate::config::QueueConfig;
use crate::controller::WorkItem;
use crate::resilience::{calculate_backoff, TokenBucket};

pub struct RequeueLimiter {
    failures: Mutex<HashMap<WorkItem, u32>>,
    bucket: Mutex<TokenBucket>,
    base_delay_ms: u64,
    max_delay_ms: u64,
}

impl RequeueLimiter {
    pub fn new(config: &QueueConfig) -> Self {
        Self {
            failures: Mutex::new(HashMap::new()),
            bucket: Mutex::new(TokenBucket::new(config.burst as f64, config.qps)),
            base_delay_ms: config.base_delay_ms,
            max_delay_ms: config.max_delay_secs.saturating_mul(1000),
        }
    }

    /// Record another failure of `item` and return how long to wait before
    /// redelivering it.
    pub fn when(&self, item: &WorkItem) -> Duration {
        let attempt = {
            let mut failures = self.failures.lock().expect("requeue limiter mutex poisoned");
            let count = failures.entry(item.clone()).or_insert(0);
            *count += 1;
            *count
        };
        let per_item = calculate_backoff(attempt, self.base_delay_ms, self.max_delay_ms);
        let global = self.bucket.lock().expect("requeue limiter mutex poisoned").reserve();
        per_item.max(global)
    }

    /// Clear the failure history of `item`.
    pub fn forget(&self, item: &WorkItem) {
        self.failures.lock().expect("requeue limiter mutex poisoned").remove(item);
    }

    /// Number of failures recorded for `item` since it was last forgotten.
    pub fn num_requeues(&self, item: &WorkItem) -> u32 {
        let failures = self.failures.lock().expect("requeue limiter mutex poisoned");
        failures.get(item).copied().unwrap_or(0)
    }
}
