//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Status write / declaration fetch:
//!     → retries.rs (re-run while the error is retryable)
//!     → backoff.rs (delay schedule with jitter)
//!
//! Failed reconcile:
//!     → controller rate limiter
//!         → backoff.rs (per-item exponential delay)
//!         → token_bucket.rs (global ceiling)
//! ```
//!
//! # Design Decisions
//! - Every retry loop is bounded except work-queue requeues, which are
//!   throttled instead
//! - Jittered backoff prevents thundering herd

pub mod backoff;
pub mod retries;
pub mod token_bucket;

pub use backoff::{calculate_backoff, Backoff};
pub use retries::{retry_on_conflict, retry_on_error};
pub use token_bucket::TokenBucket;
