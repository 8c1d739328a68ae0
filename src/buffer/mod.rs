//! Rolling health history.
//!
//! # Data Flow
//! ```text
//! Reconciler (ensure / remove)      Poller tasks (append)
//!            \                         /
//!             → registry.rs (single-writer actor, mpsc + oneshot)
//!                 → ring.rs (per-declaration RingBuffer)
//!                 ← RingSnapshot (capacity + records oldest→newest)
//!     → persist.rs (snapshot → declaration status, conflict retry)
//! ```

pub mod persist;
pub mod registry;
pub mod ring;

pub use persist::persist_status;
pub use registry::{RingHandle, RingRegistry, RingSnapshot};
pub use ring::{RingBuffer, RingError};
