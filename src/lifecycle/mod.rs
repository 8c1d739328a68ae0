//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//!
//! Shutdown (shutdown.rs):
//!     token cancelled → informer, workers, pollers, ring actor and
//!     query server stop → drain tracked tasks → Exit
//! ```
//!
//! # Design Decisions
//! - One CancellationToken tree; subsystems take child tokens
//! - Shutdown has timeout: stragglers are aborted after the deadline

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
pub use signals::wait_for_signal;
