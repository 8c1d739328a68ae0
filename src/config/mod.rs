//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! detector.toml (optional)
//!     → loader.rs (parse & deserialize, NAMESPACE override)
//!     → validation.rs (semantic checks)
//!     → DetectorConfig (validated, immutable)
//!     → shared via Arc to all subsystems
//!
//! Declaration manifest (optional):
//!     watcher.rs detects change
//!     → store::manifest reloads & validates entries
//!     → MemoryStore apply/delete
//!     → controller observes the watch events
//! ```
//!
//! # Design Decisions
//! - Detector config is immutable once loaded; declarations are the dynamic part
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, ConfigError};
pub use schema::{
    ControllerConfig, DetectorConfig, ListenerConfig, LogFormat, ObservabilityConfig, ProbeConfig,
    QueryConfig, QueueConfig, RetryConfig,
};
pub use validation::{validate_config, ValidationError};
pub use watcher::ManifestWatcher;
