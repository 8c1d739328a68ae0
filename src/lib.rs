//! Health-probe anomaly detector library.

pub mod buffer;
pub mod config;
pub mod controller;
pub mod lifecycle;
pub mod observability;
pub mod poller;
pub mod query;
pub mod resilience;
pub mod resource;
pub mod store;

pub use config::schema::DetectorConfig;
pub use controller::Controller;
pub use lifecycle::Shutdown;
pub use query::QueryServer;
