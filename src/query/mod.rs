//! Anomaly query surface.
//!
//! # Data Flow
//! ```text
//! GET /compute_health?key=ns/name&ts_a=..&ts_b=..
//!     → request_id.rs (x-request-id) → TraceLayer → TimeoutLayer
//!     → rate_limit.rs (global token bucket, 429)
//!     → server.rs (parse params, 400 │ fetch with retry, 500)
//!     → score.rs (ts_a < t ≤ ts_b, fraction healthy)
//!     → 200 {health_score, unhealthy_records, healthy_records}
//! ```

pub mod rate_limit;
pub mod request_id;
pub mod score;
pub mod server;

pub use score::{evaluate_health, select_window, HealthSummary};
pub use server::{QueryServer, StatusResponse};
