//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the detector.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::resilience::Backoff;

/// Root configuration for the anomaly detector.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct DetectorConfig {
    /// Query server listener.
    pub listener: ListenerConfig,

    /// Reconciliation loop settings.
    pub controller: ControllerConfig,

    /// Work queue requeue throttling.
    pub queue: QueueConfig,

    /// Probe client settings.
    pub probe: ProbeConfig,

    /// Optimistic-concurrency retry for status writes.
    pub status_retry: RetryConfig,

    /// Query server limits.
    pub query: QueryConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Total time allowed per request in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// Controller configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Namespace to watch. `None` watches every namespace.
    /// Overridden by the `NAMESPACE` environment variable.
    pub namespace: Option<String>,

    /// Number of workers draining the work queue.
    pub workers: usize,

    /// Declaration manifest to load into the store and watch for changes.
    pub manifest_path: Option<String>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            namespace: None,
            workers: 2,
            manifest_path: None,
        }
    }
}

/// Requeue throttling for failed reconciliations.
///
/// The delay for a failed item is the larger of its own exponential backoff
/// and the wait imposed by a global token bucket.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct QueueConfig {
    /// First per-item backoff delay in milliseconds.
    pub base_delay_ms: u64,

    /// Per-item backoff ceiling in seconds.
    pub max_delay_secs: u64,

    /// Global requeue rate (tokens per second).
    pub qps: f64,

    /// Global burst capacity.
    pub burst: u32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 5,
            max_delay_secs: 1000,
            qps: 50.0,
            burst: 300,
        }
    }
}

/// Probe client configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// File holding a bearer token sent with every probe.
    /// In-cluster: `/var/run/secrets/kubernetes.io/serviceaccount/token`.
    pub token_path: Option<String>,

    /// PEM bundle of additional trusted CAs.
    /// In-cluster: `/var/run/secrets/kubernetes.io/serviceaccount/ca.crt`.
    pub ca_cert_path: Option<String>,

    /// Probe timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            token_path: None,
            ca_cert_path: None,
            timeout_secs: 10,
        }
    }
}

impl ProbeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Bounded retry schedule.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts including the first one.
    pub max_attempts: u32,

    /// Delay after the first failure in milliseconds.
    pub base_delay_ms: u64,

    /// Multiplier applied to the delay after each failure.
    pub factor: f64,

    /// Random extra delay as a fraction of the current delay.
    pub jitter: f64,
}

impl RetryConfig {
    pub fn backoff(&self) -> Backoff {
        Backoff {
            duration: Duration::from_millis(self.base_delay_ms),
            factor: self.factor,
            jitter: self.jitter,
            steps: self.max_attempts,
            cap: None,
        }
    }
}

impl From<Backoff> for RetryConfig {
    fn from(backoff: Backoff) -> Self {
        Self {
            max_attempts: backoff.steps,
            base_delay_ms: backoff.duration.as_millis() as u64,
            factor: backoff.factor,
            jitter: backoff.jitter,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Backoff::conflict_retry().into()
    }
}

/// Query server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Sustained request rate across all clients.
    pub requests_per_second: u32,

    /// Burst capacity.
    pub burst_size: u32,

    /// Retry schedule for declaration lookups.
    pub fetch_retry: RetryConfig,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 1,
            burst_size: 5,
            fetch_retry: Backoff::fetch_retry().into(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
