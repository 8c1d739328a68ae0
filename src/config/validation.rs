//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (workers > 0, rates > 0, parseable addresses)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: DetectorConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::{DetectorConfig, RetryConfig};

/// Upper bound on configured retry attempts.
pub const MAX_RETRY_ATTEMPTS: u32 = 20;
/// Upper bound on the per-attempt delay multiplier.
pub const MAX_RETRY_FACTOR: f64 = 10.0;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Check every semantic constraint on `config`.
pub fn validate_config(config: &DetectorConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }
    if config.listener.request_timeout_secs == 0 {
        errors.push(ValidationError::new("listener.request_timeout_secs", "must be > 0"));
    }
    if config.controller.workers == 0 {
        errors.push(ValidationError::new("controller.workers", "must be > 0"));
    }
    if let Some(ns) = &config.controller.namespace {
        if ns.is_empty() || ns.contains('/') {
            errors.push(ValidationError::new("controller.namespace", format!("invalid namespace '{ns}'")));
        }
    }
    if config.queue.qps <= 0.0 {
        errors.push(ValidationError::new("queue.qps", "must be > 0"));
    }
    if config.queue.burst == 0 {
        errors.push(ValidationError::new("queue.burst", "must be > 0"));
    }
    if config.queue.base_delay_ms == 0 {
        errors.push(ValidationError::new("queue.base_delay_ms", "must be > 0"));
    }
    if config.probe.timeout_secs == 0 {
        errors.push(ValidationError::new("probe.timeout_secs", "must be > 0"));
    }
    validate_retry(
        &config.status_retry,
        ["status_retry.max_attempts", "status_retry.factor", "status_retry.jitter"],
        &mut errors,
    );
    if config.query.requests_per_second == 0 {
        errors.push(ValidationError::new("query.requests_per_second", "must be > 0"));
    }
    if config.query.burst_size == 0 {
        errors.push(ValidationError::new("query.burst_size", "must be > 0"));
    }
    validate_retry(
        &config.query.fetch_retry,
        [
            "query.fetch_retry.max_attempts",
            "query.fetch_retry.factor",
            "query.fetch_retry.jitter",
        ],
        &mut errors,
    );
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", config.observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// `fields` names the attempts, factor and jitter fields, in that order.
fn validate_retry(retry: &RetryConfig, fields: [&'static str; 3], errors: &mut Vec<ValidationError>) {
    let [attempts, factor, jitter] = fields;
    if !(1..=MAX_RETRY_ATTEMPTS).contains(&retry.max_attempts) {
        errors.push(ValidationError::new(attempts, format!("must be in [1, {MAX_RETRY_ATTEMPTS}]")));
    }
    if !(1.0..=MAX_RETRY_FACTOR).contains(&retry.factor) {
        errors.push(ValidationError::new(factor, format!("must be in [1, {MAX_RETRY_FACTOR}]")));
    }
    if !(0.0..=1.0).contains(&retry.jitter) {
        errors.push(ValidationError::new(jitter, "must be in [0, 1]"));
    }
}
