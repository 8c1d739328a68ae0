//! Range checks for declaration specs.
//!
//! The schema owner validates declarations before they reach the store; these
//! checks only guard the controller against values it cannot act on.

use thiserror::Error;
use url::Url;

use crate::resource::types::DeclarationSpec;

pub const MIN_BUFFER_SIZE: usize = 1;
pub const MAX_BUFFER_SIZE: usize = 255;
pub const MIN_QUERY_INTERVAL_SECS: u64 = 1;
pub const MAX_QUERY_INTERVAL_SECS: u64 = 300;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpecError {
    #[error("bufferSize {0} outside [1, 255]")]
    BufferSize(usize),
    #[error("queryInterval {0}s outside [1, 300]")]
    QueryInterval(u64),
    #[error("healthcheckEndpoints must not be empty")]
    NoEndpoints,
    #[error("invalid endpoint '{endpoint}': {reason}")]
    Endpoint { endpoint: String, reason: String },
}

/// Validate a spec, returning every violation found.
pub fn validate_spec(spec: &DeclarationSpec) -> Result<(), Vec<SpecError>> {
    let mut errors = Vec::new();

    if !(MIN_BUFFER_SIZE..=MAX_BUFFER_SIZE).contains(&spec.buffer_size) {
        errors.push(SpecError::BufferSize(spec.buffer_size));
    }
    if !(MIN_QUERY_INTERVAL_SECS..=MAX_QUERY_INTERVAL_SECS).contains(&spec.query_interval) {
        errors.push(SpecError::QueryInterval(spec.query_interval));
    }
    if spec.healthcheck_endpoints.is_empty() {
        errors.push(SpecError::NoEndpoints);
    }
    for endpoint in &spec.healthcheck_endpoints {
        match Url::parse(endpoint) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            Ok(url) => errors.push(SpecError::Endpoint {
                endpoint: endpoint.clone(),
                reason: format!("unsupported scheme '{}'", url.scheme()),
            }),
            Err(e) => errors.push(SpecError::Endpoint {
                endpoint: endpoint.clone(),
                reason: e.to_string(),
            }),
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
