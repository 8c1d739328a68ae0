//! Declaration schema definitions.
//!
//! Mirrors the persisted shape of a monitored-target declaration. Field names
//! serialize in camelCase so manifests and stored objects share one schema.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error returned when a `namespace/name` key cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    #[error("invalid key '{0}': expected 'namespace/name'")]
    Malformed(String),
}

/// Namespaced identity of a declaration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Parse a `namespace/name` key. Both halves must be non-empty.
    pub fn parse(raw: &str) -> Result<Self, KeyError> {
        let mut parts = raw.split('/');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(ns), Some(name), None) if !ns.is_empty() && !name.is_empty() => {
                Ok(Self::new(ns, name))
            }
            _ => Err(KeyError::Malformed(raw.to_string())),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

impl FromStr for ObjectKey {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// A single probe outcome.
///
/// Both fields unset marks an empty ring slot. An empty slot is never the same
/// thing as a record with `healthy = false`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthRecord {
    /// When the outcome was observed.
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,

    /// Whether the endpoint answered with HTTP 200.
    #[serde(default)]
    pub healthy: Option<bool>,
}

impl HealthRecord {
    pub fn new(timestamp: DateTime<Utc>, healthy: bool) -> Self {
        Self {
            timestamp: Some(timestamp),
            healthy: Some(healthy),
        }
    }

    /// An empty slot.
    pub fn unset() -> Self {
        Self::default()
    }

    /// True when both the timestamp and the outcome are present.
    pub fn is_set(&self) -> bool {
        self.timestamp.is_some() && self.healthy.is_some()
    }
}

/// Object metadata maintained by the store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    pub namespace: String,
    pub name: String,

    /// Version token. Changes on every write; must match on status updates.
    #[serde(default)]
    pub resource_version: u64,

    /// Bumped only when the spec changes.
    #[serde(default)]
    pub generation: u64,
}

/// Desired state of a declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeclarationSpec {
    /// Capacity of the rolling history.
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,

    /// Endpoints to probe.
    pub healthcheck_endpoints: Vec<String>,

    /// Seconds between probes of each endpoint.
    #[serde(default = "default_query_interval")]
    pub query_interval: u64,
}

pub const DEFAULT_BUFFER_SIZE: usize = 10;
pub const DEFAULT_QUERY_INTERVAL_SECS: u64 = 60;

fn default_buffer_size() -> usize {
    DEFAULT_BUFFER_SIZE
}

fn default_query_interval() -> u64 {
    DEFAULT_QUERY_INTERVAL_SECS
}

impl DeclarationSpec {
    pub fn new(endpoints: Vec<String>) -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            healthcheck_endpoints: endpoints,
            query_interval: DEFAULT_QUERY_INTERVAL_SECS,
        }
    }
}

/// Observed state written back by the controller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DeclarationStatus {
    /// Capacity of the in-memory buffer backing this declaration.
    pub current_buffer_size: usize,

    pub last_buffer_modification_time: Option<DateTime<Utc>>,

    /// Buffered records, oldest first.
    pub last_buffer: Vec<HealthRecord>,

    /// Last known health of each endpoint.
    pub healthcheck_endpoints_healthy: BTreeMap<String, bool>,

    pub last_healthcheck_query_time: Option<DateTime<Utc>>,
}

/// A monitored-target declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Declaration {
    pub metadata: ObjectMeta,
    pub spec: DeclarationSpec,
    #[serde(default)]
    pub status: DeclarationStatus,
}

impl Declaration {
    pub fn new(key: &ObjectKey, spec: DeclarationSpec) -> Self {
        Self {
            metadata: ObjectMeta {
                namespace: key.namespace.clone(),
                name: key.name.clone(),
                resource_version: 0,
                generation: 0,
            },
            spec,
            status: DeclarationStatus::default(),
        }
    }

    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(&self.metadata.namespace, &self.metadata.name)
    }
}
