//! Shared endpoint polling.
//!
//! # Data Flow
//! ```text
//! Reconciler
//!     → EndpointPoller::associate(key, endpoint)
//!         → registry.rs acquire (refcount +1, stop token)
//!         → task.rs Association loop (own timer, own token)
//!             tick: store.get → probe.rs → RingHandle::append → update_status
//!     → EndpointPoller::dissociate / release_all
//!         → cancel association, registry.rs release (stop at zero)
//! ```
//!
//! # Design Decisions
//! - Associations are tracked per (declaration, endpoint) pair; repeated
//!   association of the same pair is a no-op
//! - Every association runs its own timer at its declaration's interval
//! - Lock order is associations, then the endpoint registry

pub mod probe;
pub mod registry;
mod task;

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::buffer::RingHandle;
use crate::resilience::Backoff;
use crate::resource::ObjectKey;
use crate::store::ObjectStore;

pub use probe::{HttpProber, ProbeError, Prober};
pub use registry::{EndpointRegistry, Lease};

use task::Association;

/// Manages (declaration, endpoint) associations on top of the shared
/// endpoint registry.
pub struct EndpointPoller {
    registry: EndpointRegistry,
    associations: Mutex<HashMap<ObjectKey, HashMap<String, CancellationToken>>>,
    store: Arc<dyn ObjectStore>,
    rings: RingHandle,
    status_retry: Backoff,
}

impl EndpointPoller {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        rings: RingHandle,
        prober: Arc<dyn Prober>,
        status_retry: Backoff,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            registry: EndpointRegistry::new(prober, shutdown),
            associations: Mutex::new(HashMap::new()),
            store,
            rings,
            status_retry,
        }
    }

    /// Start polling `endpoint` on behalf of `key`. Returns false when the
    /// pair was already associated.
    pub fn associate(&self, key: &ObjectKey, endpoint: &str, interval: Duration) -> bool {
        let mut associations = self.associations.lock().expect("associations mutex poisoned");
        let endpoints = associations.entry(key.clone()).or_default();
        if endpoints.contains_key(endpoint) {
            return false;
        }

        let lease = self.registry.acquire(endpoint);
        let cancel = lease.stop.child_token();
        endpoints.insert(endpoint.to_string(), cancel.clone());

        let association = Association {
            key: key.clone(),
            endpoint: endpoint.to_string(),
            interval,
            store: Arc::clone(&self.store),
            rings: self.rings.clone(),
            prober: lease.prober,
            status_retry: self.status_retry,
            cancel,
        };
        tokio::spawn(association.run());

        tracing::debug!(key = %key, endpoint = %endpoint, "Endpoint associated");
        true
    }

    /// Stop polling `endpoint` on behalf of `key`. Returns false when the pair
    /// was not associated.
    pub fn dissociate(&self, key: &ObjectKey, endpoint: &str) -> bool {
        let mut associations = self.associations.lock().expect("associations mutex poisoned");
        let Some(endpoints) = associations.get_mut(key) else {
            return false;
        };
        let Some(cancel) = endpoints.remove(endpoint) else {
            return false;
        };
        if endpoints.is_empty() {
            associations.remove(key);
        }

        cancel.cancel();
        self.registry.release(endpoint);
        tracing::debug!(key = %key, endpoint = %endpoint, "Endpoint dissociated");
        true
    }

    /// Release associations of `key` whose endpoint is not in `keep`.
    /// Returns how many were released.
    pub fn retain(&self, key: &ObjectKey, keep: &[String]) -> usize {
        let keep: HashSet<&str> = keep.iter().map(String::as_str).collect();
        let stale: Vec<String> = self
            .associated(key)
            .into_iter()
            .filter(|endpoint| !keep.contains(endpoint.as_str()))
            .collect();

        stale.iter().filter(|endpoint| self.dissociate(key, endpoint)).count()
    }

    /// Release every association recorded for `key`.
    pub fn release_all(&self, key: &ObjectKey) -> usize {
        let removed = {
            let mut associations = self.associations.lock().expect("associations mutex poisoned");
            associations.remove(key).unwrap_or_default()
        };

        for (endpoint, cancel) in &removed {
            cancel.cancel();
            self.registry.release(endpoint);
        }
        if !removed.is_empty() {
            tracing::debug!(key = %key, released = removed.len(), "Declaration associations released");
        }
        removed.len()
    }

    /// Endpoints currently associated with `key`, sorted.
    pub fn associated(&self, key: &ObjectKey) -> Vec<String> {
        let associations = self.associations.lock().expect("associations mutex poisoned");
        let mut endpoints: Vec<String> = associations
            .get(key)
            .map(|endpoints| endpoints.keys().cloned().collect())
            .unwrap_or_default();
        endpoints.sort();
        endpoints
    }

    pub fn registry(&self) -> &EndpointRegistry {
        &self.registry
    }
}
