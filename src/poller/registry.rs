//! Reference-counted endpoint registry.
//!
//! One [`EndpointState`] exists per distinct endpoint URL for as long as at
//! least one declaration lists it. `acquire` and `release` are atomic under a
//! single mutex and report the start/stop transitions.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::observability::metrics;
use crate::poller::probe::Prober;

struct EndpointState {
    prober: Arc<dyn Prober>,
    stop: CancellationToken,
    reference_count: usize,
}

/// What an association needs to poll an endpoint.
#[derive(Clone)]
pub struct Lease {
    /// True when this acquire created the endpoint state.
    pub started: bool,
    pub prober: Arc<dyn Prober>,
    /// Cancelled once, when the last reference is released.
    pub stop: CancellationToken,
}

impl std::fmt::Debug for Lease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lease")
            .field("started", &self.started)
            .field("stopped", &self.stop.is_cancelled())
            .finish()
    }
}

/// Shared registry of polled endpoints.
pub struct EndpointRegistry {
    endpoints: Mutex<HashMap<String, EndpointState>>,
    prober: Arc<dyn Prober>,
    shutdown: CancellationToken,
}

impl EndpointRegistry {
    /// `prober` is installed into every new endpoint state. Endpoint stop
    /// tokens are children of `shutdown`.
    pub fn new(prober: Arc<dyn Prober>, shutdown: CancellationToken) -> Self {
        Self {
            endpoints: Mutex::new(HashMap::new()),
            prober,
            shutdown,
        }
    }

    /// Take a reference on `endpoint`, creating its state on first use.
    pub fn acquire(&self, endpoint: &str) -> Lease {
        let mut endpoints = self.endpoints.lock().expect("endpoint registry mutex poisoned");
        let started = !endpoints.contains_key(endpoint);
        let state = endpoints.entry(endpoint.to_string()).or_insert_with(|| EndpointState {
            prober: Arc::clone(&self.prober),
            stop: self.shutdown.child_token(),
            reference_count: 0,
        });
        state.reference_count += 1;

        let lease = Lease {
            started,
            prober: Arc::clone(&state.prober),
            stop: state.stop.clone(),
        };
        if started {
            tracing::info!(endpoint = %endpoint, "Endpoint registered");
        }
        metrics::set_tracked_endpoints(endpoints.len());
        lease
    }

    /// Drop a reference on `endpoint`. Returns true when this was the last
    /// reference; the endpoint's stop token has then been cancelled and the
    /// state removed. Releasing an unknown endpoint is a no-op.
    pub fn release(&self, endpoint: &str) -> bool {
        let mut endpoints = self.endpoints.lock().expect("endpoint registry mutex poisoned");
        let Some(state) = endpoints.get_mut(endpoint) else {
            return false;
        };

        state.reference_count = state.reference_count.saturating_sub(1);
        if state.reference_count > 0 {
            return false;
        }

        if let Some(state) = endpoints.remove(endpoint) {
            state.stop.cancel();
        }
        tracing::info!(endpoint = %endpoint, "Endpoint unregistered, polling stopped");
        metrics::set_tracked_endpoints(endpoints.len());
        true
    }

    /// Current reference count, or `None` if the endpoint is not registered.
    pub fn reference_count(&self, endpoint: &str) -> Option<usize> {
        let endpoints = self.endpoints.lock().expect("endpoint registry mutex poisoned");
        endpoints.get(endpoint).map(|state| state.reference_count)
    }

    pub fn len(&self) -> usize {
        self.endpoints.lock().expect("endpoint registry mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
