//! Per-association polling loop.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::buffer::{persist_status, RingError, RingHandle};
use crate::observability::metrics;
use crate::poller::probe::Prober;
use crate::resilience::Backoff;
use crate::resource::{HealthRecord, ObjectKey};
use crate::store::{ObjectStore, StoreError};

/// One (declaration, endpoint) pairing with its own timer.
pub(crate) struct Association {
    pub key: ObjectKey,
    pub endpoint: String,
    pub interval: Duration,
    pub store: Arc<dyn ObjectStore>,
    pub rings: RingHandle,
    pub prober: Arc<dyn Prober>,
    pub status_retry: Backoff,
    /// Child of the endpoint's stop token.
    pub cancel: CancellationToken,
}

enum Tick {
    /// Sleep for the declaration's current interval, then poll again.
    Continue(Duration),
    Stop,
}

impl Association {
    pub async fn run(self) {
        tracing::debug!(key = %self.key, endpoint = %self.endpoint, "Association started");
        let mut interval = self.interval;

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }

            let cancel = self.cancel.clone();
            let outcome = tokio::select! {
                _ = cancel.cancelled() => Tick::Stop,
                outcome = self.tick(interval) => outcome,
            };
            match outcome {
                Tick::Continue(next) => interval = next,
                Tick::Stop => break,
            }
        }

        tracing::debug!(key = %self.key, endpoint = %self.endpoint, "Association stopped");
    }

    async fn tick(&self, interval: Duration) -> Tick {
        let declaration = match self.store.get(&self.key).await {
            Ok(declaration) => declaration,
            Err(StoreError::NotFound(_)) => return Tick::Stop,
            Err(e) => {
                tracing::warn!(key = %self.key, error = %e, "Failed to read declaration, skipping probe");
                return Tick::Continue(interval);
            }
        };
        let next = Duration::from_secs(declaration.spec.query_interval.max(1));

        let healthy = self.prober.probe(&self.endpoint).await;
        metrics::record_probe(healthy);
        let record = HealthRecord::new(Utc::now(), healthy);

        match self.rings.append(&self.key, record).await {
            Ok(Some(_)) => {}
            // Buffer discarded: the declaration is being deleted.
            Ok(None) | Err(RingError::Closed) => return Tick::Stop,
            Err(e) => {
                tracing::warn!(key = %self.key, error = %e, "Failed to record probe outcome");
                return Tick::Continue(next);
            }
        }

        let endpoint = &self.endpoint;
        let persisted = persist_status(self.store.as_ref(), &self.rings, &self.key, self.status_retry, |status| {
            status.healthcheck_endpoints_healthy.insert(endpoint.clone(), healthy);
            status.last_healthcheck_query_time = record.timestamp;
            status.last_buffer_modification_time = record.timestamp;
        })
        .await;

        match persisted {
            Ok(_) => Tick::Continue(next),
            Err(StoreError::NotFound(_)) => Tick::Stop,
            Err(e) => {
                tracing::warn!(
                    key = %self.key,
                    endpoint = %self.endpoint,
                    error = %e,
                    "Failed to persist probe outcome"
                );
                Tick::Continue(next)
            }
        }
    }
}
