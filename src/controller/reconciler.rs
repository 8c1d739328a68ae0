//! Per-declaration reconciliation.
//!
//! # Responsibilities
//! - Added/Updated: size the ring buffer, converge endpoint associations on
//!   the spec, persist a refreshed status
//! - Deleted: discard the ring buffer and release every recorded association,
//!   unless the declaration exists again by the time the item is handled
//!
//! # Design Decisions
//! - The declaration is re-read from the store, not taken from the event
//! - A declaration that vanished before its Added/Updated pass is not an
//!   error; the Deleted event that follows does the cleanup
//! - Deletion releases the associations recorded by the poller, so it does
//!   not depend on the deleted object's spec

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::buffer::{persist_status, RingError, RingHandle};
use crate::controller::{EventKind, WorkItem};
use crate::poller::EndpointPoller;
use crate::resilience::Backoff;
use crate::resource::{validate_spec, ObjectKey};
use crate::store::{ObjectStore, StoreError};

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("ring buffer: {0}")]
    Ring(#[from] RingError),

    #[error("invalid spec for {key}: {}", reasons.join("; "))]
    InvalidSpec { key: ObjectKey, reasons: Vec<String> },
}

impl ReconcileError {
    /// Invalid specs stay invalid until the declaration changes, which
    /// produces a new event anyway.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ReconcileError::InvalidSpec { .. })
    }
}

pub struct Reconciler {
    store: Arc<dyn ObjectStore>,
    rings: RingHandle,
    poller: Arc<EndpointPoller>,
    status_retry: Backoff,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        rings: RingHandle,
        poller: Arc<EndpointPoller>,
        status_retry: Backoff,
    ) -> Self {
        Self {
            store,
            rings,
            poller,
            status_retry,
        }
    }

    pub async fn reconcile(&self, item: &WorkItem) -> Result<(), ReconcileError> {
        match item.kind {
            EventKind::Added | EventKind::Updated => self.apply(&item.key).await,
            EventKind::Deleted => self.remove(&item.key).await,
        }
    }

    async fn apply(&self, key: &ObjectKey) -> Result<(), ReconcileError> {
        let declaration = match self.store.get(key).await {
            Ok(declaration) => declaration,
            Err(StoreError::NotFound(_)) => {
                tracing::debug!(key = %key, "Declaration gone before reconcile, skipping");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        let spec = &declaration.spec;
        if let Err(errors) = validate_spec(spec) {
            return Err(ReconcileError::InvalidSpec {
                key: key.clone(),
                reasons: errors.iter().map(ToString::to_string).collect(),
            });
        }

        self.rings
            .ensure(key, spec.buffer_size, declaration.status.last_buffer.clone())
            .await?;

        let interval = Duration::from_secs(spec.query_interval);
        let mut created = 0;
        for endpoint in &spec.healthcheck_endpoints {
            if self.poller.associate(key, endpoint, interval) {
                created += 1;
            }
        }
        let released = self.poller.retain(key, &spec.healthcheck_endpoints);
        if created > 0 || released > 0 {
            tracing::info!(key = %key, created, released, "Endpoint associations updated");
        }

        let endpoints = &spec.healthcheck_endpoints;
        let result = persist_status(self.store.as_ref(), &self.rings, key, self.status_retry, |status| {
            status.last_buffer_modification_time = Some(Utc::now());
            status
                .healthcheck_endpoints_healthy
                .retain(|endpoint, _| endpoints.contains(endpoint));
        })
        .await;

        match result {
            Ok(_) => Ok(()),
            // Deleted while reconciling; the Deleted event cleans up.
            Err(StoreError::NotFound(_)) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn remove(&self, key: &ObjectKey) -> Result<(), ReconcileError> {
        // The queue collapses a re-create's Added into the one already
        // waiting, so a Deleted item can arrive after the object came back.
        match self.store.get(key).await {
            Ok(_) => {
                tracing::info!(key = %key, "Declaration re-created before its deletion was handled");
                return self.apply(key).await;
            }
            Err(StoreError::NotFound(_)) => {}
            Err(e) => return Err(e.into()),
        }

        let released = self.poller.release_all(key);
        let discarded = self.rings.remove(key).await?;
        tracing::info!(key = %key, released, discarded, "Declaration removed");
        Ok(())
    }
}
