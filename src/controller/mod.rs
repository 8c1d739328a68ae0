//! Reconciliation loop.
//!
//! # Data Flow
//! ```text
//! ObjectStore watch
//!     → informer.rs (list-then-watch, cache, no-op suppression)
//!     → queue.rs (dedup, per-key single flight)
//!     → N workers
//!         → reconciler.rs (ring buffer, associations, status)
//!         → success: forget backoff │ failure: rate_limiter.rs requeue
//!         → done(key)
//! ```
//!
//! # Design Decisions
//! - Workers start only after the informer's initial list is enqueued
//! - Failed items are retried without a count limit; the limiter keeps a
//!   permanently failing key from hot-looping

pub mod informer;
pub mod queue;
pub mod rate_limiter;
pub mod reconciler;

use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::observability::metrics;
use crate::resource::ObjectKey;
use crate::store::{ObjectStore, StoreError};

pub use informer::{Informer, SyncHandle};
pub use queue::WorkQueue;
pub use rate_limiter::RequeueLimiter;
pub use reconciler::{ReconcileError, Reconciler};

/// Kind of change a work item asks the reconciler to handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Added,
    Updated,
    Deleted,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Added => "added",
            EventKind::Updated => "updated",
            EventKind::Deleted => "deleted",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A unit of reconciliation work.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorkItem {
    pub key: ObjectKey,
    pub kind: EventKind,
}

impl WorkItem {
    pub fn new(key: ObjectKey, kind: EventKind) -> Self {
        Self { key, kind }
    }
}

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("informer failed: {0}")]
    Informer(#[from] StoreError),

    #[error("informer stopped before its initial sync")]
    NotSynced,
}

/// Drives declarations from the store's change feed into the reconciler.
pub struct Controller {
    store: Arc<dyn ObjectStore>,
    reconciler: Arc<Reconciler>,
    queue: Arc<WorkQueue>,
    namespace: Option<String>,
    workers: usize,
}

impl Controller {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        reconciler: Reconciler,
        limiter: RequeueLimiter,
        namespace: Option<String>,
        workers: usize,
    ) -> Self {
        Self {
            store,
            reconciler: Arc::new(reconciler),
            queue: WorkQueue::new(limiter),
            namespace,
            workers: workers.max(1),
        }
    }

    /// Run the informer and the worker pool until `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), ControllerError> {
        let informer = Informer::new(Arc::clone(&self.store), self.namespace.clone());
        let synced = informer.sync_handle();
        let mut informer_task = tokio::spawn(informer.run(Arc::clone(&self.queue), shutdown.clone()));

        tracing::info!(namespace = ?self.namespace, "Waiting for informer cache to sync");
        tokio::select! {
            _ = shutdown.cancelled() => {
                self.queue.shut_down();
                return Ok(());
            }
            ok = synced.wait() => {
                if !ok {
                    self.queue.shut_down();
                    return match (&mut informer_task).await {
                        Ok(Err(e)) => Err(e.into()),
                        _ => Err(ControllerError::NotSynced),
                    };
                }
            }
        }

        tracing::info!(workers = self.workers, "Starting workers");
        let mut workers = JoinSet::new();
        for id in 0..self.workers {
            workers.spawn(worker(id, Arc::clone(&self.queue), Arc::clone(&self.reconciler)));
        }

        let result = tokio::select! {
            _ = shutdown.cancelled() => Ok(()),
            joined = &mut informer_task => match joined {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(ControllerError::from(e)),
                Err(e) => {
                    tracing::error!(error = %e, "Informer task panicked");
                    Err(ControllerError::NotSynced)
                }
            },
        };

        self.queue.shut_down();
        while workers.join_next().await.is_some() {}
        informer_task.abort();
        tracing::info!("Controller stopped");
        result
    }
}

async fn worker(id: usize, queue: Arc<WorkQueue>, reconciler: Arc<Reconciler>) {
    tracing::debug!(worker = id, "Worker started");
    while let Some(item) = queue.get().await {
        process(&queue, &reconciler, &item).await;
        queue.done(&item);
    }
    tracing::debug!(worker = id, "Worker stopped");
}

async fn process(queue: &Arc<WorkQueue>, reconciler: &Reconciler, item: &WorkItem) {
    let start = Instant::now();
    match reconciler.reconcile(item).await {
        Ok(()) => {
            metrics::record_reconcile(item.kind.as_str(), true, start);
            queue.forget(item);
        }
        Err(e) if e.is_retryable() => {
            metrics::record_reconcile(item.kind.as_str(), false, start);
            tracing::warn!(
                key = %item.key,
                event = %item.kind,
                requeues = queue.num_requeues(item),
                error = %e,
                "Reconcile failed, requeueing"
            );
            queue.add_rate_limited(item.clone());
        }
        Err(e) => {
            metrics::record_reconcile(item.kind.as_str(), false, start);
            tracing::error!(key = %item.key, event = %item.kind, error = %e, "Reconcile failed, not retrying");
            queue.forget(item);
        }
    }
}
