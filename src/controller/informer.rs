//! List-then-watch change feed with a local cache.
//!
//! # Responsibilities
//! - Seed a local cache from `list` and enqueue an Added item per object
//! - Translate watch events into work items
//! - Re-list when the watch lags, synthesizing the missed changes
//! - Report when the initial list has been processed
//!
//! # Design Decisions
//! - The watch is subscribed before listing so no change is missed
//! - Modified events whose resourceVersion or generation is unchanged are
//!   dropped: status writes bump the version but not the generation, and
//!   must not trigger another reconcile

use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;

use crate::controller::queue::WorkQueue;
use crate::controller::{EventKind, WorkItem};
use crate::resource::{Declaration, ObjectKey};
use crate::store::{ObjectStore, StoreError, StoreEvent, WatchEventKind};

pub struct Informer {
    store: Arc<dyn ObjectStore>,
    namespace: Option<String>,
    cache: DashMap<ObjectKey, Declaration>,
    synced_tx: watch::Sender<bool>,
}

/// Cheap handle to wait for the informer's initial sync.
#[derive(Clone)]
pub struct SyncHandle {
    rx: watch::Receiver<bool>,
}

impl SyncHandle {
    /// Resolve once the initial list is cached and enqueued. Returns false if
    /// the informer stopped first.
    pub async fn wait(mut self) -> bool {
        self.rx.wait_for(|synced| *synced).await.is_ok()
    }

    pub fn is_synced(&self) -> bool {
        *self.rx.borrow()
    }
}

impl Informer {
    pub fn new(store: Arc<dyn ObjectStore>, namespace: Option<String>) -> Self {
        let (synced_tx, _) = watch::channel(false);
        Self {
            store,
            namespace,
            cache: DashMap::new(),
            synced_tx,
        }
    }

    pub fn sync_handle(&self) -> SyncHandle {
        SyncHandle {
            rx: self.synced_tx.subscribe(),
        }
    }

    /// Run until `shutdown` is cancelled or the store's watch closes.
    pub async fn run(self, queue: Arc<WorkQueue>, shutdown: CancellationToken) -> Result<(), StoreError> {
        let mut events = self.store.watch();

        let initial = tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            initial = self.store.list(self.namespace.as_deref()) => initial?,
        };
        for object in initial {
            let key = object.key();
            self.cache.insert(key.clone(), object);
            queue.add(WorkItem::new(key, EventKind::Added));
        }
        self.synced_tx.send_replace(true);
        tracing::info!(objects = self.cache.len(), namespace = ?self.namespace, "Informer synced");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::debug!("Informer received shutdown signal, exiting loop");
                    break;
                }
                event = events.recv() => match event {
                    Ok(event) => {
                        if let Some(item) = self.observe(event) {
                            queue.add(item);
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        tracing::warn!(missed, "Watch lagged, re-listing");
                        match self.store.list(self.namespace.as_deref()).await {
                            Ok(objects) => {
                                for item in self.resync(objects) {
                                    queue.add(item);
                                }
                            }
                            // Events after the lag are still delivered; the
                            // next lag retries the list.
                            Err(e) => tracing::error!(error = %e, "Re-list failed"),
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::info!("Watch closed, informer stopping");
                        break;
                    }
                }
            }
        }
        Ok(())
    }

    fn in_scope(&self, object: &Declaration) -> bool {
        self.namespace
            .as_deref()
            .map_or(true, |ns| object.metadata.namespace == ns)
    }

    /// Apply one watch event to the cache and decide whether it needs work.
    pub(crate) fn observe(&self, event: StoreEvent) -> Option<WorkItem> {
        if !self.in_scope(&event.object) {
            return None;
        }
        let key = event.object.key();

        match event.kind {
            WatchEventKind::Added | WatchEventKind::Modified => {
                let incoming = event.object;
                let previous = self.cache.insert(key.clone(), incoming.clone());
                match previous {
                    None => Some(WorkItem::new(key, EventKind::Added)),
                    // A re-created object restarts at generation 1; only an
                    // unchanged version makes an Added event redundant.
                    Some(previous) if event.kind == WatchEventKind::Added => {
                        (previous.metadata.resource_version != incoming.metadata.resource_version)
                            .then(|| WorkItem::new(key, EventKind::Updated))
                    }
                    Some(previous) if is_noop(&previous, &incoming) => None,
                    Some(_) => Some(WorkItem::new(key, EventKind::Updated)),
                }
            }
            WatchEventKind::Deleted => {
                self.cache.remove(&key);
                Some(WorkItem::new(key, EventKind::Deleted))
            }
        }
    }

    /// Reconcile the cache with a fresh list after missed events.
    pub(crate) fn resync(&self, objects: Vec<Declaration>) -> Vec<WorkItem> {
        let mut items = Vec::new();
        let mut listed = HashSet::new();

        for object in objects.into_iter().filter(|o| self.in_scope(o)) {
            let key = object.key();
            listed.insert(key.clone());
            match self.cache.insert(key.clone(), object.clone()) {
                None => items.push(WorkItem::new(key, EventKind::Added)),
                Some(previous) if is_noop(&previous, &object) => {}
                Some(_) => items.push(WorkItem::new(key, EventKind::Updated)),
            }
        }

        let gone: Vec<ObjectKey> = self
            .cache
            .iter()
            .map(|entry| entry.key().clone())
            .filter(|key| !listed.contains(key))
            .collect();
        for key in gone {
            self.cache.remove(&key);
            items.push(WorkItem::new(key, EventKind::Deleted));
        }

        items
    }
}

/// Status-only writes keep the generation and the spec. Comparing the spec
/// as well catches an object deleted and re-created while the watch lagged.
fn is_noop(previous: &Declaration, incoming: &Declaration) -> bool {
    previous.metadata.resource_version == incoming.metadata.resource_version
        || (previous.metadata.generation == incoming.metadata.generation && previous.spec == incoming.spec)
}
