//! In-memory versioned object store.
//!
//! Every write draws a new resource version from a store-wide counter, so
//! versions are unique and increase monotonically across all objects.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::resource::{Declaration, DeclarationSpec, ObjectKey};
use crate::store::{ObjectStore, StoreError, StoreEvent, StoreResult, WatchEventKind};

const DEFAULT_WATCH_CAPACITY: usize = 1024;

/// A thread-safe, versioned declaration store.
#[derive(Clone)]
pub struct MemoryStore {
    objects: Arc<DashMap<ObjectKey, Declaration>>,
    revision: Arc<AtomicU64>,
    events: broadcast::Sender<StoreEvent>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_watch_capacity(DEFAULT_WATCH_CAPACITY)
    }

    /// Create a store whose watch channel buffers `capacity` events per
    /// subscriber before it starts lagging.
    pub fn with_watch_capacity(capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity.max(1));
        Self {
            objects: Arc::new(DashMap::new()),
            revision: Arc::new(AtomicU64::new(0)),
            events,
        }
    }

    fn next_revision(&self) -> u64 {
        self.revision.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn emit(&self, kind: WatchEventKind, object: &Declaration) {
        // No subscribers is fine; the informer re-lists on start.
        let _ = self.events.send(StoreEvent {
            kind,
            object: object.clone(),
        });
    }

    /// Create a declaration or replace its spec.
    ///
    /// Re-applying an identical spec is a no-op and emits nothing. A changed
    /// spec bumps both the resource version and the generation; the existing
    /// status is kept.
    pub fn apply(&self, key: &ObjectKey, spec: DeclarationSpec) -> Declaration {
        match self.objects.entry(key.clone()) {
            Entry::Occupied(mut entry) => {
                let object = entry.get_mut();
                if object.spec == spec {
                    return object.clone();
                }
                object.spec = spec;
                object.metadata.generation += 1;
                object.metadata.resource_version = self.next_revision();
                tracing::debug!(key = %key, version = object.metadata.resource_version, "Declaration updated");
                self.emit(WatchEventKind::Modified, object);
                object.clone()
            }
            Entry::Vacant(entry) => {
                let mut object = Declaration::new(key, spec);
                object.metadata.generation = 1;
                object.metadata.resource_version = self.next_revision();
                tracing::debug!(key = %key, version = object.metadata.resource_version, "Declaration created");
                self.emit(WatchEventKind::Added, &object);
                entry.insert(object).clone()
            }
        }
    }

    /// Delete a declaration, returning its last state.
    pub fn delete(&self, key: &ObjectKey) -> StoreResult<Declaration> {
        match self.objects.remove(key) {
            Some((_, object)) => {
                tracing::debug!(key = %key, "Declaration deleted");
                self.emit(WatchEventKind::Deleted, &object);
                Ok(object)
            }
            None => Err(StoreError::NotFound(key.clone())),
        }
    }

    /// Number of stored declarations.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get(&self, key: &ObjectKey) -> StoreResult<Declaration> {
        self.objects
            .get(key)
            .map(|r| r.value().clone())
            .ok_or_else(|| StoreError::NotFound(key.clone()))
    }

    async fn list(&self, namespace: Option<&str>) -> StoreResult<Vec<Declaration>> {
        let mut objects: Vec<Declaration> = self
            .objects
            .iter()
            .filter(|r| namespace.map_or(true, |ns| r.key().namespace == ns))
            .map(|r| r.value().clone())
            .collect();
        objects.sort_by_key(|o| o.key());
        Ok(objects)
    }

    fn watch(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    async fn update_status(&self, object: &Declaration) -> StoreResult<Declaration> {
        let key = object.key();
        let mut stored = self
            .objects
            .get_mut(&key)
            .ok_or_else(|| StoreError::NotFound(key.clone()))?;

        if stored.metadata.resource_version != object.metadata.resource_version {
            return Err(StoreError::Conflict {
                key,
                expected: object.metadata.resource_version,
                actual: stored.metadata.resource_version,
            });
        }

        stored.status = object.status.clone();
        stored.metadata.resource_version = self.next_revision();
        self.emit(WatchEventKind::Modified, &stored);
        Ok(stored.clone())
    }
}
