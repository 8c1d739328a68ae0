//! Versioned object store abstraction.
//!
//! # Data Flow
//! ```text
//! external writer (manifest.rs, tests, ...)
//!     → memory.rs apply/delete (bump resourceVersion, generation)
//!     → broadcast StoreEvent { Added | Modified | Deleted }
//!     → controller informer (watch) / poller + reconciler (get, update_status)
//! ```
//!
//! # Design Decisions
//! - Status writes are optimistic: a stale resourceVersion yields `Conflict`
//! - Deleted objects surface as `NotFound` on the next `get`
//! - Watch is a broadcast channel; lagging subscribers re-list

pub mod error;
pub mod manifest;
pub mod memory;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::resource::{Declaration, ObjectKey};

pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;

/// Kind of change reported by a watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEventKind {
    Added,
    Modified,
    Deleted,
}

/// A change notification carrying the object state after the change
/// (or the last known state, for deletions).
#[derive(Debug, Clone)]
pub struct StoreEvent {
    pub kind: WatchEventKind,
    pub object: Declaration,
}

/// The consumed object-store contract.
#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    /// Fetch the current state of a declaration.
    async fn get(&self, key: &ObjectKey) -> StoreResult<Declaration>;

    /// List declarations, optionally restricted to one namespace.
    async fn list(&self, namespace: Option<&str>) -> StoreResult<Vec<Declaration>>;

    /// Subscribe to changes made after this call.
    fn watch(&self) -> broadcast::Receiver<StoreEvent>;

    /// Replace the status of `object`. Fails with `Conflict` when
    /// `object.metadata.resource_version` is not the stored version.
    async fn update_status(&self, object: &Declaration) -> StoreResult<Declaration>;
}
