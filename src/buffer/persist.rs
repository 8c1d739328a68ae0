//! Mirroring ring buffers into declaration status.

use crate::buffer::registry::RingHandle;
use crate::resilience::{retry_on_conflict, Backoff};
use crate::resource::{Declaration, DeclarationStatus, ObjectKey};
use crate::store::{ObjectStore, StoreError, StoreResult};

/// Write the current contents of the buffer for `key` into its status,
/// together with whatever `update` changes, retrying on conflict.
///
/// Every attempt re-reads both the declaration and the buffer, so a write
/// never regresses the persisted buffer behind a concurrent writer. A missing
/// buffer is reported as `NotFound`: buffers are discarded only on deletion.
pub async fn persist_status<F>(
    store: &dyn ObjectStore,
    rings: &RingHandle,
    key: &ObjectKey,
    backoff: Backoff,
    update: F,
) -> StoreResult<Declaration>
where
    F: Fn(&mut DeclarationStatus),
{
    let update = &update;
    retry_on_conflict(backoff, move || async move {
        let mut declaration = store.get(key).await?;
        let snapshot = match rings.snapshot(key).await {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => return Err(StoreError::NotFound(key.clone())),
            Err(e) => return Err(StoreError::Unavailable(e.to_string())),
        };

        let status = &mut declaration.status;
        status.last_buffer = snapshot.records;
        status.current_buffer_size = snapshot.capacity;
        update(status);

        store.update_status(&declaration).await
    })
    .await
}
