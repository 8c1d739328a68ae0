//! Object store error definitions.

use thiserror::Error;

use crate::resource::ObjectKey;

/// Errors surfaced by an [`ObjectStore`](crate::store::ObjectStore).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The object does not exist (or was deleted).
    #[error("declaration {0} not found")]
    NotFound(ObjectKey),

    /// The caller's version token is stale.
    #[error("conflict writing {key}: version {expected} is stale, current is {actual}")]
    Conflict {
        key: ObjectKey,
        expected: u64,
        actual: u64,
    },

    /// The store could not be reached or failed transiently.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }

    /// Conflicts and unavailability may succeed on retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Conflict { .. } | StoreError::Unavailable(_))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
