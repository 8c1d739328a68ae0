//! Single-writer registry of per-declaration ring buffers.
//!
//! # Responsibilities
//! - Own every [`RingBuffer`], keyed by declaration
//! - Serialize all buffer mutation through one command channel
//! - Reply with a flattened snapshot after each mutation
//!
//! # Design Decisions
//! - Reconciler and poller tasks never touch a buffer directly; pollers
//!   report outcomes and the actor applies them
//! - Appends for unknown keys are dropped (declaration already deleted)

use std::collections::HashMap;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::buffer::ring::{RingBuffer, RingError};
use crate::resource::{HealthRecord, ObjectKey};

const COMMAND_BUFFER: usize = 256;

/// Buffer contents at a point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RingSnapshot {
    pub capacity: usize,
    /// Occupied records, oldest first.
    pub records: Vec<HealthRecord>,
}

impl RingSnapshot {
    fn of(ring: &RingBuffer) -> Self {
        Self {
            capacity: ring.capacity(),
            records: ring.flatten(),
        }
    }
}

enum Command {
    Ensure {
        key: ObjectKey,
        capacity: usize,
        seed: Vec<HealthRecord>,
        reply: oneshot::Sender<Result<RingSnapshot, RingError>>,
    },
    Append {
        key: ObjectKey,
        record: HealthRecord,
        reply: oneshot::Sender<Result<Option<RingSnapshot>, RingError>>,
    },
    Snapshot {
        key: ObjectKey,
        reply: oneshot::Sender<Option<RingSnapshot>>,
    },
    Remove {
        key: ObjectKey,
        reply: oneshot::Sender<bool>,
    },
}

/// Cloneable handle used to talk to the registry actor.
#[derive(Debug, Clone)]
pub struct RingHandle {
    tx: mpsc::Sender<Command>,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Ensure { key, capacity, .. } => write!(f, "Ensure({key}, {capacity})"),
            Command::Append { key, .. } => write!(f, "Append({key})"),
            Command::Snapshot { key, .. } => write!(f, "Snapshot({key})"),
            Command::Remove { key, .. } => write!(f, "Remove({key})"),
        }
    }
}

impl RingHandle {
    async fn request<T>(&self, command: Command, rx: oneshot::Receiver<T>) -> Result<T, RingError> {
        self.tx.send(command).await.map_err(|_| RingError::Closed)?;
        rx.await.map_err(|_| RingError::Closed)
    }

    /// Create the buffer for `key` seeded from `seed`, or resize the existing
    /// one when its capacity differs. `seed` is ignored for existing buffers.
    pub async fn ensure(
        &self,
        key: &ObjectKey,
        capacity: usize,
        seed: Vec<HealthRecord>,
    ) -> Result<RingSnapshot, RingError> {
        let (reply, rx) = oneshot::channel();
        let command = Command::Ensure {
            key: key.clone(),
            capacity,
            seed,
            reply,
        };
        self.request(command, rx).await?
    }

    /// Append an outcome. Returns `None` when no buffer exists for `key`.
    pub async fn append(
        &self,
        key: &ObjectKey,
        record: HealthRecord,
    ) -> Result<Option<RingSnapshot>, RingError> {
        let (reply, rx) = oneshot::channel();
        let command = Command::Append {
            key: key.clone(),
            record,
            reply,
        };
        self.request(command, rx).await?
    }

    pub async fn snapshot(&self, key: &ObjectKey) -> Result<Option<RingSnapshot>, RingError> {
        let (reply, rx) = oneshot::channel();
        self.request(Command::Snapshot { key: key.clone(), reply }, rx).await
    }

    /// Discard the buffer for `key`. Returns whether one existed.
    pub async fn remove(&self, key: &ObjectKey) -> Result<bool, RingError> {
        let (reply, rx) = oneshot::channel();
        self.request(Command::Remove { key: key.clone(), reply }, rx).await
    }
}

/// The actor owning every ring buffer.
pub struct RingRegistry {
    rings: HashMap<ObjectKey, RingBuffer>,
    rx: mpsc::Receiver<Command>,
}

impl RingRegistry {
    /// Spawn the registry actor. It exits when `shutdown` is cancelled or
    /// every handle has been dropped.
    pub fn spawn(shutdown: CancellationToken) -> (RingHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let registry = Self {
            rings: HashMap::new(),
            rx,
        };
        let task = tokio::spawn(registry.run(shutdown));
        (RingHandle { tx }, task)
    }

    async fn run(mut self, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::debug!("Ring registry received shutdown signal, exiting loop");
                    break;
                }
                command = self.rx.recv() => match command {
                    Some(command) => self.apply(command),
                    None => break,
                }
            }
        }
    }

    fn apply(&mut self, command: Command) {
        match command {
            Command::Ensure {
                key,
                capacity,
                seed,
                reply,
            } => {
                let _ = reply.send(self.ensure(key, capacity, &seed));
            }
            Command::Append { key, record, reply } => {
                let result = match self.rings.get_mut(&key) {
                    Some(ring) => ring.append(record).map(|_| Some(RingSnapshot::of(ring))),
                    None => Ok(None),
                };
                let _ = reply.send(result);
            }
            Command::Snapshot { key, reply } => {
                let _ = reply.send(self.rings.get(&key).map(RingSnapshot::of));
            }
            Command::Remove { key, reply } => {
                let removed = self.rings.remove(&key).is_some();
                if removed {
                    tracing::debug!(key = %key, "Ring buffer released");
                }
                let _ = reply.send(removed);
            }
        }
    }

    fn ensure(
        &mut self,
        key: ObjectKey,
        capacity: usize,
        seed: &[HealthRecord],
    ) -> Result<RingSnapshot, RingError> {
        if let Some(ring) = self.rings.get_mut(&key) {
            if ring.capacity() != capacity {
                let previous = ring.capacity();
                ring.resize(capacity)?;
                tracing::info!(key = %key, from = previous, to = capacity, "Ring buffer resized");
            }
            return Ok(RingSnapshot::of(ring));
        }

        let ring = RingBuffer::from_records(capacity, seed)?;
        tracing::info!(key = %key, capacity, seeded = ring.len(), "Ring buffer created");
        let snapshot = RingSnapshot::of(&ring);
        self.rings.insert(key, ring);
        Ok(snapshot)
    }
}
