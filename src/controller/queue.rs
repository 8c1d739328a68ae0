//! Deduplicating work queue with per-key single flight.
//!
//! # Responsibilities
//! - Drop items already waiting in the queue
//! - Hand at most one item per declaration key to workers at a time
//! - Park items whose key is in flight until the worker calls `done`
//! - Delay redelivery of failed items through the [`RequeueLimiter`]
//!
//! # Design Decisions
//! - Parked items keep their arrival order and stay deduplicated
//! - After shutdown, `get` returns `None` and queued items are abandoned

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

use crate::controller::rate_limiter::RequeueLimiter;
use crate::controller::WorkItem;
use crate::observability::metrics;
use crate::resource::ObjectKey;

#[derive(Default)]
struct QueueState {
    queue: VecDeque<WorkItem>,
    /// Items waiting in `queue` or `parked`.
    dirty: HashSet<WorkItem>,
    /// Keys currently held by a worker.
    processing: HashSet<ObjectKey>,
    parked: HashMap<ObjectKey, VecDeque<WorkItem>>,
    shutting_down: bool,
}

impl QueueState {
    fn depth(&self) -> usize {
        self.dirty.len()
    }
}

pub struct WorkQueue {
    state: Mutex<QueueState>,
    notify: Notify,
    limiter: RequeueLimiter,
}

impl WorkQueue {
    pub fn new(limiter: RequeueLimiter) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
            limiter,
        })
    }

    /// Enqueue `item` unless an identical item is already waiting.
    pub fn add(&self, item: WorkItem) {
        let mut state = self.state.lock().expect("work queue mutex poisoned");
        if state.shutting_down || !state.dirty.insert(item.clone()) {
            return;
        }

        if state.processing.contains(&item.key) {
            state.parked.entry(item.key.clone()).or_default().push_back(item);
        } else {
            state.queue.push_back(item);
            self.notify.notify_one();
        }
        metrics::set_queue_depth(state.depth());
    }

    /// Enqueue `item` after `delay`.
    pub fn add_after(self: &Arc<Self>, item: WorkItem, delay: Duration) {
        if delay.is_zero() {
            self.add(item);
            return;
        }
        let queue = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            queue.add(item);
        });
    }

    /// Enqueue `item` after its rate-limited backoff.
    pub fn add_rate_limited(self: &Arc<Self>, item: WorkItem) {
        let delay = self.limiter.when(&item);
        metrics::record_requeue();
        tracing::debug!(key = %item.key, event = %item.kind, delay = ?delay, "Requeueing");
        self.add_after(item, delay);
    }

    /// Stop tracking failures for `item`.
    pub fn forget(&self, item: &WorkItem) {
        self.limiter.forget(item);
    }

    pub fn num_requeues(&self, item: &WorkItem) -> u32 {
        self.limiter.num_requeues(item)
    }

    /// Wait for the next item. Returns `None` once the queue is shut down.
    pub async fn get(&self) -> Option<WorkItem> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.state.lock().expect("work queue mutex poisoned");
                if state.shutting_down {
                    return None;
                }
                while let Some(item) = state.queue.pop_front() {
                    if state.processing.contains(&item.key) {
                        state.parked.entry(item.key.clone()).or_default().push_back(item);
                        continue;
                    }
                    state.dirty.remove(&item);
                    state.processing.insert(item.key.clone());
                    metrics::set_queue_depth(state.depth());
                    if !state.queue.is_empty() {
                        self.notify.notify_one();
                    }
                    return Some(item);
                }
            }

            notified.await;
        }
    }

    /// Mark the key of `item` as no longer in flight and release any items
    /// parked behind it.
    pub fn done(&self, item: &WorkItem) {
        let mut state = self.state.lock().expect("work queue mutex poisoned");
        state.processing.remove(&item.key);
        if let Some(parked) = state.parked.remove(&item.key) {
            for (i, parked_item) in parked.into_iter().enumerate() {
                state.queue.insert(i, parked_item);
            }
            self.notify.notify_one();
        }
    }

    /// Wake every waiting worker and refuse further items.
    pub fn shut_down(&self) {
        let mut state = self.state.lock().expect("work queue mutex poisoned");
        state.shutting_down = true;
        drop(state);
        self.notify.notify_waiters();
    }

    /// Items waiting (queued or parked).
    pub fn len(&self) -> usize {
        self.state.lock().expect("work queue mutex poisoned").depth()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QueueConfig;
    use crate::controller::EventKind;

    fn queue() -> Arc<WorkQueue> {
        WorkQueue::new(RequeueLimiter::new(&QueueConfig::default()))
    }

    fn item(name: &str, kind: EventKind) -> WorkItem {
        WorkItem::new(ObjectKey::new("ns", name), kind)
    }

    #[tokio::test]
    async fn test_duplicates_are_collapsed() {
        let q = queue();
        q.add(item("a", EventKind::Added));
        q.add(item("a", EventKind::Added));
        q.add(item("b", EventKind::Added));
        assert_eq!(q.len(), 2);

        assert_eq!(q.get().await, Some(item("a", EventKind::Added)));
        assert_eq!(q.get().await, Some(item("b", EventKind::Added)));
        assert!(q.is_empty());
    }

    #[tokio::test]
    async fn test_key_is_single_flight() {
        let q = queue();
        let added = item("a", EventKind::Added);
        let deleted = item("a", EventKind::Deleted);
        q.add(added.clone());
        q.add(deleted.clone());
        q.add(item("b", EventKind::Added));

        let first = q.get().await.unwrap();
        assert_eq!(first, added);
        // Same key is skipped while in flight.
        assert_eq!(q.get().await, Some(item("b", EventKind::Added)));

        // Re-adding the in-flight item parks it behind the Deleted event.
        q.add(added.clone());
        assert_eq!(q.len(), 2);

        q.done(&first);
        assert_eq!(q.get().await, Some(deleted.clone()));
        q.done(&deleted);
        assert_eq!(q.get().await, Some(added));
    }

    #[tokio::test]
    async fn test_get_wakes_on_add() {
        let q = queue();
        let waiter = {
            let q = Arc::clone(&q);
            tokio::spawn(async move { q.get().await })
        };
        tokio::task::yield_now().await;
        q.add(item("a", EventKind::Updated));
        assert_eq!(waiter.await.unwrap(), Some(item("a", EventKind::Updated)));
    }

    #[tokio::test]
    async fn test_shut_down_releases_waiters() {
        let q = queue();
        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let q = Arc::clone(&q);
                tokio::spawn(async move { q.get().await })
            })
            .collect();
        tokio::task::yield_now().await;

        q.shut_down();
        for waiter in waiters {
            assert_eq!(waiter.await.unwrap(), None);
        }
        q.add(item("late", EventKind::Added));
        assert!(q.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_add_is_delayed() {
        let q = queue();
        let a = item("a", EventKind::Updated);
        q.add_rate_limited(a.clone());
        assert!(q.is_empty());
        assert_eq!(q.num_requeues(&a), 1);

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(q.get().await, Some(a.clone()));

        q.forget(&a);
        assert_eq!(q.num_requeues(&a), 0);
    }
}
