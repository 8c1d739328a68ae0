//! Shared utilities for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use anomaly_detector::buffer::{RingHandle, RingRegistry};
use anomaly_detector::config::QueueConfig;
use anomaly_detector::controller::{Controller, ControllerError, Reconciler, RequeueLimiter};
use anomaly_detector::poller::{EndpointPoller, Prober};
use anomaly_detector::resilience::Backoff;
use anomaly_detector::resource::{Declaration, DeclarationSpec, ObjectKey};
use anomaly_detector::store::{MemoryStore, ObjectStore, StoreError, StoreEvent, StoreResult};

/// Start a programmable mock backend on an ephemeral port.
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = u16> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let f = f.clone();
                    tokio::spawn(async move {
                        let status = f().await;
                        let status_text = match status {
                            200 => "200 OK",
                            500 => "500 Internal Server Error",
                            503 => "503 Service Unavailable",
                            _ => "200 OK",
                        };
                        let response = format!(
                            "HTTP/1.1 {}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                            status_text
                        );
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

/// Prober whose answer can be flipped, counting probes per endpoint.
#[derive(Default)]
pub struct StaticProber {
    unhealthy: AtomicBool,
    probes: Mutex<HashMap<String, u32>>,
}

impl StaticProber {
    pub fn healthy() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.unhealthy.store(!healthy, Ordering::SeqCst);
    }

    pub fn probes(&self, endpoint: &str) -> u32 {
        self.probes.lock().unwrap().get(endpoint).copied().unwrap_or(0)
    }

    pub fn total_probes(&self) -> u32 {
        self.probes.lock().unwrap().values().sum()
    }
}

#[async_trait]
impl Prober for StaticProber {
    async fn probe(&self, endpoint: &str) -> bool {
        *self.probes.lock().unwrap().entry(endpoint.to_string()).or_insert(0) += 1;
        !self.unhealthy.load(Ordering::SeqCst)
    }
}

fn take(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

/// Store wrapper injecting failures in front of a [`MemoryStore`].
pub struct FlakyStore {
    inner: MemoryStore,
    get_failures: AtomicU32,
    update_conflicts: AtomicU32,
    pub update_calls: AtomicU32,
}

impl FlakyStore {
    pub fn new(inner: MemoryStore) -> Arc<Self> {
        Arc::new(Self {
            inner,
            get_failures: AtomicU32::new(0),
            update_conflicts: AtomicU32::new(0),
            update_calls: AtomicU32::new(0),
        })
    }

    /// Fail the next `n` gets with `Unavailable`.
    pub fn fail_gets(&self, n: u32) {
        self.get_failures.store(n, Ordering::SeqCst);
    }

    /// Fail the next `n` status updates with `Conflict`.
    pub fn conflict_updates(&self, n: u32) {
        self.update_conflicts.store(n, Ordering::SeqCst);
    }
}

#[async_trait]
impl ObjectStore for FlakyStore {
    async fn get(&self, key: &ObjectKey) -> StoreResult<Declaration> {
        if take(&self.get_failures) {
            return Err(StoreError::Unavailable("injected outage".into()));
        }
        self.inner.get(key).await
    }

    async fn list(&self, namespace: Option<&str>) -> StoreResult<Vec<Declaration>> {
        self.inner.list(namespace).await
    }

    fn watch(&self) -> broadcast::Receiver<StoreEvent> {
        self.inner.watch()
    }

    async fn update_status(&self, object: &Declaration) -> StoreResult<Declaration> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        if take(&self.update_conflicts) {
            return Err(StoreError::Conflict {
                key: object.key(),
                expected: object.metadata.resource_version,
                actual: object.metadata.resource_version + 1,
            });
        }
        self.inner.update_status(object).await
    }
}

/// A running controller with its collaborators.
pub struct System {
    pub rings: RingHandle,
    pub poller: Arc<EndpointPoller>,
    pub shutdown: CancellationToken,
    pub controller: JoinHandle<Result<(), ControllerError>>,
}

impl System {
    pub async fn stop(self) {
        self.shutdown.cancel();
        let result = tokio::time::timeout(Duration::from_secs(5), self.controller)
            .await
            .expect("controller did not stop");
        result.unwrap().unwrap();
    }
}

pub fn start_system(store: Arc<dyn ObjectStore>, prober: Arc<dyn Prober>, namespace: Option<&str>) -> System {
    let shutdown = CancellationToken::new();
    let (rings, _ring_task) = RingRegistry::spawn(shutdown.child_token());
    let status_retry = Backoff::conflict_retry();

    let poller = Arc::new(EndpointPoller::new(
        Arc::clone(&store),
        rings.clone(),
        prober,
        status_retry,
        shutdown.child_token(),
    ));
    let reconciler = Reconciler::new(Arc::clone(&store), rings.clone(), Arc::clone(&poller), status_retry);
    let controller = Controller::new(
        store,
        reconciler,
        RequeueLimiter::new(&QueueConfig::default()),
        namespace.map(str::to_string),
        2,
    );
    let controller = tokio::spawn(controller.run(shutdown.child_token()));

    System {
        rings,
        poller,
        shutdown,
        controller,
    }
}

pub fn spec(endpoints: &[&str], buffer_size: usize, query_interval: u64) -> DeclarationSpec {
    let mut spec = DeclarationSpec::new(endpoints.iter().map(|e| e.to_string()).collect());
    spec.buffer_size = buffer_size;
    spec.query_interval = query_interval;
    spec
}

/// Poll `check` every 20ms until it returns true or `timeout` elapses.
pub async fn eventually<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
