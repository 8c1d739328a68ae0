//! Failure injection tests for the probe and reconcile paths.

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower::ServiceExt;

use anomaly_detector::config::{DetectorConfig, ProbeConfig, RetryConfig};
use anomaly_detector::poller::HttpProber;
use anomaly_detector::query::{HealthSummary, QueryServer};
use anomaly_detector::resource::{HealthRecord, ObjectKey};
use anomaly_detector::store::{MemoryStore, ObjectStore};

mod common;
use common::{eventually, spec, start_programmable_backend, start_system, FlakyStore, StaticProber};

fn quick_fetch_retry(attempts: u32) -> DetectorConfig {
    let mut config = DetectorConfig::default();
    config.query.burst_size = 100;
    config.query.fetch_retry = RetryConfig {
        max_attempts: attempts,
        base_delay_ms: 1,
        factor: 1.0,
        jitter: 0.0,
    };
    config
}

#[tokio::test]
async fn test_status_conflicts_are_retried() {
    let memory = MemoryStore::new();
    let key = ObjectKey::new("default", "contended");
    memory.apply(&key, spec(&["http://a.svc/healthz"], 4, 300));

    let store = FlakyStore::new(memory.clone());
    store.conflict_updates(3);
    let system = start_system(store.clone(), StaticProber::healthy(), None);

    assert!(eventually(Duration::from_secs(5), || async {
        memory.get(&key).await.unwrap().status.current_buffer_size == 4
    })
    .await);
    assert!(store.update_calls.load(Ordering::SeqCst) >= 4);

    system.stop().await;
}

#[tokio::test]
async fn test_failed_reconcile_is_requeued() {
    let memory = MemoryStore::new();
    let key = ObjectKey::new("default", "outage");
    memory.apply(&key, spec(&["http://a.svc/healthz"], 4, 300));

    let store = FlakyStore::new(memory.clone());
    store.fail_gets(3);
    let system = start_system(store.clone(), StaticProber::healthy(), None);

    assert!(eventually(Duration::from_secs(5), || async { !system.poller.associated(&key).is_empty() }).await);
    assert!(eventually(Duration::from_secs(5), || async {
        memory.get(&key).await.unwrap().status.current_buffer_size == 4
    })
    .await);

    system.stop().await;
}

#[tokio::test]
async fn test_recovering_backend_is_recorded_in_order() {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    let backend = start_programmable_backend(move || {
        let counter = counter.clone();
        async move {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                503
            } else {
                200
            }
        }
    })
    .await;
    let url = format!("http://{backend}/healthz");

    let memory = MemoryStore::new();
    let key = ObjectKey::new("default", "recovering");
    memory.apply(&key, spec(&[url.as_str()], 5, 1));

    let prober = Arc::new(HttpProber::from_config(&ProbeConfig::default()).unwrap());
    let system = start_system(Arc::new(memory.clone()), prober, None);

    let recovered = eventually(Duration::from_secs(10), || async {
        let buffer = memory.get(&key).await.unwrap().status.last_buffer;
        buffer.iter().filter(|r| r.healthy == Some(true)).count() >= 1
    })
    .await;
    assert!(recovered, "endpoint never reported healthy");

    let buffer: Vec<Option<bool>> = memory
        .get(&key)
        .await
        .unwrap()
        .status
        .last_buffer
        .iter()
        .map(|r| r.healthy)
        .collect();
    assert_eq!(&buffer[..3], &[Some(false), Some(false), Some(true)]);

    system.stop().await;
}

#[tokio::test]
async fn test_unreachable_endpoint_is_unhealthy() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let url = format!("http://{addr}/healthz");

    let memory = MemoryStore::new();
    let key = ObjectKey::new("default", "gone");
    memory.apply(&key, spec(&[url.as_str()], 5, 1));

    let prober = Arc::new(HttpProber::from_config(&ProbeConfig::default()).unwrap());
    let system = start_system(Arc::new(memory.clone()), prober, None);

    assert!(eventually(Duration::from_secs(10), || async {
        let status = memory.get(&key).await.unwrap().status;
        status.healthcheck_endpoints_healthy.get(&url) == Some(&false)
            && status.last_buffer.first().map(|r| r.healthy) == Some(Some(false))
    })
    .await);

    system.stop().await;
}

async fn query(server: &QueryServer, key: &ObjectKey) -> (StatusCode, Vec<u8>) {
    let uri = format!(
        "/compute_health?key={key}&ts_a=2024-01-01T00:00:00Z&ts_b=2024-01-02T00:00:00Z"
    );
    let response = server
        .router()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, body.to_vec())
}

#[tokio::test]
async fn test_query_survives_transient_outage() {
    let memory = MemoryStore::new();
    let key = ObjectKey::new("default", "blip");
    let declaration = memory.apply(&key, spec(&["http://a.svc/healthz"], 4, 300));
    let mut seeded = declaration.clone();
    seeded.status.last_buffer = vec![HealthRecord::new("2024-01-01T12:00:00Z".parse().unwrap(), true)];
    memory.update_status(&seeded).await.unwrap();

    let store = FlakyStore::new(memory);
    store.fail_gets(2);
    let server = QueryServer::new(store.clone(), &quick_fetch_retry(5));

    let (status, body) = query(&server, &key).await;
    assert_eq!(status, StatusCode::OK);
    let summary: HealthSummary = serde_json::from_slice(&body).unwrap();
    assert_eq!(summary.healthy_records, 1);
}

#[tokio::test]
async fn test_query_fails_after_persistent_outage() {
    let memory = MemoryStore::new();
    let key = ObjectKey::new("default", "down");
    memory.apply(&key, spec(&["http://a.svc/healthz"], 4, 300));

    let store = FlakyStore::new(memory);
    store.fail_gets(100);
    let server = QueryServer::new(store.clone(), &quick_fetch_retry(3));

    let (status, _) = query(&server, &key).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

    store.fail_gets(0);
    let (status, _) = query(&server, &key).await;
    assert_eq!(status, StatusCode::OK);
}
