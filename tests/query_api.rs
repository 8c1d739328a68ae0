//! HTTP contract of the query server.

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::response::Response;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use std::sync::Arc;
use tower::ServiceExt;

use anomaly_detector::config::DetectorConfig;
use anomaly_detector::query::{HealthSummary, QueryServer, StatusResponse};
use anomaly_detector::resource::{HealthRecord, ObjectKey};
use anomaly_detector::store::{MemoryStore, ObjectStore};

mod common;
use common::spec;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

fn rfc3339(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

fn server(store: &MemoryStore, burst: u32) -> QueryServer {
    let mut config = DetectorConfig::default();
    config.query.burst_size = burst;
    config.query.fetch_retry.max_attempts = 2;
    config.query.fetch_retry.base_delay_ms = 1;
    QueryServer::new(Arc::new(store.clone()), &config)
}

async fn seed(store: &MemoryStore, key: &ObjectKey, records: Vec<HealthRecord>) {
    let declaration = store.apply(key, spec(&["http://a.svc/healthz"], records.len().max(1), 60));
    let mut seeded = declaration.clone();
    seeded.status.current_buffer_size = records.len();
    seeded.status.last_buffer = records;
    store.update_status(&seeded).await.unwrap();
}

async fn get(server: &QueryServer, uri: &str) -> Response {
    server
        .router()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

async fn summary(response: Response) -> HealthSummary {
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

fn health_uri(key: &str, from: DateTime<Utc>, to: DateTime<Utc>) -> String {
    format!("/compute_health?key={key}&ts_a={}&ts_b={}", rfc3339(from), rfc3339(to))
}

#[tokio::test]
async fn test_window_is_open_at_start_and_closed_at_end() {
    let store = MemoryStore::new();
    let key = ObjectKey::new("default", "web");
    let (t1, t2) = (t0() + ChronoDuration::seconds(1), t0() + ChronoDuration::seconds(2));
    seed(
        &store,
        &key,
        vec![
            HealthRecord::new(t0(), true),
            HealthRecord::new(t1, true),
            HealthRecord::new(t2, false),
        ],
    )
    .await;
    let server = server(&store, 100);

    let response = get(&server, &health_uri("default/web", t0(), t2)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let result = summary(response).await;
    assert_eq!(result.healthy_records + result.unhealthy_records, 2);
    assert_eq!(result.healthy_records, 1);
    assert_eq!(result.unhealthy_records, 1);
    assert!((result.health_score - 0.5).abs() < f64::EPSILON);
}

#[tokio::test]
async fn test_score_is_fraction_of_not_unhealthy() {
    let store = MemoryStore::new();
    let key = ObjectKey::new("default", "api");
    let records = (0..10)
        .map(|i| HealthRecord::new(t0() + ChronoDuration::seconds(i), i >= 3))
        .collect();
    seed(&store, &key, records).await;
    let server = server(&store, 100);

    let uri = health_uri("default/api", t0() - ChronoDuration::seconds(1), t0() + ChronoDuration::seconds(60));
    let result = summary(get(&server, &uri).await).await;
    assert!((result.health_score - 0.7).abs() < 1e-9);
    assert_eq!(result.unhealthy_records, 3);
    assert_eq!(result.healthy_records, 7);
}

#[tokio::test]
async fn test_empty_window_scores_zero() {
    let store = MemoryStore::new();
    let key = ObjectKey::new("default", "quiet");
    seed(&store, &key, vec![HealthRecord::new(t0(), true)]).await;
    let server = server(&store, 100);

    let later = t0() + ChronoDuration::hours(1);
    let result = summary(get(&server, &health_uri("default/quiet", later, later + ChronoDuration::hours(1))).await).await;
    assert_eq!(result.health_score, 0.0);
    assert_eq!(result.healthy_records, 0);
    assert_eq!(result.unhealthy_records, 0);
}

#[tokio::test]
async fn test_bad_parameters_are_rejected() {
    let store = MemoryStore::new();
    let server = server(&store, 100);
    let ts = rfc3339(t0());

    let cases = [
        format!("/compute_health?ts_a={ts}&ts_b={ts}"),
        format!("/compute_health?key=no-slash&ts_a={ts}&ts_b={ts}"),
        format!("/compute_health?key=default/web&ts_b={ts}"),
        format!("/compute_health?key=default/web&ts_a=yesterday&ts_b={ts}"),
        format!("/compute_health?key=default/web&ts_a={ts}"),
        format!("/compute_health?key=default/web&ts_a={ts}&ts_b=1714564800"),
    ];
    for uri in cases {
        let response = get(&server, &uri).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{uri}");
    }
}

#[tokio::test]
async fn test_unknown_declaration_is_server_error() {
    let store = MemoryStore::new();
    let server = server(&store, 100);

    let response = get(&server, &health_uri("default/missing", t0(), t0())).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_burst_then_too_many_requests() {
    let store = MemoryStore::new();
    let key = ObjectKey::new("default", "web");
    seed(&store, &key, vec![HealthRecord::new(t0(), true)]).await;
    let server = server(&store, 2);
    let uri = health_uri("default/web", t0() - ChronoDuration::seconds(1), t0());

    assert_eq!(get(&server, &uri).await.status(), StatusCode::OK);
    assert_eq!(get(&server, &uri).await.status(), StatusCode::OK);
    assert_eq!(get(&server, &uri).await.status(), StatusCode::TOO_MANY_REQUESTS);

    // Status is not rate limited.
    assert_eq!(get(&server, "/status").await.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_status_reports_version() {
    let store = MemoryStore::new();
    let server = server(&store, 100);

    let response = get(&server, "/status").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));

    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let status: StatusResponse = serde_json::from_slice(&body).unwrap();
    assert_eq!(status.status, "ok");
    assert_eq!(status.version, env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_client_request_id_is_echoed() {
    let store = MemoryStore::new();
    let server = server(&store, 100);

    let response = server
        .router()
        .oneshot(
            Request::builder()
                .uri("/status")
                .header("x-request-id", "probe-42")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.headers()["x-request-id"], "probe-42");
}
