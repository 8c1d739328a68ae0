//! Anomaly query HTTP server.
//!
//! # Responsibilities
//! - `GET /compute_health`: score a declaration's persisted buffer over a
//!   time window
//! - `GET /status`: liveness
//! - Wire up middleware (request ID, tracing, timeout, rate limit)
//!
//! # Design Decisions
//! - Reads persisted status only; never touches the in-memory registries
//! - Store lookups retry transient errors; NotFound fails immediately

use axum::{
    body::Body,
    extract::{Query, State},
    http::{Request, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::DetectorConfig;
use crate::observability::metrics;
use crate::query::rate_limit::{rate_limit_middleware, RateLimiterState};
use crate::query::request_id::{request_id_of, MakeRequestUuid, X_REQUEST_ID};
use crate::query::score::{evaluate_health, select_window};
use crate::resilience::{retry_on_error, Backoff};
use crate::resource::ObjectKey;
use crate::store::{ObjectStore, StoreError};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ObjectStore>,
    pub fetch_retry: Backoff,
}

/// Raw query parameters; validated by hand so every problem maps to 400.
#[derive(Debug, Default, Deserialize)]
pub struct HealthQuery {
    key: Option<String>,
    ts_a: Option<String>,
    ts_b: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub version: String,
    pub status: String,
}

pub struct QueryServer {
    router: Router,
}

impl QueryServer {
    pub fn new(store: Arc<dyn ObjectStore>, config: &DetectorConfig) -> Self {
        let state = AppState {
            store,
            fetch_retry: config.query.fetch_retry.backoff(),
        };
        let limiter = Arc::new(RateLimiterState::new(
            config.query.requests_per_second,
            config.query.burst_size,
        ));
        let timeout = Duration::from_secs(config.listener.request_timeout_secs);
        Self {
            router: Self::build_router(state, limiter, timeout),
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(state: AppState, limiter: Arc<RateLimiterState>, timeout: Duration) -> Router {
        Router::new()
            .route(
                "/compute_health",
                get(compute_health).layer(middleware::from_fn_with_state(limiter, rate_limit_middleware)),
            )
            .route("/status", get(status))
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::new(X_REQUEST_ID, MakeRequestUuid))
                    .layer(PropagateRequestIdLayer::new(X_REQUEST_ID))
                    .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                        tracing::info_span!(
                            "request",
                            method = %request.method(),
                            uri = %request.uri(),
                            request_id = %request_id_of(request),
                        )
                    }))
                    .layer(TimeoutLayer::new(timeout)),
            )
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve until `shutdown` is cancelled, then drain in-flight requests.
    pub async fn run(self, listener: TcpListener, shutdown: CancellationToken) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "Query server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown.cancelled_owned())
            .await?;

        tracing::info!("Query server stopped");
        Ok(())
    }
}

fn error(status: StatusCode, message: impl Into<String>) -> Response {
    metrics::record_query(status.as_u16());
    (status, message.into()).into_response()
}

fn parse_time(name: &str, raw: Option<&str>) -> Result<DateTime<Utc>, Response> {
    let raw = raw.ok_or_else(|| error(StatusCode::BAD_REQUEST, format!("missing parameter '{name}'")))?;
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| error(StatusCode::BAD_REQUEST, format!("invalid '{name}': {e}")))
}

async fn compute_health(State(state): State<AppState>, Query(query): Query<HealthQuery>) -> Response {
    let raw_key = match query.key.as_deref() {
        Some(raw) => raw,
        None => return error(StatusCode::BAD_REQUEST, "missing parameter 'key'"),
    };
    let key = match ObjectKey::parse(raw_key) {
        Ok(key) => key,
        Err(e) => return error(StatusCode::BAD_REQUEST, e.to_string()),
    };
    let from = match parse_time("ts_a", query.ts_a.as_deref()) {
        Ok(ts) => ts,
        Err(response) => return response,
    };
    let to = match parse_time("ts_b", query.ts_b.as_deref()) {
        Ok(ts) => ts,
        Err(response) => return response,
    };

    let store = &state.store;
    let key_ref = &key;
    let fetched = retry_on_error(state.fetch_retry, StoreError::is_transient, move || async move {
        store.get(key_ref).await
    })
    .await;

    let declaration = match fetched {
        Ok(declaration) => declaration,
        Err(e) => {
            tracing::error!(key = %key, error = %e, "Failed to fetch declaration");
            return error(StatusCode::INTERNAL_SERVER_ERROR, format!("failed to fetch {key}: {e}"));
        }
    };

    let selected = select_window(&declaration.status.last_buffer, from, to);
    let summary = evaluate_health(&selected);
    tracing::debug!(
        key = %key,
        selected = selected.len(),
        score = summary.health_score,
        "Health computed"
    );
    metrics::record_query(StatusCode::OK.as_u16());
    Json(summary).into_response()
}

async fn status() -> Json<StatusResponse> {
    Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        status: "ok".to_string(),
    })
}
