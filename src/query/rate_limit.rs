//! Global request rate limiting for the query server.

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::{Arc, Mutex};

use crate::observability::metrics;
use crate::resilience::TokenBucket;

/// One token bucket shared by every client.
pub struct RateLimiterState {
    bucket: Mutex<TokenBucket>,
}

impl RateLimiterState {
    pub fn new(requests_per_second: u32, burst_size: u32) -> Self {
        Self {
            bucket: Mutex::new(TokenBucket::new(burst_size as f64, requests_per_second as f64)),
        }
    }

    fn check(&self) -> bool {
        self.bucket.lock().expect("rate limiter mutex poisoned").try_acquire()
    }
}

/// Middleware rejecting requests over the limit with 429.
pub async fn rate_limit_middleware(
    State(state): State<Arc<RateLimiterState>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if state.check() {
        next.run(request).await
    } else {
        tracing::warn!(path = %request.uri().path(), "Rate limit exceeded");
        metrics::record_query(StatusCode::TOO_MANY_REQUESTS.as_u16());
        (StatusCode::TOO_MANY_REQUESTS, "Rate limit exceeded").into_response()
    }
}
