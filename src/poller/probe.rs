//! Endpoint probing.
//!
//! # Responsibilities
//! - Issue one authenticated GET per probe
//! - Map the outcome to a boolean: healthy iff HTTP 200
//!
//! # Design Decisions
//! - Credentials are read once at construction; unreadable credentials are
//!   fatal at startup rather than a per-probe failure
//! - Transport errors and timeouts are unhealthy outcomes, never errors

use async_trait::async_trait;
use reqwest::StatusCode;
use std::fs;
use std::path::PathBuf;
use thiserror::Error;

use crate::config::ProbeConfig;

/// Errors building a probe client.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("failed to read {path}: {source}")]
    Credential {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("bearer token file {0} is empty")]
    EmptyToken(PathBuf),
    #[error("invalid CA bundle: {0}")]
    Certificate(#[source] reqwest::Error),
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

/// Checks whether an endpoint is healthy.
#[async_trait]
pub trait Prober: Send + Sync + 'static {
    async fn probe(&self, endpoint: &str) -> bool;
}

/// Probes endpoints over HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpProber {
    client: reqwest::Client,
    token: Option<String>,
}

impl HttpProber {
    pub fn from_config(config: &ProbeConfig) -> Result<Self, ProbeError> {
        let mut builder = reqwest::Client::builder()
            .timeout(config.timeout())
            .user_agent(concat!("anomaly-detector/", env!("CARGO_PKG_VERSION")));

        if let Some(path) = &config.ca_cert_path {
            let pem = read_file(path)?;
            let cert = reqwest::Certificate::from_pem(&pem).map_err(ProbeError::Certificate)?;
            builder = builder.add_root_certificate(cert);
        }

        let token = match &config.token_path {
            Some(path) => {
                let raw = read_file(path)?;
                let token = String::from_utf8_lossy(&raw).trim().to_string();
                if token.is_empty() {
                    return Err(ProbeError::EmptyToken(PathBuf::from(path)));
                }
                Some(token)
            }
            None => None,
        };

        let client = builder.build().map_err(ProbeError::Client)?;
        Ok(Self { client, token })
    }
}

fn read_file(path: &str) -> Result<Vec<u8>, ProbeError> {
    fs::read(path).map_err(|source| ProbeError::Credential {
        path: PathBuf::from(path),
        source,
    })
}

#[async_trait]
impl Prober for HttpProber {
    async fn probe(&self, endpoint: &str) -> bool {
        let mut request = self.client.get(endpoint);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        match request.send().await {
            Ok(response) if response.status() == StatusCode::OK => true,
            Ok(response) => {
                tracing::warn!(endpoint = %endpoint, status = %response.status(), "Probe failed: non-200 status");
                false
            }
            Err(e) if e.is_timeout() => {
                tracing::warn!(endpoint = %endpoint, "Probe failed: timeout");
                false
            }
            Err(e) => {
                tracing::warn!(endpoint = %endpoint, error = %e, "Probe failed: connection error");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::HeaderMap, routing::get, Router};
    use tokio::net::TcpListener;

    async fn serve(app: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn config() -> ProbeConfig {
        ProbeConfig {
            timeout_secs: 2,
            ..ProbeConfig::default()
        }
    }

    #[tokio::test]
    async fn test_only_200_is_healthy() {
        let app = Router::new()
            .route("/ok", get(|| async { "ok" }))
            .route("/created", get(|| async { (axum::http::StatusCode::CREATED, "created") }))
            .route("/broken", get(|| async { (axum::http::StatusCode::SERVICE_UNAVAILABLE, "down") }));
        let base = serve(app).await;
        let prober = HttpProber::from_config(&config()).unwrap();

        assert!(prober.probe(&format!("{}/ok", base)).await);
        assert!(!prober.probe(&format!("{}/created", base)).await);
        assert!(!prober.probe(&format!("{}/broken", base)).await);
    }

    #[tokio::test]
    async fn test_connection_error_is_unhealthy() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let prober = HttpProber::from_config(&config()).unwrap();
        assert!(!prober.probe(&format!("http://{}/healthz", addr)).await);
    }

    #[tokio::test]
    async fn test_sends_bearer_token() {
        let app = Router::new().route(
            "/auth",
            get(|headers: HeaderMap| async move {
                match headers.get("authorization").and_then(|v| v.to_str().ok()) {
                    Some("Bearer s3cret") => axum::http::StatusCode::OK,
                    _ => axum::http::StatusCode::UNAUTHORIZED,
                }
            }),
        );
        let base = serve(app).await;

        let path = std::env::temp_dir().join(format!("token-{}", uuid::Uuid::new_v4()));
        std::fs::write(&path, "s3cret\n").unwrap();
        let prober = HttpProber::from_config(&ProbeConfig {
            token_path: Some(path.display().to_string()),
            ..config()
        })
        .unwrap();

        assert!(prober.probe(&format!("{}/auth", base)).await);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_missing_token_file_is_fatal() {
        let err = HttpProber::from_config(&ProbeConfig {
            token_path: Some("/nonexistent/token".into()),
            ..config()
        })
        .unwrap_err();
        assert!(matches!(err, ProbeError::Credential { .. }));
    }
}
