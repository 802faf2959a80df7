use axum::{routing::get, Router};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers::{health_check, status, AppState};

/// Status endpoint address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

/// Build the status router
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/status", get(status))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Serve the status endpoint until `shutdown` resolves
pub async fn run_server<F>(
    config: ServerConfig,
    state: Arc<AppState>,
    shutdown: F,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = build_router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    tracing::info!("Starting status endpoint on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    tracing::info!("Status endpoint stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::JobsConfig;
    use crate::daemon::DaemonScheduler;
    use crate::data::{Discrepancy, DiscrepancyKind, MetricKey, MetricKind, Severity};
    use crate::storage::{ChangeSet, MemoryStore, MetricStore};
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use chrono::Utc;
    use tower::util::ServiceExt;

    fn create_test_app(store: Arc<MemoryStore>) -> Router {
        let scheduler = Arc::new(DaemonScheduler::new(store.clone(), &JobsConfig::default()));
        build_router(Arc::new(AppState { scheduler, store }))
    }

    #[tokio::test]
    async fn test_health_check() {
        let app = create_test_app(Arc::new(MemoryStore::new()));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_status() {
        let store = Arc::new(MemoryStore::new());
        let key = MetricKey::new(MetricKind::CpuLoad, "web-1");
        store
            .apply(ChangeSet {
                discrepancies: vec![Discrepancy::new(DiscrepancyKind::GapInData, &key, Utc::now())],
                ..Default::default()
            })
            .await
            .unwrap();
        store
            .add_notification("queued".into(), Severity::High, Utc::now())
            .await
            .unwrap();

        let app = create_test_app(store);
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/status")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();

        assert_eq!(json["running"], false);
        assert_eq!(json["open_discrepancies"], 1);
        assert_eq!(json["unsent_notifications"], 1);
        assert_eq!(json["jobs"].as_array().unwrap().len(), 7);
        assert_eq!(json["jobs"][0]["job"], "ping");
    }
}
