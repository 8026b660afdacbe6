//! HTTP server for the Prometheus metrics endpoint.

use std::net::SocketAddr;

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::registry::SharedRegistry;

#[derive(Clone)]
struct AppState {
    registry: SharedRegistry,
}

/// Build the router serving `metrics_path`, `/health` and `/ready`.
pub fn create_router(registry: SharedRegistry, metrics_path: &str) -> Router {
    let state = AppState { registry };

    Router::new()
        .route(metrics_path, get(metrics_handler))
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Every request runs a full scrape against the cloud.
async fn metrics_handler(State(state): State<AppState>) -> Response {
    let body = state.registry.render().await;

    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
        .into_response()
}

async fn health_handler() -> Response {
    (StatusCode::OK, "healthy\n").into_response()
}

/// Ready once a scrape has run and every exporter authenticated in it.
/// Does not scrape by itself.
async fn ready_handler(State(state): State<AppState>) -> Response {
    let stats = state.registry.stats();

    if stats.scrapes_total == 0 {
        return (StatusCode::SERVICE_UNAVAILABLE, "not ready - no scrape yet\n").into_response();
    }

    let aborted: Vec<&str> = stats.aborted().collect();
    if aborted.is_empty() {
        (StatusCode::OK, "ready\n").into_response()
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            format!("not ready - authentication failed: {}\n", aborted.join(", ")),
        )
            .into_response()
    }
}

/// Serves the router on `listen_addr` until shutdown.
pub struct HttpServer {
    registry: SharedRegistry,
    listen_addr: SocketAddr,
    metrics_path: String,
}

impl HttpServer {
    pub fn new(registry: SharedRegistry, listen_addr: SocketAddr, metrics_path: String) -> Self {
        Self {
            registry,
            listen_addr,
            metrics_path,
        }
    }

    /// Bind and serve; returns once `shutdown` flips to true.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        let router = create_router(self.registry, &self.metrics_path);

        let listener = tokio::net::TcpListener::bind(self.listen_addr)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", self.listen_addr, e))?;

        info!(
            addr = %self.listen_addr,
            path = %self.metrics_path,
            "HTTP server listening"
        );

        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                loop {
                    if shutdown.changed().await.is_err() {
                        break;
                    }
                    if *shutdown.borrow() {
                        break;
                    }
                }
                info!("HTTP server shutting down");
            })
            .await
            .map_err(|e| anyhow::anyhow!("HTTP server error: {}", e))?;

        info!("HTTP server stopped");
        Ok(())
    }
}
