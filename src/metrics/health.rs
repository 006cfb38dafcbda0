//! Health check endpoints and Prometheus metrics server
//!
//! HTTP endpoints for probes, Prometheus scraping and a JSON stats dump,
//! served with Axum.

use crate::metrics::collector::MetricsCollector;
use crate::service::app::AppState;
use crate::service::health::{HealthCheck, HealthStatus};
use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Health server configuration
#[derive(Debug, Clone)]
pub struct HealthServerConfig {
    pub port: u16,
    /// Host to bind to
    pub host: String,
}

impl Default for HealthServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            host: "0.0.0.0".to_string(),
        }
    }
}

/// Shared state for the health server
#[derive(Clone)]
pub struct HealthServerState {
    pub metrics_collector: Arc<MetricsCollector>,
    pub app_state: Option<Arc<AppState>>,
}

impl HealthServerState {
    fn service_name(&self) -> String {
        self.app_state
            .as_ref()
            .map(|state| state.config().service.name.clone())
            .unwrap_or_else(|| "versus".to_string())
    }
}

/// Health server that provides HTTP endpoints for monitoring
pub struct HealthServer {
    config: HealthServerConfig,
    state: HealthServerState,
    shutdown_tx: broadcast::Sender<()>,
}

impl HealthServer {
    pub fn new(config: HealthServerConfig, metrics_collector: Arc<MetricsCollector>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            state: HealthServerState {
                metrics_collector,
                app_state: None,
            },
            shutdown_tx,
        }
    }

    /// Attach the application state used by the probe endpoints
    pub fn with_app_state(mut self, app_state: Arc<AppState>) -> Self {
        self.state.app_state = Some(app_state);
        self
    }

    /// Bind and serve until `stop` is called
    pub async fn start(&self) -> Result<()> {
        let addr: SocketAddr = format!("{}:{}", self.config.host, self.config.port)
            .parse()
            .context("Invalid health server address")?;

        let app = self.create_router();
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind health server to {}", addr))?;

        info!("Health server listening on http://{}", addr);

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
                info!("Health server shutdown signal received");
            })
            .await?;

        info!("Health server stopped");
        Ok(())
    }

    fn create_router(&self) -> Router {
        Router::new()
            .route("/", get(root_handler))
            .route("/health", get(health_handler))
            .route("/ready", get(ready_handler))
            .route("/alive", get(alive_handler))
            .route("/metrics", get(metrics_handler))
            .route("/stats", get(stats_handler))
            .with_state(self.state.clone())
    }

    pub async fn stop(&self) -> Result<()> {
        info!("Stopping health server...");

        // no receivers means the server never started
        if self.shutdown_tx.send(()).is_err() {
            warn!("Health server was not running when stop was requested");
        }

        Ok(())
    }
}

async fn root_handler(State(state): State<HealthServerState>) -> impl IntoResponse {
    Json(json!({
        "service": state.service_name(),
        "version": crate::VERSION,
        "endpoints": ["/health", "/ready", "/alive", "/metrics", "/stats"]
    }))
}

async fn health_handler(State(state): State<HealthServerState>) -> impl IntoResponse {
    debug!("Health check requested");

    let service = state.service_name();
    let Some(app_state) = state.app_state else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "unhealthy",
                "service": service,
                "version": crate::VERSION,
                "error": "Service not initialized"
            })),
        );
    };

    let status = HealthCheck::liveness_check(app_state)
        .await
        .unwrap_or(HealthStatus::Unhealthy);
    let code = match status {
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::OK,
    };

    (
        code,
        Json(json!({
            "status": status,
            "service": service,
            "version": crate::VERSION
        })),
    )
}

async fn ready_handler(State(state): State<HealthServerState>) -> impl IntoResponse {
    debug!("Readiness check requested");

    let Some(app_state) = state.app_state else {
        return (StatusCode::SERVICE_UNAVAILABLE, "Service not initialized");
    };

    match HealthCheck::readiness_check(app_state).await {
        Ok(HealthStatus::Healthy) => (StatusCode::OK, "Ready"),
        Ok(HealthStatus::Degraded) => (StatusCode::OK, "Degraded but ready"),
        Ok(HealthStatus::Unhealthy) => (StatusCode::SERVICE_UNAVAILABLE, "Not ready"),
        Err(e) => {
            error!("Readiness check failed: {}", e);
            (StatusCode::SERVICE_UNAVAILABLE, "Not ready")
        }
    }
}

async fn alive_handler(State(state): State<HealthServerState>) -> impl IntoResponse {
    debug!("Liveness check requested");

    let Some(app_state) = state.app_state else {
        return (StatusCode::SERVICE_UNAVAILABLE, "Service not initialized");
    };

    match HealthCheck::liveness_check(app_state).await {
        Ok(HealthStatus::Healthy) => (StatusCode::OK, "Alive"),
        _ => (StatusCode::SERVICE_UNAVAILABLE, "Not alive"),
    }
}

/// Prometheus text exposition
async fn metrics_handler(State(state): State<HealthServerState>) -> impl IntoResponse {
    debug!("Metrics endpoint requested");

    let metric_families = state.metrics_collector.registry().gather();
    let encoder = TextEncoder::new();

    match encoder.encode_to_string(&metric_families) {
        Ok(output) => {
            debug!("Serving {} metric families", metric_families.len());
            (
                StatusCode::OK,
                [(header::CONTENT_TYPE, encoder.format_type().to_string())],
                output,
            )
        }
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(header::CONTENT_TYPE, "text/plain".to_string())],
                "Failed to encode metrics".to_string(),
            )
        }
    }
}

/// Manager statistics and component checks as JSON
async fn stats_handler(State(state): State<HealthServerState>) -> impl IntoResponse {
    debug!("Stats endpoint requested");

    let service = state.service_name();
    let error_response = |message: &str| -> Value {
        json!({
            "service": {
                "name": service,
                "version": crate::VERSION,
                "status": "error"
            },
            "error": message,
            "timestamp": chrono::Utc::now()
        })
    };

    let Some(app_state) = state.app_state.clone() else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(error_response("Service not initialized")),
        );
    };

    match HealthCheck::check(app_state).await {
        Ok(health) => {
            let stats = &health.stats.manager;
            let body = json!({
                "service": {
                    "name": service,
                    "version": crate::VERSION,
                    "status": health.status,
                    "uptime_seconds": health.stats.uptime_seconds
                },
                "games": {
                    "created": stats.games_created,
                    "confirmed": stats.games_confirmed,
                    "finished": stats.games_finished,
                    "pending_now": stats.pending_games,
                    "confirmed_now": stats.confirmed_games,
                    "finished_now": stats.finished_games
                },
                "slots": {
                    "accepted": stats.slots_accepted,
                    "rejected": stats.acceptances_rejected
                },
                "settlements_rejected": stats.settlements_rejected,
                "components": health.checks,
                "timestamp": chrono::Utc::now()
            });

            (StatusCode::OK, Json(body))
        }
        Err(e) => {
            error!("Failed to get stats: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(error_response("Failed to get service stats")),
            )
        }
    }
}
