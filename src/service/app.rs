//! Main application state and service coordination
//!
//! This module contains the production AppState that wires storage, the
//! match manager, metrics and the health server, and runs background tasks.

use crate::config::AppConfig;
use crate::lifecycle::MatchManager;
use crate::metrics::health::HealthServerConfig;
use crate::metrics::{HealthServer, MetricsCollector, MetricsService};
use crate::storage::{InMemoryStorage, Storage};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Service-level errors
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Service initialization error: {message}")]
    Initialization { message: String },

    #[error("Background task error: {message}")]
    BackgroundTask { message: String },
}

/// Main application state containing all service components
pub struct AppState {
    /// Application configuration
    config: AppConfig,

    /// Command facade over the match lifecycle
    match_manager: Arc<MatchManager>,

    /// Metrics collector shared with the manager
    metrics_collector: Arc<MetricsCollector>,

    /// Metrics service, present while the service is started
    metrics_service: Mutex<Option<Arc<MetricsService>>>,

    /// Background task handles
    background_tasks: Mutex<Vec<JoinHandle<()>>>,

    /// Service status
    is_running: Arc<RwLock<bool>>,

    started_at: Instant,
}

impl AppState {
    /// Initialize the application with a fresh in-memory store.
    ///
    /// Embedders that issue commands should use [`AppState::with_storage`]
    /// and drive [`AppState::match_manager`]; the endpoints then report on
    /// that store.
    pub async fn new(config: AppConfig) -> Result<Arc<Self>, ServiceError> {
        Self::with_storage(config, Arc::new(InMemoryStorage::new())).await
    }

    /// Initialize the application over the given storage collaborator
    pub async fn with_storage(
        config: AppConfig,
        storage: Arc<dyn Storage>,
    ) -> Result<Arc<Self>, ServiceError> {
        info!("Initializing versus match service");
        info!(
            "Configuration: service={}, k_factor={}, initial_rating={}, reject_unknown_targets={}",
            config.service.name,
            config.rating.k_factor,
            config.rating.initial_rating,
            config.matchmaking.reject_unknown_targets
        );

        crate::config::validate_config(&config).map_err(|e| ServiceError::Configuration {
            message: e.to_string(),
        })?;

        let metrics_collector =
            Arc::new(
                MetricsCollector::new().map_err(|e| ServiceError::Initialization {
                    message: format!("Failed to create metrics collector: {}", e),
                })?,
            );

        let match_manager = Arc::new(
            MatchManager::from_config(storage, &config, metrics_collector.clone()).map_err(
                |e| ServiceError::Initialization {
                    message: format!("Failed to initialize match manager: {}", e),
                },
            )?,
        );
        info!(
            "Rating calculator: {}",
            match_manager.rating_calculator().config()
        );

        Ok(Arc::new(Self {
            config,
            match_manager,
            metrics_collector,
            metrics_service: Mutex::new(None),
            background_tasks: Mutex::new(Vec::new()),
            is_running: Arc::new(RwLock::new(false)),
            started_at: Instant::now(),
        }))
    }

    /// Start the health server and background tasks
    pub async fn start(self: &Arc<Self>) -> Result<(), ServiceError> {
        info!("Starting versus match service");

        self.set_running(true).await;
        self.start_metrics_service().await?;
        self.start_background_tasks().await;

        info!("✅ Versus match service started successfully");
        Ok(())
    }

    /// Perform graceful shutdown
    pub async fn shutdown(&self) -> Result<(), ServiceError> {
        info!("Starting graceful shutdown of versus service");

        self.set_running(false).await;
        self.stop_background_tasks().await;

        info!("Stopping metrics service...");
        // dropping the service also releases its handle on this state
        if let Some(metrics_service) = self.metrics_service.lock().await.take() {
            if let Err(e) = metrics_service.stop().await {
                warn!("Failed to stop metrics service: {}", e);
            } else {
                info!("✅ Metrics service stopped");
            }
        }

        let final_stats =
            self.match_manager
                .stats()
                .map_err(|e| ServiceError::BackgroundTask {
                    message: format!("Failed to get final stats: {}", e),
                })?;

        info!("Final service statistics: {:?}", final_stats);
        info!("✅ Versus service shutdown completed");

        Ok(())
    }

    /// Get service configuration
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Check if service is running
    pub async fn is_running(&self) -> bool {
        *self.is_running.read().await
    }

    /// Flip the running flag without starting the server or tasks
    pub async fn set_running(&self, running: bool) {
        *self.is_running.write().await = running;
    }

    /// Get the match manager for command handling
    pub fn match_manager(&self) -> Arc<MatchManager> {
        self.match_manager.clone()
    }

    pub fn metrics_collector(&self) -> Arc<MetricsCollector> {
        self.metrics_collector.clone()
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Start metrics and health endpoints
    async fn start_metrics_service(self: &Arc<Self>) -> Result<(), ServiceError> {
        let port = self.config.service.health_port;
        info!("Starting metrics and health endpoints on port {}", port);

        let health_config = HealthServerConfig {
            port,
            host: "0.0.0.0".to_string(),
        };
        let health_server = Arc::new(
            HealthServer::new(health_config, self.metrics_collector.clone())
                .with_app_state(self.clone()),
        );
        let metrics_service = Arc::new(MetricsService::new(
            self.metrics_collector.clone(),
            health_server,
        ));
        *self.metrics_service.lock().await = Some(metrics_service.clone());

        let metrics_handle = tokio::spawn(async move {
            if let Err(e) = metrics_service.start().await {
                error!("Metrics service failed: {}", e);
            } else {
                info!("Metrics service task completed");
            }
        });
        self.background_tasks.lock().await.push(metrics_handle);

        // Give the server a moment to start up
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;

        info!("✅ Metrics service started on port {}", port);
        Ok(())
    }

    /// Start background maintenance tasks
    async fn start_background_tasks(&self) {
        info!("Starting background maintenance tasks...");

        // Stats gauge refresh
        let stats_task = {
            let match_manager = self.match_manager.clone();
            let is_running = self.is_running.clone();

            tokio::spawn(async move {
                let mut interval = tokio::time::interval(Duration::from_secs(30));
                info!("Stats refresh task started");

                while *is_running.read().await {
                    interval.tick().await;

                    // stats() refreshes the per-status gauges as a side effect
                    match match_manager.stats() {
                        Ok(stats) => debug!(
                            "Refreshed game gauges - pending: {}, confirmed: {}, finished: {}",
                            stats.pending_games, stats.confirmed_games, stats.finished_games
                        ),
                        Err(e) => warn!("Failed to get manager stats for metrics update: {}", e),
                    }
                }

                info!("Stats refresh task stopped");
            })
        };

        // Uptime and component health
        let health_metrics_task = {
            let metrics_collector = self.metrics_collector.clone();
            let storage = self.match_manager.storage();
            let is_running = self.is_running.clone();
            let started_at = self.started_at;

            tokio::spawn(async move {
                let mut interval = tokio::time::interval(Duration::from_secs(60));
                info!("Health metrics task started");

                while *is_running.read().await {
                    interval.tick().await;

                    let uptime_seconds = started_at.elapsed().as_secs() as i64;
                    metrics_collector
                        .service()
                        .uptime_seconds
                        .set(uptime_seconds);

                    let storage_healthy = storage.health_check().is_ok();
                    metrics_collector.update_component_health("storage", storage_healthy);
                    metrics_collector.update_component_health("match_manager", true);
                    metrics_collector.update_health_status(if storage_healthy { 2 } else { 0 });

                    debug!(
                        "Updated service health metrics - uptime: {}s, storage healthy: {}",
                        uptime_seconds, storage_healthy
                    );
                }

                info!("Health metrics task stopped");
            })
        };

        let mut tasks = self.background_tasks.lock().await;
        tasks.push(stats_task);
        tasks.push(health_metrics_task);

        info!("2 background maintenance tasks started successfully");
    }

    /// Stop all background tasks
    async fn stop_background_tasks(&self) {
        let mut tasks = self.background_tasks.lock().await;
        let task_count = tasks.len();
        if task_count == 0 {
            info!("No background tasks to stop");
            return;
        }

        info!("Stopping {} background tasks...", task_count);

        for (i, task) in tasks.drain(..).enumerate() {
            debug!("Aborting background task {}/{}", i + 1, task_count);
            task.abort();
        }

        info!("✅ All {} background tasks stopped", task_count);
    }
}
