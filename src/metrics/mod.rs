//! Metrics and monitoring for the versus match service
//!
//! Prometheus collection for the match lifecycle plus the HTTP server that
//! exposes health probes and the scrape endpoint.

pub mod collector;
pub mod health;

pub use collector::{
    GameMetrics, MetricsCollector, MetricsTimer, PerformanceMetrics, RatingMetrics,
    ServiceMetrics, SlotMetrics,
};
pub use health::{HealthServer, HealthServerConfig};

use std::sync::Arc;

/// Collector and health server managed as one unit
#[derive(Clone)]
pub struct MetricsService {
    collector: Arc<MetricsCollector>,
    health_server: Arc<HealthServer>,
}

impl MetricsService {
    pub fn new(collector: Arc<MetricsCollector>, health_server: Arc<HealthServer>) -> Self {
        Self {
            collector,
            health_server,
        }
    }

    pub fn collector(&self) -> Arc<MetricsCollector> {
        self.collector.clone()
    }

    pub fn health_server(&self) -> Arc<HealthServer> {
        self.health_server.clone()
    }

    /// Serve the health endpoints until stopped
    pub async fn start(&self) -> anyhow::Result<()> {
        self.health_server.start().await
    }

    pub async fn stop(&self) -> anyhow::Result<()> {
        self.health_server.stop().await
    }
}
