//! Metrics collection using Prometheus
//!
//! This module provides metrics collection for the versus match service
//! using Prometheus metrics.

use crate::lifecycle::manager::MatchManagerStats;
use crate::types::{MatchFormat, RatingChange};
use anyhow::Result;
use prometheus::{
    Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec,
    Opts, Registry,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Main metrics collector for the match service
#[derive(Clone)]
pub struct MetricsCollector {
    /// Prometheus registry
    registry: Arc<Registry>,

    /// Service-level metrics
    service_metrics: ServiceMetrics,

    /// Game lifecycle metrics
    game_metrics: GameMetrics,

    /// Slot acceptance metrics
    slot_metrics: SlotMetrics,

    /// Rating metrics
    rating_metrics: RatingMetrics,

    /// Performance metrics
    performance_metrics: PerformanceMetrics,
}

/// Service-level metrics
#[derive(Clone)]
pub struct ServiceMetrics {
    /// Service uptime in seconds
    pub uptime_seconds: IntGauge,

    /// Commands handled, by command and outcome
    pub commands_total: IntCounterVec,

    /// Health check status (0=unhealthy, 1=degraded, 2=healthy)
    pub health_status: IntGauge,

    /// Component health status
    pub component_health: IntGaugeVec,
}

/// Game lifecycle metrics
#[derive(Clone)]
pub struct GameMetrics {
    /// Games created, by format
    pub games_created_total: IntCounterVec,

    /// Games promoted to confirmed, by format
    pub games_confirmed_total: IntCounterVec,

    /// Games settled, by format
    pub games_finished_total: IntCounterVec,

    /// Games per status as of the last stats refresh
    pub games_by_status: IntGaugeVec,
}

/// Slot acceptance metrics
#[derive(Clone)]
pub struct SlotMetrics {
    /// Accepted slots, by selector kind (open / targeted)
    pub slots_accepted_total: IntCounterVec,

    /// Rejected acceptances, by error kind
    pub acceptances_rejected_total: IntCounterVec,

    /// Invitations deleted on acceptance
    pub invitations_removed_total: IntCounter,
}

/// Rating metrics
#[derive(Clone)]
pub struct RatingMetrics {
    /// Absolute rating change per participant, by format
    pub rating_delta: HistogramVec,

    /// Ratings written by settlement
    pub rating_distribution: Histogram,
}

/// Performance metrics
#[derive(Clone)]
pub struct PerformanceMetrics {
    /// Command handling time, by command
    pub command_duration: HistogramVec,

    /// Rating calculation time
    pub rating_calculation_duration: Histogram,
}

impl MetricsCollector {
    /// Create a new metrics collector with default registry
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());
        Self::with_registry(registry)
    }

    /// Create a new metrics collector with custom registry
    pub fn with_registry(registry: Arc<Registry>) -> Result<Self> {
        let service_metrics = ServiceMetrics::new(&registry)?;
        let game_metrics = GameMetrics::new(&registry)?;
        let slot_metrics = SlotMetrics::new(&registry)?;
        let rating_metrics = RatingMetrics::new(&registry)?;
        let performance_metrics = PerformanceMetrics::new(&registry)?;

        Ok(Self {
            registry,
            service_metrics,
            game_metrics,
            slot_metrics,
            rating_metrics,
            performance_metrics,
        })
    }

    /// Get the Prometheus registry
    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    pub fn service(&self) -> &ServiceMetrics {
        &self.service_metrics
    }

    pub fn game(&self) -> &GameMetrics {
        &self.game_metrics
    }

    pub fn slot(&self) -> &SlotMetrics {
        &self.slot_metrics
    }

    pub fn rating(&self) -> &RatingMetrics {
        &self.rating_metrics
    }

    pub fn performance(&self) -> &PerformanceMetrics {
        &self.performance_metrics
    }

    /// Refresh gauges from manager stats
    pub fn update_from_manager_stats(&self, stats: &MatchManagerStats) {
        let games = &self.game_metrics.games_by_status;
        games.with_label_values(&["pending"]).set(stats.pending_games as i64);
        games
            .with_label_values(&["confirmed"])
            .set(stats.confirmed_games as i64);
        games
            .with_label_values(&["finished"])
            .set(stats.finished_games as i64);
    }

    /// Record a command result and its duration
    pub fn record_command(&self, command: &str, success: bool, duration: Duration) {
        let outcome = if success { "success" } else { "error" };

        self.service_metrics
            .commands_total
            .with_label_values(&[command, outcome])
            .inc();

        self.performance_metrics
            .command_duration
            .with_label_values(&[command])
            .observe(duration.as_secs_f64());
    }

    /// Record a game being created
    pub fn record_game_created(&self, format: MatchFormat) {
        self.game_metrics
            .games_created_total
            .with_label_values(&[format.label()])
            .inc();
    }

    /// Record a game being promoted to confirmed
    pub fn record_game_confirmed(&self, format: MatchFormat) {
        self.game_metrics
            .games_confirmed_total
            .with_label_values(&[format.label()])
            .inc();
    }

    /// Record a successful acceptance
    pub fn record_slot_accepted(&self, was_open: bool, invitations_removed: usize) {
        let selector = if was_open { "open" } else { "targeted" };

        self.slot_metrics
            .slots_accepted_total
            .with_label_values(&[selector])
            .inc();
        self.slot_metrics
            .invitations_removed_total
            .inc_by(invitations_removed as u64);
    }

    /// Record a rejected acceptance
    pub fn record_acceptance_rejected(&self, reason: &str) {
        self.slot_metrics
            .acceptances_rejected_total
            .with_label_values(&[reason])
            .inc();
    }

    /// Record a settled game and the rating changes it produced
    pub fn record_game_finished(&self, format: MatchFormat, changes: &[RatingChange]) {
        self.game_metrics
            .games_finished_total
            .with_label_values(&[format.label()])
            .inc();

        for change in changes {
            self.rating_metrics
                .rating_delta
                .with_label_values(&[format.label()])
                .observe(change.delta().abs());
            self.rating_metrics
                .rating_distribution
                .observe(change.new_rating);
        }
    }

    /// Record rating calculation duration
    pub fn record_rating_calculation(&self, duration: Duration) {
        self.performance_metrics
            .rating_calculation_duration
            .observe(duration.as_secs_f64());
    }

    /// Update health status
    pub fn update_health_status(&self, status: u8) {
        self.service_metrics.health_status.set(status as i64);
    }

    /// Update component health
    pub fn update_component_health(&self, component: &str, healthy: bool) {
        let status = if healthy { 1 } else { 0 };
        self.service_metrics
            .component_health
            .with_label_values(&[component])
            .set(status);
    }

    /// Create a timer for measuring operation duration
    pub fn start_timer(&self) -> MetricsTimer {
        MetricsTimer::new()
    }
}

/// Timer for measuring operation durations
pub struct MetricsTimer {
    start: Instant,
}

impl MetricsTimer {
    fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get the elapsed duration
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Stop the timer and return the duration
    pub fn stop(self) -> Duration {
        self.elapsed()
    }
}

impl ServiceMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let uptime_seconds = IntGauge::new("versus_uptime_seconds", "Service uptime in seconds")?;
        registry.register(Box::new(uptime_seconds.clone()))?;

        let commands_total = IntCounterVec::new(
            Opts::new("versus_commands_total", "Total commands handled"),
            &["command", "outcome"],
        )?;
        registry.register(Box::new(commands_total.clone()))?;

        let health_status = IntGauge::new(
            "versus_health_status",
            "Health status (0=unhealthy, 1=degraded, 2=healthy)",
        )?;
        registry.register(Box::new(health_status.clone()))?;

        let component_health = IntGaugeVec::new(
            Opts::new("versus_component_health", "Component health status"),
            &["component"],
        )?;
        registry.register(Box::new(component_health.clone()))?;

        Ok(Self {
            uptime_seconds,
            commands_total,
            health_status,
            component_health,
        })
    }
}

impl GameMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let games_created_total = IntCounterVec::new(
            Opts::new("versus_games_created_total", "Total games created"),
            &["format"],
        )?;
        registry.register(Box::new(games_created_total.clone()))?;

        let games_confirmed_total = IntCounterVec::new(
            Opts::new("versus_games_confirmed_total", "Total games fully staffed"),
            &["format"],
        )?;
        registry.register(Box::new(games_confirmed_total.clone()))?;

        let games_finished_total = IntCounterVec::new(
            Opts::new("versus_games_finished_total", "Total games settled"),
            &["format"],
        )?;
        registry.register(Box::new(games_finished_total.clone()))?;

        let games_by_status = IntGaugeVec::new(
            Opts::new("versus_games", "Number of games by status"),
            &["status"],
        )?;
        registry.register(Box::new(games_by_status.clone()))?;

        Ok(Self {
            games_created_total,
            games_confirmed_total,
            games_finished_total,
            games_by_status,
        })
    }
}

impl SlotMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let slots_accepted_total = IntCounterVec::new(
            Opts::new("versus_slots_accepted_total", "Total slots accepted"),
            &["selector"],
        )?;
        registry.register(Box::new(slots_accepted_total.clone()))?;

        let acceptances_rejected_total = IntCounterVec::new(
            Opts::new(
                "versus_acceptances_rejected_total",
                "Total rejected slot acceptances",
            ),
            &["reason"],
        )?;
        registry.register(Box::new(acceptances_rejected_total.clone()))?;

        let invitations_removed_total = IntCounter::new(
            "versus_invitations_removed_total",
            "Total invitations removed on acceptance",
        )?;
        registry.register(Box::new(invitations_removed_total.clone()))?;

        Ok(Self {
            slots_accepted_total,
            acceptances_rejected_total,
            invitations_removed_total,
        })
    }
}

impl RatingMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let rating_delta = HistogramVec::new(
            HistogramOpts::new(
                "versus_rating_delta",
                "Absolute rating change per participant",
            )
            .buckets(vec![1.0, 2.0, 4.0, 8.0, 16.0, 24.0, 32.0, 48.0, 64.0]),
            &["format"],
        )?;
        registry.register(Box::new(rating_delta.clone()))?;

        let rating_distribution = Histogram::with_opts(
            HistogramOpts::new("versus_rating_distribution", "Player rating distribution")
                .buckets(vec![
                    500.0, 800.0, 1000.0, 1200.0, 1400.0, 1600.0, 1800.0, 2000.0, 2500.0,
                ]),
        )?;
        registry.register(Box::new(rating_distribution.clone()))?;

        Ok(Self {
            rating_delta,
            rating_distribution,
        })
    }
}

impl PerformanceMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let command_duration = HistogramVec::new(
            HistogramOpts::new(
                "versus_command_duration_seconds",
                "Command processing time",
            )
            .buckets(vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5]),
            &["command"],
        )?;
        registry.register(Box::new(command_duration.clone()))?;

        let rating_calculation_duration = Histogram::with_opts(
            HistogramOpts::new(
                "versus_rating_calculation_duration_seconds",
                "Rating calculation time",
            )
            .buckets(vec![0.00001, 0.0001, 0.001, 0.005, 0.01]),
        )?;
        registry.register(Box::new(rating_calculation_duration.clone()))?;

        Ok(Self {
            command_duration,
            rating_calculation_duration,
        })
    }
}
