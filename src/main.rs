//! Main entry point for the versus match service
//!
//! Loads configuration, initializes logging, and runs the match manager with
//! its health and metrics endpoints until a shutdown signal arrives.
//!
//! The binary carries no command transport: it serves health, readiness,
//! metrics and stats over an empty in-memory store. Commands are issued
//! through the library (`AppState::with_storage` and
//! `AppState::match_manager`) or replayed with the `match-sim` binary.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio::time::Duration;
use tracing::{error, info, warn};
use versus::config::{validate_config, AppConfig};
use versus::service::{AppState, HealthCheck, HealthStatus};

/// Versus Match Service - 1v1 and 2v2 match lifecycle with Elo settlement
#[derive(Parser)]
#[command(
    name = "versus",
    version,
    about = "Match lifecycle and rating service for 1v1 and 2v2 contests",
    long_about = "Versus turns decided pairings into game rosters, lets invited players claim \
                 their slots, promotes fully staffed games, and settles reported scores into \
                 score-share Elo rating changes."
)]
struct Args {
    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "Path to configuration file (TOML format)"
    )]
    config: Option<PathBuf>,

    #[arg(long, help = "Perform a health check and exit with status code")]
    health_check: bool,

    #[arg(
        short,
        long,
        value_name = "LEVEL",
        help = "Override log level (trace, debug, info, warn, error)"
    )]
    log_level: Option<String>,

    #[arg(long, value_name = "PORT", help = "Override health server port")]
    health_port: Option<u16>,

    #[arg(long, value_name = "K", help = "Override the Elo K-factor")]
    k_factor: Option<f64>,

    #[arg(long, help = "Reject targeted selectors that name unknown users")]
    reject_unknown_targets: bool,

    #[arg(short, long, help = "Enable debug mode with verbose logging")]
    debug: bool,

    #[arg(
        long,
        help = "Validate configuration and exit without starting service"
    )]
    dry_run: bool,
}

/// Initialize structured logging with the configured level
fn init_logging(log_level: &str) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.into()),
        )
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    Ok(())
}

/// Run one health check and report it through the exit status
async fn perform_health_check(config: AppConfig) -> Result<()> {
    info!("Performing health check...");

    let app_state = AppState::new(config).await?;
    // a one-shot probe never starts the server, so count it as running
    app_state.set_running(true).await;

    let health = HealthCheck::check(app_state).await?;
    println!("Health Check: {}", health.status);
    for check in &health.checks {
        println!("  {}: {}", check.name, check.status);
    }
    println!("  Games Created: {}", health.stats.manager.games_created);
    println!("  Games Finished: {}", health.stats.manager.games_finished);

    if health.status == HealthStatus::Healthy {
        std::process::exit(0);
    }
    std::process::exit(1);
}

/// Wait for SIGINT or SIGTERM
async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())
            .context("Failed to install SIGTERM handler")?;

        tokio::select! {
            result = signal::ctrl_c() => {
                result.context("Failed to listen for Ctrl+C")?;
                info!("Received SIGINT (Ctrl+C) signal");
            },
            _ = terminate.recv() => {
                info!("Received SIGTERM signal");
            },
        }
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c()
            .await
            .context("Failed to listen for Ctrl+C")?;
        info!("Received SIGINT (Ctrl+C) signal");
    }

    Ok(())
}

/// Log a periodic summary of the manager
async fn health_check_task(app_state: Arc<AppState>) {
    let mut interval = tokio::time::interval(Duration::from_secs(30));

    while app_state.is_running().await {
        interval.tick().await;

        match HealthCheck::check(app_state.clone()).await {
            Ok(health) => {
                let stats = &health.stats.manager;
                info!(
                    "Health check: {} - {} pending, {} confirmed, {} finished games",
                    health.status, stats.pending_games, stats.confirmed_games, stats.finished_games
                );
            }
            Err(e) => {
                warn!("Health check failed: {}", e);
            }
        }
    }
}

fn display_startup_banner(config: &AppConfig) {
    info!("🚀 Versus Match Service");
    info!("   Service: {}", config.service.name);
    info!("   Log level: {}", config.service.log_level);
    info!("   Health port: {}", config.service.health_port);
    info!(
        "   Elo: k_factor={}, initial_rating={}",
        config.rating.k_factor, config.rating.initial_rating
    );
    info!(
        "   Reject unknown targets: {}",
        config.matchmaking.reject_unknown_targets
    );
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
}

/// Load configuration from file or environment, then apply CLI overrides
fn load_config(args: &Args) -> Result<AppConfig> {
    let mut config = if let Some(config_path) = &args.config {
        AppConfig::from_file(config_path)?
    } else {
        AppConfig::from_env()?
    };

    if let Some(log_level) = &args.log_level {
        config.service.log_level = log_level.clone();
    }

    if args.debug {
        config.service.log_level = "debug".to_string();
    }

    if let Some(health_port) = args.health_port {
        config.service.health_port = health_port;
    }

    if let Some(k_factor) = args.k_factor {
        config.rating.k_factor = k_factor;
    }

    if args.reject_unknown_targets {
        config.matchmaking.reject_unknown_targets = true;
    }

    validate_config(&config)?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = load_config(&args).unwrap_or_else(|e| {
        eprintln!("Configuration error: {:#}", e);
        std::process::exit(1);
    });

    if let Err(e) = init_logging(&config.service.log_level) {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    if args.health_check {
        return perform_health_check(config).await;
    }

    display_startup_banner(&config);

    if args.dry_run {
        info!("Configuration validation successful");
        info!("Dry run completed - exiting without starting service");
        return Ok(());
    }

    info!("Initializing service components...");
    let app_state = match AppState::new(config.clone()).await {
        Ok(state) => state,
        Err(e) => {
            error!("Failed to initialize application: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = app_state.start().await {
        error!("Failed to start service: {}", e);
        std::process::exit(1);
    }

    let health_task = {
        let app_state = app_state.clone();
        tokio::spawn(async move {
            health_check_task(app_state).await;
        })
    };

    info!("✅ Versus Match Service is running");
    info!("Press Ctrl+C to shutdown gracefully...");

    if let Err(e) = wait_for_shutdown_signal().await {
        error!("Signal handling failed: {:#}", e);
    }

    info!("🛑 Shutdown signal received, beginning graceful shutdown...");
    health_task.abort();

    match tokio::time::timeout(config.shutdown_timeout(), app_state.shutdown()).await {
        Ok(Ok(())) => info!("✅ Graceful shutdown completed successfully"),
        Ok(Err(e)) => error!("Shutdown finished with errors: {}", e),
        Err(_) => warn!("⚠️  Shutdown timeout exceeded, forcing exit"),
    }

    info!("🛑 Versus Match Service stopped");
    Ok(())
}
