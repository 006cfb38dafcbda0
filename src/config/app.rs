//! Main application configuration
//!
//! This module defines the primary configuration structures for the versus
//! match service, including environment variable and TOML file loading and
//! validation.

use crate::config::rating::RatingConfig;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub service: ServiceSettings,
    pub rating: RatingConfig,
    pub matchmaking: MatchmakingSettings,
}

/// Service-level settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    /// Service name for logging and metrics
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Port for health check endpoint
    pub health_port: u16,
    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_seconds: u64,
}

/// Match creation policy
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchmakingSettings {
    /// Fail match creation when a targeted user does not exist, instead of
    /// creating a slot nobody can claim
    pub reject_unknown_targets: bool,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            name: "versus".to_string(),
            log_level: "info".to_string(),
            health_port: 8080,
            shutdown_timeout_seconds: 30,
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| anyhow!("Invalid {} value: {}", key, value)),
        Err(_) => Ok(None),
    }
}

impl AppConfig {
    /// Load configuration from environment variables with fallback to defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        validate_config(&config)?;
        Ok(config)
    }

    /// Load configuration from a TOML file, then apply environment overrides
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let mut config = Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.apply_env()?;
        validate_config(&config)?;
        Ok(config)
    }

    /// Parse configuration from TOML text; missing keys take defaults
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents)?;
        Ok(config)
    }

    fn apply_env(&mut self) -> Result<()> {
        // Service settings
        if let Ok(name) = env::var("SERVICE_NAME") {
            self.service.name = name;
        }
        if let Ok(log_level) = env::var("LOG_LEVEL") {
            self.service.log_level = log_level;
        }
        if let Some(port) = parse_env("HEALTH_PORT")? {
            self.service.health_port = port;
        }
        if let Some(timeout) = parse_env("SHUTDOWN_TIMEOUT_SECONDS")? {
            self.service.shutdown_timeout_seconds = timeout;
        }

        // Rating settings
        if let Some(k_factor) = parse_env("RATING_K_FACTOR")? {
            self.rating.k_factor = k_factor;
        }
        if let Some(initial) = parse_env("INITIAL_RATING")? {
            self.rating.initial_rating = initial;
        }

        // Matchmaking settings
        if let Some(reject) = parse_env("REJECT_UNKNOWN_TARGETS")? {
            self.matchmaking.reject_unknown_targets = reject;
        }

        Ok(())
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.service.shutdown_timeout_seconds)
    }
}

/// Validate configuration values
pub fn validate_config(config: &AppConfig) -> Result<()> {
    match config.service.log_level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => {}
        _ => return Err(anyhow!("Invalid log level: {}", config.service.log_level)),
    }

    if config.service.name.trim().is_empty() {
        return Err(anyhow!("Service name cannot be empty"));
    }

    if config.service.health_port == 0 {
        return Err(anyhow!("Health port cannot be 0"));
    }

    if config.service.shutdown_timeout_seconds == 0 {
        return Err(anyhow!("Shutdown timeout must be greater than 0"));
    }

    config.rating.validate()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert_eq!(config.service.name, "versus");
        assert_eq!(config.rating.k_factor, 32.0);
        assert!(!config.matchmaking.reject_unknown_targets);
        assert_eq!(config.shutdown_timeout(), Duration::from_secs(30));
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_partial_toml_takes_defaults() {
        let config = AppConfig::from_toml(
            r#"
            [service]
            health_port = 9090

            [matchmaking]
            reject_unknown_targets = true
            "#,
        )
        .unwrap();

        assert_eq!(config.service.health_port, 9090);
        assert_eq!(config.service.log_level, "info");
        assert_eq!(config.rating.initial_rating, 1000.0);
        assert!(config.matchmaking.reject_unknown_targets);
    }

    #[test]
    fn test_invalid_toml_rejected() {
        assert!(AppConfig::from_toml("[service]\nhealth_port = \"high\"").is_err());
    }

    #[test]
    fn test_validation_failures() {
        let mut config = AppConfig::default();
        config.service.log_level = "loud".to_string();
        assert!(validate_config(&config).is_err());

        let mut config = AppConfig::default();
        config.service.health_port = 0;
        assert!(validate_config(&config).is_err());

        let mut config = AppConfig::default();
        config.service.shutdown_timeout_seconds = 0;
        assert!(validate_config(&config).is_err());

        let mut config = AppConfig::default();
        config.rating.k_factor = -4.0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_missing_file() {
        let err = AppConfig::from_file("/nonexistent/versus.toml").unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
