//! Rating system configuration

use crate::error::{MatchError, Result};
use crate::rating::elo::DEFAULT_K_FACTOR;
use serde::{Deserialize, Serialize};

/// Rating given to newly registered users
pub const DEFAULT_INITIAL_RATING: f64 = 1000.0;

/// Parameters of the score-share rating update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RatingConfig {
    /// Maximum single-pairing swing
    pub k_factor: f64,
    /// Rating for new users
    pub initial_rating: f64,
}

impl Default for RatingConfig {
    fn default() -> Self {
        Self {
            k_factor: DEFAULT_K_FACTOR,
            initial_rating: DEFAULT_INITIAL_RATING,
        }
    }
}

impl RatingConfig {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        if !self.k_factor.is_finite() || self.k_factor <= 0.0 {
            return Err(MatchError::Configuration {
                message: "K-factor must be a positive number".to_string(),
            });
        }

        if !self.initial_rating.is_finite() {
            return Err(MatchError::Configuration {
                message: "Initial rating must be finite".to_string(),
            });
        }

        Ok(())
    }
}
