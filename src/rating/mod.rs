//! Rating system used when a game is settled
//!
//! This module provides the score-share Elo update functions and the
//! calculator seam that settlement goes through.

pub mod calculator;
pub mod elo;

// Re-export commonly used types
pub use calculator::{EloRatingCalculator, MatchOutcome, RatingCalculator};
pub use elo::{
    double_match_update, single_match_update, DoubleMatchRating, SingleMatchRating,
    DEFAULT_K_FACTOR,
};
