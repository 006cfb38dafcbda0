//! Rating calculator trait and implementations
//!
//! Settlement hands a [`MatchOutcome`] to a [`RatingCalculator`] and persists
//! whatever changes come back. The production calculator dispatches to the
//! 1v1 or 2v2 update in [`crate::rating::elo`].

use crate::config::RatingConfig;
use crate::error::{MatchError, Result};
use crate::rating::elo::{
    double_match_update, single_match_update, DoubleMatchRating, SingleMatchRating,
};
use crate::types::{RatingChange, UserId};
use serde::{Deserialize, Serialize};

/// Participants and final scores of a settled game
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchOutcome {
    /// (user, current rating) for each member of the winning team
    pub winners: Vec<(UserId, f64)>,
    /// (user, current rating) for each member of the losing team
    pub losers: Vec<(UserId, f64)>,
    pub winner_score: f64,
    pub loser_score: f64,
}

impl MatchOutcome {
    /// Check the score precondition of the rating update
    pub fn validate_scores(&self) -> Result<()> {
        if !self.winner_score.is_finite() || !self.loser_score.is_finite() {
            return Err(MatchError::validation("Scores must be finite"));
        }
        if self.winner_score < 0.0 || self.loser_score < 0.0 {
            return Err(MatchError::validation("Scores must be non-negative"));
        }
        if self.winner_score + self.loser_score <= 0.0 {
            return Err(MatchError::validation("Scores cannot both be zero"));
        }
        Ok(())
    }
}

/// Trait for calculating rating changes after games
pub trait RatingCalculator: Send + Sync {
    /// Calculate rating changes for every participant, winners first
    fn calculate_rating_changes(&self, outcome: &MatchOutcome) -> Result<Vec<RatingChange>>;

    /// Get the initial rating for new players
    fn initial_rating(&self) -> f64;

    /// Get current configuration as JSON
    fn config(&self) -> serde_json::Value;
}

/// Score-share Elo calculator
#[derive(Debug, Clone)]
pub struct EloRatingCalculator {
    config: RatingConfig,
}

impl EloRatingCalculator {
    /// Create a new calculator
    pub fn new(config: RatingConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn k_factor(&self) -> f64 {
        self.config.k_factor
    }

    fn single(&self, outcome: &MatchOutcome) -> Vec<RatingChange> {
        let (winner_id, winner_rating) = outcome.winners[0];
        let (loser_id, loser_rating) = outcome.losers[0];

        let updated = single_match_update(
            SingleMatchRating {
                winner_rating,
                loser_rating,
            },
            outcome.winner_score,
            outcome.loser_score,
            self.config.k_factor,
        );

        vec![
            RatingChange {
                user_id: winner_id,
                old_rating: winner_rating,
                new_rating: updated.winner_rating,
            },
            RatingChange {
                user_id: loser_id,
                old_rating: loser_rating,
                new_rating: updated.loser_rating,
            },
        ]
    }

    fn double(&self, outcome: &MatchOutcome) -> Vec<RatingChange> {
        let (first_winner, first_winner_rating) = outcome.winners[0];
        let (second_winner, second_winner_rating) = outcome.winners[1];
        let (first_loser, first_loser_rating) = outcome.losers[0];
        let (second_loser, second_loser_rating) = outcome.losers[1];

        let updated = double_match_update(
            DoubleMatchRating {
                first_winner_rating,
                second_winner_rating,
                first_loser_rating,
                second_loser_rating,
            },
            outcome.winner_score,
            outcome.loser_score,
            self.config.k_factor,
        );

        [
            (first_winner, first_winner_rating, updated.first_winner_rating),
            (second_winner, second_winner_rating, updated.second_winner_rating),
            (first_loser, first_loser_rating, updated.first_loser_rating),
            (second_loser, second_loser_rating, updated.second_loser_rating),
        ]
        .into_iter()
        .map(|(user_id, old_rating, new_rating)| RatingChange {
            user_id,
            old_rating,
            new_rating,
        })
        .collect()
    }
}

impl Default for EloRatingCalculator {
    fn default() -> Self {
        Self {
            config: RatingConfig::default(),
        }
    }
}

impl RatingCalculator for EloRatingCalculator {
    fn calculate_rating_changes(&self, outcome: &MatchOutcome) -> Result<Vec<RatingChange>> {
        outcome.validate_scores()?;

        match (outcome.winners.len(), outcome.losers.len()) {
            (1, 1) => Ok(self.single(outcome)),
            (2, 2) => Ok(self.double(outcome)),
            (winners, losers) => Err(MatchError::integrity(format!(
                "Cannot rate {} winners against {} losers",
                winners, losers
            ))),
        }
    }

    fn initial_rating(&self) -> f64 {
        self.config.initial_rating
    }

    fn config(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "score_share_elo",
            "k_factor": self.config.k_factor,
            "initial_rating": self.config.initial_rating
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn outcome(
        winners: &[f64],
        losers: &[f64],
        winner_score: f64,
        loser_score: f64,
    ) -> MatchOutcome {
        MatchOutcome {
            winners: winners.iter().map(|r| (Uuid::new_v4(), *r)).collect(),
            losers: losers.iter().map(|r| (Uuid::new_v4(), *r)).collect(),
            winner_score,
            loser_score,
        }
    }

    #[test]
    fn test_single_outcome() {
        let calculator = EloRatingCalculator::default();
        let outcome = outcome(&[1200.0], &[1200.0], 1.0, 0.0);

        let changes = calculator.calculate_rating_changes(&outcome).unwrap();

        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].user_id, outcome.winners[0].0);
        assert_eq!(changes[0].new_rating, 1216.0);
        assert_eq!(changes[0].delta(), 16.0);
        assert_eq!(changes[1].user_id, outcome.losers[0].0);
        assert_eq!(changes[1].new_rating, 1184.0);
    }

    #[test]
    fn test_double_outcome() {
        let calculator = EloRatingCalculator::default();
        let outcome = outcome(&[1200.0, 1200.0], &[1200.0, 1200.0], 1.0, 0.0);

        let changes = calculator.calculate_rating_changes(&outcome).unwrap();

        assert_eq!(changes.len(), 4);
        assert_eq!(changes[0].user_id, outcome.winners[0].0);
        assert_eq!(changes[1].user_id, outcome.winners[1].0);
        assert_eq!(changes[2].user_id, outcome.losers[0].0);
        assert_eq!(changes[3].user_id, outcome.losers[1].0);
        assert!(changes[..2].iter().all(|c| c.new_rating == 1232.0));
        assert!(changes[2..].iter().all(|c| c.new_rating == 1168.0));
    }

    #[test]
    fn test_mismatched_sides_rejected() {
        let calculator = EloRatingCalculator::default();
        let err = calculator
            .calculate_rating_changes(&outcome(&[1000.0, 1000.0], &[1000.0], 3.0, 1.0))
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Integrity);
    }

    #[test]
    fn test_invalid_scores_rejected() {
        let calculator = EloRatingCalculator::default();

        let zero = outcome(&[1000.0], &[1000.0], 0.0, 0.0);
        assert!(calculator.calculate_rating_changes(&zero).is_err());

        let negative = outcome(&[1000.0], &[1000.0], 3.0, -1.0);
        assert!(calculator.calculate_rating_changes(&negative).is_err());
    }

    #[test]
    fn test_custom_k_factor() {
        let calculator = EloRatingCalculator::new(RatingConfig {
            k_factor: 16.0,
            initial_rating: 1500.0,
        })
        .unwrap();

        assert_eq!(calculator.initial_rating(), 1500.0);
        let changes = calculator
            .calculate_rating_changes(&outcome(&[1200.0], &[1200.0], 1.0, 0.0))
            .unwrap();
        assert_eq!(changes[0].new_rating, 1208.0);
        assert_eq!(calculator.config()["k_factor"], 16.0);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let result = EloRatingCalculator::new(RatingConfig {
            k_factor: -1.0,
            initial_rating: 1000.0,
        });
        assert!(result.is_err());
    }
}
