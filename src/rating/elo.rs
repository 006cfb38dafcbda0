//! Score-share Elo variant used to settle finished games
//!
//! Unlike classical Elo, the actual result is the winner's share of the total
//! score rather than a flat 1/0, so a 10-9 win moves ratings far less than a
//! 10-0 win. Team games collapse the four cross pairings into one shared
//! adjustment that is rounded up.
//!
//! Precondition for every function here: scores are non-negative and not both
//! zero. Callers validate this; the functions themselves never fail.

use serde::{Deserialize, Serialize};

/// K-factor used by every settlement path
pub const DEFAULT_K_FACTOR: f64 = 32.0;

/// Ratings of the two players of a 1v1 game, winner first
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SingleMatchRating {
    pub winner_rating: f64,
    pub loser_rating: f64,
}

/// Ratings of the four players of a 2v2 game
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DoubleMatchRating {
    pub first_winner_rating: f64,
    pub second_winner_rating: f64,
    pub first_loser_rating: f64,
    pub second_loser_rating: f64,
}

/// `10^(r/400)`
pub fn transformed_rating(rating: f64) -> f64 {
    10f64.powf(rating / 400.0)
}

/// Expected share of the total score for `rating` against `opponent`
pub fn expected_share(rating: f64, opponent: f64) -> f64 {
    let own = transformed_rating(rating);
    own / (own + transformed_rating(opponent))
}

/// Updated ratings after a 1v1 game. No rounding is applied.
pub fn single_match_update(
    rating: SingleMatchRating,
    winner_score: f64,
    loser_score: f64,
    k: f64,
) -> SingleMatchRating {
    let expected_winner_share = expected_share(rating.winner_rating, rating.loser_rating);
    let expected_loser_share = 1.0 - expected_winner_share;

    let actual_winner_share = winner_score / (winner_score + loser_score);
    let actual_loser_share = 1.0 - actual_winner_share;

    SingleMatchRating {
        winner_rating: rating.winner_rating + k * (actual_winner_share - expected_winner_share),
        loser_rating: rating.loser_rating + k * (actual_loser_share - expected_loser_share),
    }
}

/// Mean rating gap after running the four winner/loser pairings of a 2v2 game
/// as independent 1v1 games.
///
/// Pairings are (w1,l1), (w2,l2), (w1,l2), (w2,l1); each contributes
/// `|updated_winner - updated_loser|`.
pub fn average_pairing_delta(
    rating: DoubleMatchRating,
    winner_score: f64,
    loser_score: f64,
    k: f64,
) -> f64 {
    let pairings = [
        (rating.first_winner_rating, rating.first_loser_rating),
        (rating.second_winner_rating, rating.second_loser_rating),
        (rating.first_winner_rating, rating.second_loser_rating),
        (rating.second_winner_rating, rating.first_loser_rating),
    ];

    let total: f64 = pairings
        .iter()
        .map(|&(winner_rating, loser_rating)| {
            let updated = single_match_update(
                SingleMatchRating {
                    winner_rating,
                    loser_rating,
                },
                winner_score,
                loser_score,
                k,
            );
            (updated.winner_rating - updated.loser_rating).abs()
        })
        .sum();

    total / pairings.len() as f64
}

/// Updated ratings after a 2v2 game.
///
/// Every winner gains and every loser drops the same average pairing delta,
/// and all four results are rounded up with `ceil`.
pub fn double_match_update(
    rating: DoubleMatchRating,
    winner_score: f64,
    loser_score: f64,
    k: f64,
) -> DoubleMatchRating {
    let average_delta = average_pairing_delta(rating, winner_score, loser_score, k);

    DoubleMatchRating {
        first_winner_rating: (rating.first_winner_rating + average_delta).ceil(),
        second_winner_rating: (rating.second_winner_rating + average_delta).ceil(),
        first_loser_rating: (rating.first_loser_rating - average_delta).ceil(),
        second_loser_rating: (rating.second_loser_rating - average_delta).ceil(),
    }
}
