//! Score settlement
//!
//! Settling a game writes the final status, both team scores and every
//! participant's new rating in one guarded batch, so a concurrent settlement
//! of the same game (or of another game sharing a participant) cannot apply
//! on top of stale data.

use crate::error::{MatchError, Result};
use crate::rating::{MatchOutcome, RatingCalculator};
use crate::storage::{Precondition, Record, Storage, WriteBatch};
use crate::types::{
    EntityKind, Game, GameStatus, RatingChange, RosterSnapshot, SubmitScore, Team, TeamId,
    TeamRoster, User,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Result of a successful settlement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementOutcome {
    /// The game as written, status finished
    pub game: Game,
    pub winner_team_id: TeamId,
    pub loser_team_id: TeamId,
    /// Winners first, each side in slot order
    pub rating_changes: Vec<RatingChange>,
    /// Time spent in the rating calculator
    #[serde(skip)]
    pub rating_duration: Duration,
}

/// Coordinates final scores and rating updates
pub struct ScoreSettlementCoordinator {
    storage: Arc<dyn Storage>,
    calculator: Arc<dyn RatingCalculator>,
}

impl ScoreSettlementCoordinator {
    pub fn new(storage: Arc<dyn Storage>, calculator: Arc<dyn RatingCalculator>) -> Self {
        Self {
            storage,
            calculator,
        }
    }

    /// Finish a confirmed game and update every participant's rating
    pub fn submit_score(&self, command: &SubmitScore) -> Result<SettlementOutcome> {
        validate_command(command)?;

        let roster = self
            .storage
            .load_roster(command.game_id)?
            .ok_or_else(|| MatchError::not_found(EntityKind::Game, command.game_id))?;

        self.check_team(&roster, command.team_a_id)?;
        self.check_team(&roster, command.team_b_id)?;

        match roster.game.status {
            GameStatus::Finished => {
                return Err(MatchError::conflict(format!(
                    "Game {} is already finished",
                    command.game_id
                )))
            }
            GameStatus::Pending => {
                return Err(MatchError::integrity(format!(
                    "Game {} still has vacant slots",
                    command.game_id
                )))
            }
            GameStatus::Confirmed => {}
        }

        let (winner_id, winner_score, loser_id, loser_score) =
            if command.team_a_score > command.team_b_score {
                (
                    command.team_a_id,
                    command.team_a_score,
                    command.team_b_id,
                    command.team_b_score,
                )
            } else {
                (
                    command.team_b_id,
                    command.team_b_score,
                    command.team_a_id,
                    command.team_a_score,
                )
            };

        let team_players = roster.game.team_players();
        let winners = self.participants(&roster, winner_id, team_players)?;
        let losers = self.participants(&roster, loser_id, team_players)?;

        let mut seen = HashSet::new();
        if let Some(dup) = winners.iter().chain(&losers).find(|u| !seen.insert(u.id)) {
            return Err(MatchError::integrity(format!(
                "User {} holds more than one slot in game {}",
                dup.id, command.game_id
            )));
        }

        let outcome = MatchOutcome {
            winners: winners.iter().map(|u| (u.id, u.rating)).collect(),
            losers: losers.iter().map(|u| (u.id, u.rating)).collect(),
            winner_score: winner_score as f64,
            loser_score: loser_score as f64,
        };

        let started = Instant::now();
        let rating_changes = self.calculator.calculate_rating_changes(&outcome)?;
        let rating_duration = started.elapsed();

        let game = Game {
            status: GameStatus::Finished,
            ..roster.game.clone()
        };

        let mut batch = WriteBatch::new().require(Precondition::GameStatusIs {
            game_id: game.id,
            status: GameStatus::Confirmed,
        });
        batch.push_save(Record::Game(game.clone()));
        for (team_id, score) in [
            (command.team_a_id, command.team_a_score),
            (command.team_b_id, command.team_b_score),
        ] {
            if let Some(roster) = roster.team(team_id) {
                batch.push_save(Record::Team(Team {
                    score,
                    ..roster.team.clone()
                }));
            }
        }

        for user in winners.iter().chain(&losers) {
            let change = rating_changes
                .iter()
                .find(|c| c.user_id == user.id)
                .ok_or_else(|| MatchError::Internal {
                    message: format!("No rating change computed for user {}", user.id),
                })?;

            batch.push_require(Precondition::UserRatingIs {
                user_id: user.id,
                rating: user.rating,
            });
            batch.push_save(Record::User(User {
                rating: change.new_rating,
                ..user.clone()
            }));
        }

        self.storage.commit(batch)?;

        debug!(
            "Settled game {}: team {} beat team {} {}-{}",
            game.id, winner_id, loser_id, winner_score, loser_score
        );

        Ok(SettlementOutcome {
            game,
            winner_team_id: winner_id,
            loser_team_id: loser_id,
            rating_changes,
            rating_duration,
        })
    }

    /// A submitted team id must exist and belong to the game
    fn check_team(&self, roster: &RosterSnapshot, team_id: TeamId) -> Result<()> {
        if roster.team(team_id).is_some() {
            return Ok(());
        }
        match self.storage.find_team(team_id)? {
            None => Err(MatchError::not_found(EntityKind::Team, team_id)),
            Some(_) => Err(MatchError::validation(format!(
                "Team {} does not belong to game {}",
                team_id, roster.game.id
            ))),
        }
    }

    /// Users occupying a team's slots, in slot order
    fn participants(
        &self,
        roster: &RosterSnapshot,
        team_id: TeamId,
        team_players: usize,
    ) -> Result<Vec<User>> {
        let team: &TeamRoster = roster
            .team(team_id)
            .ok_or_else(|| MatchError::not_found(EntityKind::Team, team_id))?;

        if team.slots.len() != team_players {
            return Err(MatchError::integrity(format!(
                "Team {} has {} slots, expected {}",
                team_id,
                team.slots.len(),
                team_players
            )));
        }

        team.slots
            .iter()
            .map(|slot| {
                let user_id = match (slot.is_vacant, slot.user_id) {
                    (false, Some(user_id)) => user_id,
                    _ => {
                        return Err(MatchError::integrity(format!(
                            "Slot {} has no resolved participant",
                            slot.id
                        )))
                    }
                };
                self.storage.find_user(user_id)?.ok_or_else(|| {
                    MatchError::integrity(format!("Participant {} no longer exists", user_id))
                })
            })
            .collect()
    }
}

fn validate_command(command: &SubmitScore) -> Result<()> {
    if command.team_a_score < 0 || command.team_b_score < 0 {
        return Err(MatchError::validation("Scores must be non-negative"));
    }
    if command.team_a_score == command.team_b_score {
        return Err(MatchError::validation(
            "Scores are tied; a game needs a winner",
        ));
    }
    if command.team_a_id == command.team_b_id {
        return Err(MatchError::validation(
            "A game is settled between two different teams",
        ));
    }
    Ok(())
}
