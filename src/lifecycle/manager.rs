//! Match manager
//!
//! This module provides the MatchManager that an external command handler
//! calls. It wires the roster factory, acceptance and settlement coordinators
//! over one storage collaborator, and records statistics, metrics and logs for
//! every command.

use crate::config::AppConfig;
use crate::error::{MatchError, Result};
use crate::lifecycle::acceptance::{AcceptanceOutcome, SlotAcceptanceCoordinator};
use crate::lifecycle::roster::{CreatedMatch, MatchRosterFactory};
use crate::lifecycle::settlement::{ScoreSettlementCoordinator, SettlementOutcome};
use crate::lifecycle::view::game_view;
use crate::metrics::MetricsCollector;
use crate::rating::{EloRatingCalculator, RatingCalculator};
use crate::storage::Storage;
use crate::types::{
    AcceptSlot, CreateDoubleMatch, CreateSingleMatch, Game, GameId, GameStatus, GameView,
    MatchFormat, SubmitScore,
};
use crate::users::UserRegistry;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use tracing::{info, warn};

/// Statistics about match manager operations
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchManagerStats {
    /// Total number of games created
    pub games_created: u64,
    /// Total number of games promoted to confirmed
    pub games_confirmed: u64,
    /// Total number of games settled
    pub games_finished: u64,
    /// Total number of successful slot acceptances
    pub slots_accepted: u64,
    /// Total number of rejected slot acceptances
    pub acceptances_rejected: u64,
    /// Total number of rejected score submissions
    pub settlements_rejected: u64,
    /// Current number of pending games
    pub pending_games: usize,
    /// Current number of confirmed games
    pub confirmed_games: usize,
    /// Current number of finished games
    pub finished_games: usize,
}

/// The main match manager
#[derive(Clone)]
pub struct MatchManager {
    storage: Arc<dyn Storage>,
    roster_factory: Arc<MatchRosterFactory>,
    acceptance: Arc<SlotAcceptanceCoordinator>,
    settlement: Arc<ScoreSettlementCoordinator>,
    users: Arc<UserRegistry>,
    /// Rating calculator used by settlement
    rating_calculator: Arc<dyn RatingCalculator>,
    /// Manager statistics
    stats: Arc<RwLock<MatchManagerStats>>,
    /// Metrics collector for recording performance data
    metrics_collector: Arc<MetricsCollector>,
}

impl MatchManager {
    /// Create a new match manager
    pub fn new(
        storage: Arc<dyn Storage>,
        rating_calculator: Arc<dyn RatingCalculator>,
        reject_unknown_targets: bool,
        metrics_collector: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            roster_factory: Arc::new(MatchRosterFactory::new(
                storage.clone(),
                reject_unknown_targets,
            )),
            acceptance: Arc::new(SlotAcceptanceCoordinator::new(storage.clone())),
            settlement: Arc::new(ScoreSettlementCoordinator::new(
                storage.clone(),
                rating_calculator.clone(),
            )),
            users: Arc::new(UserRegistry::new(
                storage.clone(),
                rating_calculator.initial_rating(),
            )),
            storage,
            rating_calculator,
            stats: Arc::new(RwLock::new(MatchManagerStats::default())),
            metrics_collector,
        }
    }

    /// Create a match manager with the score-share Elo calculator from config
    pub fn from_config(
        storage: Arc<dyn Storage>,
        config: &AppConfig,
        metrics_collector: Arc<MetricsCollector>,
    ) -> Result<Self> {
        let calculator = EloRatingCalculator::new(config.rating.clone())?;
        Ok(Self::new(
            storage,
            Arc::new(calculator),
            config.matchmaking.reject_unknown_targets,
            metrics_collector,
        ))
    }

    /// User registry backed by the same storage
    pub fn users(&self) -> &UserRegistry {
        &self.users
    }

    pub fn storage(&self) -> Arc<dyn Storage> {
        self.storage.clone()
    }

    pub fn rating_calculator(&self) -> Arc<dyn RatingCalculator> {
        self.rating_calculator.clone()
    }

    pub fn metrics(&self) -> Arc<MetricsCollector> {
        self.metrics_collector.clone()
    }

    /// Create a 1v1 game
    pub fn create_single_match(&self, command: CreateSingleMatch) -> Result<CreatedMatch> {
        info!(
            "Creating 1v1 game - creator: {}, rival: {}",
            command.creator_user_id, command.rival
        );

        let result = self.timed("create_single_match", || {
            self.roster_factory.create_single_match(&command)
        });
        self.after_creation(MatchFormat::Single, &result)?;
        result
    }

    /// Create a 2v2 game
    pub fn create_double_match(&self, command: CreateDoubleMatch) -> Result<CreatedMatch> {
        info!(
            "Creating 2v2 game - creator: {}, partner: {}, rivals: [{}]",
            command.creator_user_id,
            command.partner,
            command
                .rivals
                .iter()
                .map(|s| s.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        );

        let result = self.timed("create_double_match", || {
            self.roster_factory.create_double_match(&command)
        });
        self.after_creation(MatchFormat::Double, &result)?;
        result
    }

    fn after_creation(&self, format: MatchFormat, result: &Result<CreatedMatch>) -> Result<()> {
        match result {
            Ok(created) => {
                self.metrics_collector.record_game_created(format);
                self.update_stats(|stats| stats.games_created += 1)?;
                info!(
                    "Created {} game {} with {} vacant slots",
                    format,
                    created.game.id,
                    created.vacant_slots().count()
                );
            }
            Err(e) => warn!("Failed to create {} game: {}", format, e),
        }
        Ok(())
    }

    /// Claim a slot for the acting user
    pub fn accept_slot(&self, command: AcceptSlot) -> Result<AcceptanceOutcome> {
        info!(
            "Processing acceptance - slot: {}, user: {}",
            command.slot_id, command.acting_user_id
        );

        let result = self.timed("accept_slot", || self.acceptance.accept_slot(&command));

        match &result {
            Ok(outcome) => {
                self.metrics_collector
                    .record_slot_accepted(outcome.was_open, outcome.invitations_removed);
                if outcome.promoted {
                    if let Ok(Some(game)) = self.storage.find_game(outcome.game_id) {
                        self.metrics_collector.record_game_confirmed(game.format);
                    }
                    info!("Game {} is fully staffed and confirmed", outcome.game_id);
                }
                self.update_stats(|stats| {
                    stats.slots_accepted += 1;
                    if outcome.promoted {
                        stats.games_confirmed += 1;
                    }
                })?;
            }
            Err(e) => {
                warn!("Acceptance of slot {} rejected: {}", command.slot_id, e);
                self.metrics_collector
                    .record_acceptance_rejected(&e.kind().to_string());
                self.update_stats(|stats| stats.acceptances_rejected += 1)?;
            }
        }

        result
    }

    /// Settle a game with final team scores
    pub fn submit_score(&self, command: SubmitScore) -> Result<SettlementOutcome> {
        info!(
            "Processing score - game: {}, team {}: {}, team {}: {}",
            command.game_id,
            command.team_a_id,
            command.team_a_score,
            command.team_b_id,
            command.team_b_score
        );

        let result = self.timed("submit_score", || self.settlement.submit_score(&command));

        match &result {
            Ok(outcome) => {
                self.metrics_collector
                    .record_rating_calculation(outcome.rating_duration);
                self.metrics_collector
                    .record_game_finished(outcome.game.format, &outcome.rating_changes);
                self.update_stats(|stats| stats.games_finished += 1)?;

                for change in &outcome.rating_changes {
                    info!(
                        "Rating update - user: {}, {:.1} -> {:.1} ({:+.1})",
                        change.user_id,
                        change.old_rating,
                        change.new_rating,
                        change.delta()
                    );
                }
            }
            Err(e) => {
                warn!("Score for game {} rejected: {}", command.game_id, e);
                self.update_stats(|stats| stats.settlements_rejected += 1)?;
            }
        }

        result
    }

    /// Read-only projection of a game
    pub fn game_view(&self, game_id: GameId) -> Result<GameView> {
        game_view(self.storage.as_ref(), game_id)
    }

    /// Games, optionally filtered by status
    pub fn list_games(&self, status: Option<GameStatus>) -> Result<Vec<Game>> {
        self.storage.list_games(status)
    }

    /// Current statistics, with per-status game counts read from storage
    pub fn stats(&self) -> Result<MatchManagerStats> {
        let games = self.storage.list_games(None)?;

        let mut stats = self
            .stats
            .read()
            .map_err(|_| MatchError::Internal {
                message: "Failed to acquire stats lock".to_string(),
            })?
            .clone();

        stats.pending_games = count(&games, GameStatus::Pending);
        stats.confirmed_games = count(&games, GameStatus::Confirmed);
        stats.finished_games = count(&games, GameStatus::Finished);

        self.metrics_collector.update_from_manager_stats(&stats);
        Ok(stats)
    }

    fn timed<T>(&self, command: &str, f: impl FnOnce() -> Result<T>) -> Result<T> {
        let timer = self.metrics_collector.start_timer();
        let result = f();
        let duration = timer.stop();

        info!(
            "{} completed - duration: {:.2}ms, result: {}",
            command,
            duration.as_secs_f64() * 1000.0,
            if result.is_ok() { "SUCCESS" } else { "FAILED" }
        );
        self.metrics_collector
            .record_command(command, result.is_ok(), duration);

        result
    }

    fn update_stats(&self, f: impl FnOnce(&mut MatchManagerStats)) -> Result<()> {
        let mut stats = self.stats.write().map_err(|_| MatchError::Internal {
            message: "Failed to acquire stats lock".to_string(),
        })?;
        f(&mut stats);
        Ok(())
    }
}

fn count(games: &[Game], status: GameStatus) -> usize {
    games.iter().filter(|g| g.status == status).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::storage::InMemoryStorage;
    use crate::types::{Selector, UserId};

    fn create_test_manager() -> MatchManager {
        let metrics = Arc::new(MetricsCollector::new().unwrap());
        MatchManager::from_config(
            Arc::new(InMemoryStorage::new()),
            &AppConfig::default(),
            metrics,
        )
        .unwrap()
    }

    fn register(manager: &MatchManager, name: &str) -> UserId {
        manager
            .users()
            .register(name, &format!("{}@example.com", name))
            .unwrap()
            .id
    }

    #[test]
    fn test_single_lifecycle_updates_stats() {
        let manager = create_test_manager();
        let alice = register(&manager, "alice");
        let bob = register(&manager, "bob");

        let created = manager
            .create_single_match(CreateSingleMatch {
                creator_user_id: alice,
                rival: Selector::User(bob),
            })
            .unwrap();
        let slot = created.vacant_slots().next().unwrap().id;

        let accepted = manager
            .accept_slot(AcceptSlot {
                slot_id: slot,
                acting_user_id: bob,
            })
            .unwrap();
        assert!(accepted.promoted);

        let settled = manager
            .submit_score(SubmitScore {
                game_id: created.game.id,
                team_a_id: created.teams[0].team.id,
                team_a_score: 2,
                team_b_id: created.teams[1].team.id,
                team_b_score: 1,
            })
            .unwrap();
        assert_eq!(settled.winner_team_id, created.teams[0].team.id);

        let stats = manager.stats().unwrap();
        assert_eq!(stats.games_created, 1);
        assert_eq!(stats.games_confirmed, 1);
        assert_eq!(stats.games_finished, 1);
        assert_eq!(stats.slots_accepted, 1);
        assert_eq!(stats.finished_games, 1);
        assert_eq!(stats.pending_games, 0);

        let metrics = manager.metrics();
        assert_eq!(
            metrics
                .game()
                .games_finished_total
                .with_label_values(&["single"])
                .get(),
            1
        );
    }

    #[test]
    fn test_rejections_are_counted() {
        let manager = create_test_manager();
        let alice = register(&manager, "alice");
        let bob = register(&manager, "bob");
        let carol = register(&manager, "carol");

        let created = manager
            .create_single_match(CreateSingleMatch {
                creator_user_id: alice,
                rival: Selector::User(bob),
            })
            .unwrap();
        let slot = created.vacant_slots().next().unwrap().id;

        let err = manager
            .accept_slot(AcceptSlot {
                slot_id: slot,
                acting_user_id: carol,
            })
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let err = manager
            .submit_score(SubmitScore {
                game_id: created.game.id,
                team_a_id: created.teams[0].team.id,
                team_a_score: 1,
                team_b_id: created.teams[1].team.id,
                team_b_score: 0,
            })
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Integrity);

        let stats = manager.stats().unwrap();
        assert_eq!(stats.acceptances_rejected, 1);
        assert_eq!(stats.settlements_rejected, 1);
        assert_eq!(stats.pending_games, 1);
        assert_eq!(
            manager
                .metrics()
                .slot()
                .acceptances_rejected_total
                .with_label_values(&["conflict"])
                .get(),
            1
        );
    }

    #[test]
    fn test_views_and_listing() {
        let manager = create_test_manager();
        let alice = register(&manager, "alice");

        let created = manager
            .create_double_match(CreateDoubleMatch {
                creator_user_id: alice,
                partner: Selector::Anyone,
                rivals: vec![Selector::Anyone, Selector::Anyone],
            })
            .unwrap();

        let view = manager.game_view(created.game.id).unwrap();
        assert_eq!(view.team_players, 2);
        assert_eq!(view.status, GameStatus::Pending);

        assert_eq!(manager.list_games(Some(GameStatus::Pending)).unwrap().len(), 1);
        assert!(manager
            .list_games(Some(GameStatus::Finished))
            .unwrap()
            .is_empty());

        let err = manager.game_view(crate::utils::generate_id()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_registry_uses_calculator_initial_rating() {
        let mut config = AppConfig::default();
        config.rating.initial_rating = 1500.0;
        let manager = MatchManager::from_config(
            Arc::new(InMemoryStorage::new()),
            &config,
            Arc::new(MetricsCollector::new().unwrap()),
        )
        .unwrap();

        let user = manager.users().register("dora", "dora@example.com").unwrap();
        assert_eq!(user.rating, 1500.0);
    }
}
