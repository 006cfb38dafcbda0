//! Test fixtures shared by the integration and concurrency suites

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use versus::config::AppConfig;
use versus::error::{MatchError, Result};
use versus::lifecycle::{AcceptanceOutcome, CreatedMatch};
use versus::metrics::MetricsCollector;
use versus::storage::{CommitReceipt, InMemoryStorage, Storage, WriteBatch};
use versus::types::{
    AcceptSlot, Game, GameId, GameStatus, Invitation, RosterSnapshot, Slot, SlotId, Team, TeamId,
    User, UserId,
};
use versus::MatchManager;

/// A manager wired to in-memory storage, with direct access to both
pub struct TestSystem {
    pub manager: MatchManager,
    pub storage: Arc<InMemoryStorage>,
    pub metrics: Arc<MetricsCollector>,
}

pub fn create_test_system() -> TestSystem {
    create_test_system_with(AppConfig::default())
}

pub fn create_test_system_with(config: AppConfig) -> TestSystem {
    let storage = Arc::new(InMemoryStorage::new());
    let metrics = Arc::new(MetricsCollector::new().expect("Failed to create collector"));
    let manager = MatchManager::from_config(storage.clone(), &config, metrics.clone())
        .expect("Failed to create manager");

    TestSystem {
        manager,
        storage,
        metrics,
    }
}

/// Register `count` users named `{prefix}{n}`
pub fn register_users(manager: &MatchManager, prefix: &str, count: usize) -> Vec<User> {
    (0..count)
        .map(|i| {
            let name = format!("{}{}", prefix, i + 1);
            manager
                .users()
                .register(&name, &format!("{}@example.com", name))
                .expect("Failed to register user")
        })
        .collect()
}

/// Claim every vacant slot of `created`, pairing slots with `players` in order
pub fn accept_all(
    manager: &MatchManager,
    created: &CreatedMatch,
    players: &[User],
) -> Vec<AcceptanceOutcome> {
    let slots: Vec<Slot> = created.vacant_slots().cloned().collect();
    assert_eq!(slots.len(), players.len(), "one player per vacant slot");

    slots
        .iter()
        .zip(players)
        .map(|(slot, player)| {
            manager
                .accept_slot(AcceptSlot {
                    slot_id: slot.id,
                    acting_user_id: player.id,
                })
                .expect("Failed to accept slot")
        })
        .collect()
}

pub fn rating_of(manager: &MatchManager, user_id: UserId) -> f64 {
    manager.users().get(user_id).expect("user exists").rating
}

/// Storage wrapper whose commits can be made to fail on demand
#[derive(Default)]
pub struct FlakyStorage {
    inner: InMemoryStorage,
    fail_commits: AtomicBool,
    commits: AtomicUsize,
}

impl FlakyStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail_commits.store(failing, Ordering::SeqCst);
    }

    /// Number of commits that reached the inner storage
    pub fn commit_count(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    pub fn inner(&self) -> &InMemoryStorage {
        &self.inner
    }
}

impl Storage for FlakyStorage {
    fn find_game(&self, id: GameId) -> Result<Option<Game>> {
        self.inner.find_game(id)
    }

    fn find_team(&self, id: TeamId) -> Result<Option<Team>> {
        self.inner.find_team(id)
    }

    fn find_slot(&self, id: SlotId) -> Result<Option<Slot>> {
        self.inner.find_slot(id)
    }

    fn find_user(&self, id: UserId) -> Result<Option<User>> {
        self.inner.find_user(id)
    }

    fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        self.inner.find_user_by_email(email)
    }

    fn list_teams(&self, game_id: GameId) -> Result<Vec<Team>> {
        self.inner.list_teams(game_id)
    }

    fn list_slots(&self, team_id: TeamId) -> Result<Vec<Slot>> {
        self.inner.list_slots(team_id)
    }

    fn list_invitations(&self, slot_id: SlotId) -> Result<Vec<Invitation>> {
        self.inner.list_invitations(slot_id)
    }

    fn list_games(&self, status: Option<GameStatus>) -> Result<Vec<Game>> {
        self.inner.list_games(status)
    }

    fn list_users(&self) -> Result<Vec<User>> {
        self.inner.list_users()
    }

    fn load_roster(&self, game_id: GameId) -> Result<Option<RosterSnapshot>> {
        self.inner.load_roster(game_id)
    }

    fn commit(&self, batch: WriteBatch) -> Result<CommitReceipt> {
        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(MatchError::Storage {
                message: "injected commit failure".to_string(),
            });
        }
        let receipt = self.inner.commit(batch)?;
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(receipt)
    }

    fn health_check(&self) -> Result<()> {
        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(MatchError::Storage {
                message: "storage unavailable".to_string(),
            });
        }
        Ok(())
    }
}
