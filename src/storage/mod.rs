//! Storage interface for games, teams, slots, invitations and users
//!
//! Coordinators never mutate records in place. They read through the finder
//! methods, assemble a [`WriteBatch`] of saves, deletes and preconditions, and
//! hand it to [`Storage::commit`], which applies the whole batch atomically or
//! nothing at all.

pub mod memory;

pub use memory::InMemoryStorage;

use crate::error::Result;
use crate::types::{
    Game, GameId, GameStatus, Invitation, InvitationId, RosterSnapshot, Slot, SlotId, Team,
    TeamId, User, UserId,
};

/// A record to be written
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Game(Game),
    Team(Team),
    Slot(Slot),
    Invitation(Invitation),
    User(User),
}

/// Identity of a record to be deleted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKey {
    Game(GameId),
    Team(TeamId),
    Slot(SlotId),
    Invitation(InvitationId),
    User(UserId),
}

/// Compare-and-set guard evaluated inside the commit's critical section
#[derive(Debug, Clone, PartialEq)]
pub enum Precondition {
    /// Slot exists, is vacant, and is open or reserved for this user
    SlotAdmits { slot_id: SlotId, user_id: UserId },
    /// Game exists and currently has this status
    GameStatusIs { game_id: GameId, status: GameStatus },
    /// User exists and still has exactly this rating
    UserRatingIs { user_id: UserId, rating: f64 },
    /// No user is registered under this email (case-insensitive)
    EmailUnclaimed { email: String },
}

/// A single write
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    Save(Record),
    Delete(RecordKey),
    /// Move a pending game to confirmed if, after the preceding writes, none
    /// of its slots is vacant. Resolved inside the commit's critical section.
    ConfirmIfStaffed(GameId),
}

/// What a successful commit did beyond its unconditional writes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitReceipt {
    confirmed: Vec<GameId>,
}

impl CommitReceipt {
    pub fn record_confirmed(&mut self, game_id: GameId) {
        self.confirmed.push(game_id);
    }

    /// Whether this commit promoted `game_id` to confirmed
    pub fn confirmed(&self, game_id: GameId) -> bool {
        self.confirmed.contains(&game_id)
    }
}

/// A set of writes applied all-or-nothing
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    preconditions: Vec<Precondition>,
    mutations: Vec<Mutation>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn require(mut self, precondition: Precondition) -> Self {
        self.preconditions.push(precondition);
        self
    }

    pub fn save(mut self, record: Record) -> Self {
        self.mutations.push(Mutation::Save(record));
        self
    }

    pub fn delete(mut self, key: RecordKey) -> Self {
        self.mutations.push(Mutation::Delete(key));
        self
    }

    pub fn confirm_if_staffed(mut self, game_id: GameId) -> Self {
        self.mutations.push(Mutation::ConfirmIfStaffed(game_id));
        self
    }

    pub fn push_save(&mut self, record: Record) {
        self.mutations.push(Mutation::Save(record));
    }

    pub fn push_require(&mut self, precondition: Precondition) {
        self.preconditions.push(precondition);
    }

    pub fn preconditions(&self) -> &[Precondition] {
        &self.preconditions
    }

    pub fn mutations(&self) -> &[Mutation] {
        &self.mutations
    }

    pub fn into_parts(self) -> (Vec<Precondition>, Vec<Mutation>) {
        (self.preconditions, self.mutations)
    }

    pub fn is_empty(&self) -> bool {
        self.preconditions.is_empty() && self.mutations.is_empty()
    }

    /// Number of writes in the batch
    pub fn len(&self) -> usize {
        self.mutations.len()
    }
}

/// Trait for persistence operations used by the lifecycle coordinators
#[cfg_attr(test, mockall::automock)]
pub trait Storage: Send + Sync {
    fn find_game(&self, id: GameId) -> Result<Option<Game>>;

    fn find_team(&self, id: TeamId) -> Result<Option<Team>>;

    fn find_slot(&self, id: SlotId) -> Result<Option<Slot>>;

    fn find_user(&self, id: UserId) -> Result<Option<User>>;

    /// Case-insensitive email lookup
    fn find_user_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Teams of a game, in creation order
    fn list_teams(&self, game_id: GameId) -> Result<Vec<Team>>;

    /// Slots of a team, in creation order
    fn list_slots(&self, team_id: TeamId) -> Result<Vec<Slot>>;

    /// Invitations attached to a slot, in creation order
    fn list_invitations(&self, slot_id: SlotId) -> Result<Vec<Invitation>>;

    /// Games, optionally filtered by status, in creation order
    fn list_games(&self, status: Option<GameStatus>) -> Result<Vec<Game>>;

    fn list_users(&self) -> Result<Vec<User>>;

    /// Game, teams and slots read from one consistent snapshot
    fn load_roster(&self, game_id: GameId) -> Result<Option<RosterSnapshot>>;

    /// Check every precondition, then apply every mutation, atomically
    fn commit(&self, batch: WriteBatch) -> Result<CommitReceipt>;

    /// Save a single record
    fn save(&self, record: Record) -> Result<()> {
        self.commit(WriteBatch::new().save(record)).map(|_| ())
    }

    /// Delete a single record
    fn delete(&self, key: RecordKey) -> Result<()> {
        self.commit(WriteBatch::new().delete(key)).map(|_| ())
    }

    /// Cheap liveness probe
    fn health_check(&self) -> Result<()> {
        Ok(())
    }
}
