//! In-memory storage implementation
//!
//! All tables live behind a single `RwLock`: a commit is one write-locked
//! critical section and a roster read is one read-locked snapshot.

use crate::error::{MatchError, Result};
use crate::storage::{
    CommitReceipt, Mutation, Precondition, Record, RecordKey, Storage, WriteBatch,
};
use crate::types::{
    EntityKind, Game, GameId, GameStatus, Invitation, InvitationId, RosterSnapshot, Slot, SlotId,
    Team, TeamId, TeamRoster, User, UserId,
};
use crate::utils::normalize_email;
use std::collections::{HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

/// A stored record with its insertion sequence number
#[derive(Debug, Clone)]
struct Stored<T> {
    seq: u64,
    record: T,
}

/// Record counts, for health reporting
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StorageCounts {
    pub games: usize,
    pub teams: usize,
    pub slots: usize,
    pub invitations: usize,
    pub users: usize,
}

#[derive(Debug, Default)]
struct Tables {
    next_seq: u64,
    games: HashMap<GameId, Stored<Game>>,
    teams: HashMap<TeamId, Stored<Team>>,
    slots: HashMap<SlotId, Stored<Slot>>,
    invitations: HashMap<InvitationId, Stored<Invitation>>,
    users: HashMap<UserId, Stored<User>>,
}

/// Insert or replace, keeping the original sequence number on replace
fn upsert<T>(table: &mut HashMap<uuid::Uuid, Stored<T>>, id: uuid::Uuid, record: T, seq: u64) {
    match table.get_mut(&id) {
        Some(existing) => existing.record = record,
        None => {
            table.insert(id, Stored { seq, record });
        }
    }
}

/// Records matching `filter`, in insertion order
fn ordered<T: Clone>(
    table: &HashMap<uuid::Uuid, Stored<T>>,
    filter: impl Fn(&T) -> bool,
) -> Vec<T> {
    let mut matching: Vec<&Stored<T>> = table.values().filter(|s| filter(&s.record)).collect();
    matching.sort_by_key(|s| s.seq);
    matching.into_iter().map(|s| s.record.clone()).collect()
}

impl Tables {
    fn roster(&self, game_id: GameId) -> Option<RosterSnapshot> {
        let game = self.games.get(&game_id)?.record.clone();
        let teams = ordered(&self.teams, |t| t.game_id == game_id)
            .into_iter()
            .map(|team| {
                let slots = ordered(&self.slots, |s| s.team_id == team.id);
                TeamRoster { team, slots }
            })
            .collect();
        Some(RosterSnapshot { game, teams })
    }

    fn email_taken(&self, email: &str, except: Option<UserId>) -> bool {
        let wanted = normalize_email(email);
        self.users.values().any(|stored| {
            Some(stored.record.id) != except && normalize_email(&stored.record.email) == wanted
        })
    }

    fn check(&self, precondition: &Precondition) -> Result<()> {
        match precondition {
            Precondition::SlotAdmits { slot_id, user_id } => {
                let slot = &self
                    .slots
                    .get(slot_id)
                    .ok_or_else(|| MatchError::not_found(EntityKind::Slot, slot_id))?
                    .record;
                if !slot.is_vacant {
                    return Err(MatchError::conflict(format!(
                        "Slot {} is already occupied",
                        slot_id
                    )));
                }
                if !slot.admits(*user_id) {
                    return Err(MatchError::conflict(format!(
                        "Slot {} is reserved for another user",
                        slot_id
                    )));
                }
                Ok(())
            }
            Precondition::GameStatusIs { game_id, status } => {
                let game = &self
                    .games
                    .get(game_id)
                    .ok_or_else(|| MatchError::not_found(EntityKind::Game, game_id))?
                    .record;
                if game.status != *status {
                    return Err(MatchError::conflict(format!(
                        "Game {} is {} (expected {})",
                        game_id, game.status, status
                    )));
                }
                Ok(())
            }
            Precondition::UserRatingIs { user_id, rating } => {
                let user = &self
                    .users
                    .get(user_id)
                    .ok_or_else(|| MatchError::not_found(EntityKind::User, user_id))?
                    .record;
                if user.rating != *rating {
                    return Err(MatchError::conflict(format!(
                        "Rating of user {} changed concurrently",
                        user_id
                    )));
                }
                Ok(())
            }
            Precondition::EmailUnclaimed { email } => {
                if self.email_taken(email, None) {
                    return Err(MatchError::conflict(format!(
                        "A user with email '{}' already exists",
                        email
                    )));
                }
                Ok(())
            }
        }
    }

    /// Referential and uniqueness checks over the whole batch, in order
    fn check_mutations(&self, mutations: &[Mutation]) -> Result<()> {
        let mut staged_games = HashSet::new();
        let mut staged_teams = HashSet::new();
        let mut staged_slots = HashSet::new();

        for mutation in mutations {
            match mutation {
                Mutation::Save(Record::Game(game)) => {
                    if let Some(stored) = self.games.get(&game.id) {
                        let current = stored.record.status;
                        if current != game.status && !current.can_transition_to(game.status) {
                            return Err(MatchError::integrity(format!(
                                "Game {} cannot move from {} to {}",
                                game.id, current, game.status
                            )));
                        }
                    }
                    staged_games.insert(game.id);
                }
                Mutation::Save(Record::Team(team)) => {
                    if !self.games.contains_key(&team.game_id)
                        && !staged_games.contains(&team.game_id)
                    {
                        return Err(MatchError::integrity(format!(
                            "Team {} references missing game {}",
                            team.id, team.game_id
                        )));
                    }
                    staged_teams.insert(team.id);
                }
                Mutation::Save(Record::Slot(slot)) => {
                    if !self.teams.contains_key(&slot.team_id)
                        && !staged_teams.contains(&slot.team_id)
                    {
                        return Err(MatchError::integrity(format!(
                            "Slot {} references missing team {}",
                            slot.id, slot.team_id
                        )));
                    }
                    if !slot.is_vacant && slot.user_id.is_none() {
                        return Err(MatchError::integrity(format!(
                            "Slot {} is occupied without a user",
                            slot.id
                        )));
                    }
                    staged_slots.insert(slot.id);
                }
                Mutation::Save(Record::Invitation(invitation)) => {
                    if !self.slots.contains_key(&invitation.slot_id)
                        && !staged_slots.contains(&invitation.slot_id)
                    {
                        return Err(MatchError::integrity(format!(
                            "Invitation {} references missing slot {}",
                            invitation.id, invitation.slot_id
                        )));
                    }
                }
                Mutation::Save(Record::User(user)) => {
                    if self.email_taken(&user.email, Some(user.id)) {
                        return Err(MatchError::conflict(format!(
                            "A user with email '{}' already exists",
                            user.email
                        )));
                    }
                }
                Mutation::Delete(key) => self.check_delete(key)?,
                Mutation::ConfirmIfStaffed(game_id) => {
                    if !self.games.contains_key(game_id) && !staged_games.contains(game_id) {
                        return Err(MatchError::not_found(EntityKind::Game, game_id));
                    }
                }
            }
        }

        Ok(())
    }

    fn check_delete(&self, key: &RecordKey) -> Result<()> {
        let referenced = match key {
            RecordKey::Game(id) => self.teams.values().any(|t| t.record.game_id == *id),
            RecordKey::Team(id) => self.slots.values().any(|s| s.record.team_id == *id),
            RecordKey::Slot(id) => self.invitations.values().any(|i| i.record.slot_id == *id),
            RecordKey::Invitation(_) | RecordKey::User(_) => false,
        };

        if referenced {
            return Err(MatchError::integrity(format!(
                "Cannot delete {:?} while other records reference it",
                key
            )));
        }
        Ok(())
    }

    /// Apply one checked write. Returns the game id when a conditional
    /// promotion fired.
    fn apply(&mut self, mutation: Mutation) -> Option<GameId> {
        if let Mutation::ConfirmIfStaffed(game_id) = mutation {
            return self.confirm_if_staffed(game_id);
        }

        let seq = self.next_seq;
        self.next_seq += 1;

        match mutation {
            Mutation::Save(Record::Game(game)) => upsert(&mut self.games, game.id, game, seq),
            Mutation::Save(Record::Team(team)) => upsert(&mut self.teams, team.id, team, seq),
            Mutation::Save(Record::Slot(slot)) => upsert(&mut self.slots, slot.id, slot, seq),
            Mutation::Save(Record::Invitation(invitation)) => {
                upsert(&mut self.invitations, invitation.id, invitation, seq)
            }
            Mutation::Save(Record::User(user)) => upsert(&mut self.users, user.id, user, seq),
            Mutation::Delete(RecordKey::Game(id)) => {
                self.games.remove(&id);
            }
            Mutation::Delete(RecordKey::Team(id)) => {
                self.teams.remove(&id);
            }
            Mutation::Delete(RecordKey::Slot(id)) => {
                self.slots.remove(&id);
            }
            Mutation::Delete(RecordKey::Invitation(id)) => {
                self.invitations.remove(&id);
            }
            Mutation::Delete(RecordKey::User(id)) => {
                self.users.remove(&id);
            }
            Mutation::ConfirmIfStaffed(_) => {}
        }
        None
    }

    fn confirm_if_staffed(&mut self, game_id: GameId) -> Option<GameId> {
        let roster = self.roster(game_id)?;
        if roster.game.status != GameStatus::Pending || !roster.is_fully_staffed() {
            return None;
        }

        let stored = self.games.get_mut(&game_id)?;
        stored.record.status = GameStatus::Confirmed;
        Some(game_id)
    }
}

/// In-memory storage backend
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    tables: RwLock<Tables>,
}

impl InMemoryStorage {
    /// Create a new, empty in-memory storage
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>> {
        self.tables.read().map_err(|_| MatchError::Internal {
            message: "Failed to acquire storage read lock".to_string(),
        })
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>> {
        self.tables.write().map_err(|_| MatchError::Internal {
            message: "Failed to acquire storage write lock".to_string(),
        })
    }

    /// Number of stored records per table
    pub fn counts(&self) -> Result<StorageCounts> {
        let tables = self.read()?;
        Ok(StorageCounts {
            games: tables.games.len(),
            teams: tables.teams.len(),
            slots: tables.slots.len(),
            invitations: tables.invitations.len(),
            users: tables.users.len(),
        })
    }
}

impl Storage for InMemoryStorage {
    fn find_game(&self, id: GameId) -> Result<Option<Game>> {
        Ok(self.read()?.games.get(&id).map(|s| s.record.clone()))
    }

    fn find_team(&self, id: TeamId) -> Result<Option<Team>> {
        Ok(self.read()?.teams.get(&id).map(|s| s.record.clone()))
    }

    fn find_slot(&self, id: SlotId) -> Result<Option<Slot>> {
        Ok(self.read()?.slots.get(&id).map(|s| s.record.clone()))
    }

    fn find_user(&self, id: UserId) -> Result<Option<User>> {
        Ok(self.read()?.users.get(&id).map(|s| s.record.clone()))
    }

    fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let wanted = normalize_email(email);
        Ok(self
            .read()?
            .users
            .values()
            .find(|s| normalize_email(&s.record.email) == wanted)
            .map(|s| s.record.clone()))
    }

    fn list_teams(&self, game_id: GameId) -> Result<Vec<Team>> {
        Ok(ordered(&self.read()?.teams, |t| t.game_id == game_id))
    }

    fn list_slots(&self, team_id: TeamId) -> Result<Vec<Slot>> {
        Ok(ordered(&self.read()?.slots, |s| s.team_id == team_id))
    }

    fn list_invitations(&self, slot_id: SlotId) -> Result<Vec<Invitation>> {
        Ok(ordered(&self.read()?.invitations, |i| i.slot_id == slot_id))
    }

    fn list_games(&self, status: Option<GameStatus>) -> Result<Vec<Game>> {
        Ok(ordered(&self.read()?.games, |g| {
            status.map_or(true, |wanted| g.status == wanted)
        }))
    }

    fn list_users(&self) -> Result<Vec<User>> {
        Ok(ordered(&self.read()?.users, |_| true))
    }

    fn load_roster(&self, game_id: GameId) -> Result<Option<RosterSnapshot>> {
        Ok(self.read()?.roster(game_id))
    }

    fn commit(&self, batch: WriteBatch) -> Result<CommitReceipt> {
        let mut tables = self.write()?;

        for precondition in batch.preconditions() {
            if let Err(e) = tables.check(precondition) {
                debug!("Commit rejected by precondition {:?}: {}", precondition, e);
                return Err(e);
            }
        }
        tables.check_mutations(batch.mutations())?;

        let (_, mutations) = batch.into_parts();
        let applied = mutations.len();
        let mut receipt = CommitReceipt::default();
        for mutation in mutations {
            if let Some(game_id) = tables.apply(mutation) {
                debug!("Game {} confirmed: no vacant slots left", game_id);
                receipt.record_confirmed(game_id);
            }
        }

        debug!("Committed batch of {} writes", applied);
        Ok(receipt)
    }

    fn health_check(&self) -> Result<()> {
        self.read().map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::types::MatchFormat;
    use crate::utils::{current_timestamp, generate_id};

    fn create_test_user(email: &str, rating: f64) -> User {
        User {
            id: generate_id(),
            name: "player".to_string(),
            email: email.to_string(),
            rating,
            created_at: current_timestamp(),
        }
    }

    /// Game with one team holding one open vacant slot
    fn seed_game(storage: &InMemoryStorage) -> (Game, Team, Slot) {
        let game = Game::new(generate_id(), MatchFormat::Single, current_timestamp());
        let team = Team::new(generate_id(), game.id);
        let slot = Slot::vacant(generate_id(), team.id, None, true);

        storage
            .commit(
                WriteBatch::new()
                    .save(Record::Game(game.clone()))
                    .save(Record::Team(team.clone()))
                    .save(Record::Slot(slot.clone())),
            )
            .unwrap();

        (game, team, slot)
    }

    #[test]
    fn test_basic_operations() {
        let storage = InMemoryStorage::new();
        let user = create_test_user("a@example.com", 1000.0);

        assert!(storage.find_user(user.id).unwrap().is_none());
        storage.save(Record::User(user.clone())).unwrap();

        let found = storage.find_user(user.id).unwrap().unwrap();
        assert_eq!(found, user);
        assert_eq!(
            storage.find_user_by_email("A@EXAMPLE.com").unwrap(),
            Some(user)
        );
    }

    #[test]
    fn test_children_keep_creation_order() {
        let storage = InMemoryStorage::new();
        let (game, team, first) = seed_game(&storage);

        let second = Slot::vacant(generate_id(), team.id, None, true);
        let third = Slot::vacant(generate_id(), team.id, None, false);
        storage.save(Record::Slot(second.clone())).unwrap();
        storage.save(Record::Slot(third.clone())).unwrap();

        // updating a record keeps its position
        storage
            .save(Record::Slot(first.claimed_by(generate_id())))
            .unwrap();

        let ids: Vec<_> = storage
            .list_slots(team.id)
            .unwrap()
            .iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(ids, vec![first.id, second.id, third.id]);

        let roster = storage.load_roster(game.id).unwrap().unwrap();
        assert_eq!(roster.teams.len(), 1);
        assert_eq!(roster.teams[0].slots.len(), 3);
        assert_eq!(roster.vacant_slots(), 2);
    }

    #[test]
    fn test_failed_precondition_writes_nothing() {
        let storage = InMemoryStorage::new();
        let (game, _, slot) = seed_game(&storage);

        let batch = WriteBatch::new()
            .require(Precondition::GameStatusIs {
                game_id: game.id,
                status: GameStatus::Confirmed,
            })
            .save(Record::Slot(slot.claimed_by(generate_id())));

        let err = storage.commit(batch).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert!(storage.find_slot(slot.id).unwrap().unwrap().is_vacant);
    }

    #[test]
    fn test_game_status_only_moves_forward() {
        let storage = InMemoryStorage::new();
        let (game, _, _) = seed_game(&storage);

        let mut finished = game.clone();
        finished.status = GameStatus::Finished;
        let err = storage
            .commit(WriteBatch::new().save(Record::Game(finished)))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Integrity);

        let mut confirmed = game.clone();
        confirmed.status = GameStatus::Confirmed;
        storage
            .commit(WriteBatch::new().save(Record::Game(confirmed)))
            .unwrap();

        let err = storage
            .commit(WriteBatch::new().save(Record::Game(game.clone())))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Integrity);
        assert_eq!(
            storage.find_game(game.id).unwrap().unwrap().status,
            GameStatus::Confirmed
        );
    }

    #[test]
    fn test_slot_admits_precondition() {
        let storage = InMemoryStorage::new();
        let (_, _, slot) = seed_game(&storage);
        let user = generate_id();

        let claim = |user_id| {
            WriteBatch::new()
                .require(Precondition::SlotAdmits {
                    slot_id: slot.id,
                    user_id,
                })
                .save(Record::Slot(slot.claimed_by(user_id)))
        };

        storage.commit(claim(user)).unwrap();
        let err = storage.commit(claim(generate_id())).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(storage.find_slot(slot.id).unwrap().unwrap().user_id, Some(user));

        let missing = WriteBatch::new().require(Precondition::SlotAdmits {
            slot_id: generate_id(),
            user_id: user,
        });
        assert_eq!(storage.commit(missing).unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_confirm_if_staffed_fires_with_last_claim() {
        let storage = InMemoryStorage::new();
        let (game, team, first) = seed_game(&storage);
        let second = Slot::vacant(generate_id(), team.id, None, true);
        storage.save(Record::Slot(second.clone())).unwrap();

        let claim = |slot: &Slot| {
            let user_id = generate_id();
            WriteBatch::new()
                .require(Precondition::SlotAdmits {
                    slot_id: slot.id,
                    user_id,
                })
                .save(Record::Slot(slot.claimed_by(user_id)))
                .confirm_if_staffed(game.id)
        };

        let receipt = storage.commit(claim(&first)).unwrap();
        assert!(!receipt.confirmed(game.id));
        assert_eq!(
            storage.find_game(game.id).unwrap().unwrap().status,
            GameStatus::Pending
        );

        let receipt = storage.commit(claim(&second)).unwrap();
        assert!(receipt.confirmed(game.id));
        assert_eq!(
            storage.find_game(game.id).unwrap().unwrap().status,
            GameStatus::Confirmed
        );

        // already confirmed: nothing to do
        let again = storage
            .commit(WriteBatch::new().confirm_if_staffed(game.id))
            .unwrap();
        assert!(!again.confirmed(game.id));

        let err = storage
            .commit(WriteBatch::new().confirm_if_staffed(generate_id()))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_rating_precondition() {
        let storage = InMemoryStorage::new();
        let user = create_test_user("r@example.com", 1000.0);
        storage.save(Record::User(user.clone())).unwrap();

        let stale = WriteBatch::new()
            .require(Precondition::UserRatingIs {
                user_id: user.id,
                rating: 990.0,
            })
            .save(Record::User(User {
                rating: 1010.0,
                ..user.clone()
            }));
        assert_eq!(storage.commit(stale).unwrap_err().kind(), ErrorKind::Conflict);
        assert_eq!(storage.find_user(user.id).unwrap().unwrap().rating, 1000.0);
    }

    #[test]
    fn test_referential_checks() {
        let storage = InMemoryStorage::new();

        let orphan_team = Team::new(generate_id(), generate_id());
        let err = storage.save(Record::Team(orphan_team)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Integrity);

        let (game, team, slot) = seed_game(&storage);
        let invitation = Invitation {
            id: generate_id(),
            slot_id: slot.id,
            all_players_invited: true,
        };
        storage.save(Record::Invitation(invitation.clone())).unwrap();

        // parents with children cannot be deleted
        assert!(storage.delete(RecordKey::Game(game.id)).is_err());
        assert!(storage.delete(RecordKey::Team(team.id)).is_err());
        assert!(storage.delete(RecordKey::Slot(slot.id)).is_err());

        storage.delete(RecordKey::Invitation(invitation.id)).unwrap();
        assert!(storage.list_invitations(slot.id).unwrap().is_empty());
    }

    #[test]
    fn test_occupied_slot_requires_user() {
        let storage = InMemoryStorage::new();
        let (_, _, slot) = seed_game(&storage);

        let broken = Slot {
            is_vacant: false,
            user_id: None,
            ..slot
        };
        let err = storage.save(Record::Slot(broken)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Integrity);
    }

    #[test]
    fn test_unique_email() {
        let storage = InMemoryStorage::new();
        storage
            .save(Record::User(create_test_user("dup@example.com", 1000.0)))
            .unwrap();

        let err = storage
            .save(Record::User(create_test_user("DUP@example.com", 1000.0)))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let guarded = WriteBatch::new().require(Precondition::EmailUnclaimed {
            email: "dup@example.com".to_string(),
        });
        assert!(storage.commit(guarded).is_err());
    }

    #[test]
    fn test_list_games_filter_and_counts() {
        let storage = InMemoryStorage::new();
        let (game, _, _) = seed_game(&storage);
        seed_game(&storage);

        storage
            .save(Record::Game(Game {
                status: GameStatus::Confirmed,
                ..game.clone()
            }))
            .unwrap();

        assert_eq!(storage.list_games(None).unwrap().len(), 2);
        let confirmed = storage.list_games(Some(GameStatus::Confirmed)).unwrap();
        assert_eq!(confirmed.len(), 1);
        assert_eq!(confirmed[0].id, game.id);

        let counts = storage.counts().unwrap();
        assert_eq!(counts.games, 2);
        assert_eq!(counts.teams, 2);
        assert_eq!(counts.slots, 2);
        assert!(storage.health_check().is_ok());
    }
}
