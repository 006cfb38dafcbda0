//! Slot acceptance and game promotion
//!
//! A claim is a single compare-and-set commit: the slot must still admit the
//! acting user when the write lands, every invitation on the slot is deleted,
//! and the game is promoted to confirmed if that claim filled its last
//! vacancy. Either all of it lands or none of it does.

use crate::error::{MatchError, Result};
use crate::storage::{Precondition, Record, RecordKey, Storage, WriteBatch};
use crate::types::{AcceptSlot, EntityKind, GameId, GameStatus, Slot};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Result of a successful acceptance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcceptanceOutcome {
    /// The slot as it was written
    pub slot: Slot,
    pub game_id: GameId,
    /// Game status right after the claim landed
    pub game_status: GameStatus,
    pub invitations_removed: usize,
    /// Whether this acceptance promoted the game to confirmed
    pub promoted: bool,
    /// Whether the slot was open to anyone before the claim
    pub was_open: bool,
}

/// Coordinates slot claims and promotion of fully staffed games
pub struct SlotAcceptanceCoordinator {
    storage: Arc<dyn Storage>,
}

impl SlotAcceptanceCoordinator {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Claim a slot for the acting user and promote the game when full
    pub fn accept_slot(&self, command: &AcceptSlot) -> Result<AcceptanceOutcome> {
        let slot = self
            .storage
            .find_slot(command.slot_id)?
            .ok_or_else(|| MatchError::not_found(EntityKind::Slot, command.slot_id))?;

        if self.storage.find_user(command.acting_user_id)?.is_none() {
            return Err(MatchError::not_found(
                EntityKind::User,
                command.acting_user_id,
            ));
        }

        if !slot.admits(command.acting_user_id) {
            return Err(rejection(&slot));
        }

        let team = self
            .storage
            .find_team(slot.team_id)?
            .ok_or_else(|| MatchError::integrity(format!("Slot {} has no team", slot.id)))?;
        let invitations = self.storage.list_invitations(slot.id)?;
        let claimed = slot.claimed_by(command.acting_user_id);

        let mut batch = WriteBatch::new()
            .require(Precondition::SlotAdmits {
                slot_id: slot.id,
                user_id: command.acting_user_id,
            })
            .save(Record::Slot(claimed.clone()));
        for invitation in &invitations {
            batch = batch.delete(RecordKey::Invitation(invitation.id));
        }
        let receipt = self
            .storage
            .commit(batch.confirm_if_staffed(team.game_id))?;

        // a vacant slot means the game was pending when the claim landed
        let promoted = receipt.confirmed(team.game_id);
        let game_status = if promoted {
            GameStatus::Confirmed
        } else {
            GameStatus::Pending
        };

        debug!(
            "User {} claimed slot {} ({} invitations removed, promoted: {})",
            command.acting_user_id,
            slot.id,
            invitations.len(),
            promoted
        );

        Ok(AcceptanceOutcome {
            slot: claimed,
            game_id: team.game_id,
            game_status,
            invitations_removed: invitations.len(),
            promoted,
            was_open: slot.is_open,
        })
    }
}

/// Conflict explaining why `slot` refused the claim
fn rejection(slot: &Slot) -> MatchError {
    if !slot.is_vacant {
        MatchError::conflict(format!("Slot {} is already occupied", slot.id))
    } else {
        MatchError::conflict(format!("Slot {} is reserved for another user", slot.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::roster::{CreatedMatch, MatchRosterFactory};
    use crate::error::ErrorKind;
    use crate::storage::{CommitReceipt, InMemoryStorage, MockStorage, Mutation};
    use crate::types::{CreateDoubleMatch, CreateSingleMatch, Selector, Team, User, UserId};
    use crate::utils::{current_timestamp, generate_id};

    struct Fixture {
        storage: Arc<InMemoryStorage>,
        factory: MatchRosterFactory,
        coordinator: SlotAcceptanceCoordinator,
    }

    impl Fixture {
        fn new() -> Self {
            let storage = Arc::new(InMemoryStorage::new());
            Self {
                factory: MatchRosterFactory::new(storage.clone(), false),
                coordinator: SlotAcceptanceCoordinator::new(storage.clone()),
                storage,
            }
        }

        fn user(&self) -> UserId {
            let id = generate_id();
            self.storage
                .save(Record::User(User {
                    id,
                    name: "player".to_string(),
                    email: format!("{}@example.com", id),
                    rating: 1000.0,
                    created_at: current_timestamp(),
                }))
                .unwrap();
            id
        }

        fn single(&self, creator: UserId, rival: Selector) -> CreatedMatch {
            self.factory
                .create_single_match(&CreateSingleMatch {
                    creator_user_id: creator,
                    rival,
                })
                .unwrap()
        }

        fn accept(&self, slot: &Slot, user: UserId) -> Result<AcceptanceOutcome> {
            self.coordinator.accept_slot(&AcceptSlot {
                slot_id: slot.id,
                acting_user_id: user,
            })
        }
    }

    #[test]
    fn test_open_slot_accepts_anyone_and_confirms() {
        let fx = Fixture::new();
        let created = fx.single(fx.user(), Selector::Anyone);
        let slot = &created.teams[1].slots[0];
        let rival = fx.user();

        let outcome = fx.accept(slot, rival).unwrap();

        assert_eq!(outcome.slot.user_id, Some(rival));
        assert!(!outcome.slot.is_vacant);
        assert_eq!(outcome.invitations_removed, 1);
        assert!(outcome.promoted);
        assert!(outcome.was_open);
        assert_eq!(outcome.game_status, GameStatus::Confirmed);

        assert!(fx.storage.list_invitations(slot.id).unwrap().is_empty());
        let game = fx.storage.find_game(created.game.id).unwrap().unwrap();
        assert_eq!(game.status, GameStatus::Confirmed);
    }

    #[test]
    fn test_targeted_slot_only_admits_target() {
        let fx = Fixture::new();
        let rival = fx.user();
        let created = fx.single(fx.user(), Selector::User(rival));
        let slot = &created.teams[1].slots[0];

        let err = fx.accept(slot, fx.user()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(fx.storage.list_invitations(slot.id).unwrap().len(), 1);

        let outcome = fx.accept(slot, rival).unwrap();
        assert!(!outcome.was_open);
        assert_eq!(outcome.game_status, GameStatus::Confirmed);
    }

    #[test]
    fn test_occupied_slot_rejected() {
        let fx = Fixture::new();
        let creator = fx.user();
        let created = fx.single(creator, Selector::Anyone);
        let slot = &created.teams[1].slots[0];

        fx.accept(slot, fx.user()).unwrap();
        for actor in [fx.user(), creator] {
            let err = fx.accept(slot, actor).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Conflict);
            assert!(err.to_string().contains("already occupied"));
        }

        // creator's own slot was never vacant
        let err = fx.accept(&created.teams[0].slots[0], creator).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[test]
    fn test_unknown_slot_and_user() {
        let fx = Fixture::new();
        let created = fx.single(fx.user(), Selector::Anyone);

        let err = fx
            .coordinator
            .accept_slot(&AcceptSlot {
                slot_id: generate_id(),
                acting_user_id: fx.user(),
            })
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = fx
            .accept(&created.teams[1].slots[0], generate_id())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(fx
            .storage
            .find_slot(created.teams[1].slots[0].id)
            .unwrap()
            .unwrap()
            .is_vacant);
    }

    #[test]
    fn test_partial_double_stays_pending() {
        let fx = Fixture::new();
        let created = fx
            .factory
            .create_double_match(&CreateDoubleMatch {
                creator_user_id: fx.user(),
                partner: Selector::Anyone,
                rivals: vec![Selector::Anyone, Selector::Anyone],
            })
            .unwrap();
        let vacant: Vec<Slot> = created.vacant_slots().cloned().collect();

        let first = fx.accept(&vacant[0], fx.user()).unwrap();
        let second = fx.accept(&vacant[1], fx.user()).unwrap();
        assert_eq!(first.game_status, GameStatus::Pending);
        assert_eq!(second.game_status, GameStatus::Pending);
        assert!(!second.promoted);

        let last = fx.accept(&vacant[2], fx.user()).unwrap();
        assert!(last.promoted);
        assert_eq!(last.game_status, GameStatus::Confirmed);
    }

    #[test]
    fn test_rejected_claim_does_not_promote() {
        let fx = Fixture::new();
        let created = fx.single(fx.user(), Selector::Anyone);
        let slot = &created.teams[1].slots[0];
        fx.accept(slot, fx.user()).unwrap();

        assert!(fx.accept(slot, fx.user()).is_err());
        let game = fx.storage.find_game(created.game.id).unwrap().unwrap();
        assert_eq!(game.status, GameStatus::Confirmed);
    }

    #[test]
    fn test_claim_and_promotion_share_one_commit() {
        let slot = Slot::vacant(generate_id(), generate_id(), None, true);
        let game_id = generate_id();
        let user = generate_id();

        let mut storage = MockStorage::new();
        let found = slot.clone();
        storage
            .expect_find_slot()
            .returning(move |_| Ok(Some(found.clone())));
        storage.expect_find_user().returning(move |id| {
            Ok(Some(User {
                id,
                name: "last".to_string(),
                email: "last@example.com".to_string(),
                rating: 1000.0,
                created_at: current_timestamp(),
            }))
        });
        storage
            .expect_find_team()
            .returning(move |id| Ok(Some(Team::new(id, game_id))));
        storage.expect_list_invitations().returning(|_| Ok(vec![]));
        storage
            .expect_commit()
            .times(1)
            .withf(move |batch| {
                batch.mutations().last() == Some(&Mutation::ConfirmIfStaffed(game_id))
            })
            .returning(move |_| {
                let mut receipt = CommitReceipt::default();
                receipt.record_confirmed(game_id);
                Ok(receipt)
            });

        let coordinator = SlotAcceptanceCoordinator::new(Arc::new(storage));
        let outcome = coordinator
            .accept_slot(&AcceptSlot {
                slot_id: slot.id,
                acting_user_id: user,
            })
            .unwrap();

        assert!(outcome.promoted);
        assert_eq!(outcome.game_id, game_id);
        assert_eq!(outcome.game_status, GameStatus::Confirmed);
    }

    #[test]
    fn test_lost_claim_race_is_conflict() {
        let slot = Slot::vacant(generate_id(), generate_id(), None, true);
        let user = generate_id();

        let mut storage = MockStorage::new();
        let found = slot.clone();
        storage
            .expect_find_slot()
            .returning(move |_| Ok(Some(found.clone())));
        storage.expect_find_user().returning(move |id| {
            Ok(Some(User {
                id,
                name: "late".to_string(),
                email: "late@example.com".to_string(),
                rating: 1000.0,
                created_at: current_timestamp(),
            }))
        });
        storage
            .expect_find_team()
            .returning(|id| Ok(Some(Team::new(id, generate_id()))));
        storage.expect_list_invitations().returning(|_| Ok(vec![]));
        storage
            .expect_commit()
            .times(1)
            .returning(|_| Err(MatchError::conflict("Slot is already occupied")));

        let coordinator = SlotAcceptanceCoordinator::new(Arc::new(storage));
        let err = coordinator
            .accept_slot(&AcceptSlot {
                slot_id: slot.id,
                acting_user_id: user,
            })
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Conflict);
    }
}
