//! Match roster creation
//!
//! Builds the Game / Team / Slot / Invitation graph for a new 1v1 or 2v2 game
//! and persists it in a single batch.

use crate::error::{MatchError, Result};
use crate::storage::{Record, Storage, WriteBatch};
use crate::types::{
    CreateDoubleMatch, CreateSingleMatch, EntityKind, Game, Invitation, MatchFormat, Selector,
    Slot, Team, TeamId, TeamRoster, UserId,
};
use crate::utils::{current_timestamp, generate_id};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// A freshly created game with its roster and invitations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatedMatch {
    pub game: Game,
    /// Creator's team first
    pub teams: Vec<TeamRoster>,
    pub invitations: Vec<Invitation>,
}

impl CreatedMatch {
    /// Slots still waiting for a player
    pub fn vacant_slots(&self) -> impl Iterator<Item = &Slot> {
        self.teams
            .iter()
            .flat_map(|t| t.slots.iter())
            .filter(|s| s.is_vacant)
    }
}

/// Factory for new game rosters
pub struct MatchRosterFactory {
    storage: Arc<dyn Storage>,
    reject_unknown_targets: bool,
}

impl MatchRosterFactory {
    pub fn new(storage: Arc<dyn Storage>, reject_unknown_targets: bool) -> Self {
        Self {
            storage,
            reject_unknown_targets,
        }
    }

    /// Create a 1v1 game: the creator on one team, the rival slot on the other
    pub fn create_single_match(&self, command: &CreateSingleMatch) -> Result<CreatedMatch> {
        self.create(
            MatchFormat::Single,
            command.creator_user_id,
            &[],
            std::slice::from_ref(&command.rival),
        )
    }

    /// Create a 2v2 game: creator and partner against two rivals
    pub fn create_double_match(&self, command: &CreateDoubleMatch) -> Result<CreatedMatch> {
        if command.rivals.len() != 2 {
            return Err(MatchError::validation(format!(
                "A double match needs exactly 2 rival selectors, got {}",
                command.rivals.len()
            )));
        }

        self.create(
            MatchFormat::Double,
            command.creator_user_id,
            std::slice::from_ref(&command.partner),
            &command.rivals,
        )
    }

    fn create(
        &self,
        format: MatchFormat,
        creator: UserId,
        partners: &[Selector],
        rivals: &[Selector],
    ) -> Result<CreatedMatch> {
        if self.storage.find_user(creator)?.is_none() {
            return Err(MatchError::validation(format!(
                "Creator {} does not exist",
                creator
            )));
        }
        check_targets(creator, partners.iter().chain(rivals))?;

        let game = Game::new(generate_id(), format, current_timestamp());
        let home = Team::new(generate_id(), game.id);
        let away = Team::new(generate_id(), game.id);

        let mut invitations = Vec::new();
        let mut home_slots = vec![Slot::occupied(generate_id(), home.id, creator)];
        for selector in partners {
            home_slots.push(self.vacant_slot(home.id, selector, &mut invitations)?);
        }
        let mut away_slots = Vec::with_capacity(rivals.len());
        for selector in rivals {
            away_slots.push(self.vacant_slot(away.id, selector, &mut invitations)?);
        }

        let created = CreatedMatch {
            game,
            teams: vec![
                TeamRoster {
                    team: home,
                    slots: home_slots,
                },
                TeamRoster {
                    team: away,
                    slots: away_slots,
                },
            ],
            invitations,
        };

        let mut batch = WriteBatch::new().save(Record::Game(created.game.clone()));
        for roster in &created.teams {
            batch.push_save(Record::Team(roster.team.clone()));
            for slot in &roster.slots {
                batch.push_save(Record::Slot(slot.clone()));
            }
        }
        for invitation in &created.invitations {
            batch.push_save(Record::Invitation(invitation.clone()));
        }

        debug!(
            "Persisting {} game {} with {} writes",
            format,
            created.game.id,
            batch.len()
        );
        self.storage.commit(batch)?;

        Ok(created)
    }

    /// A vacant slot for `selector`, with its invitation
    fn vacant_slot(
        &self,
        team_id: TeamId,
        selector: &Selector,
        invitations: &mut Vec<Invitation>,
    ) -> Result<Slot> {
        let slot = match selector {
            Selector::Anyone => Slot::vacant(generate_id(), team_id, None, true),
            Selector::User(target) => {
                let resolved = self.storage.find_user(*target)?.map(|u| u.id);
                if resolved.is_none() {
                    if self.reject_unknown_targets {
                        return Err(MatchError::not_found(EntityKind::User, target));
                    }
                    warn!(
                        "Targeted user {} does not exist; slot will not be claimable",
                        target
                    );
                }
                Slot::vacant(generate_id(), team_id, resolved, false)
            }
        };

        invitations.push(Invitation {
            id: generate_id(),
            slot_id: slot.id,
            all_players_invited: slot.is_open,
        });

        Ok(slot)
    }
}

/// Targeted selectors must not name the creator or repeat a user
fn check_targets<'a>(creator: UserId, selectors: impl Iterator<Item = &'a Selector>) -> Result<()> {
    let mut seen = HashSet::new();
    for target in selectors.filter_map(Selector::target) {
        if target == creator {
            return Err(MatchError::validation(
                "The creator cannot be invited to their own game",
            ));
        }
        if !seen.insert(target) {
            return Err(MatchError::validation(format!(
                "User {} is invited more than once",
                target
            )));
        }
    }
    Ok(())
}
