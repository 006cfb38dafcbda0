//! Common types used throughout the match lifecycle service

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Unique identifier for games
pub type GameId = Uuid;

/// Unique identifier for teams
pub type TeamId = Uuid;

/// Unique identifier for roster slots
pub type SlotId = Uuid;

/// Unique identifier for invitations
pub type InvitationId = Uuid;

/// Unique identifier for users
pub type UserId = Uuid;

/// Token a client sends instead of a user id to open a slot to anyone
pub const OPEN_SELECTOR: &str = "all";

/// Kind of persisted entity, used in errors and storage keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Game,
    Team,
    Slot,
    Invitation,
    User,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityKind::Game => write!(f, "game"),
            EntityKind::Team => write!(f, "team"),
            EntityKind::Slot => write!(f, "slot"),
            EntityKind::Invitation => write!(f, "invitation"),
            EntityKind::User => write!(f, "user"),
        }
    }
}

/// Roster size of a game: one or two players per team
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatchFormat {
    Single,
    Double,
}

impl MatchFormat {
    /// Number of slots on each team
    pub fn team_players(&self) -> usize {
        match self {
            MatchFormat::Single => 1,
            MatchFormat::Double => 2,
        }
    }

    pub fn from_team_players(team_players: usize) -> Option<Self> {
        match team_players {
            1 => Some(MatchFormat::Single),
            2 => Some(MatchFormat::Double),
            _ => None,
        }
    }

    /// Metric and log label
    pub fn label(&self) -> &'static str {
        match self {
            MatchFormat::Single => "single",
            MatchFormat::Double => "double",
        }
    }
}

impl std::fmt::Display for MatchFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let n = self.team_players();
        write!(f, "{}v{}", n, n)
    }
}

/// Lifecycle state of a game. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameStatus {
    /// Created, at least one slot still vacant
    Pending,
    /// Every slot is occupied
    Confirmed,
    /// Score submitted and ratings settled (terminal)
    Finished,
}

impl GameStatus {
    /// Whether `next` is the single legal successor of this status
    pub fn can_transition_to(&self, next: GameStatus) -> bool {
        matches!(
            (self, next),
            (GameStatus::Pending, GameStatus::Confirmed)
                | (GameStatus::Confirmed, GameStatus::Finished)
        )
    }
}

impl std::fmt::Display for GameStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GameStatus::Pending => write!(f, "pending"),
            GameStatus::Confirmed => write!(f, "confirmed"),
            GameStatus::Finished => write!(f, "finished"),
        }
    }
}

/// One contest between exactly two teams
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Game {
    pub id: GameId,
    pub format: MatchFormat,
    pub start_time: DateTime<Utc>,
    pub status: GameStatus,
}

impl Game {
    pub fn new(id: GameId, format: MatchFormat, start_time: DateTime<Utc>) -> Self {
        Self {
            id,
            format,
            start_time,
            status: GameStatus::Pending,
        }
    }

    pub fn team_players(&self) -> usize {
        self.format.team_players()
    }
}

/// One side of a game
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Team {
    pub id: TeamId,
    pub game_id: GameId,
    /// Set only at settlement
    pub score: i64,
}

impl Team {
    pub fn new(id: TeamId, game_id: GameId) -> Self {
        Self {
            id,
            game_id,
            score: 0,
        }
    }
}

/// One roster position on a team.
///
/// A non-vacant slot always carries a `user_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slot {
    pub id: SlotId,
    pub team_id: TeamId,
    pub user_id: Option<UserId>,
    /// Any authenticated user may claim an open slot
    pub is_open: bool,
    pub is_vacant: bool,
}

impl Slot {
    /// An occupied, closed slot (the match creator's own position)
    pub fn occupied(id: SlotId, team_id: TeamId, user_id: UserId) -> Self {
        Self {
            id,
            team_id,
            user_id: Some(user_id),
            is_open: false,
            is_vacant: false,
        }
    }

    /// A vacant slot, either open to anyone or reserved for `user_id`
    pub fn vacant(id: SlotId, team_id: TeamId, user_id: Option<UserId>, is_open: bool) -> Self {
        Self {
            id,
            team_id,
            user_id,
            is_open,
            is_vacant: true,
        }
    }

    /// Admission rule: vacant and either open or reserved for this user
    pub fn admits(&self, user_id: UserId) -> bool {
        self.is_vacant && (self.is_open || self.user_id == Some(user_id))
    }

    /// The slot after `user_id` has claimed it
    pub fn claimed_by(&self, user_id: UserId) -> Self {
        Self {
            user_id: Some(user_id),
            is_vacant: false,
            ..self.clone()
        }
    }
}

/// Standing solicitation on a vacant slot, deleted when the slot is taken
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invitation {
    pub id: InvitationId,
    pub slot_id: SlotId,
    /// True when the slot was broadcast to everyone
    pub all_players_invited: bool,
}

/// A registered player
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: String,
    /// Changed only by settlement
    pub rating: f64,
    pub created_at: DateTime<Utc>,
}

/// Who a roster position is meant for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Selector {
    /// Open to any authenticated user
    Anyone,
    /// Reserved for one specific user
    User(UserId),
}

impl Selector {
    pub fn is_open(&self) -> bool {
        matches!(self, Selector::Anyone)
    }

    pub fn target(&self) -> Option<UserId> {
        match self {
            Selector::Anyone => None,
            Selector::User(id) => Some(*id),
        }
    }
}

impl FromStr for Selector {
    type Err = crate::error::MatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case(OPEN_SELECTOR) {
            return Ok(Selector::Anyone);
        }
        Uuid::parse_str(trimmed)
            .map(Selector::User)
            .map_err(|_| crate::error::MatchError::validation(format!("Invalid selector: '{}'", s)))
    }
}

impl std::fmt::Display for Selector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Selector::Anyone => write!(f, "{}", OPEN_SELECTOR),
            Selector::User(id) => write!(f, "{}", id),
        }
    }
}

/// Command: create a 1v1 game
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSingleMatch {
    pub creator_user_id: UserId,
    pub rival: Selector,
}

/// Command: create a 2v2 game
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateDoubleMatch {
    pub creator_user_id: UserId,
    pub partner: Selector,
    /// Must hold exactly two selectors
    pub rivals: Vec<Selector>,
}

/// Command: claim a slot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcceptSlot {
    pub slot_id: SlotId,
    pub acting_user_id: UserId,
}

/// Command: settle a game with final team scores
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitScore {
    pub game_id: GameId,
    pub team_a_id: TeamId,
    pub team_a_score: i64,
    pub team_b_id: TeamId,
    pub team_b_score: i64,
}

/// A team with its slots, read together
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamRoster {
    pub team: Team,
    pub slots: Vec<Slot>,
}

/// A game with all teams and slots, read from one consistent snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RosterSnapshot {
    pub game: Game,
    pub teams: Vec<TeamRoster>,
}

impl RosterSnapshot {
    pub fn slots(&self) -> impl Iterator<Item = &Slot> {
        self.teams.iter().flat_map(|t| t.slots.iter())
    }

    pub fn vacant_slots(&self) -> usize {
        self.slots().filter(|s| s.is_vacant).count()
    }

    pub fn is_fully_staffed(&self) -> bool {
        self.vacant_slots() == 0
    }

    pub fn team(&self, team_id: TeamId) -> Option<&TeamRoster> {
        self.teams.iter().find(|t| t.team.id == team_id)
    }
}

/// Read-only projection of a team
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamView {
    pub team_id: TeamId,
    pub score: i64,
    pub slots: Vec<Slot>,
}

/// Read-only projection of a game
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameView {
    pub game_id: GameId,
    pub status: GameStatus,
    pub team_players: usize,
    pub start_time: DateTime<Utc>,
    pub teams: Vec<TeamView>,
}

impl From<RosterSnapshot> for GameView {
    fn from(snapshot: RosterSnapshot) -> Self {
        Self {
            game_id: snapshot.game.id,
            status: snapshot.game.status,
            team_players: snapshot.game.team_players(),
            start_time: snapshot.game.start_time,
            teams: snapshot
                .teams
                .into_iter()
                .map(|roster| TeamView {
                    team_id: roster.team.id,
                    score: roster.team.score,
                    slots: roster.slots,
                })
                .collect(),
        }
    }
}

/// Rating change information for a player
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingChange {
    pub user_id: UserId,
    pub old_rating: f64,
    pub new_rating: f64,
}

impl RatingChange {
    /// How much the rating moved (+/-)
    pub fn delta(&self) -> f64 {
        self.new_rating - self.old_rating
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selector_parsing() {
        assert_eq!("all".parse::<Selector>().unwrap(), Selector::Anyone);
        assert_eq!(" ALL ".parse::<Selector>().unwrap(), Selector::Anyone);

        let id = Uuid::new_v4();
        assert_eq!(
            id.to_string().parse::<Selector>().unwrap(),
            Selector::User(id)
        );

        assert!("not-a-user".parse::<Selector>().is_err());
        assert_eq!(Selector::Anyone.to_string(), "all");
    }

    #[test]
    fn test_status_transitions() {
        assert!(GameStatus::Pending.can_transition_to(GameStatus::Confirmed));
        assert!(GameStatus::Confirmed.can_transition_to(GameStatus::Finished));
        assert!(!GameStatus::Confirmed.can_transition_to(GameStatus::Pending));
        assert!(!GameStatus::Finished.can_transition_to(GameStatus::Confirmed));
        assert!(!GameStatus::Pending.can_transition_to(GameStatus::Finished));
    }

    #[test]
    fn test_slot_admission() {
        let owner = Uuid::new_v4();
        let stranger = Uuid::new_v4();
        let team = Uuid::new_v4();

        let open = Slot::vacant(Uuid::new_v4(), team, None, true);
        assert!(open.admits(owner));
        assert!(open.admits(stranger));

        let targeted = Slot::vacant(Uuid::new_v4(), team, Some(owner), false);
        assert!(targeted.admits(owner));
        assert!(!targeted.admits(stranger));

        let taken = targeted.claimed_by(owner);
        assert!(!taken.is_vacant);
        assert_eq!(taken.user_id, Some(owner));
        assert!(!taken.admits(owner));

        // targeted at nobody: nobody can take it
        let orphan = Slot::vacant(Uuid::new_v4(), team, None, false);
        assert!(!orphan.admits(owner));
    }

    #[test]
    fn test_match_format() {
        assert_eq!(MatchFormat::Single.team_players(), 1);
        assert_eq!(MatchFormat::Double.team_players(), 2);
        assert_eq!(MatchFormat::from_team_players(2), Some(MatchFormat::Double));
        assert_eq!(MatchFormat::from_team_players(3), None);
        assert_eq!(MatchFormat::Double.to_string(), "2v2");
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&GameStatus::Confirmed).unwrap();
        assert_eq!(json, "\"confirmed\"");
    }
}
