//! Match lifecycle
//!
//! Creation of game rosters, slot acceptance with promotion to confirmed,
//! and score settlement, plus the manager facade that fronts them.

pub mod acceptance;
pub mod manager;
pub mod roster;
pub mod settlement;
pub mod view;

// Re-export commonly used types
pub use acceptance::{AcceptanceOutcome, SlotAcceptanceCoordinator};
pub use manager::{MatchManager, MatchManagerStats};
pub use roster::{CreatedMatch, MatchRosterFactory};
pub use settlement::{ScoreSettlementCoordinator, SettlementOutcome};
pub use view::game_view;
