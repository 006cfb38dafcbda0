//! Read-only game projection

use crate::error::{MatchError, Result};
use crate::storage::Storage;
use crate::types::{EntityKind, GameId, GameView};

/// Assemble the view of one game from a single roster snapshot
pub fn game_view(storage: &dyn Storage, game_id: GameId) -> Result<GameView> {
    storage
        .load_roster(game_id)?
        .map(GameView::from)
        .ok_or_else(|| MatchError::not_found(EntityKind::Game, game_id))
}
