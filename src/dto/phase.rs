use serde::Serialize;
use utoipa::ToSchema;

use crate::state::rules::Outcome;

/// Game status exposed to clients in state broadcasts.
#[derive(Debug, Serialize, ToSchema, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GameStatus {
    /// Play continues.
    Ongoing,
    /// The side to move has been mated.
    Checkmate,
    /// The side to move has no legal move and is not in check.
    Stalemate,
    /// Drawn by rule (insufficient material, seventy-five-move rule).
    Draw,
}

impl GameStatus {
    /// Wire name of the status.
    pub fn as_str(self) -> &'static str {
        match self {
            GameStatus::Ongoing => "ongoing",
            GameStatus::Checkmate => "checkmate",
            GameStatus::Stalemate => "stalemate",
            GameStatus::Draw => "draw",
        }
    }
}

impl From<Outcome> for GameStatus {
    fn from(value: Outcome) -> Self {
        match value {
            Outcome::Ongoing => GameStatus::Ongoing,
            Outcome::Checkmate => GameStatus::Checkmate,
            Outcome::Stalemate => GameStatus::Stalemate,
            Outcome::Draw(_) => GameStatus::Draw,
        }
    }
}
