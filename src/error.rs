use thiserror::Error;
use validator::ValidationErrors;

use crate::state::{
    rules::{INVALID_NOTATION, IllegalMove},
    state_machine::{InvalidTransition, SessionPhase},
};

/// Game errors reported back to the connection that issued the request.
///
/// The `Display` output is the exact string sent in the `error` field.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GameError {
    /// No session is registered under the requested identifier.
    #[error("game not found")]
    NotFound,
    /// Both seats of the session are taken.
    #[error("game full")]
    Full,
    /// The sender does not hold the color whose turn it is.
    #[error("not your turn")]
    NotYourTurn,
    /// A move was submitted while a seat is empty.
    #[error("waiting for opponent")]
    WaitingForOpponent,
    /// A move was submitted after the game reached a terminal outcome.
    #[error("game over")]
    GameOver,
    /// The rules engine rejected the move; carries its reason verbatim.
    #[error("{0}")]
    IllegalMove(#[from] IllegalMove),
}

impl From<InvalidTransition> for GameError {
    fn from(err: InvalidTransition) -> Self {
        match err.from {
            SessionPhase::Finished(_) => GameError::GameOver,
            SessionPhase::WaitingForOpponent | SessionPhase::InProgress => {
                GameError::WaitingForOpponent
            }
        }
    }
}

impl From<&ValidationErrors> for GameError {
    /// Field shape failures get the reply the same request would earn downstream: an id
    /// the registry can never have issued is unknown, an oversized move is unparseable.
    fn from(errors: &ValidationErrors) -> Self {
        if errors.errors().contains_key("gameID") {
            GameError::NotFound
        } else {
            GameError::IllegalMove(IllegalMove::new(INVALID_NOTATION))
        }
    }
}

/// Protocol errors raised while decoding an inbound frame. Logged, never answered.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    /// The frame is not a JSON action envelope.
    #[error("malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),
    /// The `action` field names no known action.
    #[error("unknown action `{0}`")]
    UnknownAction(String),
    /// A field required by the action is absent.
    #[error("action `{action}` requires `{field}`")]
    MissingField {
        /// Action being decoded.
        action: &'static str,
        /// Wire name of the missing field.
        field: &'static str,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{rules::Outcome, state_machine::SessionEvent};

    #[test]
    fn wire_strings_are_stable() {
        assert_eq!(GameError::NotFound.to_string(), "game not found");
        assert_eq!(GameError::Full.to_string(), "game full");
        assert_eq!(GameError::NotYourTurn.to_string(), "not your turn");
        assert_eq!(
            GameError::IllegalMove(IllegalMove::new("invalid move")).to_string(),
            "invalid move"
        );
    }

    #[test]
    fn rejected_transitions_map_to_game_errors() {
        let finished = InvalidTransition {
            from: SessionPhase::Finished(Outcome::Checkmate),
            event: SessionEvent::MovePlayed(Outcome::Ongoing),
        };
        assert_eq!(GameError::from(finished), GameError::GameOver);

        let waiting = InvalidTransition {
            from: SessionPhase::WaitingForOpponent,
            event: SessionEvent::MovePlayed(Outcome::Ongoing),
        };
        assert_eq!(GameError::from(waiting), GameError::WaitingForOpponent);
    }
}
