use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::{Validate, ValidationErrors};

use crate::{
    dto::{
        phase::GameStatus,
        validation::{validate_game_id, validate_move_notation},
    },
    error::{EnvelopeError, GameError},
    state::color::Color,
};

#[derive(Debug, Deserialize, Serialize, ToSchema)]
/// Raw action envelope accepted from player WebSocket clients.
pub struct ClientEnvelope {
    /// One of `create`, `join`, `move`.
    pub action: String,
    /// Target session for `join` and `move`.
    #[serde(rename = "gameID", default, skip_serializing_if = "Option::is_none")]
    pub game_id: Option<String>,
    /// Move in coordinate (`e2e4`) or algebraic (`Nf3`) notation.
    #[serde(rename = "move", default, skip_serializing_if = "Option::is_none")]
    pub mv: Option<String>,
}

/// Typed action decoded from a [`ClientEnvelope`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientAction {
    /// Open a new session with the sender as first participant.
    Create,
    /// Take the free seat of an existing session.
    Join {
        /// Target session.
        game_id: String,
    },
    /// Submit a move in an existing session.
    Move {
        /// Target session.
        game_id: String,
        /// Move notation, checked for length only.
        mv: String,
    },
}

impl Validate for ClientAction {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        let (game_id, mv) = match self {
            ClientAction::Create => return Ok(()),
            ClientAction::Join { game_id } => (game_id, None),
            ClientAction::Move { game_id, mv } => (game_id, Some(mv)),
        };

        if let Err(e) = validate_game_id(game_id) {
            errors.add("gameID", e);
        }

        if let Some(mv) = mv {
            if let Err(e) = validate_move_notation(mv) {
                errors.add("move", e);
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

impl ClientAction {
    /// Decode a raw text frame. Field shapes are checked separately through [`Validate`].
    pub fn from_json_str(raw: &str) -> Result<Self, EnvelopeError> {
        let envelope: ClientEnvelope = serde_json::from_str(raw)?;
        envelope.try_into()
    }
}

impl TryFrom<ClientEnvelope> for ClientAction {
    type Error = EnvelopeError;

    fn try_from(envelope: ClientEnvelope) -> Result<Self, Self::Error> {
        let action = match envelope.action.as_str() {
            "create" => "create",
            "join" => "join",
            "move" => "move",
            _ => return Err(EnvelopeError::UnknownAction(envelope.action)),
        };

        let ClientEnvelope { game_id, mv, .. } = envelope;
        let require_game_id = |game_id: Option<String>| {
            game_id.ok_or(EnvelopeError::MissingField {
                action,
                field: "gameID",
            })
        };

        match action {
            "join" => Ok(ClientAction::Join {
                game_id: require_game_id(game_id)?,
            }),
            "move" => Ok(ClientAction::Move {
                game_id: require_game_id(game_id)?,
                mv: mv.ok_or(EnvelopeError::MissingField {
                    action,
                    field: "move",
                })?,
            }),
            _ => Ok(ClientAction::Create),
        }
    }
}

#[derive(Debug, Serialize, ToSchema, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
/// Status carried by session acknowledgements.
pub enum AckStatus {
    /// Reply to `create`.
    Created,
    /// Reply to `join`.
    Joined,
}

#[derive(Debug, Serialize, ToSchema)]
/// Positive acknowledgement sent to the creator or joiner of a session.
pub struct SessionAck {
    /// Which request is acknowledged.
    pub status: AckStatus,
    /// Session the sender is now seated in.
    #[serde(rename = "gameID")]
    pub game_id: String,
    /// Color assigned to the sender.
    pub color: Color,
}

impl SessionAck {
    /// Reply to a successful `create`.
    pub fn created(game_id: impl Into<String>, color: Color) -> Self {
        Self {
            status: AckStatus::Created,
            game_id: game_id.into(),
            color,
        }
    }

    /// Reply to a successful `join`.
    pub fn joined(game_id: impl Into<String>, color: Color) -> Self {
        Self {
            status: AckStatus::Joined,
            game_id: game_id.into(),
            color,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema, PartialEq, Eq)]
/// Session state fanned out to every participant after a join or an accepted move.
pub struct GameStateMessage {
    /// Outcome classification of the position.
    pub status: GameStatus,
    /// Position in Forsyth-Edwards Notation.
    pub fen: String,
}

#[derive(Debug, Serialize, ToSchema)]
/// Failure reported to the connection whose request caused it.
pub struct ErrorMessage {
    /// Reason shown to the player.
    pub error: String,
}

impl From<&GameError> for ErrorMessage {
    fn from(value: &GameError) -> Self {
        Self {
            error: value.to_string(),
        }
    }
}
