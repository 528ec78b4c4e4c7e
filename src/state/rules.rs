//! Move legality and outcome classification.
//!
//! Sessions only talk to the board through [`RulesEngine`]; [`StandardChess`] is the
//! production implementation backed by `shakmaty`.

use shakmaty::{
    CastlingMode, Chess, EnPassantMode, Move, Position,
    fen::Fen,
    san::{San, SanPlus},
    uci::UciMove,
};
use thiserror::Error;

use crate::state::color::Color;

/// Reason reported when a move fails to parse.
pub const INVALID_NOTATION: &str = "invalid move notation";
/// Reason reported when a move parses but is not legal in the position.
pub const INVALID_MOVE: &str = "invalid move";

/// Half-moves without capture or pawn move after which the game is drawn automatically.
const SEVENTY_FIVE_MOVE_LIMIT: u32 = 150;

/// Rejection produced by the rules engine for a submitted move.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}")]
pub struct IllegalMove {
    /// Human readable reason forwarded verbatim to the client.
    pub reason: String,
}

impl IllegalMove {
    /// Create a rejection with the given reason.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Why a finished game ended without a winner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawReason {
    /// Neither side can deliver mate.
    InsufficientMaterial,
    /// 75 full moves without capture or pawn move.
    SeventyFiveMoveRule,
}

/// Classification of a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Play continues.
    Ongoing,
    /// The side to move is mated.
    Checkmate,
    /// The side to move has no legal move and is not in check.
    Stalemate,
    /// Drawn for the given reason.
    Draw(DrawReason),
}

impl Outcome {
    /// Whether the game is over.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Outcome::Ongoing)
    }
}

/// Move-legality and outcome engine consumed by sessions.
pub trait RulesEngine: Send + Sync + 'static {
    /// Full game state: board, side to move, and history.
    type Position: Clone + Send + Sync + 'static;

    /// Starting position of a new game.
    fn new_game(&self) -> Self::Position;

    /// Apply `notation` to `position`, returning the resulting position.
    fn apply_move(
        &self,
        position: &Self::Position,
        notation: &str,
    ) -> Result<Self::Position, IllegalMove>;

    /// Color allowed to submit the next move.
    fn side_to_move(&self, position: &Self::Position) -> Color;

    /// Classify `position`.
    fn outcome(&self, position: &Self::Position) -> Outcome;

    /// Board-exchange encoding sent to clients.
    fn serialize(&self, position: &Self::Position) -> String;
}

/// Standard chess position plus the SAN history that produced it.
#[derive(Debug, Clone, Default)]
pub struct ChessPosition {
    board: Chess,
    history: Vec<String>,
}

impl ChessPosition {
    /// Load a position from FEN with an empty history.
    pub fn from_fen(fen: &str) -> Result<Self, IllegalMove> {
        let fen: Fen = fen
            .parse()
            .map_err(|err| IllegalMove::new(format!("invalid FEN: {err}")))?;
        let board: Chess = fen
            .into_position(CastlingMode::Standard)
            .map_err(|err| IllegalMove::new(format!("invalid FEN: {err}")))?;
        Ok(Self {
            board,
            history: Vec::new(),
        })
    }

    /// Moves played so far, in SAN.
    pub fn history(&self) -> &[String] {
        &self.history
    }
}

/// Rules engine for standard chess.
///
/// Accepts UCI coordinate notation (`e2e4`, `e7e8q`) and falls back to SAN (`Nf3`, `O-O`).
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardChess;

impl StandardChess {
    fn parse_move(board: &Chess, notation: &str) -> Result<Move, IllegalMove> {
        let notation = notation.trim();
        if let Ok(uci) = notation.parse::<UciMove>() {
            return uci
                .to_move(board)
                .map_err(|_| IllegalMove::new(INVALID_MOVE));
        }

        let san: SanPlus = notation
            .parse()
            .map_err(|_| IllegalMove::new(INVALID_NOTATION))?;
        san.san
            .to_move(board)
            .map_err(|_| IllegalMove::new(INVALID_MOVE))
    }
}

impl RulesEngine for StandardChess {
    type Position = ChessPosition;

    fn new_game(&self) -> ChessPosition {
        ChessPosition::default()
    }

    fn apply_move(
        &self,
        position: &ChessPosition,
        notation: &str,
    ) -> Result<ChessPosition, IllegalMove> {
        let m = Self::parse_move(&position.board, notation)?;
        let san = San::from_move(&position.board, &m);
        let board = position
            .board
            .clone()
            .play(&m)
            .map_err(|_| IllegalMove::new(INVALID_MOVE))?;

        let mut history = position.history.clone();
        history.push(san.to_string());
        Ok(ChessPosition { board, history })
    }

    fn side_to_move(&self, position: &ChessPosition) -> Color {
        position.board.turn().into()
    }

    fn outcome(&self, position: &ChessPosition) -> Outcome {
        let board = &position.board;
        if board.is_checkmate() {
            Outcome::Checkmate
        } else if board.is_stalemate() {
            Outcome::Stalemate
        } else if board.is_insufficient_material() {
            Outcome::Draw(DrawReason::InsufficientMaterial)
        } else if board.halfmoves() >= SEVENTY_FIVE_MOVE_LIMIT {
            Outcome::Draw(DrawReason::SeventyFiveMoveRule)
        } else {
            Outcome::Ongoing
        }
    }

    fn serialize(&self, position: &ChessPosition) -> String {
        Fen::from_position(position.board.clone(), EnPassantMode::Legal).to_string()
    }
}
