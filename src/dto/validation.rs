//! Validation helpers for DTOs.

use validator::ValidationError;

/// Longest accepted session identifier.
const MAX_GAME_ID_LEN: usize = 64;
/// Shortest accepted move (`e4`).
const MIN_MOVE_LEN: usize = 2;
/// Longest accepted move (`exd8=Q+`, `e7e8q` and the like fit comfortably).
const MAX_MOVE_LEN: usize = 10;

/// Validates that a session identifier is 1 to 64 bytes long.
///
/// Content is not inspected: any string is a lookup key, and ids the registry never issued
/// are reported as unknown sessions.
///
/// # Examples
///
/// ```ignore
/// validate_game_id("0f8c1d2e-7a3b-4c5d-9e6f-1a2b3c4d5e6f") // Ok
/// validate_game_id("no_such_game")                         // Ok
/// validate_game_id("")                                     // Err - empty
/// ```
pub fn validate_game_id(id: &str) -> Result<(), ValidationError> {
    if id.is_empty() || id.len() > MAX_GAME_ID_LEN {
        let mut err = ValidationError::new("game_id_length");
        err.message = Some(
            format!(
                "Game ID must be between 1 and {MAX_GAME_ID_LEN} characters (got {})",
                id.len()
            )
            .into(),
        );
        return Err(err);
    }

    Ok(())
}

/// Validates the length of a move, ignoring surrounding whitespace.
///
/// Parsing and legality are left to the rules engine.
pub fn validate_move_notation(notation: &str) -> Result<(), ValidationError> {
    let len = notation.trim().chars().count();
    if !(MIN_MOVE_LEN..=MAX_MOVE_LEN).contains(&len) {
        let mut err = ValidationError::new("move_length");
        err.message = Some(
            format!("Move must be between {MIN_MOVE_LEN} and {MAX_MOVE_LEN} characters (got {len})")
                .into(),
        );
        return Err(err);
    }

    Ok(())
}
