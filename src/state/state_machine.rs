use thiserror::Error;

use crate::state::rules::Outcome;

/// Lifecycle phases of a single game session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Only the creator is seated.
    WaitingForOpponent,
    /// Both seats have been filled and the game is not decided.
    InProgress,
    /// A terminal outcome was reached; no more moves are accepted.
    Finished(Outcome),
}

/// Events that drive a session through its phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// A second participant took the free seat.
    OpponentJoined,
    /// A move was accepted and produced a position with the given outcome.
    MovePlayed(Outcome),
}

/// Error returned when an event is not valid from the current phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while in {from:?}")]
pub struct InvalidTransition {
    /// The phase the state machine was in when the invalid event was received.
    pub from: SessionPhase,
    /// The event that cannot be applied from this phase.
    pub event: SessionEvent,
}

/// Forward-only state machine for a session.
#[derive(Debug, Clone)]
pub struct SessionStateMachine {
    phase: SessionPhase,
}

impl Default for SessionStateMachine {
    fn default() -> Self {
        Self {
            phase: SessionPhase::WaitingForOpponent,
        }
    }
}

impl SessionStateMachine {
    /// Create a state machine waiting for an opponent.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inspect the current phase.
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Apply `event`, returning the new phase.
    pub fn apply(&mut self, event: SessionEvent) -> Result<SessionPhase, InvalidTransition> {
        let next = self.compute_transition(event)?;
        self.phase = next;
        Ok(next)
    }

    /// Compute a transition from an event if the transition is valid.
    fn compute_transition(&self, event: SessionEvent) -> Result<SessionPhase, InvalidTransition> {
        let next = match (self.phase, event) {
            (SessionPhase::WaitingForOpponent, SessionEvent::OpponentJoined) => {
                SessionPhase::InProgress
            }
            // A vacated seat was filled again; the game keeps its phase.
            (SessionPhase::InProgress, SessionEvent::OpponentJoined) => SessionPhase::InProgress,
            (SessionPhase::Finished(outcome), SessionEvent::OpponentJoined) => {
                SessionPhase::Finished(outcome)
            }
            (SessionPhase::InProgress, SessionEvent::MovePlayed(outcome)) => {
                if outcome.is_terminal() {
                    SessionPhase::Finished(outcome)
                } else {
                    SessionPhase::InProgress
                }
            }
            (from, event) => return Err(InvalidTransition { from, event }),
        };

        Ok(next)
    }
}
