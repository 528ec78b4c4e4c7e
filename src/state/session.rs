//! Authoritative state of one game.
//!
//! Every operation takes the session's own lock for its whole body, including the
//! broadcast it triggers, so the state fanned out always reflects exactly the mutation
//! that caused it.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::{
    dto::{
        phase::GameStatus,
        ws::{GameStateMessage, SessionAck},
    },
    error::GameError,
    services::broadcast::broadcast_state,
    state::{
        color::Color,
        connection::{Connection, ConnectionId},
        rules::RulesEngine,
        state_machine::{SessionEvent, SessionPhase, SessionStateMachine},
    },
};

/// Seats per session.
pub const MAX_PARTICIPANTS: usize = 2;

/// A connection seated in a session with its color.
#[derive(Debug, Clone)]
pub struct Participant {
    /// Handle to the client; owned by the connection's read loop.
    pub connection: Connection,
    /// Assigned at join time, never changed.
    pub color: Color,
}

/// Read-only projection of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// Lifecycle phase.
    pub phase: SessionPhase,
    /// Wire status derived from the position's outcome.
    pub status: GameStatus,
    /// Board-exchange encoding of the position.
    pub fen: String,
    /// Seated participants.
    pub players: usize,
    /// Accepted moves so far.
    pub moves: usize,
}

impl Snapshot {
    /// Payload broadcast to participants.
    pub fn message(&self) -> GameStateMessage {
        GameStateMessage {
            status: self.status,
            fen: self.fen.clone(),
        }
    }
}

/// Result of removing a connection from a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Departure {
    /// Seats the connection held.
    pub removed: usize,
    /// Seats still taken.
    pub remaining: usize,
    /// The session has no participants left and must be dropped from the registry.
    pub closed: bool,
}

struct SessionState<P> {
    position: P,
    players: Vec<Participant>,
    machine: SessionStateMachine,
    moves: usize,
    closed: bool,
}

/// One game: position, participants and phase behind a single exclusive lock.
pub struct Session<R: RulesEngine> {
    id: String,
    engine: Arc<R>,
    state: Mutex<SessionState<R::Position>>,
}

impl<R: RulesEngine> Session<R> {
    /// Start a new game with `creator` in the first seat.
    pub fn new(id: String, engine: Arc<R>, creator: Participant) -> Self {
        let position = engine.new_game();
        Self {
            id,
            engine,
            state: Mutex::new(SessionState {
                position,
                players: vec![creator],
                machine: SessionStateMachine::new(),
                moves: 0,
                closed: false,
            }),
        }
    }

    /// Registry key of this session.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Seat `connection` opposite the existing participant.
    ///
    /// The joiner is acknowledged before the state broadcast so it learns its color first.
    pub async fn join(&self, connection: Connection) -> Result<Color, GameError> {
        let mut state = self.state.lock().await;
        if state.closed {
            return Err(GameError::NotFound);
        }
        if state.players.len() >= MAX_PARTICIPANTS {
            return Err(GameError::Full);
        }
        let Some(existing) = state.players.first() else {
            return Err(GameError::NotFound);
        };
        let color = existing.color.opposite();

        let phase = state.machine.apply(SessionEvent::OpponentJoined)?;
        state.players.push(Participant {
            connection: connection.clone(),
            color,
        });
        info!(game_id = %self.id, conn = %connection.id(), %color, ?phase, "participant joined");

        if let Err(err) = connection.send(&SessionAck::joined(&self.id, color)).await {
            warn!(game_id = %self.id, conn = %connection.id(), error = %err, "failed to acknowledge join");
        }
        self.broadcast(&state).await;

        Ok(color)
    }

    /// Apply a move on behalf of `connection` and broadcast the resulting state.
    ///
    /// A rejected move leaves the position untouched.
    pub async fn apply_move(
        &self,
        connection: &Connection,
        notation: &str,
    ) -> Result<GameStatus, GameError> {
        let mut state = self.state.lock().await;
        if state.closed {
            return Err(GameError::NotFound);
        }
        match state.machine.phase() {
            SessionPhase::Finished(_) => return Err(GameError::GameOver),
            SessionPhase::WaitingForOpponent => return Err(GameError::WaitingForOpponent),
            SessionPhase::InProgress if state.players.len() < MAX_PARTICIPANTS => {
                return Err(GameError::WaitingForOpponent);
            }
            SessionPhase::InProgress => {}
        }

        // A connection holding both seats plays whichever color is to move.
        let side = self.engine.side_to_move(&state.position);
        let seated = state
            .players
            .iter()
            .any(|player| player.connection.id() == connection.id() && player.color == side);
        if !seated {
            return Err(GameError::NotYourTurn);
        }

        let next = self.engine.apply_move(&state.position, notation)?;
        let outcome = self.engine.outcome(&next);
        let phase = state.machine.apply(SessionEvent::MovePlayed(outcome))?;
        state.position = next;
        state.moves += 1;
        info!(
            game_id = %self.id,
            conn = %connection.id(),
            color = %side,
            notation,
            moves = state.moves,
            ?phase,
            "move applied"
        );

        self.broadcast(&state).await;
        Ok(outcome.into())
    }

    /// Current phase, outcome and position.
    pub async fn snapshot(&self) -> Snapshot {
        let state = self.state.lock().await;
        self.project(&state)
    }

    /// Seated connections and their colors, in seating order.
    pub async fn participants(&self) -> Vec<(ConnectionId, Color)> {
        let state = self.state.lock().await;
        state
            .players
            .iter()
            .map(|player| (player.connection.id(), player.color))
            .collect()
    }

    /// Drop every seat held by `connection`. Never closes the connection itself.
    pub async fn remove_participant(&self, connection: ConnectionId) -> Departure {
        let mut state = self.state.lock().await;
        let before = state.players.len();
        state
            .players
            .retain(|player| player.connection.id() != connection);
        let removed = before - state.players.len();
        if removed > 0 && state.players.is_empty() {
            state.closed = true;
        }

        Departure {
            removed,
            remaining: state.players.len(),
            closed: state.closed,
        }
    }

    fn project(&self, state: &SessionState<R::Position>) -> Snapshot {
        Snapshot {
            phase: state.machine.phase(),
            status: self.engine.outcome(&state.position).into(),
            fen: self.engine.serialize(&state.position),
            players: state.players.len(),
            moves: state.moves,
        }
    }

    async fn broadcast(&self, state: &SessionState<R::Position>) {
        let snapshot = self.project(state);
        broadcast_state(&self.id, &state.players, &snapshot.message()).await;
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    use axum::extract::ws::Message;
    use serde_json::{Value, json};
    use tokio::sync::mpsc;

    use super::*;
    use crate::state::connection::SendError;
    use crate::state::rules::{
        ChessPosition, INVALID_MOVE, IllegalMove, Outcome, StandardChess,
    };

    const START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

    fn connection() -> (Connection, mpsc::Receiver<Message>) {
        let (tx, rx) = mpsc::channel(16);
        (Connection::new(tx, Duration::from_millis(50)), rx)
    }

    fn drain(rx: &mut mpsc::Receiver<Message>) -> Vec<Value> {
        let mut frames = Vec::new();
        while let Ok(message) = rx.try_recv() {
            if let Message::Text(text) = message {
                frames.push(serde_json::from_str(text.as_str()).unwrap());
            }
        }
        frames
    }

    fn session_with<R: RulesEngine>(
        engine: R,
        creator: &Connection,
        color: Color,
    ) -> Session<R> {
        Session::new(
            "game-1".into(),
            Arc::new(engine),
            Participant {
                connection: creator.clone(),
                color,
            },
        )
    }

    async fn started(
        white_conn: &Connection,
        black_conn: &Connection,
    ) -> Session<StandardChess> {
        let session = session_with(StandardChess, white_conn, Color::White);
        session.join(black_conn.clone()).await.unwrap();
        session
    }

    /// Counts how many times the wrapped engine applied a move.
    struct CountingEngine {
        applied: AtomicUsize,
    }

    impl RulesEngine for CountingEngine {
        type Position = ChessPosition;

        fn new_game(&self) -> ChessPosition {
            StandardChess.new_game()
        }

        fn apply_move(
            &self,
            position: &ChessPosition,
            notation: &str,
        ) -> Result<ChessPosition, IllegalMove> {
            let next = StandardChess.apply_move(position, notation)?;
            self.applied.fetch_add(1, Ordering::SeqCst);
            Ok(next)
        }

        fn side_to_move(&self, position: &ChessPosition) -> Color {
            StandardChess.side_to_move(position)
        }

        fn outcome(&self, position: &ChessPosition) -> Outcome {
            StandardChess.outcome(position)
        }

        fn serialize(&self, position: &ChessPosition) -> String {
            StandardChess.serialize(position)
        }
    }

    #[tokio::test]
    async fn join_assigns_complement_and_starts_game() {
        let (creator, mut creator_rx) = connection();
        let (joiner, mut joiner_rx) = connection();
        let session = session_with(StandardChess, &creator, Color::Black);

        assert_eq!(session.join(joiner.clone()).await.unwrap(), Color::White);

        let snapshot = session.snapshot().await;
        assert_eq!(snapshot.phase, SessionPhase::InProgress);
        assert_eq!(snapshot.players, 2);
        assert_eq!(
            session.participants().await,
            vec![(creator.id(), Color::Black), (joiner.id(), Color::White)]
        );

        assert_eq!(
            drain(&mut joiner_rx),
            vec![
                json!({"status": "joined", "gameID": "game-1", "color": "white"}),
                json!({"status": "ongoing", "fen": START_FEN}),
            ]
        );
        assert_eq!(
            drain(&mut creator_rx),
            vec![json!({"status": "ongoing", "fen": START_FEN})]
        );
    }

    #[tokio::test]
    async fn third_join_is_rejected() {
        let (white, _white_rx) = connection();
        let (black, _black_rx) = connection();
        let (late, mut late_rx) = connection();
        let session = started(&white, &black).await;

        assert_eq!(session.join(late).await.unwrap_err(), GameError::Full);
        assert_eq!(session.snapshot().await.players, 2);
        assert!(drain(&mut late_rx).is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_joins_fill_exactly_one_seat() {
        let (creator, _creator_rx) = connection();
        let session = Arc::new(session_with(StandardChess, &creator, Color::White));

        let mut receivers = Vec::new();
        let mut handles = Vec::new();
        for _ in 0..16 {
            let (joiner, rx) = connection();
            receivers.push(rx);
            let session = session.clone();
            handles.push(tokio::spawn(async move { session.join(joiner).await }));
        }

        let mut joined = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(color) => {
                    assert_eq!(color, Color::Black);
                    joined += 1;
                }
                Err(err) => assert_eq!(err, GameError::Full),
            }
        }

        assert_eq!(joined, 1);
        let colors: Vec<Color> = session
            .participants()
            .await
            .into_iter()
            .map(|(_, color)| color)
            .collect();
        assert_eq!(colors, vec![Color::White, Color::Black]);
    }

    #[tokio::test]
    async fn accepted_move_is_broadcast_to_both() {
        let (white, mut white_rx) = connection();
        let (black, mut black_rx) = connection();
        let session = started(&white, &black).await;
        drain(&mut white_rx);
        drain(&mut black_rx);

        let status = session.apply_move(&white, "e2e4").await.unwrap();
        assert_eq!(status, GameStatus::Ongoing);

        let expected = json!({
            "status": "ongoing",
            "fen": "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1"
        });
        assert_eq!(drain(&mut white_rx), vec![expected.clone()]);
        assert_eq!(drain(&mut black_rx), vec![expected]);
    }

    #[tokio::test]
    async fn out_of_turn_move_leaves_position_unchanged() {
        let (white, _white_rx) = connection();
        let (black, mut black_rx) = connection();
        let session = started(&white, &black).await;
        session.apply_move(&white, "e2e4").await.unwrap();
        let before = session.snapshot().await;
        drain(&mut black_rx);

        assert_eq!(
            session.apply_move(&white, "d2d4").await.unwrap_err(),
            GameError::NotYourTurn
        );
        assert_eq!(session.snapshot().await, before);
        assert!(drain(&mut black_rx).is_empty());
    }

    #[tokio::test]
    async fn outsider_cannot_move() {
        let (white, _white_rx) = connection();
        let (black, _black_rx) = connection();
        let (outsider, _outsider_rx) = connection();
        let session = started(&white, &black).await;

        assert_eq!(
            session.apply_move(&outsider, "e2e4").await.unwrap_err(),
            GameError::NotYourTurn
        );
    }

    #[tokio::test]
    async fn illegal_move_carries_engine_reason() {
        let (white, _white_rx) = connection();
        let (black, _black_rx) = connection();
        let session = started(&white, &black).await;

        let err = session.apply_move(&white, "e2e5").await.unwrap_err();
        assert_eq!(err, GameError::IllegalMove(IllegalMove::new(INVALID_MOVE)));
        assert_eq!(session.snapshot().await.fen, START_FEN);
    }

    #[tokio::test]
    async fn move_requires_an_opponent() {
        let (white, _white_rx) = connection();
        let session = session_with(StandardChess, &white, Color::White);

        assert_eq!(
            session.apply_move(&white, "e2e4").await.unwrap_err(),
            GameError::WaitingForOpponent
        );
        assert_eq!(session.snapshot().await.fen, START_FEN);
    }

    #[tokio::test]
    async fn checkmate_finishes_the_game() {
        let (white, _white_rx) = connection();
        let (black, mut black_rx) = connection();
        let session = started(&white, &black).await;

        session.apply_move(&white, "f2f3").await.unwrap();
        session.apply_move(&black, "e7e5").await.unwrap();
        session.apply_move(&white, "g2g4").await.unwrap();
        drain(&mut black_rx);
        let status = session.apply_move(&black, "d8h4").await.unwrap();

        assert_eq!(status, GameStatus::Checkmate);
        assert_eq!(
            session.snapshot().await.phase,
            SessionPhase::Finished(Outcome::Checkmate)
        );
        let frames = drain(&mut black_rx);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0]["status"], "checkmate");

        assert_eq!(
            session.apply_move(&white, "e1f2").await.unwrap_err(),
            GameError::GameOver
        );
    }

    #[tokio::test]
    async fn each_accepted_move_applies_engine_once() {
        let (white, _white_rx) = connection();
        let (black, _black_rx) = connection();
        let engine = CountingEngine {
            applied: AtomicUsize::new(0),
        };
        let session = session_with(engine, &white, Color::White);
        session.join(black.clone()).await.unwrap();

        session.apply_move(&white, "e2e4").await.unwrap();
        session.apply_move(&white, "e7e5").await.unwrap_err();
        session.apply_move(&black, "e7e6").await.unwrap();
        session.apply_move(&white, "zz").await.unwrap_err();

        assert_eq!(session.engine.applied.load(Ordering::SeqCst), 2);
        assert_eq!(session.snapshot().await.moves, 2);
        assert_eq!(
            session.snapshot().await.fen,
            "rnbqkbnr/pppp1ppp/4p3/8/4P3/8/PPPP1PPP/RNBQKBNR w KQkq - 0 2"
        );
    }

    #[tokio::test]
    async fn single_connection_can_hold_both_seats() {
        let (player, mut rx) = connection();
        let session = session_with(StandardChess, &player, Color::White);

        assert_eq!(session.join(player.clone()).await.unwrap(), Color::Black);
        session.apply_move(&player, "e2e4").await.unwrap();
        session.apply_move(&player, "e7e5").await.unwrap();

        let frames = drain(&mut rx);
        // ack, join broadcast, and one state per move; no duplicates for the shared socket
        assert_eq!(frames.len(), 4);
        assert_eq!(frames[0]["status"], "joined");
    }

    #[tokio::test]
    async fn write_failure_does_not_fail_the_move() {
        let (white, _white_rx) = connection();
        let (black, black_rx) = connection();
        let session = started(&white, &black).await;
        drop(black_rx);

        assert_eq!(
            session.apply_move(&white, "e2e4").await.unwrap(),
            GameStatus::Ongoing
        );
        assert!(session.snapshot().await.fen.contains(" b "));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn racing_moves_apply_exactly_once() {
        let (white, _white_rx) = connection();
        let (black, _black_rx) = connection();
        let engine = CountingEngine {
            applied: AtomicUsize::new(0),
        };
        let session = Arc::new(session_with(engine, &white, Color::White));
        session.join(black.clone()).await.unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let session = session.clone();
                let white = white.clone();
                tokio::spawn(async move { session.apply_move(&white, "e2e4").await })
            })
            .collect();

        let mut accepted = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(status) => {
                    assert_eq!(status, GameStatus::Ongoing);
                    accepted += 1;
                }
                Err(err) => assert_eq!(err, GameError::NotYourTurn),
            }
        }

        assert_eq!(accepted, 1);
        assert_eq!(session.engine.applied.load(Ordering::SeqCst), 1);
        let snapshot = session.snapshot().await;
        assert_eq!(snapshot.moves, 1);
        assert!(snapshot.fen.contains(" b "));
    }

    #[tokio::test]
    async fn slow_participant_does_not_stall_the_move() {
        let (white, mut white_rx) = connection();
        // room for the join ack only; every later frame waits out the deadline
        let (tx, mut black_rx) = mpsc::channel(1);
        let black = Connection::new(tx, Duration::from_millis(50));
        let session = started(&white, &black).await;
        drain(&mut white_rx);

        assert_eq!(
            black.send_raw(Message::Text("ping".into())).await,
            Err(SendError::Timeout)
        );

        let begun = tokio::time::Instant::now();
        let status = session.apply_move(&white, "e2e4").await.unwrap();
        let elapsed = begun.elapsed();

        assert_eq!(status, GameStatus::Ongoing);
        assert!(elapsed >= Duration::from_millis(50), "move took {elapsed:?}");
        assert!(elapsed < Duration::from_millis(500), "move took {elapsed:?}");

        let frames = drain(&mut white_rx);
        assert_eq!(frames.len(), 1);
        assert_eq!(
            frames[0]["fen"],
            "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1"
        );
        assert_eq!(
            drain(&mut black_rx),
            vec![json!({"status": "joined", "gameID": "game-1", "color": "black"})]
        );
    }

    #[tokio::test]
    async fn last_departure_closes_the_session() {
        let (white, _white_rx) = connection();
        let (black, _black_rx) = connection();
        let session = started(&white, &black).await;

        let first = session.remove_participant(white.id()).await;
        assert_eq!(
            first,
            Departure {
                removed: 1,
                remaining: 1,
                closed: false
            }
        );
        assert_eq!(
            session.apply_move(&black, "e7e5").await.unwrap_err(),
            GameError::WaitingForOpponent
        );

        let second = session.remove_participant(black.id()).await;
        assert!(second.closed);

        let (late, _late_rx) = connection();
        assert_eq!(session.join(late).await.unwrap_err(), GameError::NotFound);
    }

    #[tokio::test]
    async fn vacated_seat_can_be_refilled_with_same_color() {
        let (white, _white_rx) = connection();
        let (black, _black_rx) = connection();
        let session = started(&white, &black).await;
        session.remove_participant(black.id()).await;

        let (replacement, _replacement_rx) = connection();
        assert_eq!(session.join(replacement).await.unwrap(), Color::Black);
        assert_eq!(session.snapshot().await.phase, SessionPhase::InProgress);
    }
}
