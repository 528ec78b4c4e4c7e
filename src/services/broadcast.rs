use std::collections::HashSet;

use futures::future::join_all;
use tracing::{debug, warn};

use crate::{
    dto::ws::GameStateMessage,
    state::session::Participant,
};

/// Deliver `message` to every distinct connection seated in a session.
///
/// Writes run concurrently, each bounded by its connection's write deadline. A failed
/// write is logged and skipped; the failing connection is cleaned up by its own read
/// loop. Returns the number of connections that accepted the message.
pub async fn broadcast_state(
    game_id: &str,
    participants: &[Participant],
    message: &GameStateMessage,
) -> usize {
    let mut seen = HashSet::new();
    let deliveries = participants
        .iter()
        .map(|participant| &participant.connection)
        .filter(|connection| seen.insert(connection.id()))
        .map(|connection| async move { (connection.id(), connection.send(message).await) });

    let mut delivered = 0;
    for (conn, result) in join_all(deliveries).await {
        match result {
            Ok(()) => delivered += 1,
            Err(err) => {
                warn!(game_id, conn = %conn, error = %err, "failed to deliver game state");
            }
        }
    }

    debug!(
        game_id,
        status = message.status.as_str(),
        delivered,
        "game state broadcast"
    );
    delivered
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::extract::ws::Message;
    use tokio::sync::mpsc;

    use super::*;
    use crate::{
        dto::phase::GameStatus,
        state::{color::Color, connection::Connection},
    };

    fn participant(color: Color) -> (Participant, mpsc::Receiver<Message>) {
        let (tx, rx) = mpsc::channel(4);
        let connection = Connection::new(tx, Duration::from_millis(20));
        (Participant { connection, color }, rx)
    }

    fn message() -> GameStateMessage {
        GameStateMessage {
            status: GameStatus::Ongoing,
            fen: "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1".into(),
        }
    }

    #[tokio::test]
    async fn every_participant_receives_the_state() {
        let (white, mut white_rx) = participant(Color::White);
        let (black, mut black_rx) = participant(Color::Black);

        let delivered = broadcast_state("g1", &[white, black], &message()).await;

        assert_eq!(delivered, 2);
        assert!(matches!(white_rx.try_recv(), Ok(Message::Text(_))));
        assert!(matches!(black_rx.try_recv(), Ok(Message::Text(_))));
    }

    #[tokio::test]
    async fn failed_participant_does_not_block_the_other() {
        let (white, white_rx) = participant(Color::White);
        let (black, mut black_rx) = participant(Color::Black);
        drop(white_rx);

        let delivered = broadcast_state("g1", &[white, black], &message()).await;

        assert_eq!(delivered, 1);
        assert!(matches!(black_rx.try_recv(), Ok(Message::Text(_))));
    }

    #[tokio::test]
    async fn shared_connection_receives_one_copy() {
        let (white, mut rx) = participant(Color::White);
        let black = Participant {
            connection: white.connection.clone(),
            color: Color::Black,
        };

        let delivered = broadcast_state("g1", &[white, black], &message()).await;

        assert_eq!(delivered, 1);
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }
}
