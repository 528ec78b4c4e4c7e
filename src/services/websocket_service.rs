use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::{task::JoinHandle, time::timeout};
use tracing::{debug, info, warn};
use validator::Validate;

use crate::{
    dto::ws::{ClientAction, ErrorMessage, SessionAck},
    error::{EnvelopeError, GameError},
    state::{
        SharedState,
        connection::{Connection, SendError},
    },
};

/// Handle the full lifecycle for an individual player WebSocket connection.
pub async fn handle_socket(state: SharedState, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();
    let (connection, mut outbound_rx) = state.open_connection();
    let write_timeout = state.config().write_timeout();
    let conn_id = connection.id();

    // Dedicated writer task keeps outbound messages flowing even while we await inbound frames.
    // It exits on the first failed or overdue write, which closes the outbound queue.
    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            match timeout(write_timeout, sender.send(message)).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    warn!(conn = %conn_id, error = %err, "websocket write failed");
                    break;
                }
                Err(_) => {
                    warn!(conn = %conn_id, "websocket write deadline exceeded");
                    break;
                }
            }
        }
    });

    info!(conn = %conn_id, "player connected");

    loop {
        let message = tokio::select! {
            message = receiver.next() => message,
            _ = connection.closed() => {
                info!(conn = %conn_id, "writer stopped, terminating");
                break;
            }
        };

        match message {
            Some(Ok(Message::Text(text))) => {
                debug!(conn = %conn_id, payload = %text, "received player message");

                match ClientAction::from_json_str(&text) {
                    Ok(action) => {
                        if let Err(err) = dispatch(&state, &connection, action).await {
                            info!(conn = %conn_id, error = %err, "connection lost while replying, terminating");
                            break;
                        }
                    }
                    Err(EnvelopeError::UnknownAction(action)) => {
                        warn!(conn = %conn_id, action = %action, "ignoring unknown action");
                    }
                    Err(err) => {
                        warn!(conn = %conn_id, error = %err, "failed to parse player message");
                    }
                }
            }
            Some(Ok(Message::Ping(payload))) => {
                if let Err(err) = connection.send_raw(Message::Pong(payload)).await {
                    debug!(conn = %conn_id, error = %err, "failed to answer ping");
                    if err == SendError::Closed {
                        break;
                    }
                }
            }
            Some(Ok(Message::Close(frame))) => {
                info!(conn = %conn_id, "player closed");
                if let Err(err) = connection.send_raw(Message::Close(frame)).await {
                    debug!(conn = %conn_id, error = %err, "failed to echo close frame");
                }
                break;
            }
            Some(Ok(Message::Binary(_))) => {}
            Some(Ok(Message::Pong(_))) => {}
            Some(Err(err)) => {
                warn!(conn = %conn_id, error = %err, "websocket error");
                break;
            }
            None => break,
        }
    }

    let deleted = state.registry().remove_participant(conn_id).await;
    info!(conn = %conn_id, deleted_sessions = deleted, "player disconnected");

    finalize(writer_task, connection, write_timeout).await;
}

/// Route a decoded action. Only transport failures on the requesting connection are returned.
///
/// Field shape failures are answered like any other game error.
async fn dispatch(
    state: &SharedState,
    connection: &Connection,
    action: ClientAction,
) -> Result<(), SendError> {
    if let Err(errors) = action.validate() {
        let err = GameError::from(&errors);
        warn!(conn = %connection.id(), error = %errors, reply = %err, "rejected malformed field");
        return reply_error(connection, &err).await;
    }

    match action {
        ClientAction::Create => handle_create(state, connection).await,
        ClientAction::Join { game_id } => handle_join(state, connection, &game_id).await,
        ClientAction::Move { game_id, mv } => handle_move(state, connection, &game_id, &mv).await,
    }
}

async fn handle_create(state: &SharedState, connection: &Connection) -> Result<(), SendError> {
    let (session, color) = state.registry().create(connection.clone());
    connection
        .send(&SessionAck::created(session.id(), color))
        .await
}

/// Seat the connection in an existing session.
///
/// On success the session itself acknowledges the joiner and broadcasts the new state.
async fn handle_join(
    state: &SharedState,
    connection: &Connection,
    game_id: &str,
) -> Result<(), SendError> {
    let result = match state.registry().get(game_id) {
        Ok(session) => session.join(connection.clone()).await,
        Err(err) => Err(err),
    };

    match result {
        Ok(_) => Ok(()),
        Err(err) => {
            warn!(game_id, conn = %connection.id(), error = %err, "join rejected");
            reply_error(connection, &err).await
        }
    }
}

/// Apply a move. Acceptance is acknowledged by the state broadcast.
async fn handle_move(
    state: &SharedState,
    connection: &Connection,
    game_id: &str,
    notation: &str,
) -> Result<(), SendError> {
    let result = match state.registry().get(game_id) {
        Ok(session) => session.apply_move(connection, notation).await,
        Err(err) => Err(err),
    };

    match result {
        Ok(status) => {
            debug!(game_id, conn = %connection.id(), status = status.as_str(), "move accepted");
            Ok(())
        }
        Err(err) => {
            warn!(game_id, conn = %connection.id(), notation, error = %err, "move rejected");
            reply_error(connection, &err).await
        }
    }
}

async fn reply_error(connection: &Connection, err: &GameError) -> Result<(), SendError> {
    connection.send(&ErrorMessage::from(err)).await
}

/// Ensure the writer task winds down before we return from the socket handler.
async fn finalize(mut writer_task: JoinHandle<()>, connection: Connection, limit: Duration) {
    drop(connection);
    if timeout(limit, &mut writer_task).await.is_err() {
        writer_task.abort();
    }
}
