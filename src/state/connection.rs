use std::{fmt, time::Duration};

use axum::extract::ws::Message;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::SendTimeoutError};
use tracing::warn;
use uuid::Uuid;

/// Stable identity of one client connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Transport failure while queueing an outbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SendError {
    /// Writer task is gone; the socket is closed or failed.
    #[error("connection closed")]
    Closed,
    /// Outbound queue stayed full for longer than the write deadline.
    #[error("write deadline exceeded")]
    Timeout,
}

/// Handle used to push frames to a connected client.
///
/// The handle is owned by the connection's read loop; sessions only hold clones of it.
/// Dropping a clone never closes the socket.
#[derive(Debug, Clone)]
pub struct Connection {
    id: ConnectionId,
    tx: mpsc::Sender<Message>,
    write_timeout: Duration,
}

impl Connection {
    /// Wrap the sending half of a connection's outbound queue.
    pub fn new(tx: mpsc::Sender<Message>, write_timeout: Duration) -> Self {
        Self {
            id: ConnectionId::new(),
            tx,
            write_timeout,
        }
    }

    /// Identity of this connection.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Serialize `value` as JSON and queue it as a text frame.
    ///
    /// Serialization failures are logged and swallowed; only transport failures are returned.
    pub async fn send<T>(&self, value: &T) -> Result<(), SendError>
    where
        T: ?Sized + Serialize + fmt::Debug,
    {
        let payload = match serde_json::to_string(value) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(conn = %self.id, error = %err, "failed to serialize message `{value:?}`");
                return Ok(());
            }
        };

        self.send_raw(Message::Text(payload.into())).await
    }

    /// Queue a raw frame, waiting at most the write deadline for queue capacity.
    pub async fn send_raw(&self, message: Message) -> Result<(), SendError> {
        self.tx
            .send_timeout(message, self.write_timeout)
            .await
            .map_err(|err| match err {
                SendTimeoutError::Timeout(_) => SendError::Timeout,
                SendTimeoutError::Closed(_) => SendError::Closed,
            })
    }

    /// Resolve once the writer side of this connection has shut down.
    pub async fn closed(&self) {
        self.tx.closed().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_queues_json_text_frame() {
        let (tx, mut rx) = mpsc::channel(4);
        let connection = Connection::new(tx, Duration::from_millis(50));

        connection
            .send(&serde_json::json!({"status": "ongoing"}))
            .await
            .unwrap();

        match rx.recv().await {
            Some(Message::Text(text)) => assert_eq!(text.as_str(), r#"{"status":"ongoing"}"#),
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[tokio::test]
    async fn full_queue_hits_write_deadline() {
        let (tx, _rx) = mpsc::channel(1);
        let connection = Connection::new(tx, Duration::from_millis(20));

        connection.send_raw(Message::Ping(Vec::new().into())).await.unwrap();
        let err = connection
            .send_raw(Message::Ping(Vec::new().into()))
            .await
            .unwrap_err();
        assert_eq!(err, SendError::Timeout);
    }

    #[tokio::test]
    async fn dropped_writer_reports_closed() {
        let (tx, rx) = mpsc::channel(1);
        let connection = Connection::new(tx, Duration::from_millis(20));
        drop(rx);

        assert_eq!(
            connection.send(&"hello").await.unwrap_err(),
            SendError::Closed
        );
        connection.closed().await;
    }

    #[test]
    fn clones_share_identity() {
        let (tx, _rx) = mpsc::channel(1);
        let connection = Connection::new(tx.clone(), Duration::from_millis(20));
        let other = Connection::new(tx, Duration::from_millis(20));
        assert_eq!(connection.clone().id(), connection.id());
        assert_ne!(connection.id(), other.id());
    }
}
