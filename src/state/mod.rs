/// Player colors and creator color assignment.
pub mod color;
/// Outbound handle for a single WebSocket.
pub mod connection;
/// Game id to session lookup.
pub mod registry;
/// Chess rules adapter.
pub mod rules;
/// One game and its participants.
pub mod session;
/// Session lifecycle phases.
pub mod state_machine;

use std::sync::Arc;

use axum::extract::ws::Message;
use tokio::sync::mpsc;

use crate::config::AppConfig;

use self::{
    color::ColorPicker,
    connection::Connection,
    registry::SessionRegistry,
    rules::StandardChess,
};

/// Application state handle shared across handlers.
pub type SharedState = Arc<AppState>;
/// Registry of standard chess sessions served by the application.
pub type ChessRegistry = SessionRegistry<StandardChess>;

/// Central application state: configuration and the session registry.
pub struct AppState {
    config: Arc<AppConfig>,
    registry: ChessRegistry,
}

impl AppState {
    /// Construct a new [`AppState`] from the on-disk configuration, wrapped in an [`Arc`].
    pub fn new() -> SharedState {
        Self::with_config(AppConfig::load())
    }

    /// Construct a new [`AppState`] from an explicit configuration.
    pub fn with_config(config: AppConfig) -> SharedState {
        let registry = SessionRegistry::new(
            StandardChess,
            config.registry_locking(),
            ColorPicker::from_seed(config.color_seed()),
        );
        Arc::new(Self {
            config: Arc::new(config),
            registry,
        })
    }

    /// Shared runtime configuration.
    pub fn config(&self) -> Arc<AppConfig> {
        self.config.clone()
    }

    /// Registry of live sessions.
    pub fn registry(&self) -> &ChessRegistry {
        &self.registry
    }

    /// Allocate a connection handle and the receiving end of its outbound queue.
    pub fn open_connection(&self) -> (Connection, mpsc::Receiver<Message>) {
        let (tx, rx) = mpsc::channel(self.config.outbound_buffer());
        (Connection::new(tx, self.config.write_timeout()), rx)
    }
}
