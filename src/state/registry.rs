//! Mapping from session identifier to [`Session`].
//!
//! The table's locks only guard the map structure. They are never held while a session
//! lock is awaited: multi-session work runs over a snapshot of the entries.

use std::{
    collections::HashMap,
    sync::{Arc, PoisonError, RwLock},
};

use dashmap::{DashMap, mapref::entry::Entry};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::{
    error::GameError,
    state::{
        color::{Color, ColorPicker},
        connection::{Connection, ConnectionId},
        rules::RulesEngine,
        session::{Participant, Session},
    },
};

/// Locking strategy used by the session table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistryLocking {
    /// Lock shards keyed by session identifier.
    #[default]
    Sharded,
    /// A single lock over the whole map.
    Global,
}

/// Structural storage for sessions.
pub trait SessionTable<R: RulesEngine>: Send + Sync {
    /// Insert `session` under its id unless the id is already taken.
    fn insert_vacant(&self, session: Arc<Session<R>>) -> bool;
    /// Look up a session.
    fn get(&self, id: &str) -> Option<Arc<Session<R>>>;
    /// Remove a session, returning it if it was present.
    fn remove(&self, id: &str) -> Option<Arc<Session<R>>>;
    /// Clone out every registered session.
    fn snapshot(&self) -> Vec<Arc<Session<R>>>;
    /// Number of registered sessions.
    fn len(&self) -> usize;
}

/// Session table sharded with [`DashMap`].
pub struct ShardedTable<R: RulesEngine> {
    map: DashMap<String, Arc<Session<R>>>,
}

impl<R: RulesEngine> Default for ShardedTable<R> {
    fn default() -> Self {
        Self {
            map: DashMap::new(),
        }
    }
}

impl<R: RulesEngine> SessionTable<R> for ShardedTable<R> {
    fn insert_vacant(&self, session: Arc<Session<R>>) -> bool {
        match self.map.entry(session.id().to_string()) {
            Entry::Vacant(entry) => {
                entry.insert(session);
                true
            }
            Entry::Occupied(_) => false,
        }
    }

    fn get(&self, id: &str) -> Option<Arc<Session<R>>> {
        self.map.get(id).map(|entry| entry.value().clone())
    }

    fn remove(&self, id: &str) -> Option<Arc<Session<R>>> {
        self.map.remove(id).map(|(_, session)| session)
    }

    fn snapshot(&self) -> Vec<Arc<Session<R>>> {
        self.map.iter().map(|entry| entry.value().clone()).collect()
    }

    fn len(&self) -> usize {
        self.map.len()
    }
}

/// Session table behind one registry-wide lock.
pub struct GlobalLockTable<R: RulesEngine> {
    map: RwLock<HashMap<String, Arc<Session<R>>>>,
}

impl<R: RulesEngine> Default for GlobalLockTable<R> {
    fn default() -> Self {
        Self {
            map: RwLock::new(HashMap::new()),
        }
    }
}

impl<R: RulesEngine> SessionTable<R> for GlobalLockTable<R> {
    fn insert_vacant(&self, session: Arc<Session<R>>) -> bool {
        let mut map = self.map.write().unwrap_or_else(PoisonError::into_inner);
        if map.contains_key(session.id()) {
            return false;
        }
        map.insert(session.id().to_string(), session);
        true
    }

    fn get(&self, id: &str) -> Option<Arc<Session<R>>> {
        let map = self.map.read().unwrap_or_else(PoisonError::into_inner);
        map.get(id).cloned()
    }

    fn remove(&self, id: &str) -> Option<Arc<Session<R>>> {
        let mut map = self.map.write().unwrap_or_else(PoisonError::into_inner);
        map.remove(id)
    }

    fn snapshot(&self) -> Vec<Arc<Session<R>>> {
        let map = self.map.read().unwrap_or_else(PoisonError::into_inner);
        map.values().cloned().collect()
    }

    fn len(&self) -> usize {
        let map = self.map.read().unwrap_or_else(PoisonError::into_inner);
        map.len()
    }
}

/// Owner of every live session.
pub struct SessionRegistry<R: RulesEngine> {
    engine: Arc<R>,
    table: Box<dyn SessionTable<R>>,
    colors: ColorPicker,
}

impl<R: RulesEngine> SessionRegistry<R> {
    /// Build a registry using the given locking strategy.
    pub fn new(engine: R, locking: RegistryLocking, colors: ColorPicker) -> Self {
        let table: Box<dyn SessionTable<R>> = match locking {
            RegistryLocking::Sharded => Box::new(ShardedTable::default()),
            RegistryLocking::Global => Box::new(GlobalLockTable::default()),
        };
        Self::with_table(engine, table, colors)
    }

    /// Build a registry over a caller-provided table.
    pub fn with_table(engine: R, table: Box<dyn SessionTable<R>>, colors: ColorPicker) -> Self {
        Self {
            engine: Arc::new(engine),
            table,
            colors,
        }
    }

    /// Register a new session seating `creator` with a random color.
    pub fn create(&self, creator: Connection) -> (Arc<Session<R>>, Color) {
        let color = self.colors.pick();
        loop {
            let session = Arc::new(Session::new(
                Uuid::new_v4().to_string(),
                self.engine.clone(),
                Participant {
                    connection: creator.clone(),
                    color,
                },
            ));
            if self.table.insert_vacant(session.clone()) {
                info!(game_id = %session.id(), conn = %creator.id(), %color, "session created");
                return (session, color);
            }
        }
    }

    /// Look up a session by identifier.
    pub fn get(&self, id: &str) -> Result<Arc<Session<R>>, GameError> {
        self.table.get(id).ok_or(GameError::NotFound)
    }

    /// Delete a session; absent identifiers are ignored.
    pub fn remove(&self, id: &str) {
        if self.table.remove(id).is_some() {
            info!(game_id = %id, "session removed");
        }
    }

    /// Remove `connection` from every session it is seated in and delete sessions left
    /// without participants. Returns the number of deleted sessions.
    pub async fn remove_participant(&self, connection: ConnectionId) -> usize {
        let mut deleted = 0;
        for session in self.table.snapshot() {
            let departure = session.remove_participant(connection).await;
            if departure.removed > 0 {
                info!(
                    game_id = %session.id(),
                    conn = %connection,
                    remaining = departure.remaining,
                    "participant removed"
                );
            }
            if departure.closed && self.table.remove(session.id()).is_some() {
                info!(game_id = %session.id(), "session deleted");
                deleted += 1;
            }
        }
        deleted
    }

    /// Number of registered sessions.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Whether no session is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
