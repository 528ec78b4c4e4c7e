//! Library crate for chess-relay, exposing modules for binaries and integration tests.

/// Runtime configuration loaded from JSON.
pub mod config;
/// Wire and HTTP payloads.
pub mod dto;
/// Error types shared by services and sessions.
pub mod error;
/// Axum route trees.
pub mod routes;
/// Request handling services.
pub mod services;
/// Sessions, connections, and the registry.
pub mod state;
