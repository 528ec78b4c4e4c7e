use axum::Router;

use crate::state::SharedState;

/// Swagger UI and OpenAPI document.
pub mod docs;
/// Health check route.
pub mod health;
/// Player WebSocket upgrade.
pub mod websocket;

/// Compose all route trees and attach the shared state.
pub fn router(state: SharedState) -> Router<()> {
    health::router()
        .merge(websocket::router())
        .merge(docs::router())
        .with_state(state)
}
