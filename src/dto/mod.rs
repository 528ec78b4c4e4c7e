/// Health check payload.
pub mod health;
/// Game status reported to players.
pub mod phase;
/// Field validators for client messages.
pub mod validation;
/// WebSocket message envelopes.
pub mod ws;
