/// Fan-out of session state to participants.
pub mod broadcast;
/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// WebSocket connection and message handling service.
pub mod websocket_service;
