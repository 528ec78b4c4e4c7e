use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for Chess Relay.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::websocket::ws_handler,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::ws::ClientEnvelope,
            crate::dto::ws::SessionAck,
            crate::dto::ws::AckStatus,
            crate::dto::ws::GameStateMessage,
            crate::dto::ws::ErrorMessage,
            crate::dto::phase::GameStatus,
            crate::state::color::Color,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "players", description = "WebSocket game protocol for players"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_player_and_health_routes() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/ws"));
        assert!(doc.paths.paths.contains_key("/healthcheck"));

        let schemas = doc.components.expect("components").schemas;
        for name in ["ClientEnvelope", "SessionAck", "GameStateMessage", "ErrorMessage"] {
            assert!(schemas.contains_key(name), "missing schema {name}");
        }
    }
}
