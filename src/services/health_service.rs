use tracing::debug;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Report liveness along with the number of registered sessions.
pub fn health_status(state: &SharedState) -> HealthResponse {
    let sessions = state.registry().len();
    debug!(sessions, "health check");
    HealthResponse::ok(sessions)
}
