//! Health check and status endpoints.

use axum::{extract::State, Json};

use crate::rest::dto::{HealthResponse, StatusResponse};
use crate::rest::state::ApiState;
use crate::session::SessionStatus;

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/api/v1/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    )
)]
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Get service status with session counts
#[utoipa::path(
    get,
    path = "/api/v1/status",
    tag = "Health",
    responses(
        (status = 200, description = "Service status with session counts", body = StatusResponse)
    )
)]
pub async fn status(State(state): State<ApiState>) -> Json<StatusResponse> {
    let sessions = state.machine.list_sessions().await;
    let count = |status: SessionStatus| sessions.iter().filter(|s| s.status == status).count();

    Json(StatusResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        sessions_total: sessions.len(),
        sessions_active: count(SessionStatus::Active),
        sessions_completed: count(SessionStatus::Completed),
        sessions_abandoned: count(SessionStatus::Abandoned),
        in_flight: state.gateway().in_flight_count(),
        model: state.model.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::scripted::ScriptedClient;
    use crate::registry::Mode;
    use crate::rest::state::testing::state_with;
    use crate::session::Problem;

    #[tokio::test]
    async fn test_health() {
        let resp = health().await;
        assert_eq!(resp.status, "ok");
        assert!(!resp.version.is_empty());
    }

    #[tokio::test]
    async fn test_status() {
        let state = state_with(ScriptedClient::new(Vec::new()));
        let problem = Problem {
            title: "Накипь в трубах".into(),
            description: String::new(),
        };
        let kept = state
            .machine
            .start_session(Mode::Express, problem.clone())
            .await
            .unwrap();
        let dropped = state.machine.start_session(Mode::Full, problem).await.unwrap();
        state.machine.abandon(dropped.id).await.unwrap();

        let resp = status(State(state)).await;
        assert_eq!(resp.status, "ok");
        assert_eq!(resp.sessions_total, 2);
        assert_eq!(resp.sessions_active, 1);
        assert_eq!(resp.sessions_abandoned, 1);
        assert_eq!(resp.in_flight, 0);
        assert!(!kept.id.is_nil());
    }
}
