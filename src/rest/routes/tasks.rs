//! Execution handle polling.

use axum::{
    extract::{Path, State},
    Json,
};

use crate::rest::dto::TaskPollResponse;
use crate::rest::error::{ApiError, ErrorResponse};
use crate::rest::routes::sessions::parse_id;
use crate::rest::state::ApiState;

/// Poll a dispatched step execution
#[utoipa::path(
    get,
    path = "/api/v1/tasks/{task_id}",
    tag = "Tasks",
    params(("task_id" = String, Path, description = "Task id returned by submit")),
    responses(
        (status = 200, description = "Current task status", body = TaskPollResponse),
        (status = 404, description = "Unknown or expired task", body = ErrorResponse)
    )
)]
pub async fn get_one(
    State(state): State<ApiState>,
    Path(task_id): Path<String>,
) -> Result<Json<TaskPollResponse>, ApiError> {
    let poll = state.gateway().poll(parse_id(&task_id)?)?;
    Ok(Json(TaskPollResponse::from(&poll)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::scripted::ScriptedClient;
    use crate::registry::Mode;
    use crate::rest::state::testing::state_with;
    use crate::session::Problem;
    use std::time::Duration;
    use uuid::Uuid;

    const ACCEPTED_REPLY: &str =
        "Трубопровод зарастает накипью, промывка требует остановки линии на сутки каждый месяц.";

    #[tokio::test]
    async fn test_unknown_task() {
        let state = state_with(ScriptedClient::new(Vec::new()));
        let err = get_one(State(state), Path(Uuid::new_v4().to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_poll_until_ready() {
        let state = state_with(ScriptedClient::new(vec![Ok(ACCEPTED_REPLY.to_string())]));
        let session = state
            .machine
            .start_session(
                Mode::Express,
                Problem {
                    title: "Накипь".into(),
                    description: String::new(),
                },
            )
            .await
            .unwrap();
        let handle = state
            .machine
            .submit_step(session.id, "Трубы зарастают")
            .await
            .unwrap();

        let mut resp = get_one(State(state.clone()), Path(handle.task_id.to_string()))
            .await
            .unwrap();
        for _ in 0..100 {
            if resp.ready {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
            resp = get_one(State(state.clone()), Path(handle.task_id.to_string()))
                .await
                .unwrap();
        }

        assert!(resp.ready);
        assert_eq!(resp.status, "success");
        let result = resp.0.result.unwrap();
        assert_eq!(result.status, "completed");
        assert_eq!(result.validated_result.as_deref(), Some(ACCEPTED_REPLY));
    }
}
