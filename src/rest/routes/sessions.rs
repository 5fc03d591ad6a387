//! Session lifecycle endpoints.
//!
//! Submission is asynchronous: `submit` answers 202 with a task id right
//! away and the outcome is read from `GET /api/v1/tasks/{task_id}`.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::registry::Mode;
use crate::rest::dto::{
    AdvanceResponse, CreateSessionRequest, ProgressResponse, SessionListItem, SessionResponse,
    StepViewResponse, SubmitStepRequest, SummaryResponse, TaskAcceptedResponse,
};
use crate::rest::error::{ApiError, ErrorResponse};
use crate::rest::state::ApiState;
use crate::session::{Advance, Problem};

pub(crate) fn parse_id(id: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(id).map_err(|_| ApiError::BadRequest(format!("'{}' is not a valid id", id)))
}

/// Start a session
#[utoipa::path(
    post,
    path = "/api/v1/sessions",
    tag = "Sessions",
    request_body = CreateSessionRequest,
    responses(
        (status = 201, description = "Session started at its first step", body = SessionResponse),
        (status = 400, description = "Unknown mode or empty title", body = ErrorResponse)
    )
)]
pub async fn create(
    State(state): State<ApiState>,
    Json(request): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<SessionResponse>), ApiError> {
    let mode = request.mode.parse::<Mode>()?;
    let problem = Problem {
        title: request.title,
        description: request.description,
    };
    let session = state.machine.start_session(mode, problem).await?;
    Ok((StatusCode::CREATED, Json(SessionResponse::from(&session))))
}

/// List sessions, newest first
#[utoipa::path(
    get,
    path = "/api/v1/sessions",
    tag = "Sessions",
    responses(
        (status = 200, description = "All sessions", body = Vec<SessionListItem>)
    )
)]
pub async fn list(State(state): State<ApiState>) -> Json<Vec<SessionListItem>> {
    let sessions = state.machine.list_sessions().await;
    Json(sessions.iter().map(SessionListItem::from).collect())
}

/// Get a session with its full attempt history
#[utoipa::path(
    get,
    path = "/api/v1/sessions/{id}",
    tag = "Sessions",
    params(("id" = String, Path, description = "Session id")),
    responses(
        (status = 200, description = "Session", body = SessionResponse),
        (status = 404, description = "Session not found", body = ErrorResponse)
    )
)]
pub async fn get_one(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<SessionResponse>, ApiError> {
    let session = state.machine.get_session(parse_id(&id)?).await?;
    Ok(Json(SessionResponse::from(&session)))
}

/// Get session progress
#[utoipa::path(
    get,
    path = "/api/v1/sessions/{id}/progress",
    tag = "Sessions",
    params(("id" = String, Path, description = "Session id")),
    responses(
        (status = 200, description = "Progress", body = ProgressResponse),
        (status = 404, description = "Session not found", body = ErrorResponse)
    )
)]
pub async fn progress(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<ProgressResponse>, ApiError> {
    let progress = state.machine.get_progress(parse_id(&id)?).await?;
    Ok(Json(ProgressResponse::from(&progress)))
}

/// Get the current step with its latest attempt
#[utoipa::path(
    get,
    path = "/api/v1/sessions/{id}/current-step",
    tag = "Sessions",
    params(("id" = String, Path, description = "Session id")),
    responses(
        (status = 200, description = "Current step", body = StepViewResponse),
        (status = 404, description = "Session not found", body = ErrorResponse)
    )
)]
pub async fn current_step(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<StepViewResponse>, ApiError> {
    let view = state.machine.current_step(parse_id(&id)?).await?;
    Ok(Json(StepViewResponse::from(&view)))
}

/// Submit input for the current step
#[utoipa::path(
    post,
    path = "/api/v1/sessions/{id}/submit",
    tag = "Sessions",
    params(("id" = String, Path, description = "Session id")),
    request_body = SubmitStepRequest,
    responses(
        (status = 202, description = "Execution dispatched", body = TaskAcceptedResponse),
        (status = 404, description = "Session not found", body = ErrorResponse),
        (status = 409, description = "Step cannot be submitted now", body = ErrorResponse)
    )
)]
pub async fn submit(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(request): Json<SubmitStepRequest>,
) -> Result<(StatusCode, Json<TaskAcceptedResponse>), ApiError> {
    let handle = state
        .machine
        .submit_step(parse_id(&id)?, &request.user_input)
        .await?;
    Ok((StatusCode::ACCEPTED, Json(TaskAcceptedResponse::from(&handle))))
}

/// Move to the next step
#[utoipa::path(
    post,
    path = "/api/v1/sessions/{id}/advance",
    tag = "Sessions",
    params(("id" = String, Path, description = "Session id")),
    responses(
        (status = 200, description = "Next step, or the completion sentinel", body = AdvanceResponse),
        (status = 404, description = "Session not found", body = ErrorResponse),
        (status = 409, description = "Current step is not completed", body = ErrorResponse)
    )
)]
pub async fn advance(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<AdvanceResponse>, ApiError> {
    let response = match state.machine.advance_to_next(parse_id(&id)?).await? {
        Advance::Step(view) => AdvanceResponse {
            completed: false,
            detail: None,
            step: Some(StepViewResponse::from(&view)),
        },
        Advance::Completed => AdvanceResponse {
            completed: true,
            detail: Some("All steps are completed.".to_string()),
            step: None,
        },
    };
    Ok(Json(response))
}

/// Return to the previous step
#[utoipa::path(
    post,
    path = "/api/v1/sessions/{id}/back",
    tag = "Sessions",
    params(("id" = String, Path, description = "Session id")),
    responses(
        (status = 200, description = "Previous step", body = StepViewResponse),
        (status = 404, description = "Session not found", body = ErrorResponse),
        (status = 409, description = "Already at the first step", body = ErrorResponse)
    )
)]
pub async fn back(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<StepViewResponse>, ApiError> {
    let view = state.machine.go_back(parse_id(&id)?).await?;
    Ok(Json(StepViewResponse::from(&view)))
}

/// Abandon a session
#[utoipa::path(
    post,
    path = "/api/v1/sessions/{id}/abandon",
    tag = "Sessions",
    params(("id" = String, Path, description = "Session id")),
    responses(
        (status = 200, description = "Session abandoned", body = SessionResponse),
        (status = 404, description = "Session not found", body = ErrorResponse),
        (status = 409, description = "Session already ended", body = ErrorResponse)
    )
)]
pub async fn abandon(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<SessionResponse>, ApiError> {
    let session = state.machine.abandon(parse_id(&id)?).await?;
    Ok(Json(SessionResponse::from(&session)))
}

/// Get the session summary with derived entities
#[utoipa::path(
    get,
    path = "/api/v1/sessions/{id}/summary",
    tag = "Sessions",
    params(("id" = String, Path, description = "Session id")),
    responses(
        (status = 200, description = "Summary", body = SummaryResponse),
        (status = 404, description = "Session not found", body = ErrorResponse)
    )
)]
pub async fn summary(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<SummaryResponse>, ApiError> {
    let summary = state.machine.get_session_summary(parse_id(&id)?).await?;
    Ok(Json(SummaryResponse::from(&summary)))
}
