//! Mode and step-table endpoints.

use axum::{
    extract::{Path, State},
    Json,
};

use crate::registry::Mode;
use crate::rest::dto::{ModeResponse, StepDefinitionResponse};
use crate::rest::error::{ApiError, ErrorResponse};
use crate::rest::state::ApiState;

fn parse_mode(mode: &str) -> Result<Mode, ApiError> {
    mode.parse::<Mode>().map_err(ApiError::from)
}

/// List available modes
#[utoipa::path(
    get,
    path = "/api/v1/modes",
    tag = "Modes",
    responses(
        (status = 200, description = "Available modes", body = Vec<ModeResponse>)
    )
)]
pub async fn list(State(state): State<ApiState>) -> Result<Json<Vec<ModeResponse>>, ApiError> {
    let registry = state.registry();
    let modes = registry
        .modes()
        .map(|mode| {
            let total = registry.get_steps(mode)?.len();
            Ok(ModeResponse::new(mode, total, registry.parts(mode)))
        })
        .collect::<Result<Vec<_>, ApiError>>()?;
    Ok(Json(modes))
}

/// List the ordered steps of a mode
#[utoipa::path(
    get,
    path = "/api/v1/modes/{mode}/steps",
    tag = "Modes",
    params(
        ("mode" = String, Path, description = "express, full or autopilot")
    ),
    responses(
        (status = 200, description = "Ordered steps", body = Vec<StepDefinitionResponse>),
        (status = 400, description = "Unknown mode", body = ErrorResponse)
    )
)]
pub async fn steps(
    State(state): State<ApiState>,
    Path(mode): Path<String>,
) -> Result<Json<Vec<StepDefinitionResponse>>, ApiError> {
    let mode = parse_mode(&mode)?;
    let registry = state.registry();
    let multi_part = !registry.parts(mode).is_empty();

    let steps = registry
        .get_steps(mode)?
        .iter()
        .map(|step| StepDefinitionResponse::new(step, multi_part))
        .collect();
    Ok(Json(steps))
}

/// Get one step definition
#[utoipa::path(
    get,
    path = "/api/v1/modes/{mode}/steps/{code}",
    tag = "Modes",
    params(
        ("mode" = String, Path, description = "express, full or autopilot"),
        ("code" = String, Path, description = "Step code, e.g. 1.3")
    ),
    responses(
        (status = 200, description = "Step definition", body = StepDefinitionResponse),
        (status = 400, description = "Unknown mode", body = ErrorResponse),
        (status = 404, description = "Step not found", body = ErrorResponse)
    )
)]
pub async fn step(
    State(state): State<ApiState>,
    Path((mode, code)): Path<(String, String)>,
) -> Result<Json<StepDefinitionResponse>, ApiError> {
    let mode = parse_mode(&mode)?;
    let registry = state.registry();
    let step = registry.get_step(mode, &code).ok_or_else(|| {
        ApiError::NotFound(format!("Step '{}' not found in mode '{}'", code, mode))
    })?;

    Ok(Json(StepDefinitionResponse::new(
        step,
        !registry.parts(mode).is_empty(),
    )))
}
