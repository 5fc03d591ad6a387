//! OpenAPI specification builder using utoipa.

use utoipa::OpenApi;

use crate::rest::dto::{
    AdvanceResponse, ContradictionResponse, CreateSessionRequest, HealthResponse,
    IdealResultResponse, ModeResponse, PartProgressResponse, PartResponse, ProgressResponse,
    SessionListItem, SessionResponse, SolutionResponse, StatusResponse, StepDefinitionResponse,
    StepProgressResponse, StepResultResponse, StepViewResponse, SubmitStepRequest,
    SummaryResponse, SummaryStepResponse, TaskAcceptedResponse, TaskPollResponse, UsageResponse,
};
use crate::rest::error::ErrorResponse;

/// OpenAPI documentation for the ariz REST API
#[derive(OpenApi)]
#[openapi(
    info(
        title = "ARIZ Session API",
        description = "Guided multi-step ARIZ sessions: step tables, session lifecycle and asynchronous step execution.",
        license(name = "MIT")
    ),
    paths(
        // Health endpoints
        crate::rest::routes::health::health,
        crate::rest::routes::health::status,
        // Mode endpoints
        crate::rest::routes::modes::list,
        crate::rest::routes::modes::steps,
        crate::rest::routes::modes::step,
        // Session endpoints
        crate::rest::routes::sessions::create,
        crate::rest::routes::sessions::list,
        crate::rest::routes::sessions::get_one,
        crate::rest::routes::sessions::progress,
        crate::rest::routes::sessions::current_step,
        crate::rest::routes::sessions::submit,
        crate::rest::routes::sessions::advance,
        crate::rest::routes::sessions::back,
        crate::rest::routes::sessions::abandon,
        crate::rest::routes::sessions::summary,
        // Task endpoints
        crate::rest::routes::tasks::get_one,
    ),
    components(
        schemas(
            // Response types
            HealthResponse,
            StatusResponse,
            ModeResponse,
            PartResponse,
            StepDefinitionResponse,
            SessionListItem,
            SessionResponse,
            StepResultResponse,
            UsageResponse,
            StepViewResponse,
            AdvanceResponse,
            ProgressResponse,
            StepProgressResponse,
            PartProgressResponse,
            SummaryResponse,
            SummaryStepResponse,
            ContradictionResponse,
            IdealResultResponse,
            SolutionResponse,
            TaskAcceptedResponse,
            TaskPollResponse,
            ErrorResponse,
            // Request types
            CreateSessionRequest,
            SubmitStepRequest,
        )
    ),
    tags(
        (name = "Health", description = "Health check and status endpoints"),
        (name = "Modes", description = "Mode step tables"),
        (name = "Sessions", description = "Session lifecycle"),
        (name = "Tasks", description = "Step execution handles"),
    )
)]
pub struct ApiDoc;

impl ApiDoc {
    /// Generate the OpenAPI specification as a JSON string
    pub fn json() -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&Self::openapi())
    }

    /// Generate the OpenAPI specification as a YAML string
    pub fn yaml() -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(&Self::openapi())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_spec_generates() {
        let spec = ApiDoc::json().expect("Failed to generate OpenAPI spec");
        assert!(spec.contains("ARIZ Session API"));
        assert!(spec.contains("/api/v1/health"));
        assert!(spec.contains("/api/v1/sessions/{id}/submit"));
        assert!(spec.contains("/api/v1/tasks/{task_id}"));
    }

    #[test]
    fn test_openapi_has_all_tags() {
        let spec = ApiDoc::json().expect("Failed to generate OpenAPI spec");
        for tag in ["\"Health\"", "\"Modes\"", "\"Sessions\"", "\"Tasks\""] {
            assert!(spec.contains(tag), "missing tag {tag}");
        }
    }

    #[test]
    fn test_openapi_yaml() {
        let yaml = ApiDoc::yaml().unwrap();
        assert!(yaml.contains("openapi:"));
    }
}
