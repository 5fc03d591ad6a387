//! Data Transfer Objects for the REST API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::gateway::{TaskHandle, TaskPoll};
use crate::llm::TokenUsage;
use crate::registry::{Audience, Mode, PartDefinition, StepDefinition};
use crate::session::entities::{Contradiction, IdealResult, Solution};
use crate::session::{
    PartProgress, Progress, Session, SessionSummary, StepProgress, StepResult, StepView,
    SummaryStep,
};

// =============================================================================
// Health DTOs
// =============================================================================

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Service status with session counts
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct StatusResponse {
    pub status: String,
    pub version: String,
    pub sessions_total: usize,
    pub sessions_active: usize,
    pub sessions_completed: usize,
    pub sessions_abandoned: usize,
    /// Step executions currently running
    pub in_flight: usize,
    pub model: String,
}

// =============================================================================
// Mode DTOs
// =============================================================================

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PartResponse {
    pub number: u32,
    pub name: String,
}

impl From<&PartDefinition> for PartResponse {
    fn from(part: &PartDefinition) -> Self {
        Self {
            number: part.number,
            name: part.name.clone(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ModeResponse {
    pub mode: String,
    /// "lay" or "professional"
    pub audience: String,
    pub total_steps: usize,
    pub parts: Vec<PartResponse>,
}

impl ModeResponse {
    pub fn new(mode: Mode, total_steps: usize, parts: &[PartDefinition]) -> Self {
        Self {
            mode: mode.as_str().to_string(),
            audience: match mode.audience() {
                Audience::Lay => "lay".to_string(),
                Audience::Professional => "professional".to_string(),
            },
            total_steps,
            parts: parts.iter().map(PartResponse::from).collect(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct StepDefinitionResponse {
    pub code: String,
    pub name: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub part: Option<u32>,
    pub prompt: String,
    pub validators: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
}

impl StepDefinitionResponse {
    pub fn new(step: &StepDefinition, multi_part: bool) -> Self {
        Self {
            code: step.code.to_string(),
            name: step.name.clone(),
            description: step.description.clone(),
            part: if multi_part { step.code.part() } else { None },
            prompt: step.prompt.clone(),
            validators: step.validators.iter().map(|v| v.as_str().to_string()).collect(),
            max_output_tokens: step.max_output_tokens,
        }
    }
}

// =============================================================================
// Session DTOs
// =============================================================================

/// Request to start a session
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CreateSessionRequest {
    /// "express", "full" or "autopilot"
    pub mode: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
}

/// Request to submit the current step
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SubmitStepRequest {
    pub user_input: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UsageResponse {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub total_tokens: u32,
    pub cost_usd: f64,
}

impl From<&TokenUsage> for UsageResponse {
    fn from(usage: &TokenUsage) -> Self {
        Self {
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
            total_tokens: usage.total_tokens,
            cost_usd: usage.cost_usd,
        }
    }
}

/// One step attempt. Field names match the stored attempt record.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StepResultResponse {
    pub id: Uuid,
    pub step_code: String,
    pub step_name: String,
    pub attempt: u32,
    pub user_input: String,
    pub llm_output: Option<String>,
    pub validated_result: Option<String>,
    pub validation_notes: String,
    /// pending, in_progress, completed, failed or superseded
    pub status: String,
    pub usage: Option<UsageResponse>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<&StepResult> for StepResultResponse {
    fn from(result: &StepResult) -> Self {
        Self {
            id: result.id,
            step_code: result.step_code.to_string(),
            step_name: result.step_name.clone(),
            attempt: result.attempt,
            user_input: result.user_input.clone(),
            llm_output: result.llm_output.clone(),
            validated_result: result.validated_result.clone(),
            validation_notes: result.validation_notes.clone(),
            status: result.status.as_str().to_string(),
            usage: result.usage.as_ref().map(UsageResponse::from),
            created_at: result.created_at,
            completed_at: result.completed_at,
        }
    }
}

/// Listing entry for a session
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SessionListItem {
    pub id: Uuid,
    pub mode: String,
    pub title: String,
    pub status: String,
    pub current_step: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Session> for SessionListItem {
    fn from(session: &Session) -> Self {
        Self {
            id: session.id,
            mode: session.mode.as_str().to_string(),
            title: session.problem.title.clone(),
            status: session.status.as_str().to_string(),
            current_step: session.current_step.to_string(),
            created_at: session.created_at,
            updated_at: session.updated_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SessionResponse {
    pub id: Uuid,
    pub mode: String,
    pub title: String,
    pub description: String,
    pub status: String,
    pub current_step: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_part: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Every attempt, superseded ones included
    pub results: Vec<StepResultResponse>,
    pub context_entries: usize,
}

impl From<&Session> for SessionResponse {
    fn from(session: &Session) -> Self {
        Self {
            id: session.id,
            mode: session.mode.as_str().to_string(),
            title: session.problem.title.clone(),
            description: session.problem.description.clone(),
            status: session.status.as_str().to_string(),
            current_step: session.current_step.to_string(),
            current_part: session.current_part,
            created_at: session.created_at,
            updated_at: session.updated_at,
            completed_at: session.completed_at,
            results: session.results.iter().map(StepResultResponse::from).collect(),
            context_entries: session.context.len(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct StepViewResponse {
    pub code: String,
    pub name: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub part: Option<u32>,
    /// Zero-based position in the mode's step order
    pub index: usize,
    pub total_steps: usize,
    pub result: Option<StepResultResponse>,
}

impl From<&StepView> for StepViewResponse {
    fn from(view: &StepView) -> Self {
        Self {
            code: view.code.to_string(),
            name: view.name.clone(),
            description: view.description.clone(),
            part: view.part,
            index: view.index,
            total_steps: view.total_steps,
            result: view.result.as_ref().map(StepResultResponse::from),
        }
    }
}

/// Either the new current step, or the completion sentinel
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AdvanceResponse {
    pub completed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<StepViewResponse>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct StepProgressResponse {
    pub code: String,
    pub name: String,
    pub completed: bool,
}

impl From<&StepProgress> for StepProgressResponse {
    fn from(step: &StepProgress) -> Self {
        Self {
            code: step.code.to_string(),
            name: step.name.clone(),
            completed: step.completed,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PartProgressResponse {
    pub part: u32,
    pub name: String,
    pub steps_total: usize,
    pub steps_completed: usize,
    pub percent: u32,
    pub is_complete: bool,
}

impl From<&PartProgress> for PartProgressResponse {
    fn from(part: &PartProgress) -> Self {
        Self {
            part: part.part,
            name: part.name.clone(),
            steps_total: part.steps_total,
            steps_completed: part.steps_completed,
            percent: part.percent,
            is_complete: part.is_complete,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ProgressResponse {
    pub session_id: Uuid,
    pub status: String,
    pub current_step: String,
    pub current_step_name: String,
    pub current_step_status: Option<String>,
    pub current_index: usize,
    pub total_steps: usize,
    pub completed_count: usize,
    pub percent: u32,
    pub steps_completed: Vec<StepProgressResponse>,
    pub parts: Vec<PartProgressResponse>,
}

impl From<&Progress> for ProgressResponse {
    fn from(progress: &Progress) -> Self {
        Self {
            session_id: progress.session_id,
            status: progress.status.as_str().to_string(),
            current_step: progress.current_step.to_string(),
            current_step_name: progress.current_step_name.clone(),
            current_step_status: progress.current_step_status.map(|s| s.as_str().to_string()),
            current_index: progress.current_index,
            total_steps: progress.total_steps,
            completed_count: progress.completed_count,
            percent: progress.percent,
            steps_completed: progress
                .steps_completed
                .iter()
                .map(StepProgressResponse::from)
                .collect(),
            parts: progress.parts.iter().map(PartProgressResponse::from).collect(),
        }
    }
}

// =============================================================================
// Summary DTOs
// =============================================================================

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SummaryStepResponse {
    pub code: String,
    pub name: String,
    pub user_input: String,
    pub output: String,
    pub attempts: u32,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<&SummaryStep> for SummaryStepResponse {
    fn from(step: &SummaryStep) -> Self {
        Self {
            code: step.code.to_string(),
            name: step.name.clone(),
            user_input: step.user_input.clone(),
            output: step.output.clone(),
            attempts: step.attempts,
            completed_at: step.completed_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ContradictionResponse {
    /// surface, deepened or sharpened
    pub kind: String,
    pub quality_a: String,
    pub quality_b: String,
    pub property_s: String,
    pub anti_property_s: String,
    pub formulation: String,
    pub source_step: String,
}

impl From<&Contradiction> for ContradictionResponse {
    fn from(c: &Contradiction) -> Self {
        Self {
            kind: c.kind.as_str().to_string(),
            quality_a: c.quality_a.clone(),
            quality_b: c.quality_b.clone(),
            property_s: c.property_s.clone(),
            anti_property_s: c.anti_property_s.clone(),
            formulation: c.formulation.clone(),
            source_step: c.source_step.to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct IdealResultResponse {
    pub label: String,
    pub formulation: String,
    pub strengthened_formulation: String,
    pub resources_used: Vec<String>,
    pub source_step: String,
}

impl From<&IdealResult> for IdealResultResponse {
    fn from(ikr: &IdealResult) -> Self {
        Self {
            label: ikr.label.clone(),
            formulation: ikr.formulation.clone(),
            strengthened_formulation: ikr.strengthened_formulation.clone(),
            resources_used: ikr.resources_used.clone(),
            source_step: ikr.source_step.to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SolutionResponse {
    pub method: String,
    pub title: String,
    pub description: String,
    pub novelty_score: Option<u8>,
    pub feasibility_score: Option<u8>,
    pub source_step: String,
}

impl From<&Solution> for SolutionResponse {
    fn from(s: &Solution) -> Self {
        Self {
            method: s.method.as_str().to_string(),
            title: s.title.clone(),
            description: s.description.clone(),
            novelty_score: s.novelty_score,
            feasibility_score: s.feasibility_score,
            source_step: s.source_step.to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SummaryResponse {
    pub session_id: Uuid,
    pub mode: String,
    pub status: String,
    pub title: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub steps: Vec<SummaryStepResponse>,
    pub contradictions: Vec<ContradictionResponse>,
    pub ideal_results: Vec<IdealResultResponse>,
    pub solutions: Vec<SolutionResponse>,
    pub usage: UsageResponse,
}

impl From<&SessionSummary> for SummaryResponse {
    fn from(summary: &SessionSummary) -> Self {
        Self {
            session_id: summary.session_id,
            mode: summary.mode.as_str().to_string(),
            status: summary.status.as_str().to_string(),
            title: summary.problem.title.clone(),
            description: summary.problem.description.clone(),
            created_at: summary.created_at,
            completed_at: summary.completed_at,
            steps: summary.steps.iter().map(SummaryStepResponse::from).collect(),
            contradictions: summary
                .entities
                .contradictions
                .iter()
                .map(ContradictionResponse::from)
                .collect(),
            ideal_results: summary
                .entities
                .ideal_results
                .iter()
                .map(IdealResultResponse::from)
                .collect(),
            solutions: summary
                .entities
                .solutions
                .iter()
                .map(SolutionResponse::from)
                .collect(),
            usage: UsageResponse::from(&summary.usage),
        }
    }
}

// =============================================================================
// Task DTOs
// =============================================================================

/// Returned by submit; poll `GET /api/v1/tasks/{task_id}` for the outcome
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TaskAcceptedResponse {
    pub task_id: Uuid,
    pub session_id: Uuid,
    pub step_code: String,
    pub result_id: Uuid,
}

impl From<&TaskHandle> for TaskAcceptedResponse {
    fn from(handle: &TaskHandle) -> Self {
        Self {
            task_id: handle.task_id,
            session_id: handle.session_id,
            step_code: handle.step_code.to_string(),
            result_id: handle.result_id,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TaskPollResponse {
    pub task_id: Uuid,
    pub ready: bool,
    /// pending, in_progress, success or failure
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<StepResultResponse>,
}

impl From<&TaskPoll> for TaskPollResponse {
    fn from(poll: &TaskPoll) -> Self {
        Self {
            task_id: poll.task_id,
            ready: poll.ready,
            status: poll.status.as_str().to_string(),
            result: poll.result.as_ref().map(StepResultResponse::from),
        }
    }
}
