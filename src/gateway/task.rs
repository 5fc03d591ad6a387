//! Execution handles, poll snapshots and in-flight reservations.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::Instant;
use uuid::Uuid;

use crate::registry::StepCode;
use crate::session::StepResult;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    #[error("step {step_code} of session {session_id} is already executing")]
    AlreadyInFlight { session_id: Uuid, step_code: String },

    #[error("unknown task {0}")]
    UnknownHandle(Uuid),
}

/// Opaque reference to one dispatched execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskHandle {
    pub task_id: Uuid,
    pub session_id: Uuid,
    pub step_code: StepCode,
    /// Attempt this execution resolves
    pub result_id: Uuid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Success,
    Failure,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Success => "success",
            TaskStatus::Failure => "failure",
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, TaskStatus::Success | TaskStatus::Failure)
    }
}

/// What a poll observes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskPoll {
    pub task_id: Uuid,
    pub ready: bool,
    pub status: TaskStatus,
    /// The step attempt as recorded at resolution
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<StepResult>,
}

#[derive(Debug)]
pub(crate) enum TaskState {
    Queued,
    Running,
    Resolved {
        status: TaskStatus,
        result: Option<StepResult>,
    },
}

#[derive(Debug)]
pub(crate) struct TaskRecord {
    pub handle: TaskHandle,
    pub state: TaskState,
    /// Set the first time a poll sees the resolved state
    pub observed_at: Option<Instant>,
}

impl TaskRecord {
    pub fn new(handle: TaskHandle) -> Self {
        Self {
            handle,
            state: TaskState::Queued,
            observed_at: None,
        }
    }

    pub fn snapshot(&self) -> TaskPoll {
        let (status, result) = match &self.state {
            TaskState::Queued => (TaskStatus::Pending, None),
            TaskState::Running => (TaskStatus::InProgress, None),
            TaskState::Resolved { status, result } => (*status, result.clone()),
        };
        TaskPoll {
            task_id: self.handle.task_id,
            ready: status.is_ready(),
            status,
            result,
        }
    }
}

pub(crate) type InFlight = Arc<Mutex<HashSet<(Uuid, StepCode)>>>;

/// Exclusive claim on executing one step of one session.
///
/// Released when dropped, so an execution that never starts (a failed
/// precondition) or one that finishes frees the slot the same way.
#[derive(Debug)]
pub struct Reservation {
    in_flight: InFlight,
    session_id: Uuid,
    step_code: StepCode,
}

impl Reservation {
    pub(crate) fn acquire(
        in_flight: &InFlight,
        session_id: Uuid,
        step_code: StepCode,
    ) -> Result<Self, GatewayError> {
        let mut slots = in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if !slots.insert((session_id, step_code.clone())) {
            return Err(GatewayError::AlreadyInFlight {
                session_id,
                step_code: step_code.to_string(),
            });
        }
        Ok(Self {
            in_flight: Arc::clone(in_flight),
            session_id,
            step_code,
        })
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn step_code(&self) -> &StepCode {
        &self.step_code
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        let mut slots = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        slots.remove(&(self.session_id, self.step_code.clone()));
    }
}
