//! Session data model: sessions, step attempts and the context log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::entities::DerivedEntities;
use crate::llm::TokenUsage;
use crate::registry::{Mode, StepCode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Completed,
    Abandoned,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Completed => "completed",
            SessionStatus::Abandoned => "abandoned",
        }
    }
}

/// Status of one step attempt.
///
/// `Superseded` marks attempts invalidated by re-running an earlier step;
/// they stay in history but no longer count for progress, context or summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Superseded,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Pending => "pending",
            StepStatus::InProgress => "in_progress",
            StepStatus::Completed => "completed",
            StepStatus::Failed => "failed",
            StepStatus::Superseded => "superseded",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StepStatus::Completed | StepStatus::Failed | StepStatus::Superseded
        )
    }
}

/// The problem statement a session works on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Problem {
    pub title: String,
    #[serde(default)]
    pub description: String,
}

/// One attempt at one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub id: Uuid,
    pub step_code: StepCode,
    pub step_name: String,
    /// 1-based attempt number for this step code
    pub attempt: u32,
    #[serde(default)]
    pub user_input: String,
    /// Raw model output
    #[serde(default)]
    pub llm_output: Option<String>,
    /// Output accepted by the validator chain
    #[serde(default)]
    pub validated_result: Option<String>,
    #[serde(default)]
    pub validation_notes: String,
    pub status: StepStatus,
    #[serde(default)]
    pub usage: Option<TokenUsage>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl StepResult {
    pub fn pending(step_code: StepCode, step_name: impl Into<String>, attempt: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            step_code,
            step_name: step_name.into(),
            attempt,
            user_input: String::new(),
            llm_output: None,
            validated_result: None,
            validation_notes: String::new(),
            status: StepStatus::Pending,
            usage: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }
}

/// One accepted step output in the context log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextEntry {
    pub step_code: StepCode,
    pub step_name: String,
    pub user_input: String,
    pub text: String,
    /// Attempt that produced this entry
    pub result_id: Uuid,
    pub recorded_at: DateTime<Utc>,
}

/// Append-only log of accepted outputs, used as model-call context.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextSnapshot {
    entries: Vec<ContextEntry>,
}

impl ContextSnapshot {
    pub fn append(&mut self, entry: ContextEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[ContextEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains_result(&self, result_id: Uuid) -> bool {
        self.entries.iter().any(|e| e.result_id == result_id)
    }
}

/// One run of the protocol against one problem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub problem: Problem,
    pub mode: Mode,
    pub current_step: StepCode,
    /// Part of the current step; only set for multi-part modes
    #[serde(default)]
    pub current_part: Option<u32>,
    #[serde(default)]
    pub context: ContextSnapshot,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    /// Every attempt, in creation order
    #[serde(default)]
    pub results: Vec<StepResult>,
    #[serde(default)]
    pub entities: DerivedEntities,
}

impl Session {
    pub fn new(mode: Mode, problem: Problem, first_step: StepCode, part: Option<u32>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            problem,
            mode,
            current_step: first_step,
            current_part: part,
            context: ContextSnapshot::default(),
            status: SessionStatus::Active,
            created_at: now,
            updated_at: now,
            completed_at: None,
            results: Vec::new(),
            entities: DerivedEntities::default(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }

    /// Latest non-superseded attempt for a step.
    pub fn live_result(&self, code: &StepCode) -> Option<&StepResult> {
        self.results
            .iter()
            .rev()
            .find(|r| &r.step_code == code && r.status != StepStatus::Superseded)
    }

    pub fn live_result_mut(&mut self, code: &StepCode) -> Option<&mut StepResult> {
        self.results
            .iter_mut()
            .rev()
            .find(|r| &r.step_code == code && r.status != StepStatus::Superseded)
    }

    pub fn current_result(&self) -> Option<&StepResult> {
        self.live_result(&self.current_step)
    }

    pub fn result(&self, id: Uuid) -> Option<&StepResult> {
        self.results.iter().find(|r| r.id == id)
    }

    pub fn result_mut(&mut self, id: Uuid) -> Option<&mut StepResult> {
        self.results.iter_mut().find(|r| r.id == id)
    }

    /// Number of attempts recorded for a step, superseded ones included.
    pub fn attempts(&self, code: &StepCode) -> u32 {
        let count = self.results.iter().filter(|r| &r.step_code == code).count();
        u32::try_from(count).unwrap_or(u32::MAX)
    }

    /// Pushes a fresh pending attempt for `code` and returns it.
    pub fn push_attempt(&mut self, code: StepCode, name: &str) -> &mut StepResult {
        let attempt = self.attempts(&code) + 1;
        self.results.push(StepResult::pending(code, name, attempt));
        let last = self.results.len() - 1;
        &mut self.results[last]
    }

    pub fn is_completed(&self, code: &StepCode) -> bool {
        self.live_result(code)
            .is_some_and(|r| r.status == StepStatus::Completed)
    }

    /// Accepted outputs of live completed attempts, in context-log order.
    ///
    /// Keeps only the latest entry per step code, drops entries whose attempt
    /// was superseded, and keeps the entries `include` selects. With
    /// `max_entries > 0` only the most recent entries are returned.
    pub fn context_view(
        &self,
        include: impl Fn(&StepCode) -> bool,
        max_entries: usize,
    ) -> Vec<&ContextEntry> {
        let mut view: Vec<&ContextEntry> = Vec::new();
        for entry in self.context.entries() {
            let live = self
                .result(entry.result_id)
                .is_some_and(|r| r.status == StepStatus::Completed);
            if !live || !include(&entry.step_code) {
                continue;
            }
            view.retain(|e| e.step_code != entry.step_code);
            view.push(entry);
        }
        if max_entries > 0 && view.len() > max_entries {
            view.drain(..view.len() - max_entries);
        }
        view
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
