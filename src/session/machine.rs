//! Session state machine.
//!
//! The only component that moves a session's current step or changes its
//! status. Each operation checks its preconditions and applies its change
//! inside one [`SessionStore::update`], so two racing calls on the same
//! session see each other's effects and at most one of them succeeds.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use super::entities::{self, DerivedEntities};
use super::error::SessionError;
use super::model::{Problem, Session, SessionStatus, StepResult, StepStatus};
use super::store::SessionStore;
use crate::gateway::{ExecutionGateway, TaskHandle};
use crate::llm::TokenUsage;
use crate::registry::{Mode, ModeStrategy, StepCode, StepDefinition};

/// The session's current step with its authoritative attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepView {
    pub code: StepCode,
    pub name: String,
    pub description: String,
    pub part: Option<u32>,
    /// Zero-based position in the mode's step order
    pub index: usize,
    pub total_steps: usize,
    pub result: Option<StepResult>,
}

/// Result of [`SessionMachine::advance_to_next`].
#[derive(Debug, Clone, PartialEq)]
pub enum Advance {
    /// Moved to this step
    Step(StepView),
    /// The last step was accepted; the session is now completed
    Completed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepProgress {
    pub code: StepCode,
    pub name: String,
    pub completed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartProgress {
    pub part: u32,
    pub name: String,
    pub steps_total: usize,
    pub steps_completed: usize,
    pub percent: u32,
    pub is_complete: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub session_id: Uuid,
    pub status: SessionStatus,
    pub current_step: StepCode,
    pub current_step_name: String,
    pub current_step_status: Option<StepStatus>,
    pub current_index: usize,
    pub total_steps: usize,
    pub completed_count: usize,
    pub percent: u32,
    pub steps_completed: Vec<StepProgress>,
    /// Per-part progress; empty for single-part modes
    pub parts: Vec<PartProgress>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryStep {
    pub code: StepCode,
    pub name: String,
    pub user_input: String,
    pub output: String,
    pub attempts: u32,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Read-only report of a session, for export and review.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    pub session_id: Uuid,
    pub mode: Mode,
    pub status: SessionStatus,
    pub problem: Problem,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub steps: Vec<SummaryStep>,
    #[serde(flatten)]
    pub entities: DerivedEntities,
    /// Token and cost totals over every attempt, failed ones included
    pub usage: TokenUsage,
}

fn percent(done: usize, total: usize) -> u32 {
    if total == 0 {
        return 0;
    }
    ((done as f64 / total as f64) * 100.0).round() as u32
}

fn ensure_active(session: &Session) -> Result<(), SessionError> {
    match session.status {
        SessionStatus::Active => Ok(()),
        SessionStatus::Completed => Err(SessionError::invalid_state("Session is already completed.")),
        SessionStatus::Abandoned => Err(SessionError::invalid_state("Session was abandoned.")),
    }
}

#[derive(Clone)]
pub struct SessionMachine {
    strategy: ModeStrategy,
    store: SessionStore,
    gateway: ExecutionGateway,
}

impl SessionMachine {
    pub fn new(strategy: ModeStrategy, store: SessionStore, gateway: ExecutionGateway) -> Self {
        Self {
            strategy,
            store,
            gateway,
        }
    }

    pub fn strategy(&self) -> &ModeStrategy {
        &self.strategy
    }

    pub fn gateway(&self) -> &ExecutionGateway {
        &self.gateway
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Creates a session at the mode's first step with a pending attempt.
    pub async fn start_session(&self, mode: Mode, problem: Problem) -> Result<Session, SessionError> {
        if problem.title.trim().is_empty() {
            return Err(SessionError::InvalidInput(
                "Problem title must not be empty.".to_string(),
            ));
        }
        let first = self.strategy.first_step(mode)?;
        let part = self.strategy.part_of(mode, &first.code);

        let mut session = Session::new(mode, problem, first.code.clone(), part);
        session.push_attempt(first.code.clone(), &first.name);
        let session = self.store.insert(session).await?;

        info!(session_id = %session.id, mode = %mode, "Session started");
        Ok(session)
    }

    /// Marks the current step in progress and dispatches its execution.
    ///
    /// Allowed when the step's attempt is pending or failed, or when it is
    /// completed but later steps already hold results (after going back).
    /// In the last case those later results are superseded.
    pub async fn submit_step(&self, id: Uuid, user_input: &str) -> Result<TaskHandle, SessionError> {
        let code = self.store.get(id).await?.current_step;
        let reservation = self
            .gateway
            .reserve(id, code.clone())
            .map_err(|_| SessionError::invalid_state("Step is already in progress."))?;

        let strategy = &self.strategy;
        let result_id = self
            .store
            .update(id, |session| {
                ensure_active(session)?;
                if session.current_step != code {
                    return Err(SessionError::invalid_state(
                        "Session moved to another step; refresh and retry.",
                    ));
                }
                let step = strategy.registry().require_step(session.mode, code.as_str())?;

                let result_id = match session.live_result(&code).map(|r| (r.id, r.status)) {
                    Some((result_id, StepStatus::Pending)) => result_id,
                    Some((_, StepStatus::InProgress)) => {
                        return Err(SessionError::invalid_state("Step is already in progress."))
                    }
                    Some((_, StepStatus::Completed)) => {
                        let superseded = supersede_later(strategy, session, &code)?;
                        if superseded == 0 {
                            return Err(SessionError::invalid_state("Step is already completed."));
                        }
                        info!(session_id = %session.id, step_code = %code, superseded, "Re-running completed step");
                        session.push_attempt(code.clone(), &step.name).id
                    }
                    Some((_, StepStatus::Failed | StepStatus::Superseded)) | None => {
                        session.push_attempt(code.clone(), &step.name).id
                    }
                };

                if let Some(result) = session.result_mut(result_id) {
                    result.status = StepStatus::InProgress;
                    result.user_input = user_input.trim().to_string();
                }
                Ok(result_id)
            })
            .await?;

        Ok(self.gateway.dispatch(reservation, result_id))
    }

    /// Moves past a completed step, or completes the session after the last.
    pub async fn advance_to_next(&self, id: Uuid) -> Result<Advance, SessionError> {
        let strategy = &self.strategy;
        let advance = self
            .store
            .update(id, |session| {
                ensure_active(session)?;
                let code = session.current_step.clone();
                match session.live_result(&code).map(|r| r.status) {
                    Some(StepStatus::Completed) => {}
                    Some(StepStatus::InProgress) => {
                        return Err(SessionError::invalid_state("Step is still being processed."))
                    }
                    _ => return Err(SessionError::invalid_state("Current step is not completed yet.")),
                }

                let Some(next) = strategy.next_step(session.mode, &code)? else {
                    let now = Utc::now();
                    session.status = SessionStatus::Completed;
                    session.completed_at = Some(now);
                    return Ok(Advance::Completed);
                };

                if session.live_result(&next.code).is_none() {
                    session.push_attempt(next.code.clone(), &next.name);
                }
                session.current_step = next.code.clone();
                session.current_part = strategy.part_of(session.mode, &next.code);
                Ok(Advance::Step(step_view(strategy, session, next)?))
            })
            .await?;

        match &advance {
            Advance::Completed => info!(session_id = %id, "Session completed"),
            Advance::Step(view) => info!(session_id = %id, step_code = %view.code, "Advanced"),
        }
        Ok(advance)
    }

    /// Moves back one step. History is kept and the earlier step's latest
    /// attempt becomes authoritative again.
    pub async fn go_back(&self, id: Uuid) -> Result<StepView, SessionError> {
        let strategy = &self.strategy;
        self.store
            .update(id, |session| {
                ensure_active(session)?;
                let code = session.current_step.clone();
                if session.live_result(&code).map(|r| r.status) == Some(StepStatus::InProgress) {
                    return Err(SessionError::invalid_state(
                        "Cannot go back while the step is being processed.",
                    ));
                }
                let Some(previous) = strategy.previous_step(session.mode, &code)? else {
                    return Err(SessionError::invalid_state("Already at the first step."));
                };

                if session.live_result(&previous.code).is_none() {
                    session.push_attempt(previous.code.clone(), &previous.name);
                }
                session.current_step = previous.code.clone();
                session.current_part = strategy.part_of(session.mode, &previous.code);
                step_view(strategy, session, previous)
            })
            .await
    }

    /// Ends an active session for good.
    pub async fn abandon(&self, id: Uuid) -> Result<Session, SessionError> {
        let session = self
            .store
            .update(id, |session| {
                ensure_active(session)?;
                session.status = SessionStatus::Abandoned;
                Ok(session.clone())
            })
            .await?;
        info!(session_id = %id, "Session abandoned");
        Ok(session)
    }

    pub async fn get_session(&self, id: Uuid) -> Result<Session, SessionError> {
        self.store.get(id).await
    }

    pub async fn list_sessions(&self) -> Vec<Session> {
        self.store.list().await
    }

    pub async fn current_step(&self, id: Uuid) -> Result<StepView, SessionError> {
        let session = self.store.get(id).await?;
        let step = self
            .strategy
            .registry()
            .require_step(session.mode, session.current_step.as_str())?;
        step_view(&self.strategy, &session, step)
    }

    pub async fn get_progress(&self, id: Uuid) -> Result<Progress, SessionError> {
        let session = self.store.get(id).await?;
        let mode = session.mode;
        let registry = self.strategy.registry();
        let steps = registry.get_steps(mode)?;
        let current = registry.require_step(mode, session.current_step.as_str())?;

        let steps_completed: Vec<StepProgress> = steps
            .iter()
            .map(|step| StepProgress {
                code: step.code.clone(),
                name: step.name.clone(),
                completed: session.is_completed(&step.code),
            })
            .collect();
        let completed_count = steps_completed.iter().filter(|s| s.completed).count();
        let total_steps = self.strategy.total_steps(mode)?;

        let parts = self
            .strategy
            .parts(mode)
            .iter()
            .map(|part| {
                let in_part: Vec<&StepProgress> = steps_completed
                    .iter()
                    .filter(|s| s.code.part() == Some(part.number))
                    .collect();
                let done = in_part.iter().filter(|s| s.completed).count();
                PartProgress {
                    part: part.number,
                    name: part.name.clone(),
                    steps_total: in_part.len(),
                    steps_completed: done,
                    percent: percent(done, in_part.len()),
                    is_complete: !in_part.is_empty() && done == in_part.len(),
                }
            })
            .collect();

        Ok(Progress {
            session_id: session.id,
            status: session.status,
            current_step: current.code.clone(),
            current_step_name: current.name.clone(),
            current_step_status: session.current_result().map(|r| r.status),
            current_index: self.strategy.position(mode, &current.code)?,
            total_steps,
            completed_count,
            percent: percent(completed_count, total_steps),
            steps_completed,
            parts,
        })
    }

    pub async fn get_session_summary(&self, id: Uuid) -> Result<SessionSummary, SessionError> {
        let session = self.store.get(id).await?;
        let steps = self.strategy.registry().get_steps(session.mode)?;

        let summary_steps = steps
            .iter()
            .filter_map(|step| {
                let result = session.live_result(&step.code)?;
                if result.status != StepStatus::Completed {
                    return None;
                }
                Some(SummaryStep {
                    code: step.code.clone(),
                    name: step.name.clone(),
                    user_input: result.user_input.clone(),
                    output: result.validated_result.clone().unwrap_or_default(),
                    attempts: session.attempts(&step.code),
                    completed_at: result.completed_at,
                })
            })
            .collect();

        let usage = session
            .results
            .iter()
            .filter_map(|r| r.usage)
            .fold(TokenUsage::default(), |total, u| {
                TokenUsage::new(
                    total.input_tokens.saturating_add(u.input_tokens),
                    total.output_tokens.saturating_add(u.output_tokens),
                    total.cost_usd + u.cost_usd,
                )
            });

        Ok(SessionSummary {
            session_id: session.id,
            mode: session.mode,
            status: session.status,
            problem: session.problem.clone(),
            created_at: session.created_at,
            completed_at: session.completed_at,
            steps: summary_steps,
            entities: session.entities.clone(),
            usage,
        })
    }
}

/// Marks live results of every step after `code` superseded and rebuilds
/// derived entities. Returns how many results were superseded.
fn supersede_later(
    strategy: &ModeStrategy,
    session: &mut Session,
    code: &StepCode,
) -> Result<usize, SessionError> {
    let steps = strategy.registry().get_steps(session.mode)?;
    let position = strategy.position(session.mode, code)?;
    let later: Vec<&StepCode> = steps[position + 1..].iter().map(|s| &s.code).collect();

    let mut count = 0;
    for result in &mut session.results {
        if later.contains(&&result.step_code) && result.status != StepStatus::Superseded {
            result.status = StepStatus::Superseded;
            count += 1;
        }
    }
    if count > 0 {
        session.entities = entities::derive(session.mode, &session.results);
    }
    Ok(count)
}

fn step_view(
    strategy: &ModeStrategy,
    session: &Session,
    step: &StepDefinition,
) -> Result<StepView, SessionError> {
    Ok(StepView {
        code: step.code.clone(),
        name: step.name.clone(),
        description: step.description.clone(),
        part: strategy.part_of(session.mode, &step.code),
        index: strategy.position(session.mode, &step.code)?,
        total_steps: strategy.total_steps(session.mode)?,
        result: session.live_result(&step.code).cloned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{GatewaySettings, TaskPoll};
    use crate::llm::scripted::{overloaded, ScriptedClient};
    use crate::prompts::PromptStore;
    use crate::registry::{PartDefinition, StepRegistry};
    use crate::validators::{ValidatorKind, ValidatorSet};
    use std::sync::Arc;
    use std::time::Duration;

    const FALSENESS_OK: &str =
        "Трубопровод зарастает накипью, промывка требует остановки линии на сутки каждый месяц.";

    fn three_step_registry() -> StepRegistry {
        StepRegistry::builder()
            .mode(
                Mode::Express,
                vec![
                    StepDefinition::new("1", "One", "steps/express/step_1"),
                    StepDefinition::new("2", "Two", "steps/express/step_2")
                        .validate_with(&[ValidatorKind::FalsenessCheck]),
                    StepDefinition::new("3", "Three", "steps/express/step_3"),
                ],
                Vec::new(),
            )
            .mode(
                Mode::Full,
                vec![
                    StepDefinition::new("1.1", "A", "steps/full/step_1_1"),
                    StepDefinition::new("1.2", "B", "steps/full/step_1_2"),
                    StepDefinition::new("2.1", "C", "steps/full/step_2_1"),
                ],
                vec![
                    PartDefinition {
                        number: 1,
                        name: "First".into(),
                    },
                    PartDefinition {
                        number: 2,
                        name: "Second".into(),
                    },
                ],
            )
            .build()
            .unwrap()
    }

    fn machine_with(registry: StepRegistry, client: Arc<ScriptedClient>) -> SessionMachine {
        let registry = Arc::new(registry);
        let store = SessionStore::in_memory();
        let gateway = ExecutionGateway::new(
            registry.clone(),
            store.clone(),
            client,
            Arc::new(PromptStore::new().unwrap()),
            Arc::new(ValidatorSet::builtin()),
            GatewaySettings::default(),
        );
        SessionMachine::new(ModeStrategy::new(registry), store, gateway)
    }

    fn problem() -> Problem {
        Problem {
            title: "Pipe scaling".into(),
            description: String::new(),
        }
    }

    async fn wait(machine: &SessionMachine, handle: &TaskHandle) -> TaskPoll {
        loop {
            let poll = machine.gateway().poll(handle.task_id).unwrap();
            if poll.ready {
                return poll;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    async fn complete_current(machine: &SessionMachine, id: Uuid) {
        let handle = machine.submit_step(id, "x").await.unwrap();
        assert!(wait(machine, &handle).await.ready);
    }

    #[tokio::test(start_paused = true)]
    async fn test_three_step_scenario() {
        let client = ScriptedClient::new(vec![
            Ok("first".into()),
            Ok(FALSENESS_OK.into()),
            Ok("third".into()),
        ]);
        let machine = machine_with(three_step_registry(), client);

        let session = machine.start_session(Mode::Express, problem()).await.unwrap();
        assert_eq!(session.current_step, "1");
        assert_eq!(session.results[0].status, StepStatus::Pending);

        for expected_next in ["2", "3"] {
            complete_current(&machine, session.id).await;
            match machine.advance_to_next(session.id).await.unwrap() {
                Advance::Step(view) => assert_eq!(view.code, expected_next),
                Advance::Completed => panic!("completed too early"),
            }
        }
        complete_current(&machine, session.id).await;
        assert_eq!(
            machine.advance_to_next(session.id).await.unwrap(),
            Advance::Completed
        );

        let done = machine.get_session(session.id).await.unwrap();
        assert_eq!(done.status, SessionStatus::Completed);
        assert!(done.completed_at.is_some());
        assert!(machine
            .advance_to_next(session.id)
            .await
            .unwrap_err()
            .is_precondition());
    }

    #[tokio::test(start_paused = true)]
    async fn test_double_submit_rejected() {
        let machine = machine_with(three_step_registry(), ScriptedClient::new(Vec::new()));
        let session = machine.start_session(Mode::Express, problem()).await.unwrap();

        let handle = machine.submit_step(session.id, "x").await.unwrap();
        let err = machine.submit_step(session.id, "x").await.unwrap_err();
        assert!(err.is_precondition());

        wait(&machine, &handle).await;
        // completed and nothing after it: still rejected
        assert!(machine
            .submit_step(session.id, "x")
            .await
            .unwrap_err()
            .is_precondition());
    }

    #[tokio::test(start_paused = true)]
    async fn test_advance_requires_completed_step() {
        let machine = machine_with(three_step_registry(), ScriptedClient::new(Vec::new()));
        let session = machine.start_session(Mode::Express, problem()).await.unwrap();

        // pending
        assert!(machine.advance_to_next(session.id).await.unwrap_err().is_precondition());

        // in progress
        let handle = machine.submit_step(session.id, "x").await.unwrap();
        assert!(machine.advance_to_next(session.id).await.unwrap_err().is_precondition());
        assert!(machine.go_back(session.id).await.unwrap_err().is_precondition());

        wait(&machine, &handle).await;
        assert!(machine.advance_to_next(session.id).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_validator_rejection_then_new_attempt() {
        let client = ScriptedClient::new(vec![
            Ok("first".into()),
            Ok("too short".into()),
            Ok(FALSENESS_OK.into()),
        ]);
        let machine = machine_with(three_step_registry(), client);
        let session = machine.start_session(Mode::Express, problem()).await.unwrap();
        complete_current(&machine, session.id).await;
        machine.advance_to_next(session.id).await.unwrap();

        let handle = machine.submit_step(session.id, "x").await.unwrap();
        assert_eq!(
            wait(&machine, &handle).await.status,
            crate::gateway::TaskStatus::Failure
        );
        let failed = machine.current_step(session.id).await.unwrap().result.unwrap();
        assert_eq!(failed.status, StepStatus::Failed);
        assert!(failed.validation_notes.contains("[falseness_check] FAIL"));

        complete_current(&machine, session.id).await;
        let s = machine.get_session(session.id).await.unwrap();
        let step_two: Vec<&StepResult> = s.results.iter().filter(|r| r.step_code == "2").collect();
        assert_eq!(step_two.len(), 2);
        assert_eq!(step_two[0].status, StepStatus::Failed);
        assert_eq!(step_two[1].status, StepStatus::Completed);
        assert_eq!(step_two[1].attempt, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_fail_step() {
        let client = ScriptedClient::new(vec![Err(overloaded()), Err(overloaded()), Err(overloaded())]);
        let machine = machine_with(three_step_registry(), client.clone());
        let session = machine.start_session(Mode::Express, problem()).await.unwrap();

        let handle = machine.submit_step(session.id, "x").await.unwrap();
        wait(&machine, &handle).await;

        assert_eq!(client.calls(), 3);
        let result = machine.current_step(session.id).await.unwrap().result.unwrap();
        assert_eq!(result.status, StepStatus::Failed);
        assert!(!result.validation_notes.is_empty());

        // failed steps can be resubmitted
        complete_current(&machine, session.id).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_go_back_walks_to_first_step() {
        let client = ScriptedClient::new(vec![Ok("first".into()), Ok(FALSENESS_OK.into())]);
        let machine = machine_with(three_step_registry(), client);
        let session = machine.start_session(Mode::Express, problem()).await.unwrap();
        complete_current(&machine, session.id).await;
        machine.advance_to_next(session.id).await.unwrap();
        complete_current(&machine, session.id).await;
        machine.advance_to_next(session.id).await.unwrap();

        assert_eq!(machine.go_back(session.id).await.unwrap().code, "2");
        let view = machine.go_back(session.id).await.unwrap();
        assert_eq!(view.code, "1");
        assert_eq!(view.result.unwrap().status, StepStatus::Completed);

        let err = machine.go_back(session.id).await.unwrap_err();
        assert_eq!(err.to_string(), "Already at the first step.");
    }

    #[tokio::test(start_paused = true)]
    async fn test_resubmit_after_back_supersedes_later_steps() {
        let client = ScriptedClient::new(vec![
            Ok("first".into()),
            Ok(FALSENESS_OK.into()),
            Ok("first, revised".into()),
        ]);
        let machine = machine_with(three_step_registry(), client);
        let session = machine.start_session(Mode::Express, problem()).await.unwrap();
        complete_current(&machine, session.id).await;
        machine.advance_to_next(session.id).await.unwrap();
        complete_current(&machine, session.id).await;

        machine.go_back(session.id).await.unwrap();
        complete_current(&machine, session.id).await;

        let s = machine.get_session(session.id).await.unwrap();
        let step_two = s.results.iter().find(|r| r.step_code == "2").unwrap();
        assert_eq!(step_two.status, StepStatus::Superseded);
        let texts: Vec<&str> = s
            .context_view(|_| true, 0)
            .iter()
            .map(|e| e.text.as_str())
            .collect();
        assert_eq!(texts, vec!["first, revised"]);

        // advancing again starts step 2 afresh
        match machine.advance_to_next(session.id).await.unwrap() {
            Advance::Step(view) => {
                let result = view.result.unwrap();
                assert_eq!(result.status, StepStatus::Pending);
                assert_eq!(result.attempt, 2);
            }
            Advance::Completed => panic!("unexpected completion"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_progress_with_parts() {
        let machine = machine_with(three_step_registry(), ScriptedClient::new(Vec::new()));
        let session = machine.start_session(Mode::Full, problem()).await.unwrap();
        assert_eq!(session.current_part, Some(1));

        complete_current(&machine, session.id).await;
        machine.advance_to_next(session.id).await.unwrap();

        let progress = machine.get_progress(session.id).await.unwrap();
        assert_eq!(progress.current_step, "1.2");
        assert_eq!(progress.current_index, 1);
        assert_eq!(progress.total_steps, 3);
        assert_eq!(progress.completed_count, 1);
        assert_eq!(progress.percent, 33);
        assert_eq!(progress.current_step_status, Some(StepStatus::Pending));
        assert!(progress.steps_completed[0].completed);
        assert!(!progress.steps_completed[1].completed);

        assert_eq!(progress.parts.len(), 2);
        assert_eq!(progress.parts[0].steps_total, 2);
        assert_eq!(progress.parts[0].percent, 50);
        assert!(!progress.parts[0].is_complete);
        assert_eq!(progress.parts[1].steps_completed, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_autopilot_single_shot() {
        let client = ScriptedClient::new(vec![Ok(
            "Ультразвуковой излучатель снаружи трубы разрушает накипь.".into()
        )]);
        let machine = machine_with(StepRegistry::builtin().unwrap(), client);
        let session = machine.start_session(Mode::Autopilot, problem()).await.unwrap();
        assert_eq!(session.current_step, "auto");

        complete_current(&machine, session.id).await;
        assert_eq!(
            machine.advance_to_next(session.id).await.unwrap(),
            Advance::Completed
        );

        let summary = machine.get_session_summary(session.id).await.unwrap();
        assert_eq!(summary.steps.len(), 1);
        assert_eq!(summary.entities.solutions.len(), 1);
        assert_eq!(summary.usage.total_tokens, 30);
    }

    #[tokio::test]
    async fn test_abandon_is_terminal() {
        let machine = machine_with(three_step_registry(), ScriptedClient::new(Vec::new()));
        let session = machine.start_session(Mode::Express, problem()).await.unwrap();

        let abandoned = machine.abandon(session.id).await.unwrap();
        assert_eq!(abandoned.status, SessionStatus::Abandoned);
        assert!(machine.abandon(session.id).await.unwrap_err().is_precondition());
        assert!(machine.submit_step(session.id, "x").await.unwrap_err().is_precondition());
    }

    #[tokio::test]
    async fn test_start_rejects_empty_title() {
        let machine = machine_with(three_step_registry(), ScriptedClient::new(Vec::new()));
        let err = machine
            .start_session(
                Mode::Express,
                Problem {
                    title: "  ".into(),
                    description: String::new(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_unknown_session() {
        let machine = machine_with(three_step_registry(), ScriptedClient::new(Vec::new()));
        let id = Uuid::new_v4();
        assert!(matches!(
            machine.get_progress(id).await.unwrap_err(),
            SessionError::NotFound(_)
        ));
    }
}
