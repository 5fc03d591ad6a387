//! Asynchronous execution gateway.
//!
//! `dispatch` hands a reserved step attempt to a background worker and returns
//! a [`TaskHandle`] immediately. The worker renders the prompt, calls the model
//! with a bounded timeout and exponential-backoff retries on transient
//! failures, runs the step's validators, records the outcome on the session and
//! resolves the handle exactly once.

mod task;

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use backon::{ExponentialBuilder, Retryable};
use chrono::Utc;
use tokio::time::Instant;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

pub use task::{GatewayError, Reservation, TaskHandle, TaskPoll, TaskStatus};
use task::{InFlight, TaskRecord, TaskState};

use crate::config::{Config, EngineConfig};
use crate::llm::{ChatMessage, ModelClient, ModelError, ModelReply, ModelRequest};
use crate::prompts::{PromptContext, PromptStore};
use crate::registry::{StepCode, StepRegistry};
use crate::session::{entities, ContextEntry, SessionStore, StepStatus};
use crate::validators::{StepContext, Validation, ValidatorSet};

/// Gateway tuning taken from configuration.
#[derive(Debug, Clone)]
pub struct GatewaySettings {
    pub engine: EngineConfig,
    /// Output budget for steps that do not set their own
    pub max_output_tokens: u32,
    /// Most recent accepted steps sent as history (0 = all)
    pub context_max_entries: usize,
}

impl GatewaySettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            engine: config.engine.clone(),
            max_output_tokens: config.llm.max_output_tokens,
            context_max_entries: config.context.max_entries,
        }
    }
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// How one execution ended, before it is written to the session.
#[derive(Debug)]
enum Outcome {
    Accepted {
        reply: ModelReply,
        text: String,
        notes: String,
    },
    Rejected {
        reply: ModelReply,
        notes: String,
    },
    ModelFailed {
        error: ModelError,
        attempts: usize,
    },
    Misconfigured(String),
}

#[derive(Clone)]
pub struct ExecutionGateway {
    registry: Arc<StepRegistry>,
    store: SessionStore,
    client: Arc<dyn ModelClient>,
    prompts: Arc<PromptStore>,
    validators: Arc<ValidatorSet>,
    settings: Arc<GatewaySettings>,
    tasks: Arc<Mutex<HashMap<Uuid, TaskRecord>>>,
    in_flight: InFlight,
}

impl ExecutionGateway {
    pub fn new(
        registry: Arc<StepRegistry>,
        store: SessionStore,
        client: Arc<dyn ModelClient>,
        prompts: Arc<PromptStore>,
        validators: Arc<ValidatorSet>,
        settings: GatewaySettings,
    ) -> Self {
        Self {
            registry,
            store,
            client,
            prompts,
            validators,
            settings: Arc::new(settings),
            tasks: Arc::default(),
            in_flight: Arc::default(),
        }
    }

    /// Claims the single execution slot for `(session_id, step_code)`.
    pub fn reserve(&self, session_id: Uuid, step_code: StepCode) -> Result<Reservation, GatewayError> {
        Reservation::acquire(&self.in_flight, session_id, step_code)
    }

    /// Starts executing the reserved attempt `result_id` in the background.
    pub fn dispatch(&self, reservation: Reservation, result_id: Uuid) -> TaskHandle {
        let handle = TaskHandle {
            task_id: Uuid::new_v4(),
            session_id: reservation.session_id(),
            step_code: reservation.step_code().clone(),
            result_id,
        };

        {
            let mut tasks = self.lock_tasks();
            self.sweep(&mut tasks);
            tasks.insert(handle.task_id, TaskRecord::new(handle.clone()));
        }
        info!(
            task_id = %handle.task_id,
            session_id = %handle.session_id,
            step_code = %handle.step_code,
            "Dispatched step execution"
        );

        let gateway = self.clone();
        let worker_handle = handle.clone();
        tokio::spawn(async move {
            gateway.run(worker_handle, reservation).await;
        });

        handle
    }

    /// Non-blocking status of an execution.
    pub fn poll(&self, task_id: Uuid) -> Result<TaskPoll, GatewayError> {
        let mut tasks = self.lock_tasks();
        self.sweep(&mut tasks);
        let record = tasks
            .get_mut(&task_id)
            .ok_or(GatewayError::UnknownHandle(task_id))?;
        let poll = record.snapshot();
        if poll.ready && record.observed_at.is_none() {
            record.observed_at = Some(Instant::now());
        }
        Ok(poll)
    }

    /// Executions currently holding a slot.
    pub fn in_flight_count(&self) -> usize {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn lock_tasks(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, TaskRecord>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drops resolved records observed longer ago than the retention window.
    fn sweep(&self, tasks: &mut HashMap<Uuid, TaskRecord>) {
        let retention = self.settings.engine.task_retention();
        tasks.retain(|_, record| {
            record
                .observed_at
                .map_or(true, |observed| observed.elapsed() < retention)
        });
    }

    fn set_state(&self, task_id: Uuid, state: TaskState) {
        if let Some(record) = self.lock_tasks().get_mut(&task_id) {
            record.state = state;
        }
    }

    #[instrument(skip_all, fields(task_id = %handle.task_id, session_id = %handle.session_id, step_code = %handle.step_code))]
    async fn run(&self, handle: TaskHandle, reservation: Reservation) {
        self.set_state(handle.task_id, TaskState::Running);

        let outcome = self.execute(&handle).await;
        let resolved = self.record(&handle, outcome).await;

        // free the slot before the handle reports ready
        drop(reservation);
        self.set_state(handle.task_id, resolved);
    }

    async fn execute(&self, handle: &TaskHandle) -> Outcome {
        let session = match self.store.get(handle.session_id).await {
            Ok(session) => session,
            Err(e) => return Outcome::Misconfigured(e.to_string()),
        };
        let step = match self
            .registry
            .require_step(session.mode, handle.step_code.as_str())
        {
            Ok(step) => step,
            Err(e) => return Outcome::Misconfigured(e.to_string()),
        };
        let user_input = session
            .result(handle.result_id)
            .map(|r| r.user_input.clone())
            .unwrap_or_default();

        let prompt = match self
            .prompts
            .render(step, &PromptContext::new(&session, step, &user_input))
        {
            Ok(prompt) => prompt,
            Err(e) => return Outcome::Misconfigured(e.to_string()),
        };

        let mut history = Vec::new();
        for entry in session.context_view(
            |code| code != &handle.step_code,
            self.settings.context_max_entries,
        ) {
            let asked = if entry.user_input.is_empty() {
                format!("Шаг {}: {}", entry.step_code, entry.step_name)
            } else {
                format!(
                    "Шаг {}: {}\n\n{}",
                    entry.step_code, entry.step_name, entry.user_input
                )
            };
            history.push(ChatMessage::user(asked));
            history.push(ChatMessage::assistant(entry.text.clone()));
        }
        history.push(ChatMessage::user(prompt.user));

        let request = ModelRequest {
            system: prompt.system,
            history,
            max_output_tokens: step
                .max_output_tokens
                .unwrap_or(self.settings.max_output_tokens),
        };

        let attempts = AtomicUsize::new(0);
        let reply = match self.call_model(&request, &attempts).await {
            Ok(reply) => reply,
            Err(error) => {
                return Outcome::ModelFailed {
                    error,
                    attempts: attempts.load(Ordering::Relaxed),
                }
            }
        };

        let ctx = StepContext::new(session.mode, &handle.step_code);
        match self.validators.run(&step.validators, &ctx, &reply.text) {
            Ok(Validation::Accepted { text, notes }) => Outcome::Accepted { reply, text, notes },
            Ok(Validation::Rejected(rejection)) => Outcome::Rejected {
                notes: rejection.notes(),
                reply,
            },
            Err(e) => Outcome::Misconfigured(e.to_string()),
        }
    }

    fn retry_strategy(&self) -> ExponentialBuilder {
        let engine = &self.settings.engine;
        ExponentialBuilder::default()
            .with_min_delay(engine.retry_base_delay())
            .with_max_delay(engine.retry_max_delay())
            .with_max_times(engine.max_attempts.saturating_sub(1))
    }

    async fn call_model(
        &self,
        request: &ModelRequest,
        attempts: &AtomicUsize,
    ) -> Result<ModelReply, ModelError> {
        let timeout = self.settings.engine.model_timeout();
        let op = || {
            attempts.fetch_add(1, Ordering::Relaxed);
            let client = Arc::clone(&self.client);
            let request = request.clone();
            async move {
                tokio::time::timeout(timeout, client.complete(request))
                    .await
                    .unwrap_or_else(|_| Err(ModelError::Timeout(timeout)))
            }
        };

        op.retry(self.retry_strategy())
            .when(ModelError::is_transient)
            .notify(|err, dur| {
                warn!("Retrying model call after {:?}: {}", dur, err);
            })
            .await
    }

    /// Writes the outcome to the session and returns the handle's final state.
    async fn record(&self, handle: &TaskHandle, outcome: Outcome) -> TaskState {
        log_outcome(&outcome, self.client.name());

        let result_id = handle.result_id;
        let written = self
            .store
            .update(handle.session_id, |session| {
                let mode = session.mode;
                let Some(result) = session.result_mut(result_id) else {
                    return Ok(None);
                };
                let now = Utc::now();
                result.completed_at = Some(now);

                let accepted = match outcome {
                    Outcome::Accepted { reply, text, notes } => {
                        result.status = StepStatus::Completed;
                        result.llm_output = Some(reply.text);
                        result.validated_result = Some(text.clone());
                        result.validation_notes = notes;
                        result.usage = Some(reply.usage);
                        Some(ContextEntry {
                            step_code: result.step_code.clone(),
                            step_name: result.step_name.clone(),
                            user_input: result.user_input.clone(),
                            text,
                            result_id,
                            recorded_at: now,
                        })
                    }
                    Outcome::Rejected { reply, notes } => {
                        result.status = StepStatus::Failed;
                        result.llm_output = Some(reply.text);
                        result.validation_notes = notes;
                        result.usage = Some(reply.usage);
                        None
                    }
                    Outcome::ModelFailed { error, attempts } => {
                        result.status = StepStatus::Failed;
                        result.validation_notes = if error.is_transient() {
                            format!("Model call failed after {attempts} attempt(s): {error}")
                        } else {
                            format!("Model call failed: {error}")
                        };
                        None
                    }
                    Outcome::Misconfigured(message) => {
                        result.status = StepStatus::Failed;
                        result.validation_notes = format!("Step configuration error: {message}");
                        None
                    }
                };
                let snapshot = result.clone();

                // Abandoned sessions keep the attempt but take no new context.
                if let Some(entry) = accepted.filter(|_| session.is_active()) {
                    session.context.append(entry);
                    session.entities = entities::derive(mode, &session.results);
                }
                Ok(Some(snapshot))
            })
            .await;

        match written {
            Ok(Some(result)) => TaskState::Resolved {
                status: if result.status == StepStatus::Completed {
                    TaskStatus::Success
                } else {
                    TaskStatus::Failure
                },
                result: Some(result),
            },
            Ok(None) => {
                error!(result_id = %result_id, "Step attempt vanished before its outcome was recorded");
                TaskState::Resolved {
                    status: TaskStatus::Failure,
                    result: None,
                }
            }
            Err(e) => {
                error!(error = %e, "Failed to record step outcome");
                TaskState::Resolved {
                    status: TaskStatus::Failure,
                    result: None,
                }
            }
        }
    }
}

fn log_outcome(outcome: &Outcome, provider: &str) {
    match outcome {
        Outcome::Accepted { reply, .. } => info!(
            provider,
            model = %reply.model,
            input_tokens = reply.usage.input_tokens,
            output_tokens = reply.usage.output_tokens,
            cost_usd = reply.usage.cost_usd,
            latency_ms = reply.latency_ms,
            "Step completed"
        ),
        Outcome::Rejected { reply, notes } => info!(
            provider,
            output_tokens = reply.usage.output_tokens,
            notes = %notes,
            "Step output rejected by validation"
        ),
        Outcome::ModelFailed { error, attempts } => warn!(
            provider,
            attempts,
            error = %error,
            "Step failed: model call unsuccessful"
        ),
        Outcome::Misconfigured(message) => error!(message = %message, "Step failed: configuration error"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::scripted::{overloaded, ScriptedClient};
    use crate::registry::Mode;
    use crate::session::{Problem, Session, SessionStatus};
    use std::time::Duration;

    async fn setup(client: Arc<ScriptedClient>) -> (ExecutionGateway, SessionStore, Session) {
        let registry = Arc::new(StepRegistry::builtin().unwrap());
        let store = SessionStore::in_memory();
        let gateway = ExecutionGateway::new(
            registry,
            store.clone(),
            client,
            Arc::new(PromptStore::new().unwrap()),
            Arc::new(ValidatorSet::builtin()),
            GatewaySettings::default(),
        );
        let mut session = Session::new(
            Mode::Express,
            Problem {
                title: "Pipe scaling".into(),
                description: String::new(),
            },
            StepCode::from("6"),
            None,
        );
        let result = session.push_attempt(StepCode::from("6"), "Ресурсы");
        result.status = StepStatus::InProgress;
        result.user_input = "water, heat".into();
        let session = store.insert(session).await.unwrap();
        (gateway, store, session)
    }

    async fn wait_ready(gateway: &ExecutionGateway, task_id: Uuid) -> TaskPoll {
        loop {
            let poll = gateway.poll(task_id).unwrap();
            if poll.ready {
                return poll;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_records_result_and_context() {
        let client = ScriptedClient::new(vec![Ok("Use the water flow itself".into())]);
        let (gateway, store, session) = setup(client.clone()).await;
        let result_id = session.results[0].id;

        let reservation = gateway.reserve(session.id, StepCode::from("6")).unwrap();
        let handle = gateway.dispatch(reservation, result_id);
        let poll = wait_ready(&gateway, handle.task_id).await;

        assert_eq!(poll.status, TaskStatus::Success);
        let stored = store.get(session.id).await.unwrap();
        assert_eq!(stored.results[0].status, StepStatus::Completed);
        assert_eq!(
            stored.results[0].validated_result.as_deref(),
            Some("Use the water flow itself")
        );
        assert_eq!(stored.context.len(), 1);
        assert_eq!(gateway.in_flight_count(), 0);

        let requests = client.requests.lock().unwrap();
        assert!(requests[0].history.last().unwrap().content.contains("water, heat"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_session_takes_no_context() {
        let client = ScriptedClient::new(vec![Ok("Use the water flow itself".into())]);
        let (gateway, store, session) = setup(client).await;

        let reservation = gateway.reserve(session.id, StepCode::from("6")).unwrap();
        store
            .update(session.id, |s| {
                s.status = SessionStatus::Abandoned;
                Ok(())
            })
            .await
            .unwrap();
        let handle = gateway.dispatch(reservation, session.results[0].id);
        wait_ready(&gateway, handle.task_id).await;

        let stored = store.get(session.id).await.unwrap();
        assert_eq!(stored.status, SessionStatus::Abandoned);
        assert_eq!(stored.results[0].status, StepStatus::Completed);
        assert!(stored.context.is_empty());
        assert!(stored.entities.solutions.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_exhaust_retries() {
        let client = ScriptedClient::new(vec![Err(overloaded()), Err(overloaded()), Err(overloaded())]);
        let (gateway, store, session) = setup(client.clone()).await;

        let reservation = gateway.reserve(session.id, StepCode::from("6")).unwrap();
        let handle = gateway.dispatch(reservation, session.results[0].id);
        let poll = wait_ready(&gateway, handle.task_id).await;

        assert_eq!(poll.status, TaskStatus::Failure);
        assert_eq!(client.calls(), 3);
        let stored = store.get(session.id).await.unwrap();
        assert_eq!(stored.results[0].status, StepStatus::Failed);
        assert!(stored.results[0].validation_notes.contains("after 3 attempt(s)"));
        assert!(stored.context.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failure_then_success() {
        let client = ScriptedClient::new(vec![Err(overloaded()), Ok("Recovered answer".into())]);
        let (gateway, _store, session) = setup(client.clone()).await;

        let reservation = gateway.reserve(session.id, StepCode::from("6")).unwrap();
        let handle = gateway.dispatch(reservation, session.results[0].id);

        assert_eq!(wait_ready(&gateway, handle.task_id).await.status, TaskStatus::Success);
        assert_eq!(client.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_failure_not_retried() {
        let client = ScriptedClient::new(vec![Err(ModelError::Unauthorized {
            provider: "scripted".into(),
        })]);
        let (gateway, store, session) = setup(client.clone()).await;

        let reservation = gateway.reserve(session.id, StepCode::from("6")).unwrap();
        let handle = gateway.dispatch(reservation, session.results[0].id);

        assert_eq!(wait_ready(&gateway, handle.task_id).await.status, TaskStatus::Failure);
        assert_eq!(client.calls(), 1);
        let stored = store.get(session.id).await.unwrap();
        assert!(stored.results[0]
            .validation_notes
            .starts_with("Model call failed: "));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slot_held_while_executing() {
        let client = ScriptedClient::new(vec![Err(overloaded())]);
        let (gateway, _store, session) = setup(client).await;

        let reservation = gateway.reserve(session.id, StepCode::from("6")).unwrap();
        let handle = gateway.dispatch(reservation, session.results[0].id);
        assert!(matches!(
            gateway.reserve(session.id, StepCode::from("6")),
            Err(GatewayError::AlreadyInFlight { .. })
        ));

        wait_ready(&gateway, handle.task_id).await;
        assert!(gateway.reserve(session.id, StepCode::from("6")).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_observed_handles_expire() {
        let client = ScriptedClient::new(vec![Ok("Answer".into())]);
        let (gateway, _store, session) = setup(client).await;

        let reservation = gateway.reserve(session.id, StepCode::from("6")).unwrap();
        let handle = gateway.dispatch(reservation, session.results[0].id);
        wait_ready(&gateway, handle.task_id).await;

        // still pollable within the retention window
        assert!(gateway.poll(handle.task_id).unwrap().ready);

        tokio::time::advance(Duration::from_secs(601)).await;
        assert_eq!(
            gateway.poll(handle.task_id).unwrap_err(),
            GatewayError::UnknownHandle(handle.task_id)
        );
    }

    #[tokio::test]
    async fn test_unknown_handle() {
        let (gateway, _store, _session) = setup(ScriptedClient::new(Vec::new())).await;
        let id = Uuid::new_v4();
        assert_eq!(gateway.poll(id).unwrap_err(), GatewayError::UnknownHandle(id));
    }
}
