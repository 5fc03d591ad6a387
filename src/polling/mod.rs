//! Client side of the execution protocol: poll a handle with capped
//! exponential backoff until it resolves or the attempt budget runs out.
//!
//! Dropping the future returned by [`Poller::wait`] only stops polling; the
//! execution itself keeps running and a later poll still sees its result.

mod http;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub use http::HttpTaskSource;

use crate::config::PollingConfig;
use crate::gateway::{ExecutionGateway, GatewayError, TaskPoll, TaskStatus};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PollError {
    #[error("task {0} is unknown or expired")]
    UnknownHandle(Uuid),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("unexpected response: {0}")]
    Decode(String),
}

/// Anything that can answer "is this execution done yet".
#[async_trait]
pub trait TaskSource: Send + Sync {
    async fn poll(&self, task_id: Uuid) -> Result<TaskPoll, PollError>;
}

#[async_trait]
impl TaskSource for ExecutionGateway {
    async fn poll(&self, task_id: Uuid) -> Result<TaskPoll, PollError> {
        ExecutionGateway::poll(self, task_id).map_err(|e| match e {
            GatewayError::UnknownHandle(id) => PollError::UnknownHandle(id),
            other => PollError::Transport(other.to_string()),
        })
    }
}

/// Delays before each poll: `initial`, then multiplied by `factor` after
/// every unsuccessful poll and capped at `max`, for at most `max_retries` polls.
#[derive(Debug, Clone)]
pub struct PollSchedule {
    next: Duration,
    max: Duration,
    factor: f64,
    remaining: u32,
}

impl PollSchedule {
    pub fn new(initial: Duration, max: Duration, factor: f64, max_retries: u32) -> Self {
        Self {
            next: initial.min(max),
            max,
            // NaN and shrinking factors would break monotonicity
            factor: factor.max(1.0),
            remaining: max_retries,
        }
    }

    pub fn from_config(config: &PollingConfig) -> Self {
        Self::new(
            Duration::from_millis(config.initial_interval_ms),
            Duration::from_millis(config.max_interval_ms),
            config.backoff_factor,
            config.max_retries,
        )
    }
}

impl Iterator for PollSchedule {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let current = self.next;
        self.next = Duration::try_from_secs_f64(current.as_secs_f64() * self.factor)
            .unwrap_or(self.max)
            .min(self.max);
        Some(current)
    }
}

/// The single terminal signal of one [`Poller::wait`].
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Completed(TaskPoll),
    Failed(TaskPoll),
    /// Attempt budget exhausted; the execution may still finish later
    TimedOut { polls: u32, elapsed_ms: u64 },
}

impl PollOutcome {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::TimedOut { .. })
    }
}

#[derive(Debug, Clone)]
pub struct Poller {
    config: PollingConfig,
}

impl Poller {
    pub fn new(config: PollingConfig) -> Self {
        Self { config }
    }

    pub async fn wait(&self, source: &dyn TaskSource, task_id: Uuid) -> Result<PollOutcome, PollError> {
        let started = Instant::now();
        let mut polls = 0u32;

        for delay in PollSchedule::from_config(&self.config) {
            tokio::time::sleep(delay).await;
            polls += 1;

            match source.poll(task_id).await {
                Ok(poll) if poll.ready => {
                    let elapsed_ms = elapsed_ms(started);
                    info!(%task_id, polls, elapsed_ms, status = ?poll.status, "Task resolved");
                    return Ok(if poll.status == TaskStatus::Success {
                        PollOutcome::Completed(poll)
                    } else {
                        PollOutcome::Failed(poll)
                    });
                }
                Ok(poll) => debug!(%task_id, polls, status = ?poll.status, "Task not ready"),
                Err(PollError::UnknownHandle(id)) => return Err(PollError::UnknownHandle(id)),
                Err(e) => warn!(%task_id, polls, error = %e, "Poll failed"),
            }
        }

        let elapsed_ms = elapsed_ms(started);
        info!(%task_id, polls, elapsed_ms, "Polling timed out");
        Ok(PollOutcome::TimedOut { polls, elapsed_ms })
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
