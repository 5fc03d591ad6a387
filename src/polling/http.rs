//! Task source backed by a running ariz HTTP server.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use uuid::Uuid;

use super::{PollError, TaskSource};
use crate::gateway::TaskPoll;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub struct HttpTaskSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTaskSource {
    /// `base_url` is the server root, e.g. `http://localhost:7010`.
    pub fn new(base_url: &str) -> Result<Self, PollError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| PollError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn task_url(&self, task_id: Uuid) -> String {
        format!("{}/api/v1/tasks/{}", self.base_url, task_id)
    }
}

#[async_trait]
impl TaskSource for HttpTaskSource {
    async fn poll(&self, task_id: Uuid) -> Result<TaskPoll, PollError> {
        let response = self
            .client
            .get(self.task_url(task_id))
            .send()
            .await
            .map_err(|e| PollError::Transport(e.to_string()))?;

        match response.status() {
            StatusCode::OK => response
                .json::<TaskPoll>()
                .await
                .map_err(|e| PollError::Decode(e.to_string())),
            StatusCode::NOT_FOUND => Err(PollError::UnknownHandle(task_id)),
            status => Err(PollError::Transport(format!("HTTP {status}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_url() {
        let source = HttpTaskSource::new("http://localhost:7010/").unwrap();
        let id = Uuid::nil();
        assert_eq!(
            source.task_url(id),
            "http://localhost:7010/api/v1/tasks/00000000-0000-0000-0000-000000000000"
        );
    }

    #[tokio::test]
    async fn test_unreachable_server_is_transport_error() {
        // port 9 (discard) is not served
        let source = HttpTaskSource::new("http://127.0.0.1:9").unwrap();
        let err = source.poll(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, PollError::Transport(_)));
    }
}
