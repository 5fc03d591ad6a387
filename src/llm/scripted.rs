//! Scripted model client for unit tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::{ModelClient, ModelError, ModelReply, ModelRequest, TokenUsage};

/// Replays queued replies in order, then answers with a fixed text.
/// Every request is recorded.
pub struct ScriptedClient {
    replies: Mutex<VecDeque<Result<String, ModelError>>>,
    pub requests: Mutex<Vec<ModelRequest>>,
}

impl ScriptedClient {
    pub fn new(replies: Vec<Result<String, ModelError>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

pub fn overloaded() -> ModelError {
    ModelError::Http {
        provider: "scripted".into(),
        status: 529,
        message: "overloaded".into(),
    }
}

#[async_trait]
impl ModelClient for ScriptedClient {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ModelRequest) -> Result<ModelReply, ModelError> {
        self.requests.lock().unwrap().push(request);
        let next = self.replies.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok("Scripted answer for the current step.".into()))
            .map(|text| ModelReply {
                text,
                model: "scripted-1".into(),
                usage: TokenUsage::new(10, 20, 0.001),
                finish_reason: Some("end_turn".into()),
                latency_ms: 5,
            })
    }
}
