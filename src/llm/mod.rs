//! Model-call collaborator.
//!
//! The gateway only needs one operation: text in, text plus token cost out, or
//! a typed failure. [`ModelClient`] is that seam; [`AnthropicClient`] is the
//! HTTP implementation used by the binary.

mod anthropic;
#[cfg(test)]
pub(crate) mod scripted;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use anthropic::AnthropicClient;

/// Speaker of a history message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Input to a single model call.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelRequest {
    /// System prompt
    pub system: String,
    /// Conversation so far, ending with the message to answer
    pub history: Vec<ChatMessage>,
    pub max_output_tokens: u32,
}

/// Token accounting for one call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub total_tokens: u32,
    /// Estimated cost in USD; zero when the model is not priced
    pub cost_usd: f64,
}

impl TokenUsage {
    pub fn new(input_tokens: u32, output_tokens: u32, cost_usd: f64) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens: input_tokens.saturating_add(output_tokens),
            cost_usd,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelReply {
    pub text: String,
    pub model: String,
    pub usage: TokenUsage,
    pub finish_reason: Option<String>,
    pub latency_ms: u64,
}

/// Failures of a model call.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ModelError {
    #[error("model call timed out after {0:?}")]
    Timeout(Duration),

    #[error("rate limited by {provider}")]
    RateLimited {
        provider: String,
        retry_after_secs: Option<u64>,
    },

    #[error("network error talking to {provider}: {message}")]
    Network { provider: String, message: String },

    #[error("{provider} returned HTTP {status}: {message}")]
    Http {
        provider: String,
        status: u16,
        message: String,
    },

    #[error("{provider} rejected the credentials")]
    Unauthorized { provider: String },

    #[error("{provider} is not configured (missing API key)")]
    NotConfigured { provider: String },

    #[error("{provider} returned an empty response")]
    EmptyResponse { provider: String },

    #[error("failed to decode {provider} response: {message}")]
    Decode { provider: String, message: String },
}

impl ModelError {
    /// Timeouts, rate limits, connection failures and server-side errors.
    pub fn is_transient(&self) -> bool {
        match self {
            ModelError::Timeout(_) | ModelError::RateLimited { .. } | ModelError::Network { .. } => {
                true
            }
            // 529 is Anthropic's "overloaded"
            ModelError::Http { status, .. } => matches!(status, 500 | 502 | 503 | 504 | 529),
            ModelError::Unauthorized { .. }
            | ModelError::NotConfigured { .. }
            | ModelError::EmptyResponse { .. }
            | ModelError::Decode { .. } => false,
        }
    }
}

/// The model-call collaborator.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Provider name for logs, e.g. "anthropic"
    fn name(&self) -> &str;

    async fn complete(&self, request: ModelRequest) -> Result<ModelReply, ModelError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(ModelError::Timeout(Duration::from_secs(1)).is_transient());
        assert!(ModelError::RateLimited {
            provider: "x".into(),
            retry_after_secs: Some(3)
        }
        .is_transient());
        assert!(ModelError::Http {
            provider: "x".into(),
            status: 529,
            message: String::new()
        }
        .is_transient());
        assert!(!ModelError::Http {
            provider: "x".into(),
            status: 400,
            message: String::new()
        }
        .is_transient());
        assert!(!ModelError::NotConfigured {
            provider: "x".into()
        }
        .is_transient());
    }

    #[test]
    fn test_token_usage_total() {
        let usage = TokenUsage::new(1200, 300, 0.01);
        assert_eq!(usage.total_tokens, 1500);
    }
}
