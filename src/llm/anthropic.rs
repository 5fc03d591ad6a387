//! Anthropic Messages API client

use std::env;
use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{ChatMessage, ModelClient, ModelError, ModelReply, ModelRequest, TokenUsage};
use crate::config::LlmConfig;

const ANTHROPIC_API_BASE: &str = "https://api.anthropic.com";
const ANTHROPIC_API_VERSION: &str = "2023-06-01";
const PROVIDER_NAME: &str = "anthropic";

/// USD per million tokens (input, output), matched by model-name prefix.
const PRICING: &[(&str, f64, f64)] = &[
    ("claude-opus", 15.00, 75.00),
    ("claude-sonnet", 3.00, 15.00),
    ("claude-3-5-haiku", 0.80, 4.00),
    ("claude-haiku", 1.00, 5.00),
];

pub struct AnthropicClient {
    api_key: String,
    model: String,
    client: reqwest::Client,
    base_url: String,
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: &'a [ChatMessage],
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    model: String,
    stop_reason: Option<String>,
    usage: Usage,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct Usage {
    input_tokens: u32,
    output_tokens: u32,
}

impl AnthropicClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self, ModelError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("ariz/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| network(e.to_string()))?;

        Ok(Self {
            api_key: api_key.into(),
            model: model.into(),
            client,
            base_url: ANTHROPIC_API_BASE.to_string(),
        })
    }

    /// Build from config, reading the key from the configured environment
    /// variable. A missing key yields a client whose calls fail with
    /// [`ModelError::NotConfigured`].
    pub fn from_config(config: &LlmConfig) -> Result<Self, ModelError> {
        let api_key = env::var(&config.api_key_env).unwrap_or_default();
        let mut client = Self::new(api_key, &config.model)?;
        if let Some(base_url) = &config.base_url {
            client.base_url = base_url.trim_end_matches('/').to_string();
        }
        Ok(client)
    }

    pub fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }

    /// Cost in USD for the given usage, zero for unpriced models.
    pub fn estimate_cost(model: &str, input_tokens: u32, output_tokens: u32) -> f64 {
        PRICING
            .iter()
            .find(|(prefix, _, _)| model.starts_with(prefix))
            .map(|(_, input, output)| {
                (f64::from(input_tokens) * input + f64::from(output_tokens) * output) / 1_000_000.0
            })
            .unwrap_or(0.0)
    }

    fn map_status(status: u16, headers: &reqwest::header::HeaderMap, body: String) -> ModelError {
        match status {
            401 | 403 => ModelError::Unauthorized {
                provider: PROVIDER_NAME.to_string(),
            },
            429 => ModelError::RateLimited {
                provider: PROVIDER_NAME.to_string(),
                retry_after_secs: headers
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.parse().ok()),
            },
            status => ModelError::Http {
                provider: PROVIDER_NAME.to_string(),
                status,
                message: body,
            },
        }
    }
}

fn network(message: String) -> ModelError {
    ModelError::Network {
        provider: PROVIDER_NAME.to_string(),
        message,
    }
}

#[async_trait]
impl ModelClient for AnthropicClient {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn complete(&self, request: ModelRequest) -> Result<ModelReply, ModelError> {
        if !self.is_configured() {
            return Err(ModelError::NotConfigured {
                provider: PROVIDER_NAME.to_string(),
            });
        }

        let url = format!("{}/v1/messages", self.base_url);
        let body = MessagesRequest {
            model: &self.model,
            max_tokens: request.max_output_tokens,
            system: Some(request.system.as_str()).filter(|s| !s.is_empty()),
            messages: &request.history,
        };

        let started = Instant::now();
        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_API_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ModelError::Timeout(started.elapsed())
                } else {
                    network(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let headers = response.headers().clone();
            let body = response.text().await.unwrap_or_default();
            return Err(Self::map_status(status.as_u16(), &headers, body));
        }

        let parsed: MessagesResponse = response.json().await.map_err(|e| ModelError::Decode {
            provider: PROVIDER_NAME.to_string(),
            message: e.to_string(),
        })?;
        let latency = started.elapsed();

        let text: String = parsed
            .content
            .iter()
            .filter(|block| block.kind == "text")
            .map(|block| block.text.as_str())
            .collect::<Vec<_>>()
            .join("");
        if text.trim().is_empty() {
            return Err(ModelError::EmptyResponse {
                provider: PROVIDER_NAME.to_string(),
            });
        }

        let cost = Self::estimate_cost(
            &parsed.model,
            parsed.usage.input_tokens,
            parsed.usage.output_tokens,
        );

        Ok(ModelReply {
            text,
            model: parsed.model,
            usage: TokenUsage::new(parsed.usage.input_tokens, parsed.usage.output_tokens, cost),
            finish_reason: parsed.stop_reason,
            latency_ms: u64::try_from(latency.as_millis()).unwrap_or(u64::MAX),
        })
    }
}
