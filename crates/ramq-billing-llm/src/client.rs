//! Blocking chat-completion client (OpenAI-compatible API).

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::extraction::{ChatCompleter, Completion, LlmError, LlmResult};
use crate::prompts::MAX_RESPONSE_TOKENS;

/// Default API endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";

/// Default model.
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";

/// Chat-completion client with a hard request timeout.
pub struct OpenAiClient {
    http: reqwest::blocking::Client,
    endpoint: String,
    api_key: String,
    model: String,
    timeout: Duration,
}

impl OpenAiClient {
    /// Create a client for `model`, failing fast if the HTTP stack can't be built.
    pub fn new(api_key: String, model: String, timeout: Duration) -> LlmResult<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LlmError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_key,
            model,
            timeout,
        })
    }

    /// Point the client at a different OpenAI-compatible endpoint.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
    model: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    total_tokens: u32,
}

impl ChatCompleter for OpenAiClient {
    fn model(&self) -> &str {
        &self.model
    }

    fn complete(&self, system: &str, user: &str) -> LlmResult<Completion> {
        let body = json!({
            "model": self.model,
            "messages": [
                ChatMessage { role: "system", content: system },
                ChatMessage { role: "user", content: user },
            ],
            "temperature": 0,
            "max_tokens": MAX_RESPONSE_TOKENS,
            "response_format": { "type": "json_object" },
        });

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .map_err(|e| self.map_transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(LlmError::Transport(format!("HTTP {}", status)));
        }

        let parsed: ChatResponse = response.json().map_err(|e| self.map_transport_error(e))?;
        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| LlmError::InvalidFormat("Response has no message content".into()))?;

        tracing::debug!(model = %self.model, "Chat completion received");

        Ok(Completion {
            text,
            total_tokens: parsed.usage.map(|u| u.total_tokens).unwrap_or(0),
            model: parsed.model.unwrap_or_else(|| self.model.clone()),
        })
    }
}

impl OpenAiClient {
    fn map_transport_error(&self, e: reqwest::Error) -> LlmError {
        if e.is_timeout() {
            LlmError::Timeout(self.timeout.as_secs())
        } else {
            LlmError::Transport(e.to_string())
        }
    }
}
