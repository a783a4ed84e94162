//! Billing suggestion extraction from chat-completion output.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// LLM errors.
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Invalid response format: {0}")]
    InvalidFormat(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Request timed out after {0} seconds")]
    Timeout(u64),
}

pub type LlmResult<T> = Result<T, LlmError>;

/// Raw completion returned by a chat backend.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    /// Assistant message content
    pub text: String,
    /// Prompt plus completion tokens, as reported by the API
    pub total_tokens: u32,
    /// Model that served the request
    pub model: String,
}

/// A chat-completion backend.
pub trait ChatCompleter: Send + Sync {
    /// Model tag used for pricing and cache provenance.
    fn model(&self) -> &str;

    /// Run one system + user exchange.
    fn complete(&self, system: &str, user: &str) -> LlmResult<Completion>;
}

/// Billing codes suggested by the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RemoteSuggestion {
    pub primary_code: String,
    #[serde(default)]
    pub procedure_codes: Vec<String>,
    #[serde(default)]
    pub reasoning: String,
}

/// Parse model output JSON into a suggestion.
pub fn parse_suggestion_output(text: &str) -> LlmResult<RemoteSuggestion> {
    // Models occasionally wrap the object in prose or code fences
    let json_start = text.find('{').ok_or_else(|| {
        LlmError::InvalidFormat("No JSON object found in response".into())
    })?;
    let json_end = text.rfind('}').ok_or_else(|| {
        LlmError::InvalidFormat("No closing brace found in response".into())
    })?;
    if json_end < json_start {
        return Err(LlmError::InvalidFormat(
            "Closing brace precedes opening brace".into(),
        ));
    }

    let suggestion: RemoteSuggestion = serde_json::from_str(&text[json_start..=json_end])?;

    let primary_code = suggestion.primary_code.trim().to_string();
    if primary_code.is_empty() {
        return Err(LlmError::InvalidFormat("Empty primary_code".into()));
    }

    Ok(RemoteSuggestion {
        primary_code,
        procedure_codes: suggestion
            .procedure_codes
            .into_iter()
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect(),
        reasoning: suggestion.reasoning,
    })
}
