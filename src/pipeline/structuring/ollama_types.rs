//! Ollama HTTP API contract, error taxonomy, and validators.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::types::GenerationParams;
use super::LlmError;

// ──────────────────────────────────────────────
// Wire types (`/api/chat`, `/api/tags`)
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest<'a> {
    pub model: &'a str,
    pub messages: Vec<ChatMessage<'a>>,
    pub stream: bool,
    pub options: ChatOptions,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage<'a> {
    pub role: &'static str,
    pub content: &'a str,
    /// Base64-encoded images (user messages only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub images: Option<&'a [String]>,
}

impl<'a> ChatMessage<'a> {
    pub fn system(content: &'a str) -> Self {
        Self {
            role: "system",
            content,
            images: None,
        }
    }

    pub fn user(content: &'a str) -> Self {
        Self {
            role: "user",
            content,
            images: None,
        }
    }

    pub fn with_images(mut self, images: &'a [String]) -> Self {
        self.images = Some(images);
        self
    }
}

/// Build the message list: optional system message, then one user message.
pub fn conversation<'a>(prompt: &'a str, system: Option<&'a str>) -> Vec<ChatMessage<'a>> {
    let mut messages = Vec::with_capacity(2);
    if let Some(system) = system.filter(|s| !s.is_empty()) {
        messages.push(ChatMessage::system(system));
    }
    messages.push(ChatMessage::user(prompt));
    messages
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatOptions {
    pub temperature: f32,
    pub num_predict: u32,
    pub top_p: f32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub stop: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_ctx: Option<u32>,
}

impl ChatOptions {
    pub fn from_params(params: &GenerationParams, num_ctx: Option<u32>) -> Self {
        Self {
            temperature: params.temperature,
            num_predict: params.max_tokens,
            top_p: params.top_p,
            stop: params.stop.clone(),
            num_ctx,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse {
    pub message: ChatResponseMessage,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponseMessage {
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TagsResponse {
    #[serde(default)]
    pub models: Vec<TagEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TagEntry {
    pub name: String,
}

// ──────────────────────────────────────────────
// Errors
// ──────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum OllamaError {
    #[error("Ollama is not running at {0}")]
    NotReachable(String),

    #[error("Ollama returned an error (HTTP {status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("Model '{0}' is not installed")]
    ModelNotFound(String),

    #[error("Invalid model name: '{0}'")]
    InvalidModelName(String),

    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Malformed Ollama response: {0}")]
    MalformedResponse(String),
}

impl From<OllamaError> for LlmError {
    fn from(err: OllamaError) -> Self {
        match err {
            OllamaError::NotReachable(_)
            | OllamaError::ModelNotFound(_)
            | OllamaError::InvalidModelName(_) => LlmError::ModelUnavailable(err.to_string()),
            OllamaError::MalformedResponse(msg) => LlmError::InvalidModelResponse(msg),
            other => LlmError::GenerationFailure(other.to_string()),
        }
    }
}

// ──────────────────────────────────────────────
// Validators
// ──────────────────────────────────────────────

static MODEL_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9._-]*(/[a-zA-Z0-9][a-zA-Z0-9._-]*)?(:[a-zA-Z0-9._-]+)?$")
        .expect("static regex")
});

/// Accept `[namespace/]model[:tag]` with at most one `/`.
pub fn validate_model_name(name: &str) -> Result<(), OllamaError> {
    if MODEL_NAME.is_match(name) {
        Ok(())
    } else {
        Err(OllamaError::InvalidModelName(name.to_string()))
    }
}
