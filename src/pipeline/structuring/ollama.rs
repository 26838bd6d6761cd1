use std::collections::VecDeque;
use std::sync::Mutex;

use serde_json::{json, Map, Value};

use super::ollama_types::{
    conversation, validate_model_name, ChatMessage, ChatOptions, ChatRequest, ChatResponse,
    OllamaError, TagsResponse,
};
use super::types::{GenerationParams, LanguageModel, VisionClient};
use super::LlmError;
use crate::config::AppConfig;

/// Ollama HTTP client for local inference.
pub struct OllamaClient {
    base_url: String,
    client: reqwest::blocking::Client,
    timeout_secs: u64,
}

impl OllamaClient {
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self, OllamaError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| OllamaError::Network(format!("cannot build HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            timeout_secs,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn send_error(&self, e: reqwest::Error) -> OllamaError {
        if e.is_connect() {
            OllamaError::NotReachable(self.base_url.clone())
        } else if e.is_timeout() {
            OllamaError::Timeout(self.timeout_secs)
        } else {
            OllamaError::Network(e.to_string())
        }
    }

    fn check_status(
        response: reqwest::blocking::Response,
    ) -> Result<reqwest::blocking::Response, OllamaError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().unwrap_or_default();
        Err(OllamaError::ApiError {
            status: status.as_u16(),
            message,
        })
    }

    /// Installed model names from `/api/tags`.
    pub fn list_models(&self) -> Result<Vec<String>, OllamaError> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self.client.get(&url).send().map_err(|e| self.send_error(e))?;
        let parsed: TagsResponse = Self::check_status(response)?
            .json()
            .map_err(|e| OllamaError::MalformedResponse(e.to_string()))?;
        Ok(parsed.models.into_iter().map(|m| m.name).collect())
    }

    /// `model` is installed under exactly that name, or untagged as `model:latest`.
    pub fn is_model_available(&self, model: &str) -> Result<bool, OllamaError> {
        let models = self.list_models()?;
        let latest = format!("{model}:latest");
        Ok(models.iter().any(|m| *m == model || *m == latest))
    }

    /// One non-streaming `/api/chat` round trip; returns the assistant content.
    pub fn chat(&self, request: &ChatRequest<'_>) -> Result<String, OllamaError> {
        let url = format!("{}/api/chat", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .map_err(|e| self.send_error(e))?;
        let parsed: ChatResponse = Self::check_status(response)?
            .json()
            .map_err(|e| OllamaError::MalformedResponse(e.to_string()))?;
        Ok(parsed.message.content)
    }
}

impl VisionClient for OllamaClient {
    fn chat_with_images(
        &self,
        model: &str,
        prompt: &str,
        images: &[String],
        system: Option<&str>,
    ) -> Result<String, OllamaError> {
        validate_model_name(model)?;

        let mut messages = Vec::with_capacity(2);
        if let Some(system) = system {
            messages.push(ChatMessage::system(system));
        }
        messages.push(ChatMessage::user(prompt).with_images(images));

        let request = ChatRequest {
            model,
            messages,
            stream: false,
            options: ChatOptions {
                temperature: 0.0,
                num_predict: 2048,
                top_p: 0.9,
                stop: Vec::new(),
                num_ctx: None,
            },
        };
        self.chat(&request)
    }
}

// ──────────────────────────────────────────────
// Ollama-backed language model
// ──────────────────────────────────────────────

/// `LanguageModel` over a local Ollama server. Construction probes the
/// server and fails fast when the model is not installed.
pub struct OllamaBackend {
    client: OllamaClient,
    model: String,
    context_size: u32,
}

impl OllamaBackend {
    /// Every failure while probing the server is `ModelUnavailable`.
    pub fn connect(config: &AppConfig) -> Result<Self, LlmError> {
        let unavailable = |e: OllamaError| LlmError::ModelUnavailable(e.to_string());

        validate_model_name(&config.model).map_err(unavailable)?;
        let client = OllamaClient::new(&config.ollama_url, config.timeout_secs).map_err(unavailable)?;

        let installed = client.is_model_available(&config.model).map_err(unavailable)?;
        if !installed {
            return Err(unavailable(OllamaError::ModelNotFound(config.model.clone())));
        }

        tracing::info!(
            model = %config.model,
            url = %client.base_url(),
            context_size = config.context_size,
            "Language model ready"
        );
        Ok(Self {
            client,
            model: config.model.clone(),
            context_size: config.context_size,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

impl LanguageModel for OllamaBackend {
    fn generate(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
        params: &GenerationParams,
    ) -> Result<String, LlmError> {
        let _span = tracing::debug_span!(
            "ollama_generate",
            model = %self.model,
            prompt_chars = prompt.chars().count(),
            max_tokens = params.max_tokens,
        )
        .entered();

        let request = ChatRequest {
            model: &self.model,
            messages: conversation(prompt, system_prompt),
            stream: false,
            options: ChatOptions::from_params(params, Some(self.context_size)),
        };
        let start = std::time::Instant::now();
        let content = self.client.chat(&request)?;
        tracing::debug!(
            elapsed_ms = %start.elapsed().as_millis(),
            response_chars = content.chars().count(),
            "Generation complete"
        );
        Ok(content)
    }

    fn get_model_info(&self) -> Map<String, Value> {
        let info = json!({
            "backend": "ollama",
            "model": self.model,
            "base_url": self.client.base_url(),
            "context_size": self.context_size,
            "status": "loaded",
        });
        match info {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }
}

// ──────────────────────────────────────────────
// Mock
// ──────────────────────────────────────────────

/// One recorded `generate` call.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub prompt: String,
    pub system: Option<String>,
    pub params: GenerationParams,
}

/// Scripted language model: replies are served in order, the last one
/// repeating once the script runs out.
pub struct MockLanguageModel {
    replies: Mutex<VecDeque<String>>,
    last: Mutex<Option<String>>,
    available: bool,
    failure: Option<String>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl MockLanguageModel {
    pub fn new(replies: Vec<String>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            last: Mutex::new(None),
            available: true,
            failure: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Always answers with `reply`.
    pub fn replying(reply: &str) -> Self {
        Self::new(vec![reply.to_string()])
    }

    /// Backend that was never loaded.
    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::new(Vec::new())
        }
    }

    /// Loaded backend whose every call fails.
    pub fn failing(message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            ..Self::new(Vec::new())
        }
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

impl LanguageModel for MockLanguageModel {
    fn generate(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
        params: &GenerationParams,
    ) -> Result<String, LlmError> {
        if !self.available {
            return Err(LlmError::ModelUnavailable("mock model not loaded".into()));
        }
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(RecordedCall {
                prompt: prompt.to_string(),
                system: system_prompt.map(str::to_string),
                params: params.clone(),
            });
        }
        if let Some(message) = &self.failure {
            return Err(LlmError::GenerationFailure(message.clone()));
        }

        let mut replies = self
            .replies
            .lock()
            .map_err(|_| LlmError::GenerationFailure("mock lock poisoned".into()))?;
        let mut last = self
            .last
            .lock()
            .map_err(|_| LlmError::GenerationFailure("mock lock poisoned".into()))?;

        if let Some(reply) = replies.pop_front() {
            *last = Some(reply);
        }
        last.clone()
            .ok_or_else(|| LlmError::GenerationFailure("mock has no scripted reply".into()))
    }

    fn is_available(&self) -> bool {
        self.available
    }

    fn get_model_info(&self) -> Map<String, Value> {
        let mut info = Map::new();
        info.insert("backend".into(), "mock".into());
        info.insert(
            "status".into(),
            if self.available { "loaded" } else { "not_loaded" }.into(),
        );
        info
    }
}
