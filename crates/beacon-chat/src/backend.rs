//! Dialogue backend: the remote service that produces assistant replies.
//!
//! The HTTP implementation speaks the OpenAI-compatible chat completions
//! protocol, which Ollama, llama.cpp, vLLM and most hosted providers accept.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use beacon_core::config::BackendConfig;
use beacon_core::types::WireMessage;

use crate::error::BackendError;
use crate::request::DialogueRequest;

/// Produces one reply for one request. Implementations hold no conversation
/// state; the full history travels with every request.
#[async_trait]
pub trait DialogueBackend: Send + Sync {
    async fn complete(&self, request: &DialogueRequest) -> Result<String, BackendError>;
}

// =============================================================================
// Wire format
// =============================================================================

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [WireMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

// =============================================================================
// HTTP backend
// =============================================================================

/// Non-streaming client for an OpenAI-compatible `/chat/completions` endpoint.
#[derive(Debug, Clone)]
pub struct HttpDialogueBackend {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    temperature: Option<f32>,
}

impl HttpDialogueBackend {
    pub fn new(
        base_url: &str,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, BackendError> {
        let base_url = base_url.trim().trim_end_matches('/');
        if base_url.is_empty() {
            return Err(BackendError::Config("base_url is empty".to_string()));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BackendError::Config(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", base_url),
            model: model.into(),
            api_key: None,
            temperature: None,
        })
    }

    /// Build from the `[backend]` section. The API key is read from the
    /// environment variable it names, if set.
    pub fn from_config(config: &BackendConfig) -> Result<Self, BackendError> {
        let mut backend = Self::new(
            &config.base_url,
            config.model.clone(),
            Duration::from_secs(config.timeout_secs.max(1)),
        )?;
        backend.temperature = config.temperature;
        if !config.api_key_env.is_empty() {
            backend.api_key = std::env::var(&config.api_key_env)
                .ok()
                .filter(|k| !k.trim().is_empty());
        }
        Ok(backend)
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl DialogueBackend for HttpDialogueBackend {
    async fn complete(&self, request: &DialogueRequest) -> Result<String, BackendError> {
        let body = ChatCompletionRequest {
            model: &self.model,
            messages: &request.messages,
            temperature: self.temperature,
            stream: false,
        };

        let mut http = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            http = http.bearer_auth(key);
        }

        tracing::debug!(
            endpoint = %self.endpoint,
            model = %self.model,
            messages = request.messages.len(),
            "Sending dialogue request"
        );
        let response = http.send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Status {
                status: status.as_u16(),
                body: body.chars().take(512).collect(),
            });
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| BackendError::InvalidResponse(e.to_string()))?;

        let reply = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| BackendError::InvalidResponse("no choices in response".to_string()))?
            .message
            .content
            .unwrap_or_default();

        // Leading whitespace can be meaningful (indented code, lists).
        if reply.trim().is_empty() {
            return Err(BackendError::EmptyReply);
        }
        Ok(reply)
    }
}
