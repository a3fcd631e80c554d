//! OpenAI-compatible chat completions provider
//!
//! Covers every endpoint speaking `POST {base_url}/chat/completions`
//! (OpenAI, GitHub Models, OpenRouter, Gemini's compatibility layer).

use crate::config::ProviderDescriptor;
use crate::types::{GenerationError, GenerationProvider, GenerationRequest};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub struct OpenAiCompatibleProvider {
    descriptor: ProviderDescriptor,
    client: reqwest::Client,
}

impl OpenAiCompatibleProvider {
    pub fn new(descriptor: ProviderDescriptor) -> Result<Self, GenerationError> {
        let client = reqwest::Client::builder()
            .timeout(descriptor.timeout)
            .build()
            .map_err(|e| GenerationError::Unavailable(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { descriptor, client })
    }

    fn request_body(&self, request: &GenerationRequest) -> ChatRequest {
        ChatRequest {
            model: self.descriptor.model.clone(),
            messages: vec![
                ChatMessage::new("system", &request.system_prompt),
                ChatMessage::new("user", &request.user_prompt),
            ],
            max_tokens: self.descriptor.max_tokens,
            temperature: self.descriptor.temperature,
        }
    }
}

#[async_trait]
impl GenerationProvider for OpenAiCompatibleProvider {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        let url = format!("{}/chat/completions", self.descriptor.base_url);
        debug!(provider = %self.descriptor.name, url = %url, "Sending chat completion request");

        let mut builder = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&self.request_body(request));

        // Local OpenAI-compatible servers accept anonymous requests
        if let Some(api_key) = &self.descriptor.api_key {
            builder = builder.bearer_auth(api_key);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                GenerationError::Timeout(self.descriptor.timeout.as_millis() as u64)
            } else {
                GenerationError::Network(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(GenerationError::Api(format!("HTTP {}: {}", status, error_text)));
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::Malformed(format!("Failed to parse response: {}", e)))?;

        extract_completion(body)
    }
}

fn extract_completion(body: ChatResponse) -> Result<String, GenerationError> {
    body.choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| GenerationError::Malformed("response carried no choices".to_string()))
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
}

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

impl ChatMessage {
    fn new(role: &str, content: &str) -> Self {
        Self {
            role: role.to_string(),
            content: content.to_string(),
        }
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}
