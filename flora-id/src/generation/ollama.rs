//! Ollama chat provider (`POST {base_url}/api/chat`, non-streaming)

use crate::config::ProviderDescriptor;
use crate::types::{GenerationError, GenerationProvider, GenerationRequest};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub struct OllamaProvider {
    descriptor: ProviderDescriptor,
    client: reqwest::Client,
}

impl OllamaProvider {
    pub fn new(descriptor: ProviderDescriptor) -> Result<Self, GenerationError> {
        let client = reqwest::Client::builder()
            .timeout(descriptor.timeout)
            .build()
            .map_err(|e| GenerationError::Unavailable(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { descriptor, client })
    }

    fn request_body(&self, request: &GenerationRequest) -> OllamaRequest {
        OllamaRequest {
            model: self.descriptor.model.clone(),
            messages: vec![
                OllamaMessage {
                    role: "system".to_string(),
                    content: request.system_prompt.clone(),
                },
                OllamaMessage {
                    role: "user".to_string(),
                    content: request.user_prompt.clone(),
                },
            ],
            stream: false,
            options: OllamaOptions {
                temperature: self.descriptor.temperature,
                num_predict: self.descriptor.max_tokens,
            },
        }
    }
}

#[async_trait]
impl GenerationProvider for OllamaProvider {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        let url = format!("{}/api/chat", self.descriptor.base_url);
        debug!(provider = %self.descriptor.name, url = %url, "Sending Ollama chat request");

        let response = self
            .client
            .post(&url)
            .json(&self.request_body(request))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GenerationError::Timeout(self.descriptor.timeout.as_millis() as u64)
                } else if e.is_connect() {
                    GenerationError::Unavailable(format!("Ollama not reachable: {}", e))
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

        let body: OllamaResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::Malformed(format!("Failed to parse response: {}", e)))?;

        Ok(body.message.content)
    }
}

#[derive(Serialize)]
struct OllamaRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Serialize, Deserialize)]
struct OllamaMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

#[derive(Deserialize)]
struct OllamaResponse {
    message: OllamaMessage,
}
