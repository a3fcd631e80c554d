//! Generation Fallback Chain
//!
//! Walks an ordered provider list one provider at a time:
//!
//! ```text
//! Trying(0) ─fail→ Trying(1) ─fail→ … ─past end→ ExhaustedFallback
//!     └─ok→ Succeeded         └─ok→ Succeeded
//! ```
//!
//! A provider that fails is not retried within the same request, and
//! nothing is remembered between requests. `ExhaustedFallback` renders a
//! local template from the context block, so the chain always returns
//! non-empty text and never an error.
//!
//! Providers run strictly sequentially: a later provider is only called
//! once the earlier one has definitely failed.

pub mod ollama;
pub mod openai;
pub mod prompt;

pub use ollama::OllamaProvider;
pub use openai::OpenAiCompatibleProvider;

use crate::config::{ProviderDescriptor, ProviderKind};
use crate::types::{GenerationError, GenerationProvider, GenerationRequest};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Response when no candidate matched
pub const NO_MATCH_MESSAGE: &str = "Image analysis finished but no matching plant was found. \
Please try again with a sharper photo or a different angle.";

/// Name reported for text produced by the local template
pub const TEMPLATE_PROVIDER: &str = "template";

/// Position of a request in the chain walk
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainState {
    /// Attempting the provider at this index
    Trying(usize),
    /// A provider produced text
    Succeeded { provider: String },
    /// Every provider failed (or none configured); template used
    ExhaustedFallback,
}

/// One provider invocation
#[derive(Debug, Clone)]
pub struct AttemptRecord {
    pub provider: String,
    /// Failure description; `None` for the successful attempt
    pub error: Option<String>,
    pub elapsed: Duration,
}

/// Result of a chain walk
#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    /// Non-empty generated or templated text
    pub text: String,
    /// Terminal state: `Succeeded` or `ExhaustedFallback`
    pub state: ChainState,
    pub attempts: Vec<AttemptRecord>,
}

impl GenerationOutcome {
    /// Provider name that produced the text, or "template"
    pub fn generated_by(&self) -> &str {
        match &self.state {
            ChainState::Succeeded { provider } => provider,
            _ => TEMPLATE_PROVIDER,
        }
    }
}

struct ChainEntry {
    descriptor: ProviderDescriptor,
    provider: Arc<dyn GenerationProvider>,
}

/// Ordered provider chain, built once at startup
#[derive(Default)]
pub struct GenerationChain {
    entries: Vec<ChainEntry>,
}

impl GenerationChain {
    /// Chain with no providers (template only)
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a provider; call order is priority order
    pub fn with_provider(
        mut self,
        descriptor: ProviderDescriptor,
        provider: Arc<dyn GenerationProvider>,
    ) -> Self {
        self.entries.push(ChainEntry { descriptor, provider });
        self
    }

    /// Build HTTP-backed providers for each descriptor, preserving order
    pub fn from_descriptors(descriptors: &[ProviderDescriptor]) -> Result<Self, GenerationError> {
        let mut chain = Self::new();
        for descriptor in descriptors {
            let provider: Arc<dyn GenerationProvider> = match descriptor.kind {
                ProviderKind::OpenaiCompatible => {
                    Arc::new(OpenAiCompatibleProvider::new(descriptor.clone())?)
                }
                ProviderKind::Ollama => Arc::new(OllamaProvider::new(descriptor.clone())?),
            };
            info!(
                provider = %descriptor.name,
                kind = %descriptor.kind,
                model = %descriptor.model,
                "Generation provider registered"
            );
            chain = chain.with_provider(descriptor.clone(), provider);
        }
        Ok(chain)
    }

    /// Provider names in priority order
    pub fn provider_names(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.descriptor.name.clone()).collect()
    }

    /// Walk the chain for one request
    pub async fn generate(&self, request: &GenerationRequest) -> GenerationOutcome {
        let mut attempts = Vec::new();
        let mut generated = None;
        let mut state = ChainState::Trying(0);

        while let ChainState::Trying(index) = state {
            let Some(entry) = self.entries.get(index) else {
                state = ChainState::ExhaustedFallback;
                break;
            };

            let name = entry.descriptor.name.clone();
            let started = Instant::now();
            let result = Self::attempt(entry, request).await;
            let elapsed = started.elapsed();

            state = match result {
                Ok(text) => {
                    info!(provider = %name, elapsed_ms = elapsed.as_millis() as u64, "Generation succeeded");
                    attempts.push(AttemptRecord { provider: name.clone(), error: None, elapsed });
                    generated = Some(text);
                    ChainState::Succeeded { provider: name }
                }
                Err(e) => {
                    warn!(provider = %name, error = %e, "Generation provider failed, trying next");
                    attempts.push(AttemptRecord {
                        provider: name,
                        error: Some(e.to_string()),
                        elapsed,
                    });
                    ChainState::Trying(index + 1)
                }
            };
        }

        let text = match generated {
            Some(text) => text,
            None => {
                info!(attempted = attempts.len(), "All generation providers exhausted, using template");
                template_response(&request.context)
            }
        };

        GenerationOutcome { text, state, attempts }
    }

    async fn attempt(entry: &ChainEntry, request: &GenerationRequest) -> Result<String, GenerationError> {
        let timeout = entry.descriptor.timeout;
        let text = tokio::time::timeout(timeout, entry.provider.generate(request))
            .await
            .map_err(|_| GenerationError::Timeout(timeout.as_millis() as u64))??;

        if text.trim().is_empty() {
            return Err(GenerationError::Malformed("empty completion".to_string()));
        }
        Ok(text)
    }
}

/// Deterministic local response built only from the context block
pub fn template_response(context: &str) -> String {
    if context.trim().is_empty() {
        return NO_MATCH_MESSAGE.to_string();
    }

    [
        "Image analysis complete.",
        "",
        "Plants found:",
        context,
        "",
        "Note:",
        "- Scores combine several independent identification sources.",
        "- Consult an expert before relying on this identification.",
    ]
    .join("\n")
}
