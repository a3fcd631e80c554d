//! Identification pipeline
//!
//! Per request:
//! 1. Query every source concurrently (bounded by the source timeout)
//! 2. Merge the result lists into ranked candidates
//! 3. Validate against the local registry
//! 4. Enrich the top candidates with reference detail
//! 5. Render the context block and walk the generation chain
//!
//! All collaborators are injected once at startup and shared read-only;
//! the request path takes no locks. Dropping the returned future cancels
//! every in-flight call.

use crate::config::EnsembleConfig;
use crate::context::build_context;
use crate::enrichment::enrich_top_k;
use crate::ensemble::{merge_results, SourceFanout};
use crate::generation::prompt::{chat_request, identification_request};
use crate::generation::{template_response, ChainState, GenerationChain, TEMPLATE_PROVIDER};
use crate::types::{Candidate, DetailClient, NameRegistry, SourceResults};
use crate::validation::validate_candidates;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Reply when no provider could answer a plain chat message
pub const CHAT_UNAVAILABLE_MESSAGE: &str =
    "The assistant is unavailable right now. Please try again in a moment.";

/// Pipeline error
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Caller cancelled the request; partial work was discarded
    #[error("Identification cancelled")]
    Cancelled,
}

/// Outcome of one identification request
#[derive(Debug, Clone)]
pub struct IdentificationReport {
    /// Top candidates (at most exposure K), best first
    pub ranked_candidates: Vec<Candidate>,
    /// Provider text or template output; never empty
    pub generated_text: String,
    /// Candidate count before the exposure cut
    pub total_matches: usize,
    /// Provider name that produced the text, or "template"
    pub generated_by: String,
    /// Counts over the full merged list
    pub sources: SourceSummary,
}

/// Candidate counts per source over the full merged list
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceSummary {
    /// (source id, candidates it reported) in registration order
    pub per_source: Vec<(String, usize)>,
    /// Candidates confirmed by the name registry
    pub validated: usize,
}

impl SourceSummary {
    fn from_merge(results: &[SourceResults], candidates: &[Candidate], validated: usize) -> Self {
        let per_source = results
            .iter()
            .map(|r| {
                let count = candidates
                    .iter()
                    .filter(|c| c.origin_sources().any(|s| s == r.source))
                    .count();
                (r.source.clone(), count)
            })
            .collect();

        Self { per_source, validated }
    }

    /// Candidates reported by `source` (0 when unknown)
    pub fn count_for(&self, source: &str) -> usize {
        self.per_source
            .iter()
            .find(|(s, _)| s == source)
            .map(|(_, n)| *n)
            .unwrap_or(0)
    }
}

impl IdentificationReport {
    /// Confidence of the best exposed candidate (0 when none)
    pub fn highest_confidence(&self) -> f64 {
        self.ranked_candidates
            .first()
            .map(Candidate::confidence)
            .unwrap_or(0.0)
    }
}

/// Outcome of a text-only chat request
#[derive(Debug, Clone)]
pub struct ChatReply {
    pub text: String,
    pub generated_by: String,
}

/// Multi-source identification pipeline
pub struct IdentificationPipeline {
    config: Arc<EnsembleConfig>,
    fanout: SourceFanout,
    registry: Arc<dyn NameRegistry>,
    detail: Option<Arc<dyn DetailClient>>,
    chain: GenerationChain,
}

impl IdentificationPipeline {
    pub fn new(
        config: Arc<EnsembleConfig>,
        fanout: SourceFanout,
        registry: Arc<dyn NameRegistry>,
        chain: GenerationChain,
    ) -> Self {
        Self {
            config,
            fanout,
            registry,
            detail: None,
            chain,
        }
    }

    /// Enable enrichment through `client`
    pub fn with_detail_client(mut self, client: Arc<dyn DetailClient>) -> Self {
        self.detail = Some(client);
        self
    }

    pub fn config(&self) -> &EnsembleConfig {
        &self.config
    }

    /// Registered source identifiers
    pub fn source_ids(&self) -> Vec<String> {
        self.fanout.source_ids()
    }

    /// Generation providers in priority order
    pub fn provider_names(&self) -> Vec<String> {
        self.chain.provider_names()
    }

    /// Identify the plant in `image` and answer `message` about it
    pub async fn identify(&self, image: &[u8], message: &str) -> IdentificationReport {
        let started = Instant::now();
        let config = self.config.as_ref();

        let results = self.fanout.query_all(image, config).await;
        let mut candidates = merge_results(&results, config);
        let total_matches = candidates.len();

        if candidates.is_empty() {
            info!(
                elapsed_ms = started.elapsed().as_millis() as u64,
                "No source produced a candidate"
            );
            return IdentificationReport {
                ranked_candidates: Vec::new(),
                generated_text: template_response(""),
                total_matches: 0,
                generated_by: TEMPLATE_PROVIDER.to_string(),
                sources: SourceSummary::from_merge(&results, &candidates, 0),
            };
        }

        let validated = validate_candidates(&mut candidates, self.registry.as_ref());
        let sources = SourceSummary::from_merge(&results, &candidates, validated);

        if let Some(detail) = &self.detail {
            enrich_top_k(&mut candidates, detail.as_ref(), config).await;
        }

        candidates.truncate(config.exposure_top_k);
        let context = build_context(&candidates, config);
        debug!(context_len = context.len(), "Context block rendered");

        let outcome = self.chain.generate(&identification_request(message, &context)).await;
        let generated_by = outcome.generated_by().to_string();

        info!(
            total_matches,
            top = candidates.first().map(|c| c.canonical_name.as_str()).unwrap_or_default(),
            generated_by = %generated_by,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Identification complete"
        );

        IdentificationReport {
            ranked_candidates: candidates,
            generated_text: outcome.text,
            total_matches,
            generated_by,
            sources,
        }
    }

    /// [`identify`](Self::identify), abandoned as soon as `cancel` fires
    pub async fn identify_with_cancel(
        &self,
        image: &[u8],
        message: &str,
        cancel: CancellationToken,
    ) -> Result<IdentificationReport, PipelineError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!("Identification cancelled by caller");
                Err(PipelineError::Cancelled)
            }
            report = self.identify(image, message) => Ok(report),
        }
    }

    /// Answer a plain text message through the generation chain
    pub async fn chat(&self, message: &str) -> ChatReply {
        let outcome = self.chain.generate(&chat_request(message)).await;

        match outcome.state {
            ChainState::ExhaustedFallback => ChatReply {
                text: CHAT_UNAVAILABLE_MESSAGE.to_string(),
                generated_by: TEMPLATE_PROVIDER.to_string(),
            },
            _ => ChatReply {
                generated_by: outcome.generated_by().to_string(),
                text: outcome.text,
            },
        }
    }
}
