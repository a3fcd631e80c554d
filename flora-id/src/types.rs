//! Core Types and Trait Definitions for flora-id
//!
//! Defines the data contracts between pipeline stages and the collaborator
//! traits the stages consume:
//! - **SourceClient:** remote identification oracles (PlantNet, PlantCLEF classifier)
//! - **NameRegistry:** local authoritative name list (validation)
//! - **DetailClient:** reference detail lookup (enrichment)
//! - **GenerationProvider:** text generation endpoints (fallback chain)
//!
//! Every trait is object-safe so implementations are injected as
//! `Arc<dyn Trait>` and replaced by test doubles.

use crate::config::EnsembleConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Candidate
// ============================================================================

/// Reconciled identification result for one plant
///
/// Identity is the canonical name. Per-source scores only change through
/// [`Candidate::record_score`], which recomputes the weighted score from
/// scratch so the derived value can never drift from its inputs.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    /// Normalized scientific name (identity key)
    pub canonical_name: String,
    /// Common name (first non-empty wins)
    pub common_name: Option<String>,
    /// Botanical family (first non-empty wins)
    pub family: Option<String>,
    /// Set when the canonical name matched the local registry
    pub validated: bool,
    /// Registry symbol recorded on validation (e.g. USDA symbol)
    pub registry_symbol: Option<String>,
    /// Reference detail, present only on enriched candidates
    pub detail: Option<PlantDetail>,
    /// Per-source scores in first-report order
    source_scores: Vec<(String, f64)>,
    weighted_score: f64,
}

impl Candidate {
    /// Create an unscored candidate
    pub fn new(canonical_name: impl Into<String>) -> Self {
        Self {
            canonical_name: canonical_name.into(),
            common_name: None,
            family: None,
            validated: false,
            registry_symbol: None,
            detail: None,
            source_scores: Vec::new(),
            weighted_score: 0.0,
        }
    }

    /// Record a score from `source`, keeping the maximum per source
    ///
    /// Repeated detections from the same source never add up.
    pub fn record_score(&mut self, source: &str, score: f64, config: &EnsembleConfig) {
        let score = sanitize_score(score);
        match self.source_scores.iter_mut().find(|(s, _)| s == source) {
            Some((_, existing)) => *existing = existing.max(score),
            None => self.source_scores.push((source.to_string(), score)),
        }
        self.recompute_weighted_score(config);
    }

    fn recompute_weighted_score(&mut self, config: &EnsembleConfig) {
        self.weighted_score = self
            .source_scores
            .iter()
            .map(|(source, score)| score * config.weight_for(source))
            .sum();
    }

    /// Score reported by `source` (0 when the source never reported this plant)
    pub fn score_for(&self, source: &str) -> f64 {
        self.source_scores
            .iter()
            .find(|(s, _)| s == source)
            .map(|(_, score)| *score)
            .unwrap_or(0.0)
    }

    /// Per-source scores in first-report order
    pub fn source_scores(&self) -> impl Iterator<Item = (&str, f64)> {
        self.source_scores.iter().map(|(s, score)| (s.as_str(), *score))
    }

    /// Weighted ensemble score (not bounded to 1.0)
    pub fn weighted_score(&self) -> f64 {
        self.weighted_score
    }

    /// Display confidence: weighted score clamped to [0, 1]
    pub fn confidence(&self) -> f64 {
        self.weighted_score.clamp(0.0, 1.0)
    }

    /// Sources that reported this plant, in first-report order
    pub fn origin_sources(&self) -> impl Iterator<Item = &str> {
        self.source_scores.iter().map(|(s, _)| s.as_str())
    }

    /// Provenance string, e.g. `kaggle-plantclef+plantnet`
    pub fn provenance(&self) -> String {
        self.origin_sources().collect::<Vec<_>>().join("+")
    }

    /// Set the common name unless one is already present
    pub fn fill_common_name(&mut self, value: Option<&str>) {
        if self.common_name.is_none() {
            self.common_name = flora_common::text::non_blank(value);
        }
    }

    /// Set the family unless one is already present
    pub fn fill_family(&mut self, value: Option<&str>) {
        if self.family.is_none() {
            self.family = flora_common::text::non_blank(value);
        }
    }
}

/// Absent, negative and non-finite scores all read as zero
fn sanitize_score(score: f64) -> f64 {
    if score.is_finite() {
        score.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

// ============================================================================
// Source Client
// ============================================================================

/// One entry of a source's ranked result list
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceMatch {
    /// Raw scientific name as reported by the source
    pub name: String,
    pub common_name: Option<String>,
    pub family: Option<String>,
    /// Score or certainty in [0, 1]; `None` when the source omitted it
    pub score: Option<f64>,
}

impl SourceMatch {
    pub fn new(name: impl Into<String>, score: f64) -> Self {
        Self {
            name: name.into(),
            score: Some(score),
            ..Default::default()
        }
    }

    pub fn with_common_name(mut self, common_name: impl Into<String>) -> Self {
        self.common_name = Some(common_name.into());
        self
    }

    pub fn with_family(mut self, family: impl Into<String>) -> Self {
        self.family = Some(family.into());
        self
    }
}

/// Result list of a single source
#[derive(Debug, Clone, PartialEq)]
pub struct SourceResults {
    /// Source identifier (e.g. "plantnet")
    pub source: String,
    pub matches: Vec<SourceMatch>,
}

impl SourceResults {
    pub fn new(source: impl Into<String>, matches: Vec<SourceMatch>) -> Self {
        Self {
            source: source.into(),
            matches,
        }
    }

    /// A source that produced nothing (no match, timeout or failure)
    pub fn empty(source: impl Into<String>) -> Self {
        Self::new(source, Vec::new())
    }
}

/// Remote identification oracle
///
/// "No match" is `Ok(vec![])`. Errors are reserved for transport, auth and
/// protocol failures; the pipeline treats them as an empty result.
#[async_trait::async_trait]
pub trait SourceClient: Send + Sync {
    /// Source identifier used for weighting and provenance
    fn source_id(&self) -> &str;

    /// Identify the plant in `image`, returning at most `top_k` matches
    async fn identify(&self, image: &[u8], top_k: usize) -> Result<Vec<SourceMatch>, SourceError>;
}

/// Source client error
#[derive(Debug, Error)]
pub enum SourceError {
    /// Network communication error
    #[error("Network error: {0}")]
    Network(String),

    /// Upstream returned an error status or an in-band error
    #[error("API error: {0}")]
    Api(String),

    /// Failed to parse the response
    #[error("Parse error: {0}")]
    Parse(String),

    /// Call exceeded its time budget
    #[error("Timed out after {0} ms")]
    Timeout(u64),
}

// ============================================================================
// Validation Registry
// ============================================================================

/// Registry record for a known scientific name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub family: Option<String>,
    pub common_name: Option<String>,
    pub symbol: Option<String>,
}

/// Local authoritative name registry (synchronous, no network)
pub trait NameRegistry: Send + Sync {
    /// Exact-match lookup on a canonical name
    fn lookup(&self, canonical_name: &str) -> Option<RegistryEntry>;

    /// Number of known names
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ============================================================================
// Detail Enrichment
// ============================================================================

/// Reference detail for an enriched candidate
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlantDetail {
    pub description: Option<String>,
    #[serde(default)]
    pub common_names: Vec<String>,
    pub url: Option<String>,
    pub image_url: Option<String>,
}

/// Detail lookup collaborator
#[async_trait::async_trait]
pub trait DetailClient: Send + Sync {
    /// Fetch reference detail for a canonical name
    async fn fetch_detail(&self, canonical_name: &str) -> Result<PlantDetail, EnrichmentError>;
}

/// Enrichment error
#[derive(Debug, Error)]
pub enum EnrichmentError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("Parse error: {0}")]
    Parse(String),

    /// No detail known for this name
    #[error("No detail found for {0}")]
    NotFound(String),

    #[error("Timed out after {0} ms")]
    Timeout(u64),
}

// ============================================================================
// Generation
// ============================================================================

/// Input handed to every provider in the chain
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    /// Assistant framing
    pub system_prompt: String,
    /// User turn (question plus rendered plant context)
    pub user_prompt: String,
    /// Context Builder output; the only input of the template fallback
    pub context: String,
}

/// Text generation endpoint
///
/// The chain applies the per-call timeout; providers only report failure.
#[async_trait::async_trait]
pub trait GenerationProvider: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError>;
}

/// Generation provider error
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error: {0}")]
    Api(String),

    /// Response did not carry usable text
    #[error("Malformed response: {0}")]
    Malformed(String),

    #[error("Timed out after {0} ms")]
    Timeout(u64),

    /// Provider cannot be used (e.g. missing credentials)
    #[error("Provider unavailable: {0}")]
    Unavailable(String),
}

// ============================================================================
// Tests
// ============================================================================
