//! Configuration for flora-id
//!
//! The TOML file (see `flora_common::config::resolve_config_path`) is read
//! once at startup and turned into the read-only runtime values shared by
//! every request: [`EnsembleConfig`] and the ordered [`ProviderDescriptor`]
//! list. Validation runs before the server binds; any violation is fatal.
//!
//! Secrets resolve ENV → TOML.

use flora_common::config::{resolve_secret, LoggingConfig};
use flora_common::{Error, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable naming the config file
pub const CONFIG_ENV_VAR: &str = "FLORA_CONFIG";
/// Config file name looked up in the user/system config directories
pub const CONFIG_FILE_NAME: &str = "flora-id.toml";
/// PlantNet API key environment variable
pub const PLANTNET_KEY_ENV: &str = "FLORA_PLANTNET_API_KEY";
/// Plant.id API key environment variable
pub const PLANT_ID_KEY_ENV: &str = "FLORA_PLANT_ID_API_KEY";

/// Source identifier of the PlantCLEF classifier
pub const PLANTCLEF_SOURCE: &str = "kaggle-plantclef";
/// Source identifier of PlantNet
pub const PLANTNET_SOURCE: &str = "plantnet";

/// Source ids the service can register
pub const KNOWN_SOURCES: &[&str] = &[PLANTCLEF_SOURCE, PLANTNET_SOURCE];

// ============================================================================
// Runtime configuration
// ============================================================================

/// Weight applied to one source
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SourceWeight {
    pub name: String,
    pub weight: f64,
}

impl SourceWeight {
    pub fn new(name: impl Into<String>, weight: f64) -> Self {
        Self {
            name: name.into(),
            weight,
        }
    }
}

/// Ensemble parameters, loaded once and shared read-only
#[derive(Debug, Clone, PartialEq)]
pub struct EnsembleConfig {
    /// Ordered source weights; order drives context rendering
    pub sources: Vec<SourceWeight>,
    /// Results considered per source (caps oversized upstream lists)
    pub per_source_limit: usize,
    /// Candidates sent to the detail lookup
    pub enrichment_top_k: usize,
    /// Candidates exposed in the context and response
    pub exposure_top_k: usize,
    /// Budget for one source call
    pub source_timeout: Duration,
    /// Budget for one detail lookup
    pub enrichment_timeout: Duration,
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            sources: default_source_weights(),
            per_source_limit: 5,
            enrichment_top_k: 3,
            exposure_top_k: 3,
            source_timeout: Duration::from_secs(30),
            enrichment_timeout: Duration::from_secs(10),
        }
    }
}

impl EnsembleConfig {
    /// Weight configured for `source` (0 when not configured)
    pub fn weight_for(&self, source: &str) -> f64 {
        self.sources
            .iter()
            .find(|s| s.name == source)
            .map(|s| s.weight)
            .unwrap_or(0.0)
    }

    /// Reject configurations the pipeline cannot honor
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for source in &self.sources {
            if source.name.trim().is_empty() {
                return Err(Error::Config("Ensemble source name must not be empty".to_string()));
            }
            if !seen.insert(source.name.as_str()) {
                return Err(Error::Config(format!(
                    "Ensemble source '{}' configured more than once",
                    source.name
                )));
            }
            if !source.weight.is_finite() || source.weight < 0.0 {
                return Err(Error::Config(format!(
                    "Ensemble weight for '{}' must be a finite number >= 0 (got {})",
                    source.name, source.weight
                )));
            }
        }
        if self.per_source_limit == 0 {
            return Err(Error::Config("per_source_limit must be at least 1".to_string()));
        }
        if self.enrichment_top_k == 0 || self.exposure_top_k == 0 {
            return Err(Error::Config(
                "enrichment_top_k and exposure_top_k must be at least 1".to_string(),
            ));
        }
        if self.source_timeout.is_zero() || self.enrichment_timeout.is_zero() {
            return Err(Error::Config("Ensemble timeouts must be non-zero".to_string()));
        }
        Ok(())
    }

    /// Every registered source must carry a configured weight
    pub fn check_registered(&self, registered: &[String]) -> Result<()> {
        let unweighted: Vec<&str> = registered
            .iter()
            .map(String::as_str)
            .filter(|id| !self.sources.iter().any(|s| s.name == *id))
            .collect();
        if !unweighted.is_empty() {
            return Err(Error::Config(format!(
                "No ensemble weight configured for registered source(s): {}",
                unweighted.join(", ")
            )));
        }
        Ok(())
    }
}

fn default_source_weights() -> Vec<SourceWeight> {
    vec![
        SourceWeight::new(PLANTCLEF_SOURCE, 0.6),
        SourceWeight::new(PLANTNET_SOURCE, 0.4),
    ]
}

/// Wire protocol spoken by a generation provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// `POST {base_url}/chat/completions` (OpenAI, GitHub Models, OpenRouter, Gemini)
    OpenaiCompatible,
    /// `POST {base_url}/api/chat` (local Ollama)
    Ollama,
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderKind::OpenaiCompatible => write!(f, "openai_compatible"),
            ProviderKind::Ollama => write!(f, "ollama"),
        }
    }
}

/// One entry of the generation chain; array position is priority
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderDescriptor {
    pub name: String,
    pub kind: ProviderKind,
    pub base_url: String,
    pub model: String,
    pub timeout: Duration,
    pub api_key: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f64>,
}

impl ProviderDescriptor {
    pub fn new(
        name: impl Into<String>,
        kind: ProviderKind,
        base_url: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            base_url: base_url.into(),
            model: model.into(),
            timeout: Duration::from_secs(30),
            api_key: None,
            max_tokens: None,
            temperature: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

// ============================================================================
// TOML schema
// ============================================================================

/// Full TOML configuration of the service
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub logging: LoggingConfig,
    pub server: ServerConfig,
    pub ensemble: EnsembleSection,
    pub plantnet: PlantNetSection,
    pub plantclef: PlantClefSection,
    pub plant_id: PlantIdSection,
    pub registry: RegistrySection,
    pub generation: GenerationSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address
    pub bind: String,
    /// Upload cap in megabytes
    pub max_image_size_mb: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:5780".to_string(),
            max_image_size_mb: 10,
        }
    }
}

impl ServerConfig {
    pub fn max_image_bytes(&self) -> usize {
        self.max_image_size_mb.saturating_mul(1024 * 1024)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EnsembleSection {
    pub sources: Vec<SourceWeight>,
    pub per_source_limit: usize,
    pub enrichment_top_k: usize,
    pub exposure_top_k: usize,
    pub source_timeout_ms: u64,
    pub enrichment_timeout_ms: u64,
}

impl Default for EnsembleSection {
    fn default() -> Self {
        let defaults = EnsembleConfig::default();
        Self {
            sources: defaults.sources,
            per_source_limit: defaults.per_source_limit,
            enrichment_top_k: defaults.enrichment_top_k,
            exposure_top_k: defaults.exposure_top_k,
            source_timeout_ms: defaults.source_timeout.as_millis() as u64,
            enrichment_timeout_ms: defaults.enrichment_timeout.as_millis() as u64,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlantNetSection {
    pub api_url: String,
    pub api_key: Option<String>,
    /// Organ hint: leaf, flower, fruit, bark or auto
    pub organ: String,
}

impl Default for PlantNetSection {
    fn default() -> Self {
        Self {
            api_url: "https://my-api.plantnet.org/v2/identify/all".to_string(),
            api_key: None,
            organ: "auto".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PlantClefSection {
    /// Base URL of the hosted classifier (e.g. a Gradio share link)
    pub endpoint: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlantIdSection {
    pub api_url: String,
    pub api_key: Option<String>,
    /// Outbound pacing for detail lookups
    pub requests_per_second: u32,
}

impl Default for PlantIdSection {
    fn default() -> Self {
        Self {
            api_url: "https://plant.id/api/v3".to_string(),
            api_key: None,
            requests_per_second: 5,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RegistrySection {
    /// JSON file of registry records
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GenerationSection {
    pub providers: Vec<ProviderSection>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderSection {
    pub name: String,
    pub kind: ProviderKind,
    pub base_url: String,
    pub model: String,
    #[serde(default = "default_provider_timeout_ms")]
    pub timeout_ms: u64,
    /// Environment variable holding the API key
    #[serde(default)]
    pub api_key_env: Option<String>,
    /// Inline API key (environment wins when both are set)
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub temperature: Option<f64>,
}

fn default_provider_timeout_ms() -> u64 {
    30_000
}

impl ServiceConfig {
    /// Build and validate the ensemble configuration
    pub fn ensemble_config(&self) -> Result<EnsembleConfig> {
        let section = &self.ensemble;
        let config = EnsembleConfig {
            sources: section.sources.clone(),
            per_source_limit: section.per_source_limit,
            enrichment_top_k: section.enrichment_top_k,
            exposure_top_k: section.exposure_top_k,
            source_timeout: Duration::from_millis(section.source_timeout_ms),
            enrichment_timeout: Duration::from_millis(section.enrichment_timeout_ms),
        };
        config.validate()?;
        Ok(config)
    }

    /// Build and validate the ordered provider list
    pub fn provider_descriptors(&self) -> Result<Vec<ProviderDescriptor>> {
        let mut seen = HashSet::new();
        let mut descriptors = Vec::with_capacity(self.generation.providers.len());

        for provider in &self.generation.providers {
            if provider.name.trim().is_empty() {
                return Err(Error::Config("Provider name must not be empty".to_string()));
            }
            if !seen.insert(provider.name.as_str()) {
                return Err(Error::Config(format!(
                    "Provider '{}' configured more than once",
                    provider.name
                )));
            }
            if provider.base_url.trim().is_empty() || provider.model.trim().is_empty() {
                return Err(Error::Config(format!(
                    "Provider '{}' needs both base_url and model",
                    provider.name
                )));
            }
            if provider.timeout_ms == 0 {
                return Err(Error::Config(format!(
                    "Provider '{}' timeout must be non-zero",
                    provider.name
                )));
            }
            if let Some(temperature) = provider.temperature {
                if !temperature.is_finite() || temperature < 0.0 {
                    return Err(Error::Config(format!(
                        "Provider '{}' temperature must be a finite number >= 0",
                        provider.name
                    )));
                }
            }

            let label = format!("API key for provider '{}'", provider.name);
            let api_key = match &provider.api_key_env {
                Some(env_var) => resolve_secret(env_var, provider.api_key.as_deref(), &label),
                None => provider.api_key.clone().filter(|k| !k.trim().is_empty()),
            };

            descriptors.push(ProviderDescriptor {
                name: provider.name.clone(),
                kind: provider.kind,
                base_url: provider.base_url.trim_end_matches('/').to_string(),
                model: provider.model.clone(),
                timeout: Duration::from_millis(provider.timeout_ms),
                api_key,
                max_tokens: provider.max_tokens,
                temperature: provider.temperature,
            });
        }

        Ok(descriptors)
    }

    /// PlantNet API key (ENV → TOML)
    pub fn plantnet_api_key(&self) -> Option<String> {
        resolve_secret(PLANTNET_KEY_ENV, self.plantnet.api_key.as_deref(), "PlantNet API key")
    }

    /// Plant.id API key (ENV → TOML)
    pub fn plant_id_api_key(&self) -> Option<String> {
        resolve_secret(PLANT_ID_KEY_ENV, self.plant_id.api_key.as_deref(), "Plant.id API key")
    }

    /// Validate everything that must hold before serving
    pub fn validate(&self) -> Result<()> {
        let ensemble = self.ensemble_config()?;
        if let Some(unknown) = ensemble
            .sources
            .iter()
            .find(|s| !KNOWN_SOURCES.contains(&s.name.as_str()))
        {
            return Err(Error::Config(format!(
                "Unknown ensemble source '{}' (expected one of: {})",
                unknown.name,
                KNOWN_SOURCES.join(", ")
            )));
        }
        self.provider_descriptors()?;
        if self.server.max_image_size_mb == 0 {
            return Err(Error::Config("max_image_size_mb must be at least 1".to_string()));
        }
        if self.plant_id.requests_per_second == 0 {
            return Err(Error::Config("plant_id.requests_per_second must be at least 1".to_string()));
        }
        Ok(())
    }
}
