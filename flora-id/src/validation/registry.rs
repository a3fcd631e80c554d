//! In-memory name registry
//!
//! Loaded once from a JSON array of records (e.g. a USDA PLANTS export).
//! Keys are canonicalized on load so lookups use the same normalization as
//! the merge engine.

use crate::ensemble::canonicalize_name;
use crate::types::{NameRegistry, RegistryEntry};
use flora_common::{Error, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

/// One record of the registry file
#[derive(Debug, Clone, Deserialize)]
pub struct RegistryRecord {
    pub scientific_name: String,
    #[serde(default)]
    pub common_name: Option<String>,
    #[serde(default)]
    pub family: Option<String>,
    #[serde(default)]
    pub symbol: Option<String>,
}

/// Registry held entirely in memory
#[derive(Debug, Default)]
pub struct InMemoryRegistry {
    entries: HashMap<String, RegistryEntry>,
}

impl InMemoryRegistry {
    /// Build from records; the first record wins for duplicate names
    pub fn from_records(records: Vec<RegistryRecord>) -> Self {
        let mut entries = HashMap::with_capacity(records.len());

        for record in records {
            let Some(key) = canonicalize_name(&record.scientific_name) else {
                continue;
            };
            entries.entry(key).or_insert_with(|| RegistryEntry {
                family: flora_common::text::non_blank(record.family.as_deref()),
                common_name: flora_common::text::non_blank(record.common_name.as_deref()),
                symbol: flora_common::text::non_blank(record.symbol.as_deref()),
            });
        }

        Self { entries }
    }

    /// Load from a JSON file
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read registry {} failed: {}", path.display(), e)))?;
        let records: Vec<RegistryRecord> = serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("Parse registry {} failed: {}", path.display(), e)))?;

        let registry = Self::from_records(records);
        info!(
            path = %path.display(),
            names = registry.entries.len(),
            "Name registry loaded"
        );
        Ok(registry)
    }

    /// Load from `path` when configured, otherwise start empty
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_json_file(path),
            None => {
                warn!("No registry path configured, candidates will not be validated");
                Ok(Self::default())
            }
        }
    }
}

impl NameRegistry for InMemoryRegistry {
    fn lookup(&self, canonical_name: &str) -> Option<RegistryEntry> {
        self.entries.get(canonical_name).cloned()
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}
