//! Validation Stage
//!
//! Cross-checks candidates against the local name registry. A match marks
//! the candidate validated, records the registry symbol and backfills empty
//! family/common name fields. Source-provided values are never overridden.
//! No network, no side effects beyond the candidates passed in.

mod registry;

pub use registry::{InMemoryRegistry, RegistryRecord};

use crate::types::{Candidate, NameRegistry};
use tracing::{debug, info};

/// Annotate candidates in place; returns the number validated
pub fn validate_candidates(candidates: &mut [Candidate], registry: &dyn NameRegistry) -> usize {
    let mut validated = 0;

    for candidate in candidates.iter_mut() {
        let Some(entry) = registry.lookup(&candidate.canonical_name) else {
            debug!(name = %candidate.canonical_name, "Not found in registry");
            continue;
        };

        candidate.validated = true;
        candidate.registry_symbol = entry.symbol.clone();
        candidate.fill_family(entry.family.as_deref());
        candidate.fill_common_name(entry.common_name.as_deref());
        validated += 1;

        debug!(name = %candidate.canonical_name, "Registry verified");
    }

    info!(
        validated = validated,
        total = candidates.len(),
        "Registry validation complete"
    );
    validated
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RegistryEntry;

    fn registry() -> InMemoryRegistry {
        InMemoryRegistry::from_records(vec![RegistryRecord {
            scientific_name: "Rosa canina".to_string(),
            common_name: Some("Dog rose".to_string()),
            family: Some("Rosaceae".to_string()),
            symbol: Some("ROCA3".to_string()),
        }])
    }

    #[test]
    fn test_match_marks_validated_and_backfills() {
        let mut candidates = vec![Candidate::new("Rosa canina")];
        let count = validate_candidates(&mut candidates, &registry());

        assert_eq!(count, 1);
        assert!(candidates[0].validated);
        assert_eq!(candidates[0].registry_symbol.as_deref(), Some("ROCA3"));
        assert_eq!(candidates[0].family.as_deref(), Some("Rosaceae"));
        assert_eq!(candidates[0].common_name.as_deref(), Some("Dog rose"));
    }

    #[test]
    fn test_registry_never_overrides_source_values() {
        let mut candidate = Candidate::new("Rosa canina");
        candidate.common_name = Some("Brier".to_string());
        candidate.family = Some("Rosaceae (source)".to_string());
        let mut candidates = vec![candidate];

        validate_candidates(&mut candidates, &registry());
        assert!(candidates[0].validated);
        assert_eq!(candidates[0].common_name.as_deref(), Some("Brier"));
        assert_eq!(candidates[0].family.as_deref(), Some("Rosaceae (source)"));
    }

    #[test]
    fn test_unknown_name_left_unvalidated() {
        let mut candidates = vec![Candidate::new("Rosa gallica")];
        let count = validate_candidates(&mut candidates, &registry());

        assert_eq!(count, 0);
        assert!(!candidates[0].validated);
        assert!(candidates[0].family.is_none());
    }

    #[test]
    fn test_empty_registry_validates_nothing() {
        let registry = InMemoryRegistry::default();
        let mut candidates = vec![Candidate::new("Rosa canina")];
        assert_eq!(validate_candidates(&mut candidates, &registry), 0);
        assert_eq!(registry.lookup("Rosa canina"), None::<RegistryEntry>);
    }
}
