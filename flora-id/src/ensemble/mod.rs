//! Ensemble Merge Engine
//!
//! Reconciles the ranked lists of several identification sources into one
//! list of [`Candidate`], unique by canonical name and ranked by weighted
//! score.
//!
//! # Algorithm
//! 1. For each source, take its first `per_source_limit` entries and
//!    canonicalize the name; entries with empty names are skipped.
//! 2. First sighting of a name creates a candidate; later sightings keep the
//!    maximum score per source (never the sum).
//! 3. Weighted scores are recomputed on every score change.
//! 4. Stable sort by weighted score, descending; ties keep first-seen order.
//!
//! Sources that returned nothing simply contribute nothing. All sources empty
//! yields an empty list, which callers report as "no match".

mod fanout;

pub use fanout::SourceFanout;

use crate::config::EnsembleConfig;
use crate::types::{Candidate, SourceResults};
use std::cmp::Ordering;
use std::collections::HashMap;
use tracing::debug;

/// Canonical form of a scientific name
///
/// Whitespace is trimmed and collapsed; the genus is capitalized and every
/// other letter lowercased, so "ROSA  canina" and "Rosa canina" collide.
/// Returns `None` for names with no visible characters.
pub fn canonicalize_name(raw: &str) -> Option<String> {
    let collapsed = flora_common::text::collapse_whitespace(raw);
    if collapsed.is_empty() {
        return None;
    }

    let lower = collapsed.to_lowercase();
    let mut chars = lower.chars();
    let first = chars.next()?;
    Some(first.to_uppercase().chain(chars).collect())
}

/// Merge per-source result lists into a ranked candidate list
pub fn merge_results(results: &[SourceResults], config: &EnsembleConfig) -> Vec<Candidate> {
    let mut candidates: Vec<Candidate> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for source_results in results {
        let source = source_results.source.as_str();

        for entry in source_results.matches.iter().take(config.per_source_limit) {
            let Some(name) = canonicalize_name(&entry.name) else {
                debug!(source = source, "Skipping entry without a name");
                continue;
            };
            // Absent score and explicit zero are indistinguishable here
            let score = entry.score.unwrap_or(0.0);

            let position = *index.entry(name.clone()).or_insert_with(|| {
                candidates.push(Candidate::new(name.clone()));
                candidates.len() - 1
            });

            let candidate = &mut candidates[position];
            candidate.record_score(source, score, config);
            candidate.fill_common_name(entry.common_name.as_deref());
            candidate.fill_family(entry.family.as_deref());
        }
    }

    // Vec::sort_by is stable: equal scores keep insertion order
    candidates.sort_by(|a, b| {
        b.weighted_score()
            .partial_cmp(&a.weighted_score())
            .unwrap_or(Ordering::Equal)
    });

    for candidate in &candidates {
        debug!(
            name = %candidate.canonical_name,
            weighted = candidate.weighted_score(),
            provenance = %candidate.provenance(),
            "Merged candidate"
        );
    }

    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SourceWeight;
    use crate::types::SourceMatch;

    fn weights() -> EnsembleConfig {
        EnsembleConfig {
            sources: vec![SourceWeight::new("A", 0.6), SourceWeight::new("B", 0.4)],
            ..EnsembleConfig::default()
        }
    }

    fn names(candidates: &[Candidate]) -> Vec<&str> {
        candidates.iter().map(|c| c.canonical_name.as_str()).collect()
    }

    #[test]
    fn test_canonicalize_name() {
        assert_eq!(canonicalize_name("  Rosa   canina "), Some("Rosa canina".to_string()));
        assert_eq!(canonicalize_name("ROSA CANINA"), Some("Rosa canina".to_string()));
        assert_eq!(canonicalize_name("rosa canina"), Some("Rosa canina".to_string()));
        assert_eq!(canonicalize_name(" \t "), None);
        assert_eq!(canonicalize_name(""), None);
    }

    #[test]
    fn test_weighting() {
        let results = vec![
            SourceResults::new("A", vec![SourceMatch::new("Rosa canina", 0.8)]),
            SourceResults::new("B", vec![SourceMatch::new("Rosa canina", 0.5)]),
        ];

        let merged = merge_results(&results, &weights());
        assert_eq!(merged.len(), 1);
        assert!((merged[0].weighted_score() - 0.68).abs() < 1e-9);
        assert_eq!(merged[0].provenance(), "A+B");
    }

    #[test]
    fn test_max_not_sum() {
        let results = vec![SourceResults::new(
            "A",
            vec![
                SourceMatch::new("Rosa canina", 0.4),
                SourceMatch::new("rosa canina", 0.7),
            ],
        )];

        let merged = merge_results(&results, &weights());
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].score_for("A"), 0.7);
    }

    #[test]
    fn test_duplicates_collapse_across_spelling() {
        let results = vec![
            SourceResults::new("A", vec![SourceMatch::new("Aloe vera", 0.5)]),
            SourceResults::new("B", vec![SourceMatch::new("  ALOE  VERA ", 0.9)]),
        ];

        let merged = merge_results(&results, &weights());
        assert_eq!(names(&merged), vec!["Aloe vera"]);
        assert_eq!(merged[0].score_for("B"), 0.9);
    }

    #[test]
    fn test_sorted_descending() {
        let results = vec![
            SourceResults::new(
                "A",
                vec![
                    SourceMatch::new("Quercus robur", 0.2),
                    SourceMatch::new("Fagus sylvatica", 0.9),
                ],
            ),
            SourceResults::new("B", vec![SourceMatch::new("Tilia cordata", 0.5)]),
        ];

        let merged = merge_results(&results, &weights());
        assert_eq!(
            names(&merged),
            vec!["Fagus sylvatica", "Tilia cordata", "Quercus robur"]
        );
    }

    #[test]
    fn test_ties_keep_insertion_order() {
        let results = vec![
            SourceResults::new("A", vec![SourceMatch::new("Salix alba", 0.5)]),
            SourceResults::new("A", vec![SourceMatch::new("Betula pendula", 0.5)]),
            SourceResults::new("A", vec![SourceMatch::new("Acer platanoides", 0.5)]),
        ];

        let merged = merge_results(&results, &weights());
        assert_eq!(
            names(&merged),
            vec!["Salix alba", "Betula pendula", "Acer platanoides"]
        );
    }

    #[test]
    fn test_merge_determinism() {
        let results = vec![
            SourceResults::new(
                "A",
                vec![
                    SourceMatch::new("Mentha piperita", 0.3),
                    SourceMatch::new("Ocimum basilicum", 0.3),
                ],
            ),
            SourceResults::new(
                "B",
                vec![
                    SourceMatch::new("Ocimum basilicum", 0.45),
                    SourceMatch::new("Thymus vulgaris", 0.45),
                ],
            ),
        ];

        let first = merge_results(&results, &weights());
        for _ in 0..10 {
            assert_eq!(merge_results(&results, &weights()), first);
        }
    }

    #[test]
    fn test_per_source_limit_caps_entries() {
        let matches = (0..20)
            .map(|i| SourceMatch::new(format!("Species number{}", i), 0.5))
            .collect();
        let results = vec![SourceResults::new("A", matches)];

        let merged = merge_results(&results, &weights());
        assert_eq!(merged.len(), 5);
    }

    #[test]
    fn test_empty_names_discarded() {
        let results = vec![SourceResults::new(
            "A",
            vec![SourceMatch::new("   ", 0.9), SourceMatch::new("Ficus carica", 0.1)],
        )];

        let merged = merge_results(&results, &weights());
        assert_eq!(names(&merged), vec!["Ficus carica"]);
    }

    #[test]
    fn test_missing_score_reads_as_zero() {
        let entry = SourceMatch {
            name: "Ginkgo biloba".to_string(),
            ..Default::default()
        };
        let results = vec![SourceResults::new("A", vec![entry])];

        let merged = merge_results(&results, &weights());
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].weighted_score(), 0.0);
        assert_eq!(merged[0].provenance(), "A");
    }

    #[test]
    fn test_first_non_empty_metadata_wins() {
        let results = vec![
            SourceResults::new(
                "A",
                vec![SourceMatch::new("Olea europaea", 0.5).with_common_name("")],
            ),
            SourceResults::new(
                "B",
                vec![SourceMatch::new("Olea europaea", 0.5)
                    .with_common_name("Olive")
                    .with_family("Oleaceae")],
            ),
        ];

        let merged = merge_results(&results, &weights());
        assert_eq!(merged[0].common_name.as_deref(), Some("Olive"));
        assert_eq!(merged[0].family.as_deref(), Some("Oleaceae"));
    }

    #[test]
    fn test_partial_failure_equals_empty_list() {
        let a = SourceResults::new(
            "A",
            vec![
                SourceMatch::new("Rosa canina", 0.8),
                SourceMatch::new("Rosa gallica", 0.1),
            ],
        );

        let with_empty_b = merge_results(&[a.clone(), SourceResults::empty("B")], &weights());
        let without_b = merge_results(&[a], &weights());
        assert_eq!(with_empty_b, without_b);
    }

    #[test]
    fn test_all_sources_empty() {
        let results = vec![SourceResults::empty("A"), SourceResults::empty("B")];
        assert!(merge_results(&results, &weights()).is_empty());
    }
}
