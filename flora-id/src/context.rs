//! Context Builder
//!
//! Renders the top exposure-K candidates into the text block handed to the
//! generation chain. Pure and deterministic: the same candidates and
//! configuration always produce byte-identical output.

use crate::config::EnsembleConfig;
use crate::types::Candidate;
use std::fmt::Write;

/// Maximum characters of a description excerpt
pub const DESCRIPTION_EXCERPT_CHARS: usize = 300;

/// Marker for absent names
pub const UNKNOWN: &str = "unknown";

/// Render the ranked candidates; empty input renders as an empty string
pub fn build_context(candidates: &[Candidate], config: &EnsembleConfig) -> String {
    let exposed: Vec<&Candidate> = candidates.iter().take(config.exposure_top_k).collect();
    if exposed.is_empty() {
        return String::new();
    }

    let weights = config
        .sources
        .iter()
        .map(|s| format!("{}={}", s.name, percent(s.weight, 0)))
        .collect::<Vec<_>>()
        .join(", ");

    let mut blocks = Vec::with_capacity(exposed.len() + 1);
    blocks.push(format!("Ensemble weights: {}", weights));

    for (rank, candidate) in exposed.iter().enumerate() {
        blocks.push(render_candidate(rank + 1, candidate, config));
    }

    blocks.join("\n\n")
}

fn render_candidate(rank: usize, candidate: &Candidate, config: &EnsembleConfig) -> String {
    let mut out = String::new();

    // Writing into a String cannot fail
    let _ = writeln!(out, "#{} {}", rank, candidate.canonical_name);
    let _ = writeln!(
        out,
        "   Common name: {}",
        candidate.common_name.as_deref().unwrap_or(UNKNOWN)
    );
    let _ = writeln!(out, "   Family: {}", candidate.family.as_deref().unwrap_or(UNKNOWN));

    for source in &config.sources {
        let _ = writeln!(
            out,
            "   {} score: {}",
            source.name,
            percent(candidate.score_for(&source.name), 1)
        );
    }
    // Sources without a configured weight still show their evidence
    for (source, score) in candidate.source_scores() {
        if !config.sources.iter().any(|s| s.name == source) {
            let _ = writeln!(out, "   {} score: {} (unweighted)", source, percent(score, 1));
        }
    }

    let _ = writeln!(out, "   Weighted score: {}", percent(candidate.weighted_score(), 1));
    let _ = writeln!(out, "   Provenance: {}", candidate.provenance());

    let validation = match (candidate.validated, candidate.registry_symbol.as_deref()) {
        (true, Some(symbol)) => format!("registry verified ({})", symbol),
        (true, None) => "registry verified".to_string(),
        (false, _) => "not verified".to_string(),
    };
    let _ = write!(out, "   Validation: {}", validation);

    if let Some(description) = candidate
        .detail
        .as_ref()
        .and_then(|d| d.description.as_deref())
    {
        let (excerpt, truncated) =
            flora_common::text::truncate_chars(description, DESCRIPTION_EXCERPT_CHARS);
        let _ = write!(
            out,
            "\n   Description: {}{}",
            excerpt,
            if truncated { "..." } else { "" }
        );
    }

    out
}

fn percent(value: f64, decimals: usize) -> String {
    format!("{:.*}%", decimals, value * 100.0)
}
