//! Enrichment Stage
//!
//! Adds reference detail to the top-K candidates only, bounding external
//! call cost. Lookups run concurrently and each is bounded by its own
//! timeout, so the stage never takes longer than one per-call budget.
//! A failed or slow lookup leaves its candidate unenriched; candidates are
//! never dropped.

pub mod plant_id_client;

pub use plant_id_client::PlantIdClient;

use crate::config::EnsembleConfig;
use crate::types::{Candidate, DetailClient, EnrichmentError};
use futures::future::join_all;
use tracing::{debug, info, warn};

/// Enrich the first `enrichment_top_k` candidates; returns how many succeeded
pub async fn enrich_top_k(
    candidates: &mut [Candidate],
    client: &dyn DetailClient,
    config: &EnsembleConfig,
) -> usize {
    let k = config.enrichment_top_k.min(candidates.len());
    if k == 0 {
        return 0;
    }

    let lookups = candidates[..k].iter().map(|candidate| {
        let name = candidate.canonical_name.clone();
        async move {
            let outcome = tokio::time::timeout(config.enrichment_timeout, client.fetch_detail(&name))
                .await
                .unwrap_or_else(|_| {
                    Err(EnrichmentError::Timeout(config.enrichment_timeout.as_millis() as u64))
                });
            (name, outcome)
        }
    });

    let outcomes = join_all(lookups).await;

    let mut enriched = 0;
    for (candidate, (name, outcome)) in candidates[..k].iter_mut().zip(outcomes) {
        match outcome {
            Ok(detail) => {
                candidate.fill_common_name(detail.common_names.first().map(String::as_str));
                candidate.detail = Some(detail);
                enriched += 1;
                debug!(name = %name, "Candidate enriched");
            }
            Err(e) => {
                warn!(name = %name, error = %e, "Enrichment unavailable, continuing without detail");
            }
        }
    }

    info!(enriched = enriched, attempted = k, "Enrichment complete");
    enriched
}
