//! Concurrent source querying
//!
//! Every source is queried at once and bounded by the per-source timeout.
//! A timed-out or failed source becomes an empty result list; it never fails
//! the request.

use crate::config::EnsembleConfig;
use crate::types::{SourceClient, SourceError, SourceResults};
use futures::future::join_all;
use std::sync::Arc;
use tracing::{info, warn};

/// Fan-out executor over the configured source clients
pub struct SourceFanout {
    clients: Vec<Arc<dyn SourceClient>>,
}

impl SourceFanout {
    pub fn new(clients: Vec<Arc<dyn SourceClient>>) -> Self {
        Self { clients }
    }

    /// Identifiers of the registered sources, in query order
    pub fn source_ids(&self) -> Vec<String> {
        self.clients.iter().map(|c| c.source_id().to_string()).collect()
    }

    pub fn count(&self) -> usize {
        self.clients.len()
    }

    /// Query all sources concurrently
    ///
    /// Output order follows registration order regardless of completion order.
    pub async fn query_all(&self, image: &[u8], config: &EnsembleConfig) -> Vec<SourceResults> {
        let futures = self.clients.iter().map(|client| {
            let client = Arc::clone(client);
            async move {
                let source = client.source_id().to_string();
                let outcome = tokio::time::timeout(
                    config.source_timeout,
                    client.identify(image, config.per_source_limit),
                )
                .await
                .unwrap_or_else(|_| {
                    Err(SourceError::Timeout(config.source_timeout.as_millis() as u64))
                });

                match outcome {
                    Ok(matches) => {
                        if matches.is_empty() {
                            warn!(source = %source, "Source returned no results");
                        } else {
                            info!(source = %source, count = matches.len(), "Source returned results");
                        }
                        SourceResults::new(source, matches)
                    }
                    Err(e) => {
                        warn!(
                            source = %source,
                            error = %e,
                            "Source unavailable, treating as zero results"
                        );
                        SourceResults::empty(source)
                    }
                }
            }
        });

        join_all(futures).await
    }
}
