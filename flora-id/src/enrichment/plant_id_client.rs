//! Plant.id knowledge-base client
//!
//! Two-step lookup: name search → access token → plant detail.
//! Outbound calls are paced with a token bucket so concurrent enrichment
//! of several candidates stays within the account's request rate.
//!
//! API Documentation: https://plant.id/docs

use crate::types::{DetailClient, EnrichmentError, PlantDetail};
use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use reqwest::Client;
use serde_json::Value;
use std::num::NonZeroU32;
use std::time::Duration;
use tracing::{debug, info};

/// Detail fields requested from the knowledge base
const DETAIL_FIELDS: &str = "common_names,url,description,taxonomy,image,watering";

/// Plant.id detail client
pub struct PlantIdClient {
    client: Client,
    base_url: String,
    api_key: String,
    rate_limiter: RateLimiter<
        governor::state::direct::NotKeyed,
        governor::state::InMemoryState,
        governor::clock::DefaultClock,
    >,
}

impl PlantIdClient {
    /// Create a client for `base_url` (e.g. "https://plant.id/api/v3")
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        requests_per_second: u32,
        timeout: Duration,
    ) -> Result<Self, EnrichmentError> {
        let per_second = NonZeroU32::new(requests_per_second).ok_or_else(|| {
            EnrichmentError::Api("requests_per_second must be at least 1".to_string())
        })?;

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EnrichmentError::Network(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            rate_limiter: RateLimiter::direct(Quota::per_second(per_second)),
        })
    }

    async fn get_json(&self, url: &str, query: &[(&str, &str)]) -> Result<Value, EnrichmentError> {
        self.rate_limiter.until_ready().await;

        let response = self
            .client
            .get(url)
            .query(query)
            .header("Api-Key", &self.api_key)
            .send()
            .await
            .map_err(|e| EnrichmentError::Network(format!("Plant.id request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(EnrichmentError::Api(format!(
                "Plant.id returned error status: {}",
                status
            )));
        }

        response
            .json()
            .await
            .map_err(|e| EnrichmentError::Parse(format!("Failed to parse Plant.id response: {}", e)))
    }
}

#[async_trait]
impl DetailClient for PlantIdClient {
    async fn fetch_detail(&self, canonical_name: &str) -> Result<PlantDetail, EnrichmentError> {
        debug!(name = %canonical_name, "Querying Plant.id knowledge base");

        let search_url = format!("{}/kb/plants/name_search", self.base_url);
        let search = self
            .get_json(&search_url, &[("q", canonical_name), ("limit", "1")])
            .await?;

        let token = parse_access_token(&search)
            .ok_or_else(|| EnrichmentError::NotFound(canonical_name.to_string()))?;

        let detail_url = format!("{}/kb/plants/{}", self.base_url, token);
        let detail = self.get_json(&detail_url, &[("details", DETAIL_FIELDS)]).await?;

        let detail = parse_plant_detail(&detail);
        info!(name = %canonical_name, "Plant.id details retrieved");
        Ok(detail)
    }
}

/// Access token of the first name-search hit
pub fn parse_access_token(body: &Value) -> Option<String> {
    body.get("entities")?
        .as_array()?
        .first()?
        .get("access_token")?
        .as_str()
        .filter(|t| !t.trim().is_empty())
        .map(str::to_string)
}

/// Map a knowledge-base detail body; missing fields stay empty
pub fn parse_plant_detail(body: &Value) -> PlantDetail {
    let text = |value: Option<&Value>| {
        value
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    let common_names = body
        .get("common_names")
        .and_then(Value::as_array)
        .map(|names| {
            names
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    PlantDetail {
        description: text(body.get("description").and_then(|d| d.get("value"))),
        common_names,
        url: text(body.get("url")),
        image_url: text(body.get("image").and_then(|i| i.get("value"))),
    }
}
