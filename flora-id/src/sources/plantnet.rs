//! PlantNet identification source
//!
//! Endpoint: `POST {api_url}?api-key=…` with a multipart body carrying the
//! photo (`images`) and an organ hint (`organs`).
//!
//! API Documentation: https://my.plantnet.org/doc

use super::image_mime;
use crate::config::PLANTNET_SOURCE;
use crate::types::{SourceClient, SourceError, SourceMatch};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// PlantNet v2 client
pub struct PlantNetClient {
    client: Client,
    api_url: String,
    api_key: String,
    organ: String,
}

impl PlantNetClient {
    pub fn new(
        api_url: impl Into<String>,
        api_key: impl Into<String>,
        organ: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, SourceError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SourceError::Network(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_url: api_url.into(),
            api_key: api_key.into(),
            organ: organ.into(),
        })
    }
}

#[async_trait]
impl SourceClient for PlantNetClient {
    fn source_id(&self) -> &str {
        PLANTNET_SOURCE
    }

    async fn identify(&self, image: &[u8], top_k: usize) -> Result<Vec<SourceMatch>, SourceError> {
        let part = Part::bytes(image.to_vec())
            .file_name("plant.jpg")
            .mime_str(image_mime(image))
            .map_err(|e| SourceError::Api(format!("Invalid image part: {}", e)))?;
        let form = Form::new().part("images", part).text("organs", self.organ.clone());

        let response = self
            .client
            .post(&self.api_url)
            .query(&[("api-key", self.api_key.as_str())])
            .multipart(form)
            .send()
            .await
            .map_err(|e| SourceError::Network(format!("PlantNet request failed: {}", e)))?;

        let status = response.status();
        // PlantNet answers 404 "Species not found" when nothing matched
        if status == StatusCode::NOT_FOUND {
            debug!("PlantNet found no species");
            return Ok(Vec::new());
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SourceError::Api(format!("PlantNet HTTP {}: {}", status, body)));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| SourceError::Parse(format!("Failed to parse PlantNet response: {}", e)))?;

        let matches = parse_plantnet_results(&body, top_k);
        debug!(count = matches.len(), "PlantNet results parsed");
        Ok(matches)
    }
}

/// Map `results[]` to source matches, skipping entries without a name
pub fn parse_plantnet_results(body: &Value, top_k: usize) -> Vec<SourceMatch> {
    let Some(results) = body.get("results").and_then(Value::as_array) else {
        return Vec::new();
    };

    results
        .iter()
        .filter_map(|result| {
            let species = result.get("species")?;
            let name = species
                .get("scientificNameWithoutAuthor")
                .and_then(Value::as_str)
                .filter(|n| !n.trim().is_empty())?;

            let common_name = species
                .get("commonNames")
                .and_then(Value::as_array)
                .and_then(|names| names.iter().filter_map(Value::as_str).next())
                .map(str::to_string);
            let family = species
                .get("family")
                .and_then(|f| f.get("scientificNameWithoutAuthor"))
                .and_then(Value::as_str)
                .map(str::to_string);

            Some(SourceMatch {
                name: name.to_string(),
                common_name,
                family,
                score: result.get("score").and_then(Value::as_f64),
            })
        })
        .take(top_k)
        .collect()
}
