//! PlantCLEF classifier source
//!
//! A CLIP zero-shot classifier over the PlantCLEF species list, served as a
//! Gradio app. The image travels as a base64 data URL:
//!
//! ```text
//! POST {endpoint}/api/predict
//! {"data": ["data:image/jpeg;base64,…"]}
//! → {"data": [{"label": "...", "confidences": [{"label": "...", "confidence": 0.42}]}]}
//! ```
//!
//! The app reports its own failures in-band as a single label starting
//! with `Error:`.

use super::image_mime;
use crate::config::PLANTCLEF_SOURCE;
use crate::types::{SourceClient, SourceError, SourceMatch};
use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

const ERROR_LABEL_PREFIX: &str = "Error:";

/// Hosted PlantCLEF classifier client
pub struct PlantClefClient {
    client: Client,
    predict_url: String,
}

impl PlantClefClient {
    /// `endpoint` is the app's base URL (e.g. a Gradio share link)
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, SourceError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SourceError::Network(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            predict_url: format!("{}/api/predict", endpoint.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl SourceClient for PlantClefClient {
    fn source_id(&self) -> &str {
        PLANTCLEF_SOURCE
    }

    async fn identify(&self, image: &[u8], top_k: usize) -> Result<Vec<SourceMatch>, SourceError> {
        let response = self
            .client
            .post(&self.predict_url)
            .json(&predict_payload(image))
            .send()
            .await
            .map_err(|e| SourceError::Network(format!("PlantCLEF request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Api(format!("PlantCLEF returned error status: {}", status)));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| SourceError::Parse(format!("Failed to parse PlantCLEF response: {}", e)))?;

        let matches = parse_predictions(&body, top_k)?;
        debug!(count = matches.len(), "PlantCLEF predictions parsed");
        Ok(matches)
    }
}

/// Gradio predict payload with the image as a data URL
pub fn predict_payload(image: &[u8]) -> Value {
    let encoded = base64::engine::general_purpose::STANDARD.encode(image);
    json!({ "data": [format!("data:{};base64,{}", image_mime(image), encoded)] })
}

/// Map `data[0].confidences[]` to source matches
///
/// Returns `SourceError::Api` when the classifier reported an error label.
pub fn parse_predictions(body: &Value, top_k: usize) -> Result<Vec<SourceMatch>, SourceError> {
    let Some(output) = body.get("data").and_then(Value::as_array).and_then(|d| d.first()) else {
        return Err(SourceError::Parse("response has no data".to_string()));
    };

    if let Some(label) = output.get("label").and_then(Value::as_str) {
        if label.starts_with(ERROR_LABEL_PREFIX) {
            return Err(SourceError::Api(label.to_string()));
        }
    }

    let confidences = output
        .get("confidences")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    let mut matches = Vec::new();
    for entry in confidences {
        let Some(label) = entry.get("label").and_then(Value::as_str) else {
            continue;
        };
        if label.starts_with(ERROR_LABEL_PREFIX) {
            return Err(SourceError::Api(label.to_string()));
        }
        if label.trim().is_empty() {
            continue;
        }
        matches.push(SourceMatch {
            name: label.to_string(),
            common_name: None,
            family: None,
            score: entry.get("confidence").and_then(Value::as_f64),
        });
    }

    matches.truncate(top_k);
    Ok(matches)
}
