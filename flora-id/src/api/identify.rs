//! Image identification endpoint
//!
//! `POST /identify?message=…&session_id=…` with the raw image as body.

use axum::{
    body::Bytes,
    extract::{Query, State},
    routing::post,
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use tracing::info;
use uuid::Uuid;

use super::bounded_message;
use crate::error::{ApiError, ApiResult};
use crate::pipeline::{IdentificationReport, SourceSummary};
use crate::AppState;

/// Query parameters of an identification request
#[derive(Debug, Default, Deserialize)]
pub struct IdentifyParams {
    /// Question about the plant; empty means "what is this?"
    #[serde(default)]
    pub message: String,
    /// Client session identifier, generated when absent
    pub session_id: Option<String>,
}

/// One exposed candidate
#[derive(Debug, Serialize)]
pub struct IdentifiedPlant {
    /// 1-based rank
    pub id: usize,
    pub scientific_name: String,
    pub common_name: Option<String>,
    pub family: Option<String>,
    /// Weighted score clamped to [0, 1]
    pub confidence: f64,
    /// Contributing sources joined with "+"
    pub source: String,
    pub validated: bool,
}

/// Candidate counts per source plus the registry-verified count
#[derive(Debug, Serialize)]
pub struct SourceCounts {
    #[serde(flatten)]
    pub per_source: BTreeMap<String, usize>,
    pub validated: usize,
}

impl From<&SourceSummary> for SourceCounts {
    fn from(summary: &SourceSummary) -> Self {
        Self {
            per_source: summary.per_source.iter().cloned().collect(),
            validated: summary.validated,
        }
    }
}

/// Identification response
#[derive(Debug, Serialize)]
pub struct IdentifyResponse {
    pub session_id: String,
    pub response: String,
    pub identified_plants: Vec<IdentifiedPlant>,
    pub total_matches: usize,
    pub highest_confidence: f64,
    pub sources: SourceCounts,
    pub generated_by: String,
    /// First 16 hex chars of the image's SHA-256
    pub image_hash: String,
    pub timestamp: String,
}

impl IdentifyResponse {
    fn from_report(report: IdentificationReport, session_id: String, image_hash: String) -> Self {
        let highest_confidence = report.highest_confidence();
        let sources = SourceCounts::from(&report.sources);
        let identified_plants = report
            .ranked_candidates
            .iter()
            .enumerate()
            .map(|(rank, candidate)| IdentifiedPlant {
                id: rank + 1,
                scientific_name: candidate.canonical_name.clone(),
                common_name: candidate.common_name.clone(),
                family: candidate.family.clone(),
                confidence: candidate.confidence(),
                source: candidate.provenance(),
                validated: candidate.validated,
            })
            .collect();

        Self {
            session_id,
            response: report.generated_text,
            identified_plants,
            total_matches: report.total_matches,
            highest_confidence,
            sources,
            generated_by: report.generated_by,
            image_hash,
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

/// Short content hash used to correlate uploads in logs and responses
pub fn image_hash(image: &[u8]) -> String {
    Sha256::digest(image)
        .iter()
        .take(8)
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// POST /identify
pub async fn identify(
    State(state): State<AppState>,
    Query(params): Query<IdentifyParams>,
    body: Bytes,
) -> ApiResult<Json<IdentifyResponse>> {
    if body.is_empty() {
        return Err(ApiError::BadRequest("Request body must contain an image".to_string()));
    }
    if !infer::is_image(&body) {
        return Err(ApiError::BadRequest("Uploaded file is not a supported image".to_string()));
    }

    let session_id = params
        .session_id
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let hash = image_hash(&body);
    info!(session_id = %session_id, image_hash = %hash, bytes = body.len(), "Identification request");

    let report = state
        .pipeline
        .identify_with_cancel(&body, bounded_message(&params.message), state.shutdown.child_token())
        .await?;

    Ok(Json(IdentifyResponse::from_report(report, session_id, hash)))
}

/// Build identification routes
pub fn identify_routes() -> Router<AppState> {
    Router::new().route("/identify", post(identify))
}
