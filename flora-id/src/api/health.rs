//! Health check endpoint

use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use crate::AppState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// "ok", or "degraded" when no source is registered
    pub status: String,
    /// Module name ("flora-id")
    pub module: String,
    /// Crate version from Cargo.toml
    pub version: String,
    /// Seconds since service started
    pub uptime_seconds: u64,
    /// Registered identification sources
    pub sources: Vec<String>,
    /// Generation providers in priority order
    pub providers: Vec<String>,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime = Utc::now().signed_duration_since(state.startup_time);
    let uptime_seconds = uptime.num_seconds().max(0) as u64;

    let sources = state.pipeline.source_ids();
    let status = if sources.is_empty() { "degraded" } else { "ok" };

    Json(HealthResponse {
        status: status.to_string(),
        module: "flora-id".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds,
        sources,
        providers: state.pipeline.provider_names(),
    })
}

/// Build health check routes
pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
