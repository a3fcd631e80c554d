//! flora-id library interface
//!
//! Multi-source plant identification: concurrent source fan-out, weighted
//! ensemble merge, registry validation, detail enrichment and a generation
//! fallback chain, served over a small axum API.

pub mod api;
pub mod config;
pub mod context;
pub mod enrichment;
pub mod ensemble;
pub mod error;
pub mod generation;
pub mod pipeline;
pub mod sources;
pub mod types;
pub mod validation;

pub use crate::error::{ApiError, ApiResult};
pub use crate::pipeline::{IdentificationPipeline, IdentificationReport};

use axum::extract::DefaultBodyLimit;
use axum::Router;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Identification pipeline (read-only, shared by every request)
    pub pipeline: Arc<IdentificationPipeline>,
    /// Upload cap for identification requests
    pub max_image_bytes: usize,
    /// Cancelled on shutdown; in-flight identifications are abandoned
    pub shutdown: CancellationToken,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(pipeline: Arc<IdentificationPipeline>, max_image_bytes: usize) -> Self {
        Self {
            pipeline,
            max_image_bytes,
            shutdown: CancellationToken::new(),
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    let body_limit = state.max_image_bytes;

    Router::new()
        .merge(api::health_routes())
        .merge(api::identify_routes())
        .merge(api::chat_routes())
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
