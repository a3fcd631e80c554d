//! Text-only chat endpoint

use axum::{extract::State, routing::post, Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::bounded_message;
use crate::error::{ApiError, ApiResult};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub session_id: String,
    pub response: String,
    pub generated_by: String,
    pub timestamp: String,
}

/// POST /chat
pub async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> ApiResult<Json<ChatResponse>> {
    let message = bounded_message(&request.message);
    if message.is_empty() {
        return Err(ApiError::BadRequest("Message must not be empty".to_string()));
    }

    let session_id = request
        .session_id
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let reply = state.pipeline.chat(message).await;

    Ok(Json(ChatResponse {
        session_id,
        response: reply.text,
        generated_by: reply.generated_by,
        timestamp: Utc::now().to_rfc3339(),
    }))
}

/// Build chat routes
pub fn chat_routes() -> Router<AppState> {
    Router::new().route("/chat", post(chat))
}
