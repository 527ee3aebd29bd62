use axum::{Json, extract::State, response::IntoResponse};
use serde_json::json;

use crate::AppState;

/// GET /health
pub async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
  Json(json!({
    "status": "healthy",
    "service": "relaychat_server",
    "version": env!("CARGO_PKG_VERSION"),
    "timestamp": chrono::Utc::now().to_rfc3339(),
    "sessions": state.sessions.session_count(),
  }))
}
