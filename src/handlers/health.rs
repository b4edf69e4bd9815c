use axum::{Json, extract::State, response::IntoResponse};

use crate::state::AppState;

pub async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "remote_extraction": state.orchestrator.has_remote(),
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}
