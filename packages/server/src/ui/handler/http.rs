//! HTTP API endpoint handlers.

use std::sync::Arc;

use axum::{Json, extract::State, http::StatusCode};

use crate::{infrastructure::dto::http::LobbySnapshotDto, ui::state::AppState};

/// Debug endpoint returning both pools (for testing purposes)
pub async fn debug_lobby(
    State(state): State<Arc<AppState>>,
) -> Result<Json<LobbySnapshotDto>, StatusCode> {
    match state.lobby.snapshot().await {
        Ok(snapshot) => Ok(Json(snapshot)),
        Err(e) => {
            tracing::error!("Failed to take lobby snapshot: {}", e);
            Err(StatusCode::SERVICE_UNAVAILABLE)
        }
    }
}

/// Health check endpoint
pub async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}
