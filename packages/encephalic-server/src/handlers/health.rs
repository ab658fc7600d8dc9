use axum::{extract::State, http::StatusCode, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::loader::LoaderStatus;
use crate::state::AppState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub data_loaded: bool,
    pub loader_state: LoaderStatus,
    pub loaded_at: Option<DateTime<Utc>>,
    pub uptime_seconds: u64,
}

/// Health check endpoint; reports loader progress but never fails
pub async fn health_check(State(state): State<Arc<AppState>>) -> (StatusCode, Json<HealthResponse>) {
    let loader_state = state.loader.status();
    let response = HealthResponse {
        status: "healthy".to_string(),
        service: "encephalic-eeg-api".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        data_loaded: loader_state == LoaderStatus::Ready,
        loader_state,
        loaded_at: state.loader.loaded_at(),
        uptime_seconds: state.uptime_seconds(),
    };

    (StatusCode::OK, Json(response))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NotFoundResponse {
    pub error: String,
}

pub async fn handle_404() -> (StatusCode, Json<NotFoundResponse>) {
    tracing::warn!("404 - Endpoint not found");
    (
        StatusCode::NOT_FOUND,
        Json(NotFoundResponse {
            error: "Endpoint not found".to_string(),
        }),
    )
}
