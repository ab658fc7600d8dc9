use axum::{extract::State, Json};
use std::sync::Arc;

use crate::state::{AppState, CacheStatsResponse};

pub async fn cache_stats(State(state): State<Arc<AppState>>) -> Json<CacheStatsResponse> {
    Json(state.caches.stats())
}
