use axum::{
    http::{header, HeaderValue, Method},
    routing::get,
    Router,
};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers::{
    cache_stats, get_eeg_bands, get_eeg_data, get_eeg_info, get_eeg_psd, get_eeg_topomap,
    handle_404, health_check,
};
use crate::state::AppState;

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        let origins: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|origin| match origin.parse::<HeaderValue>() {
                Ok(value) => Some(value),
                Err(_) => {
                    tracing::warn!("Ignoring invalid CORS origin '{}'", origin);
                    None
                }
            })
            .collect();
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
}

pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.config.cors_origins);

    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/eeg-info", get(get_eeg_info))
        .route("/api/eeg-data", get(get_eeg_data))
        .route("/api/eeg-topomap/{time_point}", get(get_eeg_topomap))
        .route("/api/eeg-psd", get(get_eeg_psd))
        .route("/api/eeg-bands", get(get_eeg_bands))
        .route("/api/cache/stats", get(cache_stats))
        .fallback(handle_404)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
