use axum::{
    extract::{Path, Query, State},
    http::header,
    response::IntoResponse,
    Json,
};
use encephalic_dsp::Recording;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{ApiResult, ServiceError};
use crate::spectral::{BandPowerTable, SpectralResult};
use crate::state::AppState;
use crate::window::WindowData;

const DEFAULT_TMIN: f64 = 0.0;
const DEFAULT_TMAX: f64 = 10.0;

#[derive(Debug, Serialize)]
pub struct EegInfoResponse {
    pub n_channels: usize,
    pub channel_names: Vec<String>,
    pub sampling_freq: f64,
    pub duration: f64,
    pub n_samples: usize,
}

/// Run `work` against the loaded recording on the blocking pool.
async fn with_recording<T, F>(state: &Arc<AppState>, work: F) -> ApiResult<T>
where
    T: Send + 'static,
    F: FnOnce(&AppState, &Recording) -> Result<T, ServiceError> + Send + 'static,
{
    let recording = state.loader.current()?;
    let state = state.clone();
    let result = tokio::task::spawn_blocking(move || work(&state, &recording)).await??;
    Ok(result)
}

fn parse_bound(params: &HashMap<String, String>, name: &str, default: f64) -> Result<f64, ServiceError> {
    match params.get(name) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse::<f64>()
            .map_err(|_| ServiceError::InvalidRange(format!("{} must be a number, got '{}'", name, raw))),
    }
}

pub async fn get_eeg_info(State(state): State<Arc<AppState>>) -> ApiResult<Json<EegInfoResponse>> {
    let recording = state.loader.current()?;
    Ok(Json(EegInfoResponse {
        n_channels: recording.n_channels(),
        channel_names: recording.channel_names(),
        sampling_freq: recording.sfreq(),
        duration: recording.duration(),
        n_samples: recording.n_samples(),
    }))
}

pub async fn get_eeg_data(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult<Json<Arc<WindowData>>> {
    let tmin = parse_bound(&params, "tmin", DEFAULT_TMIN)?;
    let tmax = parse_bound(&params, "tmax", DEFAULT_TMAX)?;

    let window = with_recording(&state, move |state, recording| {
        state.windows.get(recording, tmin, tmax)
    })
    .await?;
    Ok(Json(window))
}

pub async fn get_eeg_topomap(
    State(state): State<Arc<AppState>>,
    Path(time_point): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let time_point: f64 = time_point.trim().parse().map_err(|_| {
        ServiceError::InvalidTimePoint(format!("'{}' is not a number", time_point))
    })?;

    let png = with_recording(&state, move |state, recording| {
        state.topomaps.render(recording, time_point)
    })
    .await?;

    Ok((
        [
            (header::CONTENT_TYPE, "image/png"),
            (header::CACHE_CONTROL, "public, max-age=300"),
        ],
        (*png).clone(),
    ))
}

pub async fn get_eeg_psd(State(state): State<Arc<AppState>>) -> ApiResult<Json<Arc<SpectralResult>>> {
    let spectrum = with_recording(&state, |state, recording| state.spectral.psd(recording)).await?;
    Ok(Json(spectrum))
}

pub async fn get_eeg_bands(State(state): State<Arc<AppState>>) -> ApiResult<Json<Arc<BandPowerTable>>> {
    let bands = with_recording(&state, |state, recording| state.spectral.bands(recording)).await?;
    Ok(Json(bands))
}
