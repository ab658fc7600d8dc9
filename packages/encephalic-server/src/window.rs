use encephalic_dsp::Recording;
use ndarray::s;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::cache::ResponseCache;
use crate::error::ServiceError;

/// A cropped slice of the recording, shaped for JSON.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindowData {
    pub labels: Vec<String>,
    /// Channels × samples
    pub data: Vec<Vec<f64>>,
    /// Absolute seconds from recording start
    pub times: Vec<f64>,
    pub sfreq: f64,
}

/// Half-open sample range `[start, stop)` covering `[tmin, tmax)` after clamping.
///
/// When `tmax` reaches the end of the recording the last sample is included.
/// A range that contains no sample is rejected.
pub fn sample_range(recording: &Recording, tmin: f64, tmax: f64) -> Result<(usize, usize), ServiceError> {
    if tmin.is_nan() || tmax.is_nan() {
        return Err(ServiceError::InvalidRange(format!(
            "bounds must be numbers, got tmin={} tmax={}",
            tmin, tmax
        )));
    }

    let duration = recording.duration();
    let tmin = tmin.max(0.0);
    let tmax = tmax.min(duration);
    if tmin >= tmax {
        return Err(ServiceError::InvalidRange(format!(
            "tmin ({}) must be less than tmax ({}) within [0, {}]",
            tmin, tmax, duration
        )));
    }

    let sfreq = recording.sfreq();
    let n = recording.n_samples();
    // Tolerance absorbs float error in t * sfreq for times that sit on a sample
    let first_at_or_after = |t: f64| ((t * sfreq - 1e-9).ceil().max(0.0) as usize).min(n);

    let start = first_at_or_after(tmin);
    let stop = if tmax >= duration {
        n
    } else {
        first_at_or_after(tmax)
    };
    if stop <= start {
        return Err(ServiceError::InvalidRange(format!(
            "no samples between tmin ({}) and tmax ({}) at {} Hz",
            tmin, tmax, sfreq
        )));
    }
    Ok((start, stop))
}

/// Crop `recording` to `[tmin, tmax]`, clamping out-of-range bounds.
pub fn extract(recording: &Recording, tmin: f64, tmax: f64) -> Result<WindowData, ServiceError> {
    let (start, stop) = sample_range(recording, tmin, tmax)?;
    let view = recording.data();
    let window = view.slice(s![.., start..stop]);

    Ok(WindowData {
        labels: recording.channel_names(),
        data: window.outer_iter().map(|row| row.to_vec()).collect(),
        times: (start..stop).map(|i| recording.time_of(i)).collect(),
        sfreq: recording.sfreq(),
    })
}

/// Memoizes [`extract`] keyed by the literal requested bounds.
pub struct WindowExtractor {
    cache: Arc<dyn ResponseCache<WindowData>>,
    ttl: Duration,
}

impl WindowExtractor {
    pub fn new(cache: Arc<dyn ResponseCache<WindowData>>, ttl: Duration) -> Self {
        Self { cache, ttl }
    }

    pub fn cache_key(tmin: f64, tmax: f64) -> String {
        format!("window:{}:{}", tmin, tmax)
    }

    pub fn get(&self, recording: &Recording, tmin: f64, tmax: f64) -> Result<Arc<WindowData>, ServiceError> {
        let key = Self::cache_key(tmin, tmax);
        if let Some(hit) = self.cache.get(&key) {
            debug!(%key, "Window cache hit");
            return Ok(hit);
        }

        let window = Arc::new(extract(recording, tmin, tmax)?);
        debug!(
            %key,
            samples = window.times.len(),
            "Extracted window"
        );
        self.cache.set(key, window.clone(), self.ttl);
        Ok(window)
    }
}
