use bytes::Bytes;
use encephalic_dsp::{render_png, Recording, SensorPosition, TopomapStyle};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::cache::ResponseCache;
use crate::error::ServiceError;

/// Index of the sample closest to `t` on a non-decreasing time axis.
///
/// Ties resolve to the earlier sample.
pub fn nearest_index(times: &[f64], t: f64) -> Option<usize> {
    if times.is_empty() || t.is_nan() {
        return None;
    }
    let upper = times.partition_point(|&x| x < t);
    if upper == 0 {
        return Some(0);
    }
    if upper == times.len() {
        return Some(times.len() - 1);
    }
    let lower = upper - 1;
    if t - times[lower] <= times[upper] - t {
        Some(lower)
    } else {
        Some(upper)
    }
}

/// Per-channel mean amplitude around one instant, ready to paint.
#[derive(Debug, Clone, PartialEq)]
pub struct TopographicFrame {
    pub sample_index: usize,
    pub actual_time: f64,
    pub channel_names: Vec<String>,
    pub values: Vec<f64>,
    pub positions: Vec<SensorPosition>,
}

/// Build the frame for `time_point`, averaging `[idx - w, idx + w)` with
/// `w = floor(half_width * sfreq)`. The window shrinks at the recording edges
/// and always contains the centre sample.
pub fn build_frame(recording: &Recording, time_point: f64, half_width: f64) -> Result<TopographicFrame, ServiceError> {
    if recording.n_channels() == 0 {
        return Err(ServiceError::Render("recording has no channels".to_string()));
    }
    let times = recording.times();
    let idx = nearest_index(&times, time_point)
        .ok_or_else(|| ServiceError::InvalidTimePoint(time_point.to_string()))?;

    let w = (half_width * recording.sfreq()).floor() as usize;
    let start = idx.saturating_sub(w);
    let stop = idx.saturating_add(w).min(times.len()).max(idx + 1);

    let data = recording.data();
    let mut channel_names = Vec::new();
    let mut values = Vec::new();
    let mut positions = Vec::new();
    for (channel, row) in recording.channels().iter().zip(data.outer_iter()) {
        let Some(position) = channel.position else {
            continue;
        };
        let window = row.slice(ndarray::s![start..stop]);
        channel_names.push(channel.name.clone());
        values.push(window.sum() / window.len() as f64);
        positions.push(position);
    }

    if positions.is_empty() {
        return Err(ServiceError::Render(
            "no channels have a known scalp position".to_string(),
        ));
    }

    Ok(TopographicFrame {
        sample_index: idx,
        actual_time: times[idx],
        channel_names,
        values,
        positions,
    })
}

/// Turns a frame into encoded image bytes.
pub trait FramePainter: Send + Sync {
    fn paint(&self, frame: &TopographicFrame) -> Result<Vec<u8>, ServiceError>;
}

#[derive(Default)]
pub struct PngPainter {
    style: TopomapStyle,
}

impl PngPainter {
    pub fn new(style: TopomapStyle) -> Self {
        Self { style }
    }
}

impl FramePainter for PngPainter {
    fn paint(&self, frame: &TopographicFrame) -> Result<Vec<u8>, ServiceError> {
        render_png(&frame.values, &frame.positions, frame.actual_time, &self.style)
            .map_err(|e| ServiceError::Render(e.to_string()))
    }
}

/// Memoized topomaps keyed by the requested time rounded to centiseconds.
pub struct TopomapRenderer {
    painter: Arc<dyn FramePainter>,
    cache: Arc<dyn ResponseCache<Bytes>>,
    half_width: f64,
    ttl: Duration,
}

impl TopomapRenderer {
    pub fn new(
        painter: Arc<dyn FramePainter>,
        cache: Arc<dyn ResponseCache<Bytes>>,
        half_width: f64,
        ttl: Duration,
    ) -> Self {
        Self {
            painter,
            cache,
            half_width,
            ttl,
        }
    }

    pub fn cache_key(time_point: f64) -> String {
        let rounded = (time_point * 100.0).round() / 100.0;
        // Avoid a separate "-0.00" entry
        let rounded = if rounded == 0.0 { 0.0 } else { rounded };
        format!("topomap:{:.2}", rounded)
    }

    pub fn render(&self, recording: &Recording, time_point: f64) -> Result<Arc<Bytes>, ServiceError> {
        if !time_point.is_finite() {
            return Err(ServiceError::InvalidTimePoint(format!(
                "time point must be a finite number, got {}",
                time_point
            )));
        }

        let key = Self::cache_key(time_point);
        if let Some(hit) = self.cache.get(&key) {
            debug!(%key, "Returning cached topomap");
            return Ok(hit);
        }

        let frame = build_frame(recording, time_point, self.half_width)?;
        let png = Arc::new(Bytes::from(self.painter.paint(&frame)?));
        info!(
            "Topomap generated and cached for t={:.2}s ({} channels, {} bytes)",
            frame.actual_time,
            frame.values.len(),
            png.len()
        );
        self.cache.set(key, png.clone(), self.ttl);
        Ok(png)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use ndarray::Array2;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingPainter {
        calls: AtomicUsize,
    }

    impl FramePainter for CountingPainter {
        fn paint(&self, frame: &TopographicFrame) -> Result<Vec<u8>, ServiceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(format!("frame@{}", frame.sample_index).into_bytes())
        }
    }

    fn recording(labels: &[&str]) -> Recording {
        // Each channel ramps 0, 1, 2, ... at 10 Hz for 5 s
        let data = Array2::from_shape_fn((labels.len(), 51), |(_, i)| i as f64);
        Recording::new(labels.iter().map(|s| s.to_string()).collect(), data, 10.0).unwrap()
    }

    fn renderer(painter: Arc<CountingPainter>) -> TopomapRenderer {
        TopomapRenderer::new(
            painter,
            Arc::new(MemoryCache::<Bytes>::new("topomaps", 16)),
            0.5,
            Duration::from_secs(300),
        )
    }

    #[test]
    fn test_nearest_index_rule() {
        let times = [0.0, 0.5, 1.0];
        assert_eq!(nearest_index(&times, 0.26), Some(1));
        assert_eq!(nearest_index(&times, 0.24), Some(0));
        assert_eq!(nearest_index(&times, 0.25), Some(0));
        assert_eq!(nearest_index(&times, -4.0), Some(0));
        assert_eq!(nearest_index(&times, 9.0), Some(2));
        assert_eq!(nearest_index(&[], 1.0), None);
    }

    #[test]
    fn test_frame_averages_symmetric_window() {
        let frame = build_frame(&recording(&["Fz", "Cz"]), 2.0, 0.5).unwrap();
        // idx 20, w 5 -> samples 15..25
        assert_eq!(frame.sample_index, 20);
        assert_eq!(frame.values, vec![19.5, 19.5]);
    }

    #[test]
    fn test_frame_window_narrows_at_edges() {
        let rec = recording(&["Cz"]);
        assert_eq!(build_frame(&rec, 0.0, 0.5).unwrap().values, vec![2.0]);
        assert_eq!(build_frame(&rec, 5.0, 0.5).unwrap().values, vec![47.5]);
        assert_eq!(build_frame(&rec, 5.0, 0.0).unwrap().values, vec![50.0]);
    }

    #[test]
    fn test_huge_half_width_covers_whole_recording() {
        let frame = build_frame(&recording(&["Cz"]), 2.0, 1e20).unwrap();
        assert_eq!(frame.values, vec![25.0]);
    }

    #[test]
    fn test_unpositioned_channels_are_skipped() {
        let frame = build_frame(&recording(&["Cz", "EOG Left"]), 1.0, 0.5).unwrap();
        assert_eq!(frame.channel_names, vec!["Cz".to_string()]);

        let err = build_frame(&recording(&["EOG Left"]), 1.0, 0.5).unwrap_err();
        assert!(matches!(err, ServiceError::Render(_)));
    }

    #[test]
    fn test_cache_key_rounds_to_centiseconds() {
        assert_eq!(TopomapRenderer::cache_key(1.234), "topomap:1.23");
        assert_eq!(TopomapRenderer::cache_key(1.0), "topomap:1.00");
        assert_eq!(TopomapRenderer::cache_key(-0.001), "topomap:0.00");
    }

    #[test]
    fn test_nearby_requests_hit_cache_without_repainting() {
        let painter = Arc::new(CountingPainter {
            calls: AtomicUsize::new(0),
        });
        let renderer = renderer(painter.clone());
        let rec = recording(&["Fz", "Cz", "Pz"]);

        let first = renderer.render(&rec, 1.231).unwrap();
        let second = renderer.render(&rec, 1.229).unwrap();
        assert_eq!(first, second);
        assert_eq!(painter.calls.load(Ordering::SeqCst), 1);

        renderer.render(&rec, 2.5).unwrap();
        assert_eq!(painter.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_non_finite_time_rejected() {
        let renderer = renderer(Arc::new(CountingPainter {
            calls: AtomicUsize::new(0),
        }));
        let err = renderer.render(&recording(&["Cz"]), f64::NAN).unwrap_err();
        assert!(matches!(err, ServiceError::InvalidTimePoint(_)));
    }

    #[test]
    fn test_png_painter_output() {
        let frame = build_frame(&recording(&["Fz", "Cz", "Pz", "C3", "C4"]), 2.0, 0.5).unwrap();
        let png = PngPainter::default().paint(&frame).unwrap();
        assert_eq!(&png[1..4], b"PNG");
    }
}
