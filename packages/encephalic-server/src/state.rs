use bytes::Bytes;
use encephalic_dsp::WelchParams;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

use crate::cache::{CacheStats, MemoryCache, ResponseCache};
use crate::config::ServerConfig;
use crate::loader::{RecordingLoader, RecordingSource};
use crate::spectral::{BandPowerTable, SpectralEstimator, SpectralResult};
use crate::topomap::{FramePainter, PngPainter, TopomapRenderer};
use crate::window::{WindowData, WindowExtractor};

/// The concrete caches behind each component, kept for purging and stats.
pub struct CacheSet {
    pub windows: Arc<MemoryCache<WindowData>>,
    pub topomaps: Arc<MemoryCache<Bytes>>,
    pub psd: Arc<MemoryCache<SpectralResult>>,
    pub bands: Arc<MemoryCache<BandPowerTable>>,
}

#[derive(Debug, Serialize)]
pub struct CacheStatsResponse {
    pub windows: CacheStats,
    pub topomaps: CacheStats,
    pub psd: CacheStats,
    pub bands: CacheStats,
}

impl CacheSet {
    fn new(capacity: usize) -> Self {
        Self {
            windows: Arc::new(MemoryCache::new("windows", capacity)),
            topomaps: Arc::new(MemoryCache::new("topomaps", capacity)),
            psd: Arc::new(MemoryCache::new("psd", capacity)),
            bands: Arc::new(MemoryCache::new("bands", capacity)),
        }
    }

    pub fn purge_expired(&self) -> usize {
        self.windows.purge_expired()
            + self.topomaps.purge_expired()
            + self.psd.purge_expired()
            + self.bands.purge_expired()
    }

    pub fn stats(&self) -> CacheStatsResponse {
        CacheStatsResponse {
            windows: self.windows.stats(),
            topomaps: self.topomaps.stats(),
            psd: self.psd.stats(),
            bands: self.bands.stats(),
        }
    }
}

/// Main server state shared across all handlers
pub struct AppState {
    pub config: ServerConfig,
    pub loader: Arc<RecordingLoader>,
    pub windows: WindowExtractor,
    pub spectral: SpectralEstimator,
    pub topomaps: TopomapRenderer,
    pub caches: CacheSet,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(config: ServerConfig, source: Arc<dyn RecordingSource>) -> Self {
        Self::with_painter(config, source, Arc::new(PngPainter::default()))
    }

    pub fn with_painter(
        config: ServerConfig,
        source: Arc<dyn RecordingSource>,
        painter: Arc<dyn FramePainter>,
    ) -> Self {
        let caches = CacheSet::new(config.cache_capacity);

        let windows = WindowExtractor::new(caches.windows.clone(), config.window_cache_ttl);
        let spectral = SpectralEstimator::new(
            caches.psd.clone(),
            caches.bands.clone(),
            WelchParams {
                n_fft: config.psd_n_fft,
                fmax: config.psd_fmax,
                ..WelchParams::default()
            },
            config.psd_cache_ttl,
        );
        let topomaps = TopomapRenderer::new(
            painter,
            caches.topomaps.clone(),
            config.topomap_half_width,
            config.topomap_cache_ttl,
        );

        Self {
            loader: Arc::new(RecordingLoader::new(source)),
            windows,
            spectral,
            topomaps,
            caches,
            config,
            start_time: Instant::now(),
        }
    }

    /// Get uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
