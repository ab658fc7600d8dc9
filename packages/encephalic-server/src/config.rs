use encephalic_dsp::SensorSelection;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Server configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to listen on
    pub port: u16,
    /// Bind address (0.0.0.0 for LAN, 127.0.0.1 for localhost)
    pub bind_addr: String,
    /// EDF recording served by this process
    pub data_file: PathBuf,
    /// Channels kept when loading the recording
    pub sensor_selection: SensorSelection,
    /// Maximum entries per response cache
    pub cache_capacity: usize,
    pub window_cache_ttl: Duration,
    pub topomap_cache_ttl: Duration,
    pub psd_cache_ttl: Duration,
    /// Half-width of the averaging window around a topomap time point, in seconds
    pub topomap_half_width: f64,
    /// Upper frequency bound of the PSD, in Hz
    pub psd_fmax: f64,
    /// Welch segment length
    pub psd_n_fft: usize,
    /// CORS allowed origins (comma-separated in env var)
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8000,
            bind_addr: "0.0.0.0".to_string(),
            data_file: PathBuf::from("data/sample_eeg.edf"),
            sensor_selection: SensorSelection::Only(encephalic_dsp::ChannelType::Eeg),
            cache_capacity: 1000,
            window_cache_ttl: Duration::from_secs(300),
            topomap_cache_ttl: Duration::from_secs(300),
            psd_cache_ttl: Duration::from_secs(600),
            topomap_half_width: 0.5,
            psd_fmax: 50.0,
            psd_n_fft: 256,
            cors_origins: vec![
                "http://localhost:3000".to_string(),
                "http://frontend:3000".to_string(),
            ],
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        let config = Self {
            port: env::var("ENCEPHALIC_PORT")
                .map(|v| v.trim().parse::<u16>().map_err(|_| ConfigError::InvalidPort))
                .unwrap_or(Ok(defaults.port))?,
            bind_addr: env::var("ENCEPHALIC_BIND_ADDR").unwrap_or(defaults.bind_addr),
            data_file: env::var("ENCEPHALIC_DATA_FILE")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_file),
            sensor_selection: match env::var("ENCEPHALIC_SENSOR_TYPE") {
                Ok(raw) => raw.parse().map_err(|e: String| {
                    ConfigError::InvalidValue(format!("ENCEPHALIC_SENSOR_TYPE: {}", e))
                })?,
                Err(_) => defaults.sensor_selection,
            },
            cache_capacity: parse_var("ENCEPHALIC_CACHE_CAPACITY", defaults.cache_capacity)?,
            window_cache_ttl: Duration::from_secs(parse_var(
                "WINDOW_CACHE_TTL_SECONDS",
                defaults.window_cache_ttl.as_secs(),
            )?),
            topomap_cache_ttl: Duration::from_secs(parse_var(
                "TOPOMAP_CACHE_TTL_SECONDS",
                defaults.topomap_cache_ttl.as_secs(),
            )?),
            psd_cache_ttl: Duration::from_secs(parse_var(
                "PSD_CACHE_TTL_SECONDS",
                defaults.psd_cache_ttl.as_secs(),
            )?),
            topomap_half_width: parse_var("TOPOMAP_HALF_WIDTH_SECONDS", defaults.topomap_half_width)?,
            psd_fmax: parse_var("PSD_FMAX", defaults.psd_fmax)?,
            psd_n_fft: parse_var("PSD_N_FFT", defaults.psd_n_fft)?,
            cors_origins: env::var("CORS_ORIGINS")
                .map(|s| s.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or(defaults.cors_origins),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache_capacity == 0 {
            return Err(ConfigError::InvalidValue(
                "ENCEPHALIC_CACHE_CAPACITY must be at least 1".to_string(),
            ));
        }
        if !(self.topomap_half_width.is_finite() && self.topomap_half_width >= 0.0) {
            return Err(ConfigError::InvalidValue(
                "TOPOMAP_HALF_WIDTH_SECONDS must be a non-negative number".to_string(),
            ));
        }
        if !(self.psd_fmax.is_finite() && self.psd_fmax > 0.0) {
            return Err(ConfigError::InvalidValue(
                "PSD_FMAX must be a positive number".to_string(),
            ));
        }
        if self.psd_n_fft < 2 {
            return Err(ConfigError::InvalidValue(
                "PSD_N_FFT must be at least 2".to_string(),
            ));
        }
        Ok(())
    }

    /// Get the full bind address (addr:port)
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }
}

fn parse_var<T: FromStr>(name: &str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(format!("{}={}", name, raw))),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid port number")]
    InvalidPort,
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}
