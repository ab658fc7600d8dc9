use anyhow::Context;
use clap::Parser;
use encephalic_dsp::{demo_recording, write_recording, SyntheticConfig};
use encephalic_server::{
    cli::{Cli, Commands},
    config::ServerConfig,
    create_router, AppState, EdfSource,
};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::time;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const VERSION: &str = env!("CARGO_PKG_VERSION");
const PURGE_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "encephalic_server=info,encephalic_dsp=info,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::GenerateDemo {
            output,
            duration,
            sfreq,
            seed,
        }) => {
            return generate_demo(&output, duration, sfreq, seed);
        }
        Some(Commands::Serve) | None => {}
    }

    let config = ServerConfig::from_env().context("invalid configuration")?;

    info!("🚀 Starting Encephalic Server v{}", VERSION);
    info!("📋 Configuration loaded:");
    info!("   Bind address: {}", config.bind_address());
    info!("   Recording: {:?} ({} channels)", config.data_file, config.sensor_selection);
    info!("   Cache capacity: {} entries per cache", config.cache_capacity);
    info!(
        "   Cache TTLs: window {:?}, topomap {:?}, psd {:?}",
        config.window_cache_ttl, config.topomap_cache_ttl, config.psd_cache_ttl
    );
    info!("   CORS origins: {:?}", config.cors_origins);

    let source = Arc::new(EdfSource::new(config.data_file.clone(), config.sensor_selection));
    let state = Arc::new(AppState::new(config.clone(), source));

    // Load the recording in the background; handlers answer 503 until it is ready
    {
        let loader = state.loader.clone();
        tokio::task::spawn_blocking(move || {
            if let Err(e) = loader.load() {
                error!("Recording unavailable, data endpoints will return 503: {}", e);
            }
        });
    }

    // Spawn background task to purge expired cache entries
    {
        let state = state.clone();
        tokio::spawn(async move {
            let mut interval = time::interval(PURGE_INTERVAL);
            loop {
                interval.tick().await;
                let purged = state.caches.purge_expired();
                if purged > 0 {
                    info!("Purged {} expired cache entries", purged);
                }
            }
        });
    }

    let app = create_router(state);

    let addr: SocketAddr = config
        .bind_address()
        .parse()
        .with_context(|| format!("invalid bind address {}", config.bind_address()))?;
    info!("🎧 Listening on http://{}", addr);
    info!("🔑 Health endpoint: http://{}/api/health", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

fn generate_demo(output: &Path, duration: f64, sfreq: f64, seed: u64) -> anyhow::Result<()> {
    let recording = demo_recording(&SyntheticConfig {
        duration,
        sfreq,
        seed,
    })?;

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    write_recording(output, &recording)?;

    info!(
        "Wrote demo recording to {}: {} channels, {:.1}s at {} Hz",
        output.display(),
        recording.n_channels(),
        recording.duration(),
        recording.sfreq()
    );
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
