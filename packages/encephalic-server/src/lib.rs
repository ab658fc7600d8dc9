pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod handlers;
pub mod loader;
pub mod router;
pub mod spectral;
pub mod state;
pub mod topomap;
pub mod window;

pub use cache::{CacheStats, MemoryCache, ResponseCache};
pub use config::ServerConfig;
pub use error::{ApiError, ServiceError};
pub use loader::{EdfSource, InMemorySource, LoaderStatus, RecordingLoader, RecordingSource};
pub use router::create_router;
pub use state::AppState;
