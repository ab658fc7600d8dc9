use chrono::{DateTime, Utc};
use encephalic_dsp::{read_recording, Recording, SensorSelection};
use parking_lot::{Condvar, Mutex};
use serde::Serialize;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

use crate::error::ServiceError;

/// Where the served recording comes from.
pub trait RecordingSource: Send + Sync {
    fn load(&self) -> Result<Recording, ServiceError>;

    /// Human-readable origin, used in logs.
    fn describe(&self) -> String;
}

/// Reads an EDF file and keeps the configured sensor type.
pub struct EdfSource {
    path: PathBuf,
    selection: SensorSelection,
}

impl EdfSource {
    pub fn new(path: impl Into<PathBuf>, selection: SensorSelection) -> Self {
        Self {
            path: path.into(),
            selection,
        }
    }
}

impl RecordingSource for EdfSource {
    fn load(&self) -> Result<Recording, ServiceError> {
        read_recording(&self.path, self.selection).map_err(|e| {
            error!("Failed to load {:?}: {}", self.path, e);
            ServiceError::from_load(e)
        })
    }

    fn describe(&self) -> String {
        format!("{} ({} channels)", self.path.display(), self.selection)
    }
}

/// A recording that is already in memory.
pub struct InMemorySource {
    recording: Recording,
}

impl InMemorySource {
    pub fn new(recording: Recording) -> Self {
        Self { recording }
    }
}

impl RecordingSource for InMemorySource {
    fn load(&self) -> Result<Recording, ServiceError> {
        Ok(self.recording.clone())
    }

    fn describe(&self) -> String {
        "in-memory recording".to_string()
    }
}

enum LoadState {
    NotStarted,
    Loading,
    Ready {
        recording: Arc<Recording>,
        loaded_at: DateTime<Utc>,
    },
    Failed(ServiceError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoaderStatus {
    NotStarted,
    Loading,
    Ready,
    Failed,
}

/// Loads the recording at most once per process.
///
/// Concurrent callers of [`RecordingLoader::load`] block on the single
/// in-flight load and all observe its outcome. Failures are final.
pub struct RecordingLoader {
    source: Arc<dyn RecordingSource>,
    state: Mutex<LoadState>,
    settled: Condvar,
}

impl RecordingLoader {
    pub fn new(source: Arc<dyn RecordingSource>) -> Self {
        Self {
            source,
            state: Mutex::new(LoadState::NotStarted),
            settled: Condvar::new(),
        }
    }

    /// Blocking; run it off the async runtime.
    pub fn load(&self) -> Result<Arc<Recording>, ServiceError> {
        {
            let mut state = self.state.lock();
            loop {
                match &*state {
                    LoadState::Ready { recording, .. } => return Ok(recording.clone()),
                    LoadState::Failed(err) => return Err(err.clone()),
                    LoadState::Loading => self.settled.wait(&mut state),
                    LoadState::NotStarted => break,
                }
            }
            *state = LoadState::Loading;
        }

        info!("Loading recording from {}", self.source.describe());
        let started = Instant::now();
        let outcome = catch_unwind(AssertUnwindSafe(|| self.source.load())).unwrap_or_else(|panic| {
            Err(ServiceError::DataUnavailable(format!(
                "recording source panicked: {}",
                panic_message(panic.as_ref())
            )))
        });

        let result = {
            let mut state = self.state.lock();
            match outcome {
                Ok(recording) => {
                    let recording = Arc::new(recording);
                    info!(
                        "Recording ready in {:.2?}: {} channels, {} samples at {} Hz",
                        started.elapsed(),
                        recording.n_channels(),
                        recording.n_samples(),
                        recording.sfreq()
                    );
                    *state = LoadState::Ready {
                        recording: recording.clone(),
                        loaded_at: Utc::now(),
                    };
                    Ok(recording)
                }
                Err(err) => {
                    error!("Recording load failed: {}", err);
                    *state = LoadState::Failed(err.clone());
                    Err(err)
                }
            }
        };
        self.settled.notify_all();
        result
    }

    /// Non-blocking accessor for request handlers.
    pub fn current(&self) -> Result<Arc<Recording>, ServiceError> {
        match &*self.state.lock() {
            LoadState::Ready { recording, .. } => Ok(recording.clone()),
            LoadState::Failed(err) => Err(err.clone()),
            LoadState::NotStarted | LoadState::Loading => Err(ServiceError::Initializing),
        }
    }

    pub fn status(&self) -> LoaderStatus {
        match &*self.state.lock() {
            LoadState::NotStarted => LoaderStatus::NotStarted,
            LoadState::Loading => LoaderStatus::Loading,
            LoadState::Ready { .. } => LoaderStatus::Ready,
            LoadState::Failed(_) => LoaderStatus::Failed,
        }
    }

    pub fn loaded_at(&self) -> Option<DateTime<Utc>> {
        match &*self.state.lock() {
            LoadState::Ready { loaded_at, .. } => Some(*loaded_at),
            _ => None,
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
