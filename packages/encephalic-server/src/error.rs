use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use encephalic_dsp::SignalError;
use serde::Serialize;

/// Failures surfaced by the service components.
///
/// Cloneable so a failed load can be reported to every later caller.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ServiceError {
    #[error("Recording unavailable: {0}")]
    DataUnavailable(String),

    #[error("No {sensor} channels found in recording")]
    NoChannels { sensor: String },

    #[error("Invalid time range: {0}")]
    InvalidRange(String),

    #[error("Invalid time point: {0}")]
    InvalidTimePoint(String),

    #[error("Failed to render topomap: {0}")]
    Render(String),

    #[error("Computation failed: {0}")]
    Computation(String),

    #[error("Recording is still loading")]
    Initializing,
}

impl ServiceError {
    /// Translate a load failure from the signal library.
    pub fn from_load(err: SignalError) -> Self {
        match err {
            SignalError::NoChannels { sensor } => ServiceError::NoChannels { sensor },
            other => ServiceError::DataUnavailable(other.to_string()),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::InvalidRange(_) | ServiceError::InvalidTimePoint(_) => {
                StatusCode::BAD_REQUEST
            }
            ServiceError::Render(_) | ServiceError::Computation(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ServiceError::DataUnavailable(_)
            | ServiceError::NoChannels { .. }
            | ServiceError::Initializing => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl From<tokio::task::JoinError> for ServiceError {
    fn from(err: tokio::task::JoinError) -> Self {
        ServiceError::Computation(format!("worker task failed: {}", err))
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

/// HTTP-facing wrapper rendering a [`ServiceError`] as `{"error": ...}`.
#[derive(Debug)]
pub struct ApiError(pub ServiceError);

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        ApiError(err)
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        ApiError(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.0.status_code();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), "Request failed: {}", self.0);
        } else {
            tracing::warn!(status = status.as_u16(), "Request rejected: {}", self.0);
        }
        (
            status,
            Json(ErrorBody {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
