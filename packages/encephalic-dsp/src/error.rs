use thiserror::Error;

#[derive(Error, Debug)]
pub enum SignalError {
    #[error("Recording file not found: {0}")]
    FileNotFound(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse EDF file: {0}")]
    ParseError(String),

    #[error("No {sensor} channels found in recording")]
    NoChannels { sensor: String },

    #[error("Invalid recording data: {0}")]
    InvalidData(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Failed to render image: {0}")]
    RenderError(String),
}

impl<E: std::error::Error + Send + Sync + 'static> From<plotters::drawing::DrawingAreaErrorKind<E>>
    for SignalError
{
    fn from(value: plotters::drawing::DrawingAreaErrorKind<E>) -> Self {
        SignalError::RenderError(format!("{value:?}"))
    }
}

impl From<image::ImageError> for SignalError {
    fn from(value: image::ImageError) -> Self {
        SignalError::RenderError(value.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SignalError>;
