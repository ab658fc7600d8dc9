pub mod channels;
pub mod edf;
pub mod error;
pub mod montage;
pub mod recording;
pub mod spectral;
pub mod synthetic;
pub mod topomap;

pub use channels::{classify_channel_label, ChannelType, SensorSelection};
pub use edf::{read_recording, write_recording, EdfReader, EdfWriter};
pub use error::{Result, SignalError};
pub use montage::{position_for, SensorPosition};
pub use recording::{ChannelInfo, Recording};
pub use spectral::{welch, PowerSpectrum, WelchParams};
pub use synthetic::{demo_recording, SyntheticConfig};
pub use topomap::{render_png, TopomapStyle};
