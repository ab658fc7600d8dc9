use crate::channels::{classify_channel_label, ChannelType};
use crate::error::{Result, SignalError};
use crate::montage::{position_for, SensorPosition};
use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub name: String,
    pub channel_type: ChannelType,
    pub position: Option<SensorPosition>,
}

impl ChannelInfo {
    /// Classify the label and resolve its montage position.
    pub fn from_label(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            channel_type: classify_channel_label(&name),
            position: position_for(&name),
            name,
        }
    }
}

/// An immutable multi-channel recording held fully in memory.
///
/// Rows of `data` are channels in file order, columns are samples.
#[derive(Debug, Clone)]
pub struct Recording {
    channels: Vec<ChannelInfo>,
    data: Array2<f64>,
    sfreq: f64,
}

impl Recording {
    pub fn new(channel_names: Vec<String>, data: Array2<f64>, sfreq: f64) -> Result<Self> {
        let channels = channel_names.into_iter().map(ChannelInfo::from_label).collect();
        Self::from_channels(channels, data, sfreq)
    }

    pub fn from_channels(channels: Vec<ChannelInfo>, data: Array2<f64>, sfreq: f64) -> Result<Self> {
        if !sfreq.is_finite() || sfreq <= 0.0 {
            return Err(SignalError::InvalidData(format!(
                "sampling frequency must be positive, got {}",
                sfreq
            )));
        }
        if channels.len() != data.nrows() {
            return Err(SignalError::InvalidData(format!(
                "{} channel labels for {} data rows",
                channels.len(),
                data.nrows()
            )));
        }
        if data.ncols() == 0 {
            return Err(SignalError::InvalidData("recording has no samples".to_string()));
        }

        let mut seen = HashSet::new();
        for channel in &channels {
            if !seen.insert(channel.name.as_str()) {
                return Err(SignalError::InvalidData(format!(
                    "duplicate channel label '{}'",
                    channel.name
                )));
            }
        }

        Ok(Self {
            channels,
            data,
            sfreq,
        })
    }

    pub fn channels(&self) -> &[ChannelInfo] {
        &self.channels
    }

    pub fn channel_names(&self) -> Vec<String> {
        self.channels.iter().map(|c| c.name.clone()).collect()
    }

    pub fn data(&self) -> ArrayView2<'_, f64> {
        self.data.view()
    }

    pub fn sfreq(&self) -> f64 {
        self.sfreq
    }

    pub fn n_channels(&self) -> usize {
        self.data.nrows()
    }

    pub fn n_samples(&self) -> usize {
        self.data.ncols()
    }

    /// Time of the last sample, in seconds from recording start.
    pub fn duration(&self) -> f64 {
        (self.n_samples() - 1) as f64 / self.sfreq
    }

    pub fn time_of(&self, sample: usize) -> f64 {
        sample as f64 / self.sfreq
    }

    pub fn times(&self) -> Vec<f64> {
        (0..self.n_samples()).map(|i| self.time_of(i)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_counts_sample_intervals() {
        let data = Array2::zeros((2, 1201));
        let rec = Recording::new(vec!["Fz".into(), "Cz".into()], data, 600.0).unwrap();
        assert_eq!(rec.n_samples(), 1201);
        assert!((rec.duration() - 2.0).abs() < 1e-12);
        assert_eq!(rec.channels()[1].channel_type, ChannelType::Eeg);
        assert!(rec.channels()[1].position.is_some());
    }

    #[test]
    fn test_rejects_mismatched_rows() {
        let data = Array2::zeros((3, 10));
        let err = Recording::new(vec!["Fz".into()], data, 100.0).unwrap_err();
        assert!(matches!(err, SignalError::InvalidData(_)));
    }

    #[test]
    fn test_rejects_duplicate_labels() {
        let data = Array2::zeros((2, 10));
        assert!(Recording::new(vec!["Fz".into(), "Fz".into()], data, 100.0).is_err());
    }

    #[test]
    fn test_rejects_bad_sampling_rate() {
        assert!(Recording::new(vec!["Fz".into()], Array2::zeros((1, 10)), 0.0).is_err());
        assert!(Recording::new(vec!["Fz".into()], Array2::zeros((1, 10)), f64::NAN).is_err());
    }
}
