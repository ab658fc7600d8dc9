//! Deterministic synthetic EEG for demos and tests.

use crate::error::{Result, SignalError};
use crate::montage::position_for;
use crate::recording::Recording;
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f64::consts::PI;

/// The 19 electrodes of the classic 10-20 layout plus one EOG channel.
pub const DEMO_CHANNELS: &[&str] = &[
    "Fp1", "Fp2", "F7", "F3", "Fz", "F4", "F8", "T7", "C3", "Cz", "C4", "T8", "P7", "P3", "Pz",
    "P4", "P8", "O1", "O2", "EOG Left",
];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyntheticConfig {
    pub duration: f64,
    pub sfreq: f64,
    pub seed: u64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            duration: 60.0,
            sfreq: 256.0,
            seed: 42,
        }
    }
}

/// Build a resting-state-like recording in microvolts.
///
/// Occipital sites carry a dominant 10 Hz alpha rhythm, frontal sites a 6 Hz
/// theta component, and every channel gets low-amplitude 20 Hz beta plus
/// uniform noise. The same config always yields the same samples.
pub fn demo_recording(config: &SyntheticConfig) -> Result<Recording> {
    if !(config.sfreq.is_finite() && config.sfreq > 0.0) {
        return Err(SignalError::InvalidParameter(format!(
            "sampling frequency must be positive, got {}",
            config.sfreq
        )));
    }
    let n_samples = (config.duration * config.sfreq).round();
    if !(n_samples.is_finite() && n_samples >= 2.0) {
        return Err(SignalError::InvalidParameter(format!(
            "duration {}s at {} Hz yields fewer than two samples",
            config.duration, config.sfreq
        )));
    }
    let n_samples = n_samples as usize;

    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut data = Array2::<f64>::zeros((DEMO_CHANNELS.len(), n_samples));

    for (ch, label) in DEMO_CHANNELS.iter().enumerate() {
        let phase = rng.gen_range(0.0..2.0 * PI);
        let mut row = data.row_mut(ch);

        let Some(position) = position_for(label) else {
            // Slow blink-like drift for the ocular channel
            for (i, sample) in row.iter_mut().enumerate() {
                let t = i as f64 / config.sfreq;
                *sample = 80.0 * (2.0 * PI * 0.3 * t + phase).sin() + rng.gen_range(-5.0..5.0);
            }
            continue;
        };

        let alpha = 20.0 * (1.0 - position.y) / 2.0 + 2.0;
        let theta = 8.0 * (1.0 + position.y) / 2.0 + 1.0;
        for (i, sample) in row.iter_mut().enumerate() {
            let t = i as f64 / config.sfreq;
            *sample = alpha * (2.0 * PI * 10.0 * t + phase).sin()
                + theta * (2.0 * PI * 6.0 * t + 0.5 * phase).cos()
                + 3.0 * (2.0 * PI * 20.0 * t).sin()
                + rng.gen_range(-4.0..4.0);
        }
    }

    log::debug!(
        "Generated synthetic recording: {} channels, {} samples at {} Hz",
        DEMO_CHANNELS.len(),
        n_samples,
        config.sfreq
    );

    Recording::new(
        DEMO_CHANNELS.iter().map(|s| s.to_string()).collect(),
        data,
        config.sfreq,
    )
}
