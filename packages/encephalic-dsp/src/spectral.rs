//! Welch power spectral density estimate.

use crate::error::{Result, SignalError};
use ndarray::ArrayView2;
use rayon::prelude::*;
use rustfft::{num_complex::Complex, FftPlanner};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::f64::consts::PI;

// Thread-local FFT planner so rayon workers reuse their cached plans
thread_local! {
    static FFT_PLANNER: RefCell<FftPlanner<f64>> = RefCell::new(FftPlanner::new());
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WelchParams {
    /// Segment length; shortened to the signal length for short recordings.
    pub n_fft: usize,
    pub n_overlap: usize,
    pub fmin: f64,
    pub fmax: f64,
}

impl Default for WelchParams {
    fn default() -> Self {
        Self {
            n_fft: 256,
            n_overlap: 0,
            fmin: 0.0,
            fmax: 50.0,
        }
    }
}

/// One-sided power spectral density per channel, in units²/Hz.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerSpectrum {
    pub frequencies: Vec<f64>,
    pub channel_psds: Vec<Vec<f64>>,
}

impl PowerSpectrum {
    /// Mean over channels for every frequency bin.
    pub fn mean_spectrum(&self) -> Vec<f64> {
        let n_channels = self.channel_psds.len();
        if n_channels == 0 {
            return vec![0.0; self.frequencies.len()];
        }
        (0..self.frequencies.len())
            .map(|k| self.channel_psds.iter().map(|psd| psd[k]).sum::<f64>() / n_channels as f64)
            .collect()
    }
}

/// Periodic Hamming window.
pub fn hamming(n: usize) -> Vec<f64> {
    (0..n)
        .map(|i| 0.54 - 0.46 * (2.0 * PI * i as f64 / n as f64).cos())
        .collect()
}

/// Welch estimate over each row of `data` (channels × samples).
///
/// Segments of `n_fft` samples advance by `n_fft - n_overlap`, are Hamming
/// windowed, and their periodograms are averaged. Only bins with
/// `fmin <= f <= fmax` are returned.
pub fn welch(data: ArrayView2<'_, f64>, sfreq: f64, params: &WelchParams) -> Result<PowerSpectrum> {
    if !(sfreq.is_finite() && sfreq > 0.0) {
        return Err(SignalError::InvalidParameter(format!(
            "sampling frequency must be positive, got {}",
            sfreq
        )));
    }
    if params.fmax < params.fmin {
        return Err(SignalError::InvalidParameter(format!(
            "fmax {} is below fmin {}",
            params.fmax, params.fmin
        )));
    }

    let n_samples = data.ncols();
    if n_samples == 0 {
        return Err(SignalError::InvalidData("cannot estimate PSD of an empty signal".to_string()));
    }
    let n_fft = params.n_fft.min(n_samples).max(1);
    if params.n_overlap >= n_fft {
        return Err(SignalError::InvalidParameter(format!(
            "overlap {} must be smaller than segment length {}",
            params.n_overlap, n_fft
        )));
    }
    let step = n_fft - params.n_overlap;

    let window = hamming(n_fft);
    let window_power: f64 = window.iter().map(|w| w * w).sum();
    let scale = 1.0 / (sfreq * window_power);

    let resolution = sfreq / n_fft as f64;
    let bins: Vec<usize> = (0..=n_fft / 2)
        .filter(|&k| {
            let f = k as f64 * resolution;
            f >= params.fmin && f <= params.fmax
        })
        .collect();
    let frequencies: Vec<f64> = bins.iter().map(|&k| k as f64 * resolution).collect();

    log::debug!(
        "Welch PSD: {} channels, n_fft={}, step={}, {} bins up to {} Hz",
        data.nrows(),
        n_fft,
        step,
        bins.len(),
        params.fmax
    );

    let rows: Vec<Vec<f64>> = data.outer_iter().map(|row| row.to_vec()).collect();
    let channel_psds = rows
        .par_iter()
        .map(|signal| channel_psd(signal, n_fft, step, &window, scale, &bins))
        .collect();

    Ok(PowerSpectrum {
        frequencies,
        channel_psds,
    })
}

fn channel_psd(
    signal: &[f64],
    n_fft: usize,
    step: usize,
    window: &[f64],
    scale: f64,
    bins: &[usize],
) -> Vec<f64> {
    let fft = FFT_PLANNER.with(|planner| planner.borrow_mut().plan_fft_forward(n_fft));
    let nyquist = if n_fft % 2 == 0 { Some(n_fft / 2) } else { None };

    let mut accumulated = vec![0.0; bins.len()];
    let mut n_segments = 0usize;
    let mut buffer = vec![Complex::new(0.0, 0.0); n_fft];

    let mut start = 0;
    while start + n_fft <= signal.len() {
        for (slot, (&x, &w)) in buffer
            .iter_mut()
            .zip(signal[start..start + n_fft].iter().zip(window))
        {
            *slot = Complex::new(x * w, 0.0);
        }
        fft.process(&mut buffer);

        for (acc, &k) in accumulated.iter_mut().zip(bins) {
            let mut power = buffer[k].norm_sqr() * scale;
            // Fold negative frequencies into the one-sided spectrum
            if k != 0 && Some(k) != nyquist {
                power *= 2.0;
            }
            *acc += power;
        }
        n_segments += 1;
        start += step;
    }

    if n_segments > 0 {
        for acc in &mut accumulated {
            *acc /= n_segments as f64;
        }
    }
    accumulated
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn sine(freq: f64, sfreq: f64, n: usize, amplitude: f64) -> Vec<f64> {
        (0..n)
            .map(|i| amplitude * (2.0 * PI * freq * i as f64 / sfreq).sin())
            .collect()
    }

    #[test]
    fn test_peak_at_signal_frequency() {
        let sfreq = 256.0;
        let signal = sine(10.0, sfreq, 2560, 1.0);
        let data = Array2::from_shape_vec((1, signal.len()), signal).unwrap();
        let spectrum = welch(data.view(), sfreq, &WelchParams::default()).unwrap();

        let (peak, _) = spectrum.channel_psds[0]
            .iter()
            .enumerate()
            .fold((0, f64::MIN), |best, (i, &p)| if p > best.1 { (i, p) } else { best });
        assert!((spectrum.frequencies[peak] - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_frequencies_bounded_by_fmax() {
        let sfreq = 512.0;
        let data = Array2::from_shape_vec((2, 1024), vec![0.5; 2048]).unwrap();
        let spectrum = welch(data.view(), sfreq, &WelchParams::default()).unwrap();

        assert_eq!(spectrum.frequencies.first(), Some(&0.0));
        assert!(spectrum.frequencies.iter().all(|&f| f <= 50.0));
        assert!(spectrum.frequencies.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(spectrum.channel_psds.len(), 2);
        assert_eq!(spectrum.channel_psds[0].len(), spectrum.frequencies.len());
    }

    #[test]
    fn test_total_power_matches_variance() {
        // Parseval: integrating a density-scaled PSD recovers the signal power
        let sfreq = 200.0;
        let signal = sine(20.0, sfreq, 2000, 2.0);
        let data = Array2::from_shape_vec((1, signal.len()), signal).unwrap();
        let params = WelchParams {
            fmax: 100.0,
            ..WelchParams::default()
        };
        let spectrum = welch(data.view(), sfreq, &params).unwrap();
        let df = spectrum.frequencies[1] - spectrum.frequencies[0];
        let total: f64 = spectrum.channel_psds[0].iter().sum::<f64>() * df;
        assert!((total - 2.0).abs() < 0.2, "total power {}", total);
    }

    #[test]
    fn test_short_signal_uses_whole_length() {
        let data = Array2::from_shape_vec((1, 100), sine(5.0, 100.0, 100, 1.0)).unwrap();
        let spectrum = welch(data.view(), 100.0, &WelchParams::default()).unwrap();
        assert!((spectrum.frequencies[1] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_mean_spectrum() {
        let spectrum = PowerSpectrum {
            frequencies: vec![0.0, 1.0],
            channel_psds: vec![vec![1.0, 2.0], vec![3.0, 6.0]],
        };
        assert_eq!(spectrum.mean_spectrum(), vec![2.0, 4.0]);
    }

    #[test]
    fn test_rejects_overlap_not_smaller_than_segment() {
        let data = Array2::<f64>::zeros((1, 512));
        let params = WelchParams {
            n_overlap: 256,
            ..WelchParams::default()
        };
        assert!(welch(data.view(), 256.0, &params).is_err());
    }
}
