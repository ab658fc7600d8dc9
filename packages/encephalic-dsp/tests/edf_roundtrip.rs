use encephalic_dsp::{
    demo_recording, read_recording, welch, write_recording, ChannelType, Recording,
    SensorSelection, SignalError, SyntheticConfig, WelchParams,
};
use ndarray::Array2;
use std::fs::OpenOptions;
use std::io::{Seek, SeekFrom, Write};
use std::path::PathBuf;

fn write_demo(dir: &tempfile::TempDir) -> (PathBuf, Recording) {
    let recording = demo_recording(&SyntheticConfig {
        duration: 4.0,
        sfreq: 128.0,
        seed: 7,
    })
    .expect("demo recording");
    let path = dir.path().join("demo.edf");
    write_recording(&path, &recording).expect("write EDF");
    (path, recording)
}

#[test]
fn test_roundtrip_preserves_samples_within_quantization() {
    let dir = tempfile::tempdir().unwrap();
    let (path, original) = write_demo(&dir);

    let loaded = read_recording(&path, SensorSelection::All).unwrap();
    assert_eq!(loaded.channel_names(), original.channel_names());
    assert_eq!(loaded.sfreq(), 128.0);
    assert_eq!(loaded.n_samples(), original.n_samples());

    let max_error = loaded
        .data()
        .iter()
        .zip(original.data().iter())
        .fold(0.0f64, |acc, (a, b)| acc.max((a - b).abs()));
    assert!(max_error < 0.05, "max quantization error {}", max_error);
}

#[test]
fn test_sensor_selection_filters_channels() {
    let dir = tempfile::tempdir().unwrap();
    let (path, _) = write_demo(&dir);

    let eeg = read_recording(&path, SensorSelection::Only(ChannelType::Eeg)).unwrap();
    assert_eq!(eeg.n_channels(), 19);
    assert!(eeg.channels().iter().all(|c| c.position.is_some()));

    let eog = read_recording(&path, SensorSelection::Only(ChannelType::Eog)).unwrap();
    assert_eq!(eog.channel_names(), vec!["EOG Left".to_string()]);

    let err = read_recording(&path, SensorSelection::Only(ChannelType::Meg)).unwrap_err();
    assert!(matches!(err, SignalError::NoChannels { .. }));
}

#[test]
fn test_truncated_file_is_a_parse_error() {
    let dir = tempfile::tempdir().unwrap();
    let (path, _) = write_demo(&dir);

    let len = std::fs::metadata(&path).unwrap().len();
    let file = OpenOptions::new().write(true).open(&path).unwrap();
    file.set_len(len - 100).unwrap();

    let err = read_recording(&path, SensorSelection::All).unwrap_err();
    assert!(matches!(err, SignalError::ParseError(_)), "{:?}", err);
}

#[test]
fn test_unknown_record_count_is_inferred() {
    let dir = tempfile::tempdir().unwrap();
    let (path, original) = write_demo(&dir);

    let mut file = OpenOptions::new().write(true).open(&path).unwrap();
    file.seek(SeekFrom::Start(236)).unwrap();
    file.write_all(b"-1      ").unwrap();
    drop(file);

    let loaded = read_recording(&path, SensorSelection::All).unwrap();
    assert_eq!(loaded.n_samples(), original.n_samples());
}

#[test]
fn test_missing_file() {
    let err = read_recording("/nonexistent/sample.edf", SensorSelection::All).unwrap_err();
    assert!(matches!(err, SignalError::FileNotFound(_)));
}

#[test]
fn test_fractional_rate_cannot_be_exported() {
    let dir = tempfile::tempdir().unwrap();
    let recording = Recording::new(vec!["Cz".into()], Array2::zeros((1, 100)), 100.5).unwrap();
    let err = write_recording(dir.path().join("x.edf"), &recording).unwrap_err();
    assert!(matches!(err, SignalError::InvalidParameter(_)));
}

#[test]
fn test_occipital_alpha_peak_survives_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let (path, _) = write_demo(&dir);
    let loaded = read_recording(&path, SensorSelection::Only(ChannelType::Eeg)).unwrap();

    let o1 = loaded
        .channel_names()
        .iter()
        .position(|n| n == "O1")
        .unwrap();
    let spectrum = welch(loaded.data(), loaded.sfreq(), &WelchParams::default()).unwrap();
    let psd = &spectrum.channel_psds[o1];
    let peak = (0..psd.len())
        .max_by(|&a, &b| psd[a].total_cmp(&psd[b]))
        .unwrap();
    assert!((spectrum.frequencies[peak] - 10.0).abs() < 1e-9);
}
