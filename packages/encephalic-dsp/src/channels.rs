//! Channel type classification from EDF signal labels.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Standard 10-20 / 10-10 electrode labels (matched case-insensitively).
const EEG_10_20_LABELS: &[&str] = &[
    "fp1", "fp2", "f3", "f4", "c3", "c4", "p3", "p4", "o1", "o2", "f7", "f8", "t3", "t4", "t5",
    "t6", "t7", "t8", "p7", "p8", "fz", "cz", "pz", "oz", "af3", "af4", "af7", "af8", "afz", "f1",
    "f2", "f5", "f6", "f9", "f10", "fc1", "fc2", "fc3", "fc4", "fc5", "fc6", "fcz", "ft7", "ft8",
    "ft9", "ft10", "c1", "c2", "c5", "c6", "cp1", "cp2", "cp3", "cp4", "cp5", "cp6", "cpz", "tp7",
    "tp8", "tp9", "tp10", "p1", "p2", "p5", "p6", "p9", "p10", "po3", "po4", "po7", "po8", "poz",
    "o9", "o10", "fpz", "nz", "iz", "a1", "a2", "m1", "m2",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelType {
    Eeg,
    Eog,
    Ecg,
    Emg,
    Meg,
    Stim,
    Resp,
    Misc,
    Annotation,
    Unknown,
}

impl ChannelType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelType::Eeg => "eeg",
            ChannelType::Eog => "eog",
            ChannelType::Ecg => "ecg",
            ChannelType::Emg => "emg",
            ChannelType::Meg => "meg",
            ChannelType::Stim => "stim",
            ChannelType::Resp => "resp",
            ChannelType::Misc => "misc",
            ChannelType::Annotation => "annotation",
            ChannelType::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ChannelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChannelType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "eeg" => Ok(ChannelType::Eeg),
            "eog" => Ok(ChannelType::Eog),
            "ecg" | "ekg" => Ok(ChannelType::Ecg),
            "emg" => Ok(ChannelType::Emg),
            "meg" => Ok(ChannelType::Meg),
            "stim" => Ok(ChannelType::Stim),
            "resp" => Ok(ChannelType::Resp),
            "misc" => Ok(ChannelType::Misc),
            other => Err(format!("unknown channel type '{}'", other)),
        }
    }
}

/// Which channels survive loading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorSelection {
    All,
    Only(ChannelType),
}

impl SensorSelection {
    pub fn accepts(&self, channel_type: ChannelType) -> bool {
        match self {
            // Annotation channels never carry samples worth serving
            SensorSelection::All => channel_type != ChannelType::Annotation,
            SensorSelection::Only(wanted) => *wanted == channel_type,
        }
    }
}

impl fmt::Display for SensorSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SensorSelection::All => f.write_str("all"),
            SensorSelection::Only(t) => write!(f, "{}", t.as_str().to_uppercase()),
        }
    }
}

impl FromStr for SensorSelection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("all") {
            return Ok(SensorSelection::All);
        }
        s.parse::<ChannelType>().map(SensorSelection::Only)
    }
}

/// Strip type prefixes and reference suffixes: "EEG Fp1-REF" -> "fp1".
pub fn electrode_name(label: &str) -> String {
    let mut lower = label.trim().to_lowercase();
    for prefix in ["eeg ", "eeg-", "eeg_"] {
        if let Some(rest) = lower.strip_prefix(prefix) {
            lower = rest.trim().to_string();
            break;
        }
    }
    match lower.split_once('-') {
        Some((head, _)) if !head.is_empty() => head.trim().to_string(),
        _ => lower,
    }
}

/// Classify a single channel label.
///
/// Priority order:
/// 1. EDF+ annotation signal
/// 2. Type prefix ("EEG Fp1", "EOG Left")
/// 3. Known pattern (EOG, ECG, EMG, STIM, RESP)
/// 4. 10-20 electrode name
/// 5. Unknown
pub fn classify_channel_label(label: &str) -> ChannelType {
    let lower = label.trim().to_lowercase();
    if lower.is_empty() {
        return ChannelType::Unknown;
    }

    if lower.contains("annotations") {
        return ChannelType::Annotation;
    }

    if let Some(channel_type) = classify_by_prefix(&lower) {
        return channel_type;
    }

    if let Some(channel_type) = classify_by_pattern(&lower) {
        return channel_type;
    }

    if EEG_10_20_LABELS.contains(&electrode_name(&lower).as_str()) {
        return ChannelType::Eeg;
    }

    ChannelType::Unknown
}

fn classify_by_prefix(lower: &str) -> Option<ChannelType> {
    let prefixes: &[(&str, ChannelType)] = &[
        ("eeg ", ChannelType::Eeg),
        ("eog ", ChannelType::Eog),
        ("ecg ", ChannelType::Ecg),
        ("ekg ", ChannelType::Ecg),
        ("emg ", ChannelType::Emg),
        ("meg ", ChannelType::Meg),
        ("stim ", ChannelType::Stim),
        ("sti ", ChannelType::Stim),
        ("misc ", ChannelType::Misc),
        ("resp ", ChannelType::Resp),
    ];

    prefixes
        .iter()
        .find(|(prefix, _)| lower.starts_with(prefix))
        .map(|(_, channel_type)| *channel_type)
}

fn classify_by_pattern(lower: &str) -> Option<ChannelType> {
    if lower.starts_with("eog") || lower.ends_with("eog") {
        return Some(ChannelType::Eog);
    }
    if lower.starts_with("ecg") || lower.starts_with("ekg") {
        return Some(ChannelType::Ecg);
    }
    if lower.starts_with("emg") {
        return Some(ChannelType::Emg);
    }
    if lower.starts_with("stim")
        || lower.starts_with("sti0")
        || lower == "status"
        || lower == "trigger"
    {
        return Some(ChannelType::Stim);
    }
    if lower.starts_with("resp") {
        return Some(ChannelType::Resp);
    }
    None
}
