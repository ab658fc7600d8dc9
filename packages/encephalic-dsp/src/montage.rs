//! Standard 10-20 montage projected onto the unit head disk.
//!
//! Coordinates are an azimuthal equidistant projection centred on Cz with the
//! nose pointing towards +y. The ring through Fpz, T7, Oz and T8 lies on the
//! unit circle, which is also where the head outline is drawn.

use crate::channels::electrode_name;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorPosition {
    pub x: f64,
    pub y: f64,
}

impl SensorPosition {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, x: f64, y: f64) -> f64 {
        ((self.x - x).powi(2) + (self.y - y).powi(2)).sqrt()
    }
}

const STANDARD_1020: &[(&str, f64, f64)] = &[
    ("fpz", 0.0, 1.0),
    ("fp1", -0.309, 0.951),
    ("fp2", 0.309, 0.951),
    ("afz", 0.0, 0.75),
    ("f7", -0.809, 0.588),
    ("f3", -0.405, 0.544),
    ("fz", 0.0, 0.5),
    ("f4", 0.405, 0.544),
    ("f8", 0.809, 0.588),
    ("fcz", 0.0, 0.25),
    ("t7", -1.0, 0.0),
    ("c5", -0.75, 0.0),
    ("c3", -0.5, 0.0),
    ("c1", -0.25, 0.0),
    ("cz", 0.0, 0.0),
    ("c2", 0.25, 0.0),
    ("c4", 0.5, 0.0),
    ("c6", 0.75, 0.0),
    ("t8", 1.0, 0.0),
    ("cpz", 0.0, -0.25),
    ("p7", -0.809, -0.588),
    ("p3", -0.405, -0.544),
    ("pz", 0.0, -0.5),
    ("p4", 0.405, -0.544),
    ("p8", 0.809, -0.588),
    ("poz", 0.0, -0.75),
    ("o1", -0.309, -0.951),
    ("oz", 0.0, -1.0),
    ("o2", 0.309, -0.951),
];

/// Old 10-20 temporal names map onto their 10-10 equivalents.
fn canonical(name: &str) -> &str {
    match name {
        "t3" => "t7",
        "t4" => "t8",
        "t5" => "p7",
        "t6" => "p8",
        other => other,
    }
}

/// Look up the scalp position for a channel label, if it names a known electrode.
pub fn position_for(label: &str) -> Option<SensorPosition> {
    let name = electrode_name(label);
    let name = canonical(&name);
    STANDARD_1020
        .iter()
        .find(|(electrode, _, _)| *electrode == name)
        .map(|&(_, x, y)| SensorPosition::new(x, y))
}
