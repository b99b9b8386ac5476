// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of SmartCover.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

//! Sun/cover geometry.

use serde::{Deserialize, Serialize};
use smartcover_types::{GlobalSettings, SunPosition};

/// Absolute circular difference between two compass bearings, in 0..=180
pub fn azimuth_difference(a: f64, b: f64) -> f64 {
    let diff = (a - b).rem_euclid(360.0);
    diff.min(360.0 - diff)
}

/// Result of the sun-hit test for one cover
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SunHit {
    pub hitting: bool,
    /// Sun/cover azimuth difference (°)
    pub azimuth_diff: f64,
}

impl SunHit {
    /// Sun is hitting iff it is above the elevation threshold and within the tolerance arc
    pub fn evaluate(sun: &SunPosition, cover_azimuth: f64, settings: &GlobalSettings) -> Self {
        let azimuth_diff = azimuth_difference(sun.azimuth, cover_azimuth);
        let hitting = sun.elevation > settings.sun_elevation_threshold
            && azimuth_diff <= settings.sun_azimuth_tolerance;
        Self {
            hitting,
            azimuth_diff,
        }
    }

    /// Difference rounded to 0.1° for reporting
    pub fn rounded_diff(&self) -> f64 {
        (self.azimuth_diff * 10.0).round() / 10.0
    }
}
