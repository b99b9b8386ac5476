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

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Weather conditions that count as sunny
pub const SUNNY_CONDITIONS: [&str; 3] = ["sunny", "partlycloudy", "clear"];

/// Sun geometry read once per cycle
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SunPosition {
    /// Degrees above the horizon (-90..90)
    pub elevation: f64,
    /// Compass bearing (0..360)
    pub azimuth: f64,
    /// Most recent sunset, if known
    pub last_sunset: Option<DateTime<Utc>>,
}

impl SunPosition {
    pub fn new(elevation: f64, azimuth: f64) -> Self {
        Self {
            elevation,
            azimuth,
            last_sunset: None,
        }
    }

    pub fn with_last_sunset(mut self, sunset: DateTime<Utc>) -> Self {
        self.last_sunset = Some(sunset);
        self
    }

    pub fn is_below_horizon(&self) -> bool {
        self.elevation <= 0.0
    }
}

/// Forecast maximum temperature for the relevant day
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "celsius", rename_all = "snake_case")]
pub enum ForecastTemperature {
    Available(f64),
    Unavailable,
}

impl ForecastTemperature {
    pub fn from_option(value: Option<f64>) -> Self {
        value.map_or(Self::Unavailable, Self::Available)
    }

    pub fn value(&self) -> Option<f64> {
        match self {
            Self::Available(t) => Some(*t),
            Self::Unavailable => None,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available(_))
    }

    /// Strictly above the threshold; never hot when unavailable
    pub fn is_hot(&self, threshold: f64) -> bool {
        self.value().is_some_and(|t| t > threshold)
    }
}

/// Whether a weather condition string counts as sunny.
///
/// A missing condition never blocks heat protection.
pub fn is_sunny_condition(condition: Option<&str>) -> bool {
    condition.is_none_or(|c| {
        let c = c.trim().to_lowercase();
        SUNNY_CONDITIONS.contains(&c.as_str())
    })
}
