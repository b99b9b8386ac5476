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

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::settings::{ConfigError, GlobalSettings};

/// Fully closed position
pub const POSITION_CLOSED: u8 = 0;
/// Fully open position
pub const POSITION_OPEN: u8 = 100;

/// Binary covers open for targets above this value
pub const BINARY_OPEN_ABOVE: u8 = 50;

/// `supported_features` bit for open
pub const FEATURE_OPEN: u32 = 1;
/// `supported_features` bit for close
pub const FEATURE_CLOSE: u32 = 2;
/// `supported_features` bit for set position
pub const FEATURE_SET_POSITION: u32 = 4;

/// Static per-cover configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverConfig {
    /// Cover entity (e.g., "cover.living_room")
    pub entity_id: String,

    /// Direction the window faces (0-360°, 180 = south)
    pub azimuth: f64,

    /// Per-cover lowest allowed position, overrides `covers_min_closure`
    #[serde(default)]
    pub min_closure: Option<u8>,

    /// Per-cover highest allowed position, overrides `covers_max_closure`
    #[serde(default)]
    pub max_closure: Option<u8>,

    /// Window contacts whose "open" state vetoes closing this cover
    #[serde(default)]
    pub window_sensors: Vec<String>,
}

/// Effective position bounds for a cover
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosureLimits {
    pub min: u8,
    pub max: u8,
}

impl ClosureLimits {
    pub fn clamp(&self, target: u8) -> u8 {
        target.clamp(self.min, self.max)
    }
}

impl CoverConfig {
    pub fn new(entity_id: impl Into<String>, azimuth: f64) -> Self {
        Self {
            entity_id: entity_id.into(),
            azimuth,
            min_closure: None,
            max_closure: None,
            window_sensors: Vec::new(),
        }
    }

    pub fn with_limits(mut self, min: Option<u8>, max: Option<u8>) -> Self {
        self.min_closure = min;
        self.max_closure = max;
        self
    }

    pub fn with_window_sensors(mut self, sensors: Vec<String>) -> Self {
        self.window_sensors = sensors;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.entity_id.trim().is_empty() {
            return Err(ConfigError::InvalidCover(
                "cover entity_id cannot be empty".to_owned(),
            ));
        }
        if !self.azimuth.is_finite() || !(0.0..=360.0).contains(&self.azimuth) {
            return Err(ConfigError::OutOfRange {
                field: format!("{}.azimuth", self.entity_id),
                value: self.azimuth,
                min: 0.0,
                max: 360.0,
            });
        }
        for (name, limit) in [("min_closure", self.min_closure), ("max_closure", self.max_closure)]
        {
            if let Some(value) = limit
                && value > POSITION_OPEN
            {
                return Err(ConfigError::OutOfRange {
                    field: format!("{}.{}", self.entity_id, name),
                    value: f64::from(value),
                    min: 0.0,
                    max: 100.0,
                });
            }
        }
        Ok(())
    }

    /// Per-cover limits layered over the global defaults.
    ///
    /// Inverted limits are reported, never swapped.
    pub fn effective_limits(&self, settings: &GlobalSettings) -> Result<ClosureLimits, ConfigError> {
        let min = self.min_closure.unwrap_or(settings.covers_min_closure);
        let max = self.max_closure.unwrap_or(settings.covers_max_closure);
        if min > max {
            return Err(ConfigError::InvertedClosureLimits {
                entity_id: self.entity_id.clone(),
                min,
                max,
            });
        }
        Ok(ClosureLimits { min, max })
    }
}

/// Reported state of a cover entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoverStateKind {
    Open,
    Closed,
    Opening,
    Closing,
    Unknown,
    Unavailable,
}

impl CoverStateKind {
    /// Map an HA state string
    pub fn from_state(state: &str) -> Self {
        match state.trim().to_lowercase().as_str() {
            "open" => Self::Open,
            "closed" => Self::Closed,
            "opening" => Self::Opening,
            "closing" => Self::Closing,
            "unavailable" => Self::Unavailable,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
            Self::Opening => "opening",
            Self::Closing => "closing",
            Self::Unknown => "unknown",
            Self::Unavailable => "unavailable",
        }
    }

    pub fn is_transitional(&self) -> bool {
        matches!(self, Self::Opening | Self::Closing)
    }

    /// Unknown/unavailable states cannot be automated
    pub fn is_usable(&self) -> bool {
        !matches!(self, Self::Unknown | Self::Unavailable)
    }
}

impl fmt::Display for CoverStateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a cover can be told to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CoverCapabilities {
    pub set_position: bool,
    pub open_close: bool,
}

impl CoverCapabilities {
    pub fn from_supported_features(features: u32) -> Self {
        Self {
            set_position: features & FEATURE_SET_POSITION != 0,
            open_close: features & (FEATURE_OPEN | FEATURE_CLOSE) != 0,
        }
    }

    pub fn position() -> Self {
        Self {
            set_position: true,
            open_close: true,
        }
    }

    pub fn binary() -> Self {
        Self {
            set_position: false,
            open_close: true,
        }
    }

    /// Position the device ends up at when asked for `target`. Covers without
    /// set-position support only reach fully open or fully closed.
    pub fn reachable_position(&self, target: u8) -> u8 {
        if self.set_position {
            target
        } else if target > BINARY_OPEN_ABOVE {
            POSITION_OPEN
        } else {
            POSITION_CLOSED
        }
    }
}

/// One reading of a cover entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverReading {
    pub state: CoverStateKind,
    /// `current_position` attribute, if reported
    pub position: Option<u8>,
    pub capabilities: CoverCapabilities,
    /// Raw `supported_features` bitmask
    pub supported_features: u32,
}

impl CoverReading {
    pub fn new(state: CoverStateKind, position: Option<u8>, supported_features: u32) -> Self {
        Self {
            state,
            position,
            capabilities: CoverCapabilities::from_supported_features(supported_features),
            supported_features,
        }
    }

    /// Normalized current position.
    ///
    /// A reported position wins. Otherwise closed maps to 0, open to 100, and any
    /// transitional or unknown state to 100.
    pub fn normalized_position(&self) -> u8 {
        if let Some(position) = self.position {
            return position.min(POSITION_OPEN);
        }
        match self.state {
            CoverStateKind::Closed => POSITION_CLOSED,
            CoverStateKind::Open
            | CoverStateKind::Opening
            | CoverStateKind::Closing
            | CoverStateKind::Unknown
            | CoverStateKind::Unavailable => POSITION_OPEN,
        }
    }
}

/// State of a window contact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowState {
    Open,
    Closed,
}

impl WindowState {
    /// Binary sensors report "on" for an open contact
    pub fn from_state(state: &str) -> Option<Self> {
        match state.trim().to_lowercase().as_str() {
            "on" | "open" => Some(Self::Open),
            "off" | "closed" => Some(Self::Closed),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binary_cover_position_inference() {
        let closed = CoverReading::new(CoverStateKind::Closed, None, FEATURE_OPEN | FEATURE_CLOSE);
        assert_eq!(closed.normalized_position(), 0);

        let open = CoverReading::new(CoverStateKind::Open, None, FEATURE_OPEN | FEATURE_CLOSE);
        assert_eq!(open.normalized_position(), 100);

        for state in [
            CoverStateKind::Opening,
            CoverStateKind::Closing,
            CoverStateKind::Unknown,
        ] {
            let reading = CoverReading::new(state, None, FEATURE_OPEN | FEATURE_CLOSE);
            assert_eq!(reading.normalized_position(), 100, "{state}");
        }
    }

    #[test]
    fn test_reported_position_wins() {
        let reading = CoverReading::new(CoverStateKind::Open, Some(35), 15);
        assert!(reading.capabilities.set_position);
        assert_eq!(reading.normalized_position(), 35);
    }

    #[test]
    fn test_capabilities_from_features() {
        let caps = CoverCapabilities::from_supported_features(FEATURE_OPEN | FEATURE_CLOSE);
        assert!(!caps.set_position);
        assert!(caps.open_close);

        let caps = CoverCapabilities::from_supported_features(15);
        assert!(caps.set_position);
    }

    #[test]
    fn test_reachable_position() {
        let binary = CoverCapabilities::binary();
        assert_eq!(binary.reachable_position(80), POSITION_OPEN);
        assert_eq!(binary.reachable_position(51), POSITION_OPEN);
        assert_eq!(binary.reachable_position(50), POSITION_CLOSED);
        assert_eq!(binary.reachable_position(20), POSITION_CLOSED);
        assert_eq!(CoverCapabilities::position().reachable_position(80), 80);
    }

    #[test]
    fn test_state_parsing() {
        assert_eq!(CoverStateKind::from_state("OPEN"), CoverStateKind::Open);
        assert_eq!(CoverStateKind::from_state("closing"), CoverStateKind::Closing);
        assert_eq!(CoverStateKind::from_state(""), CoverStateKind::Unknown);
        assert!(!CoverStateKind::from_state("unavailable").is_usable());
        assert!(CoverStateKind::Opening.is_transitional());
    }

    #[test]
    fn test_effective_limits_override_globals() {
        let settings = GlobalSettings {
            covers_min_closure: 10,
            covers_max_closure: 90,
            ..Default::default()
        };

        let cover = CoverConfig::new("cover.a", 180.0);
        assert_eq!(
            cover.effective_limits(&settings).unwrap(),
            ClosureLimits { min: 10, max: 90 }
        );

        let cover = CoverConfig::new("cover.a", 180.0).with_limits(Some(30), None);
        assert_eq!(
            cover.effective_limits(&settings).unwrap(),
            ClosureLimits { min: 30, max: 90 }
        );
    }

    #[test]
    fn test_effective_limits_never_swap() {
        let settings = GlobalSettings::default();
        let cover = CoverConfig::new("cover.a", 180.0).with_limits(Some(70), Some(20));
        let err = cover.effective_limits(&settings).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvertedClosureLimits { min: 70, max: 20, .. }
        ));
    }

    #[test]
    fn test_clamp_stays_within_limits() {
        for min in (0..=100).step_by(10) {
            for max in (min..=100).step_by(10) {
                let limits = ClosureLimits { min, max };
                for target in [0, 50, 100] {
                    let clamped = limits.clamp(target);
                    assert!(min <= clamped && clamped <= max);
                }
            }
        }
    }

    #[test]
    fn test_validate_cover_azimuth() {
        assert!(CoverConfig::new("cover.a", 180.0).validate().is_ok());
        assert!(CoverConfig::new("cover.a", 361.0).validate().is_err());
        assert!(CoverConfig::new("", 10.0).validate().is_err());
        assert!(
            CoverConfig::new("cover.a", 10.0)
                .with_limits(None, Some(120))
                .validate()
                .is_err()
        );
    }

    #[test]
    fn test_window_state_parsing() {
        assert_eq!(WindowState::from_state("on"), Some(WindowState::Open));
        assert_eq!(WindowState::from_state("off"), Some(WindowState::Closed));
        assert_eq!(WindowState::from_state("unavailable"), None);
    }
}
