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

use crate::cover::CoverConfig;
use crate::settings::{ConfigError, GlobalSettings};

/// One automation instance: a set of covers sharing weather/sun sources and settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceConfig {
    /// Unique instance ID, used for lock-mode routing and persistence
    pub id: String,

    /// Display name
    #[serde(default = "default_name")]
    pub name: String,

    /// Weather entity supplying the daily forecast
    #[serde(default = "default_weather_entity")]
    pub weather_entity: String,

    /// Sun entity supplying elevation/azimuth
    #[serde(default = "default_sun_entity")]
    pub sun_entity: String,

    /// Optional input_select mirroring this instance's lock mode
    #[serde(default)]
    pub lock_control_entity: Option<String>,

    /// Prefix for published sensor entities, defaults to the instance ID
    #[serde(default)]
    pub publish_prefix: Option<String>,

    #[serde(flatten)]
    pub settings: GlobalSettings,

    #[serde(default)]
    pub covers: Vec<CoverConfig>,
}

fn default_name() -> String {
    "Smart Cover Automation".to_owned()
}

fn default_weather_entity() -> String {
    "weather.home".to_owned()
}

fn default_sun_entity() -> String {
    "sun.sun".to_owned()
}

impl InstanceConfig {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: default_name(),
            weather_entity: default_weather_entity(),
            sun_entity: default_sun_entity(),
            lock_control_entity: None,
            publish_prefix: None,
            settings: GlobalSettings::default(),
            covers: Vec::new(),
        }
    }

    pub fn publish_prefix(&self) -> String {
        self.publish_prefix
            .clone()
            .unwrap_or_else(|| format!("smart_cover_{}", self.id))
    }

    /// Validate settings and every cover. An empty cover list is allowed here; the
    /// refresh cycle reports it instead.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.settings.validate()?;
        for cover in &self.covers {
            cover.validate()?;
            cover.effective_limits(&self.settings)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_flattened_settings_deserialize() {
        let config: InstanceConfig = serde_json::from_value(json!({
            "id": "south",
            "temp_threshold": 25.0,
            "covers": [
                {"entity_id": "cover.office", "azimuth": 180, "window_sensors": ["binary_sensor.office_window"]}
            ]
        }))
        .unwrap();

        assert_eq!(config.id, "south");
        assert_eq!(config.weather_entity, "weather.home");
        assert_eq!(config.settings.temp_threshold, 25.0);
        assert_eq!(config.settings.sun_elevation_threshold, 20.0);
        assert_eq!(config.covers.len(), 1);
        assert_eq!(config.covers[0].window_sensors.len(), 1);
        assert_eq!(config.publish_prefix(), "smart_cover_south");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_reports_inverted_cover_limits() {
        let mut config = InstanceConfig::new("a");
        config
            .covers
            .push(CoverConfig::new("cover.x", 90.0).with_limits(Some(80), Some(20)));
        assert!(config.validate().is_err());
    }
}
