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

//! Cycle-wide automation settings.
//!
//! Settings are resolved from two layers of loosely typed key/value data (`options` over
//! `data`) with a per-key default. A value that cannot be coerced to the key's type is
//! replaced by the default; a value that coerces but falls outside the documented range
//! is a configuration error.

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

/// Configuration error kinds
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("No covers configured")]
    NoCovers,

    #[error("{field} = {value} is out of range ({min}..={max})")]
    OutOfRange {
        field: String,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("{entity_id}: min closure {min}% is greater than max closure {max}%")]
    InvertedClosureLimits { entity_id: String, min: u8, max: u8 },

    #[error("Invalid time range '{0}', expected HH:MM-HH:MM")]
    InvalidTimeRange(String),

    #[error("Invalid time '{0}', expected HH:MM")]
    InvalidTime(String),

    #[error(
        "Unknown lock mode '{0}' (expected one of: unlocked, hold_position, force_open, force_close)"
    )]
    UnknownLockMode(String),

    #[error("Invalid cover configuration: {0}")]
    InvalidCover(String),

    #[error("Invalid settings: {0}")]
    Invalid(String),
}

/// Parse a wall-clock time written as `HH:MM` or `HH:MM:SS`
pub fn parse_time(s: &str) -> Result<NaiveTime, ConfigError> {
    let trimmed = s.trim();
    NaiveTime::parse_from_str(trimmed, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(trimmed, "%H:%M:%S"))
        .map_err(|_| ConfigError::InvalidTime(s.to_owned()))
}

/// Serde helpers storing a `NaiveTime` as `HH:MM`
pub mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&time.format("%H:%M").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_time(&raw).map_err(serde::de::Error::custom)
    }
}

/// Daily wall-clock window, e.g. `22:00-06:00`.
///
/// An end before the start means the window crosses midnight. Equal start and end
/// describe an empty window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeRange {
    start: NaiveTime,
    end: NaiveTime,
}

impl TimeRange {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    /// Parse `HH:MM-HH:MM`
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        let (start, end) = s
            .split_once('-')
            .ok_or_else(|| ConfigError::InvalidTimeRange(s.to_owned()))?;
        let start = parse_time(start).map_err(|_| ConfigError::InvalidTimeRange(s.to_owned()))?;
        let end = parse_time(end).map_err(|_| ConfigError::InvalidTimeRange(s.to_owned()))?;
        Ok(Self { start, end })
    }

    pub fn start(&self) -> NaiveTime {
        self.start
    }

    pub fn end(&self) -> NaiveTime {
        self.end
    }

    pub fn crosses_midnight(&self) -> bool {
        self.end < self.start
    }

    /// Start inclusive, end exclusive
    pub fn contains(&self, time: NaiveTime) -> bool {
        if self.start <= self.end {
            self.start <= time && time < self.end
        } else {
            time >= self.start || time < self.end
        }
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}",
            self.start.format("%H:%M"),
            self.end.format("%H:%M")
        )
    }
}

impl TryFrom<String> for TimeRange {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<TimeRange> for String {
    fn from(range: TimeRange) -> Self {
        range.to_string()
    }
}

/// Every key that can be resolved into `GlobalSettings`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettingKey {
    Enabled,
    SimulationMode,
    VerboseLogging,
    TempThreshold,
    SunElevationThreshold,
    SunAzimuthTolerance,
    CoversMinClosure,
    CoversMaxClosure,
    CoversMinPositionDelta,
    ManualOverrideDuration,
    NighttimeBlockOpening,
    NighttimeTimeRange,
    CloseCoversAfterSunset,
    CloseCoversAfterSunsetDelay,
    CloseCoversAfterSunsetCoverList,
    AutomationDisabledTimeRange,
    WeatherHotCutoverTime,
    PositionHistoryDepth,
}

/// Value shape of a setting, used for coercion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingKind {
    Bool,
    Float,
    Integer,
    TimeRange,
    Time,
    EntityList,
}

impl SettingKey {
    pub const ALL: [SettingKey; 18] = [
        Self::Enabled,
        Self::SimulationMode,
        Self::VerboseLogging,
        Self::TempThreshold,
        Self::SunElevationThreshold,
        Self::SunAzimuthTolerance,
        Self::CoversMinClosure,
        Self::CoversMaxClosure,
        Self::CoversMinPositionDelta,
        Self::ManualOverrideDuration,
        Self::NighttimeBlockOpening,
        Self::NighttimeTimeRange,
        Self::CloseCoversAfterSunset,
        Self::CloseCoversAfterSunsetDelay,
        Self::CloseCoversAfterSunsetCoverList,
        Self::AutomationDisabledTimeRange,
        Self::WeatherHotCutoverTime,
        Self::PositionHistoryDepth,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Enabled => "enabled",
            Self::SimulationMode => "simulation_mode",
            Self::VerboseLogging => "verbose_logging",
            Self::TempThreshold => "temp_threshold",
            Self::SunElevationThreshold => "sun_elevation_threshold",
            Self::SunAzimuthTolerance => "sun_azimuth_tolerance",
            Self::CoversMinClosure => "covers_min_closure",
            Self::CoversMaxClosure => "covers_max_closure",
            Self::CoversMinPositionDelta => "covers_min_position_delta",
            Self::ManualOverrideDuration => "manual_override_duration",
            Self::NighttimeBlockOpening => "nighttime_block_opening",
            Self::NighttimeTimeRange => "nighttime_time_range",
            Self::CloseCoversAfterSunset => "close_covers_after_sunset",
            Self::CloseCoversAfterSunsetDelay => "close_covers_after_sunset_delay",
            Self::CloseCoversAfterSunsetCoverList => "close_covers_after_sunset_cover_list",
            Self::AutomationDisabledTimeRange => "automation_disabled_time_range",
            Self::WeatherHotCutoverTime => "weather_hot_cutover_time",
            Self::PositionHistoryDepth => "position_history_depth",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|key| key.as_str() == name)
    }

    pub fn kind(&self) -> SettingKind {
        match self {
            Self::Enabled
            | Self::SimulationMode
            | Self::VerboseLogging
            | Self::NighttimeBlockOpening
            | Self::CloseCoversAfterSunset => SettingKind::Bool,
            Self::TempThreshold | Self::SunElevationThreshold | Self::SunAzimuthTolerance => {
                SettingKind::Float
            }
            Self::CoversMinClosure
            | Self::CoversMaxClosure
            | Self::CoversMinPositionDelta
            | Self::ManualOverrideDuration
            | Self::CloseCoversAfterSunsetDelay
            | Self::PositionHistoryDepth => SettingKind::Integer,
            Self::NighttimeTimeRange | Self::AutomationDisabledTimeRange => SettingKind::TimeRange,
            Self::WeatherHotCutoverTime => SettingKind::Time,
            Self::CloseCoversAfterSunsetCoverList => SettingKind::EntityList,
        }
    }

    /// Documented inclusive range for numeric keys
    pub fn range(&self) -> Option<(f64, f64)> {
        match self {
            Self::TempThreshold => Some((-50.0, 60.0)),
            Self::SunElevationThreshold => Some((-90.0, 90.0)),
            Self::SunAzimuthTolerance => Some((0.0, 180.0)),
            Self::CoversMinClosure | Self::CoversMaxClosure | Self::CoversMinPositionDelta => {
                Some((0.0, 100.0))
            }
            Self::ManualOverrideDuration => Some((0.0, 86_400.0)),
            Self::CloseCoversAfterSunsetDelay => Some((0.0, 14_400.0)),
            Self::PositionHistoryDepth => Some((1.0, 20.0)),
            Self::Enabled
            | Self::SimulationMode
            | Self::VerboseLogging
            | Self::NighttimeBlockOpening
            | Self::NighttimeTimeRange
            | Self::CloseCoversAfterSunset
            | Self::CloseCoversAfterSunsetCoverList
            | Self::AutomationDisabledTimeRange
            | Self::WeatherHotCutoverTime => None,
        }
    }
}

impl fmt::Display for SettingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolved, cycle-wide configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Compute and log decisions without sending device commands
    #[serde(default)]
    pub simulation_mode: bool,

    #[serde(default)]
    pub verbose_logging: bool,

    /// Forecast maximum (°C) above which the day counts as hot
    #[serde(default = "default_temp_threshold")]
    pub temp_threshold: f64,

    /// Sun elevation (°) that must be exceeded before the sun can hit any cover
    #[serde(default = "default_sun_elevation_threshold")]
    pub sun_elevation_threshold: f64,

    /// Half-width (°) of the arc around a cover's azimuth that counts as a direct hit
    #[serde(default = "default_sun_azimuth_tolerance")]
    pub sun_azimuth_tolerance: f64,

    /// Lowest position (%) the automation may command
    #[serde(default)]
    pub covers_min_closure: u8,

    /// Highest position (%) the automation may command
    #[serde(default = "default_max_closure")]
    pub covers_max_closure: u8,

    /// Moves smaller than this (%) are skipped as minor adjustments
    #[serde(default = "default_min_position_delta")]
    pub covers_min_position_delta: u8,

    /// Seconds automation stays suppressed after an external move
    #[serde(default = "default_manual_override_duration")]
    pub manual_override_duration: u64,

    #[serde(default)]
    pub nighttime_block_opening: bool,

    /// Night window for `nighttime_block_opening`; sun below the horizon when unset
    #[serde(default)]
    pub nighttime_time_range: Option<TimeRange>,

    #[serde(default)]
    pub close_covers_after_sunset: bool,

    /// Seconds after sunset before the evening close applies
    #[serde(default)]
    pub close_covers_after_sunset_delay: u64,

    /// Covers closed after sunset; empty means all covers
    #[serde(default)]
    pub close_covers_after_sunset_cover_list: Vec<String>,

    #[serde(default)]
    pub automation_disabled_time_range: Option<TimeRange>,

    /// From this local time on, tomorrow's forecast decides whether the day is hot
    #[serde(default = "default_cutover_time", with = "hhmm")]
    pub weather_hot_cutover_time: NaiveTime,

    #[serde(default = "default_position_history_depth")]
    pub position_history_depth: usize,
}

fn default_true() -> bool {
    true
}

fn default_temp_threshold() -> f64 {
    23.0
}

fn default_sun_elevation_threshold() -> f64 {
    20.0
}

fn default_sun_azimuth_tolerance() -> f64 {
    90.0
}

fn default_max_closure() -> u8 {
    100
}

fn default_min_position_delta() -> u8 {
    5
}

fn default_manual_override_duration() -> u64 {
    1800
}

fn default_cutover_time() -> NaiveTime {
    NaiveTime::from_hms_opt(16, 0, 0).unwrap_or(NaiveTime::MIN)
}

fn default_position_history_depth() -> usize {
    1
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            simulation_mode: false,
            verbose_logging: false,
            temp_threshold: default_temp_threshold(),
            sun_elevation_threshold: default_sun_elevation_threshold(),
            sun_azimuth_tolerance: default_sun_azimuth_tolerance(),
            covers_min_closure: 0,
            covers_max_closure: default_max_closure(),
            covers_min_position_delta: default_min_position_delta(),
            manual_override_duration: default_manual_override_duration(),
            nighttime_block_opening: false,
            nighttime_time_range: None,
            close_covers_after_sunset: false,
            close_covers_after_sunset_delay: 0,
            close_covers_after_sunset_cover_list: Vec::new(),
            automation_disabled_time_range: None,
            weather_hot_cutover_time: default_cutover_time(),
            position_history_depth: default_position_history_depth(),
        }
    }
}

impl GlobalSettings {
    /// Numeric view of a setting, `None` for non-numeric keys
    pub fn numeric_value(&self, key: SettingKey) -> Option<f64> {
        match key {
            SettingKey::TempThreshold => Some(self.temp_threshold),
            SettingKey::SunElevationThreshold => Some(self.sun_elevation_threshold),
            SettingKey::SunAzimuthTolerance => Some(self.sun_azimuth_tolerance),
            SettingKey::CoversMinClosure => Some(f64::from(self.covers_min_closure)),
            SettingKey::CoversMaxClosure => Some(f64::from(self.covers_max_closure)),
            SettingKey::CoversMinPositionDelta => Some(f64::from(self.covers_min_position_delta)),
            SettingKey::ManualOverrideDuration => Some(lossy_f64(self.manual_override_duration)),
            SettingKey::CloseCoversAfterSunsetDelay => {
                Some(lossy_f64(self.close_covers_after_sunset_delay))
            }
            SettingKey::PositionHistoryDepth => {
                Some(lossy_f64(self.position_history_depth as u64))
            }
            SettingKey::Enabled
            | SettingKey::SimulationMode
            | SettingKey::VerboseLogging
            | SettingKey::NighttimeBlockOpening
            | SettingKey::NighttimeTimeRange
            | SettingKey::CloseCoversAfterSunset
            | SettingKey::CloseCoversAfterSunsetCoverList
            | SettingKey::AutomationDisabledTimeRange
            | SettingKey::WeatherHotCutoverTime => None,
        }
    }

    /// Serialized form keyed by `SettingKey::as_str`
    pub fn to_map(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }

    /// Check every numeric setting against its documented range and the closure limits
    /// against each other
    pub fn validate(&self) -> Result<(), ConfigError> {
        for key in SettingKey::ALL {
            if let (Some(value), Some(range)) = (self.numeric_value(key), key.range()) {
                check_range(key, value, range)?;
            }
        }

        if self.covers_min_closure > self.covers_max_closure {
            return Err(ConfigError::InvertedClosureLimits {
                entity_id: "global".to_owned(),
                min: self.covers_min_closure,
                max: self.covers_max_closure,
            });
        }

        Ok(())
    }

    /// Whether the evening close applies to this cover
    pub fn closes_after_sunset(&self, entity_id: &str) -> bool {
        self.close_covers_after_sunset
            && (self.close_covers_after_sunset_cover_list.is_empty()
                || self
                    .close_covers_after_sunset_cover_list
                    .iter()
                    .any(|id| id == entity_id))
    }
}

fn check_range(key: SettingKey, value: f64, (min, max): (f64, f64)) -> Result<(), ConfigError> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            field: key.as_str().to_owned(),
            value,
            min,
            max,
        })
    }
}

/// Resolve settings from `options`, then `data`, then the defaults
pub fn resolve_settings(
    options: &Map<String, Value>,
    data: &Map<String, Value>,
) -> Result<GlobalSettings, ConfigError> {
    let mut merged = Map::new();

    for key in SettingKey::ALL {
        let Some(raw) = options.get(key.as_str()).or_else(|| data.get(key.as_str())) else {
            continue;
        };

        // Non-coercible values fall back to the default
        let Some(value) = coerce(key.kind(), raw) else {
            continue;
        };

        if let (Some(range), Some(number)) = (key.range(), value.as_f64()) {
            check_range(key, number, range)?;
        }

        merged.insert(key.as_str().to_owned(), value);
    }

    let settings: GlobalSettings = serde_json::from_value(Value::Object(merged))
        .map_err(|e| ConfigError::Invalid(e.to_string()))?;
    settings.validate()?;
    Ok(settings)
}

/// Coerce a loosely typed value into the JSON shape `GlobalSettings` expects
pub fn coerce(kind: SettingKind, raw: &Value) -> Option<Value> {
    match kind {
        SettingKind::Bool => match raw {
            Value::Bool(b) => Some(Value::Bool(*b)),
            Value::Number(n) => n.as_f64().map(|v| Value::Bool(v != 0.0)),
            Value::String(s) => match s.trim().to_lowercase().as_str() {
                "true" | "on" | "yes" | "1" => Some(Value::Bool(true)),
                "false" | "off" | "no" | "0" => Some(Value::Bool(false)),
                _ => None,
            },
            _ => None,
        },
        SettingKind::Float => {
            let value = match raw {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => s.trim().parse::<f64>().ok(),
                _ => None,
            }?;
            value.is_finite().then(|| Value::from(value))
        }
        SettingKind::Integer => {
            let value = match raw {
                Value::Number(n) => n.as_i64().or_else(|| n.as_f64().and_then(truncate)),
                Value::String(s) => {
                    let s = s.trim();
                    s.parse::<i64>()
                        .ok()
                        .or_else(|| s.parse::<f64>().ok().and_then(truncate))
                }
                _ => None,
            }?;
            Some(Value::from(value))
        }
        SettingKind::TimeRange => match raw {
            Value::Null => Some(Value::Null),
            Value::String(s) if s.trim().is_empty() => Some(Value::Null),
            Value::String(s) => TimeRange::parse(s)
                .ok()
                .map(|range| Value::String(range.to_string())),
            _ => None,
        },
        SettingKind::Time => match raw {
            Value::String(s) => parse_time(s)
                .ok()
                .map(|t| Value::String(t.format("%H:%M").to_string())),
            _ => None,
        },
        SettingKind::EntityList => match raw {
            Value::Array(items) => Some(Value::Array(
                items
                    .iter()
                    .filter_map(|item| item.as_str())
                    .map(|s| Value::String(s.trim().to_owned()))
                    .collect(),
            )),
            Value::String(s) => Some(Value::Array(
                s.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(|s| Value::String(s.to_owned()))
                    .collect(),
            )),
            Value::Null => Some(Value::Array(Vec::new())),
            _ => None,
        },
    }
}

#[allow(clippy::cast_precision_loss)]
fn lossy_f64(value: u64) -> f64 {
    value as f64
}

#[allow(clippy::cast_possible_truncation)]
fn truncate(value: f64) -> Option<i64> {
    value.is_finite().then(|| value.trunc() as i64)
}
