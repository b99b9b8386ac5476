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

//! Host-facing control entities.
//!
//! Each adapter exposes one value of an instance (a setting, the lock mode or a
//! snapshot field) as `{current_value, is_available, set_value}`. Writes never touch
//! the instance directly; they return an `EntityCommand` for the instance worker.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde_json::{Map, Value, json};
use smartcover_types::{
    ConfigError, CycleSnapshot, GlobalSettings, LockMode, SettingKey, SettingKind,
    resolve_settings,
};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

use crate::traits::StatePublisher;

/// What the control entities read, refreshed by the instance worker after each cycle
#[derive(Debug, Clone, Default)]
pub struct InstanceView {
    pub instance_id: String,
    pub settings: GlobalSettings,
    pub lock_mode: LockMode,
    pub snapshot: Option<CycleSnapshot>,
    /// Last cycle-fatal error, cleared by the next successful cycle
    pub last_error: Option<String>,
    pub last_movement: Option<DateTime<Utc>>,
}

pub type SharedInstanceView = Arc<RwLock<InstanceView>>;

#[derive(Debug, Clone, PartialEq)]
pub enum EntityValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl EntityValue {
    /// Host state string
    pub fn to_state(&self) -> String {
        match self {
            Self::Bool(true) => "on".to_owned(),
            Self::Bool(false) => "off".to_owned(),
            Self::Number(n) => {
                if n.fract() == 0.0 {
                    format!("{n:.0}")
                } else {
                    format!("{n:.1}")
                }
            }
            Self::Text(s) => s.clone(),
        }
    }
}

/// Host platform an entity belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Select,
    Switch,
    Number,
    Sensor,
    BinarySensor,
}

impl Platform {
    pub fn domain(&self) -> &'static str {
        match self {
            Self::Select => "select",
            Self::Switch => "switch",
            Self::Number => "number",
            Self::Sensor => "sensor",
            Self::BinarySensor => "binary_sensor",
        }
    }

    pub fn is_read_only(&self) -> bool {
        matches!(self, Self::Sensor | Self::BinarySensor)
    }
}

/// Change requested through a control entity
#[derive(Debug, Clone, PartialEq)]
pub enum EntityCommand {
    SetLockMode(LockMode),
    ApplySettings(GlobalSettings),
}

#[derive(Debug, Error)]
pub enum EntityError {
    #[error("{0} is read-only")]
    ReadOnly(String),

    #[error("{entity_id} expects a {expected} value")]
    WrongType {
        entity_id: String,
        expected: &'static str,
    },

    #[error("Unknown entity: {0}")]
    UnknownEntity(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Capability set shared by every host entity adapter
pub trait ControlEntity: Send + Sync {
    fn entity_id(&self) -> &str;

    fn platform(&self) -> Platform;

    fn current_value(&self) -> Option<EntityValue>;

    fn is_available(&self) -> bool {
        self.current_value().is_some()
    }

    fn set_value(&self, value: EntityValue) -> Result<EntityCommand, EntityError>;

    fn attributes(&self) -> Value {
        Value::Object(Map::new())
    }
}

fn entity_id(platform: Platform, prefix: &str, suffix: &str) -> String {
    format!("{}.{}_{}", platform.domain(), prefix, suffix)
}

fn read_only(entity_id: &str) -> EntityError {
    EntityError::ReadOnly(entity_id.to_owned())
}

/// Apply one setting change with the same coercion and range checks as config loading
fn with_setting(
    settings: &GlobalSettings,
    key: SettingKey,
    value: Value,
) -> Result<GlobalSettings, ConfigError> {
    let mut options = Map::new();
    options.insert(key.as_str().to_owned(), value);
    resolve_settings(&options, &settings.to_map())
}

// ============= Select =============

/// Lock mode select
pub struct LockModeSelect {
    entity_id: String,
    view: SharedInstanceView,
}

impl LockModeSelect {
    pub fn new(prefix: &str, view: SharedInstanceView) -> Self {
        Self {
            entity_id: entity_id(Platform::Select, prefix, "lock_mode"),
            view,
        }
    }
}

impl ControlEntity for LockModeSelect {
    fn entity_id(&self) -> &str {
        &self.entity_id
    }

    fn platform(&self) -> Platform {
        Platform::Select
    }

    fn current_value(&self) -> Option<EntityValue> {
        Some(EntityValue::Text(
            self.view.read().lock_mode.to_config_value().to_owned(),
        ))
    }

    fn set_value(&self, value: EntityValue) -> Result<EntityCommand, EntityError> {
        let EntityValue::Text(option) = value else {
            return Err(EntityError::WrongType {
                entity_id: self.entity_id.clone(),
                expected: "text",
            });
        };
        Ok(EntityCommand::SetLockMode(option.parse()?))
    }

    fn attributes(&self) -> Value {
        let options: Vec<&str> = LockMode::all()
            .iter()
            .map(LockMode::to_config_value)
            .collect();
        json!({ "options": options })
    }
}

// ============= Switch =============

/// Boolean setting (`enabled`, `simulation_mode`, `verbose_logging`)
pub struct SettingSwitch {
    entity_id: String,
    key: SettingKey,
    view: SharedInstanceView,
}

impl SettingSwitch {
    pub const KEYS: [SettingKey; 3] = [
        SettingKey::Enabled,
        SettingKey::SimulationMode,
        SettingKey::VerboseLogging,
    ];

    pub fn new(prefix: &str, key: SettingKey, view: SharedInstanceView) -> Self {
        Self {
            entity_id: entity_id(Platform::Switch, prefix, key.as_str()),
            key,
            view,
        }
    }
}

impl ControlEntity for SettingSwitch {
    fn entity_id(&self) -> &str {
        &self.entity_id
    }

    fn platform(&self) -> Platform {
        Platform::Switch
    }

    fn current_value(&self) -> Option<EntityValue> {
        self.view
            .read()
            .settings
            .to_map()
            .get(self.key.as_str())
            .and_then(Value::as_bool)
            .map(EntityValue::Bool)
    }

    fn set_value(&self, value: EntityValue) -> Result<EntityCommand, EntityError> {
        let EntityValue::Bool(on) = value else {
            return Err(EntityError::WrongType {
                entity_id: self.entity_id.clone(),
                expected: "boolean",
            });
        };
        let settings = with_setting(&self.view.read().settings, self.key, Value::Bool(on))?;
        Ok(EntityCommand::ApplySettings(settings))
    }
}

// ============= Number =============

/// Numeric setting with its documented range
pub struct SettingNumber {
    entity_id: String,
    key: SettingKey,
    view: SharedInstanceView,
}

impl SettingNumber {
    pub const KEYS: [SettingKey; 6] = [
        SettingKey::TempThreshold,
        SettingKey::SunAzimuthTolerance,
        SettingKey::SunElevationThreshold,
        SettingKey::CoversMinClosure,
        SettingKey::CoversMaxClosure,
        SettingKey::ManualOverrideDuration,
    ];

    pub fn new(prefix: &str, key: SettingKey, view: SharedInstanceView) -> Self {
        Self {
            entity_id: entity_id(Platform::Number, prefix, key.as_str()),
            key,
            view,
        }
    }

    fn unit(&self) -> &'static str {
        match self.key {
            SettingKey::TempThreshold => "°C",
            SettingKey::SunAzimuthTolerance | SettingKey::SunElevationThreshold => "°",
            SettingKey::ManualOverrideDuration => "s",
            _ => "%",
        }
    }
}

impl ControlEntity for SettingNumber {
    fn entity_id(&self) -> &str {
        &self.entity_id
    }

    fn platform(&self) -> Platform {
        Platform::Number
    }

    fn current_value(&self) -> Option<EntityValue> {
        self.view
            .read()
            .settings
            .numeric_value(self.key)
            .map(EntityValue::Number)
    }

    fn set_value(&self, value: EntityValue) -> Result<EntityCommand, EntityError> {
        let EntityValue::Number(n) = value else {
            return Err(EntityError::WrongType {
                entity_id: self.entity_id.clone(),
                expected: "number",
            });
        };
        let raw = match self.key.kind() {
            SettingKind::Integer if n.fract() == 0.0 => json!(n as i64),
            _ => json!(n),
        };
        let settings = with_setting(&self.view.read().settings, self.key, raw)?;
        Ok(EntityCommand::ApplySettings(settings))
    }

    fn attributes(&self) -> Value {
        let (min, max) = self.key.range().unwrap_or((0.0, 100.0));
        json!({
            "min": min,
            "max": max,
            "step": if self.key.kind() == SettingKind::Float { 0.5 } else { 1.0 },
            "unit_of_measurement": self.unit(),
        })
    }
}

// ============= Sensor =============

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorKind {
    SunAzimuth,
    SunElevation,
    TempCurrentMax,
    Status,
    LastMovement,
}

impl SensorKind {
    pub const ALL: [SensorKind; 5] = [
        Self::SunAzimuth,
        Self::SunElevation,
        Self::TempCurrentMax,
        Self::Status,
        Self::LastMovement,
    ];

    fn suffix(self) -> &'static str {
        match self {
            Self::SunAzimuth => "sun_azimuth",
            Self::SunElevation => "sun_elevation",
            Self::TempCurrentMax => "temp_current_max",
            Self::Status => "status",
            Self::LastMovement => "last_movement",
        }
    }
}

/// Read-only sensor over the latest snapshot
pub struct SnapshotSensor {
    entity_id: String,
    kind: SensorKind,
    view: SharedInstanceView,
}

impl SnapshotSensor {
    pub fn new(prefix: &str, kind: SensorKind, view: SharedInstanceView) -> Self {
        Self {
            entity_id: entity_id(Platform::Sensor, prefix, kind.suffix()),
            kind,
            view,
        }
    }
}

impl ControlEntity for SnapshotSensor {
    fn entity_id(&self) -> &str {
        &self.entity_id
    }

    fn platform(&self) -> Platform {
        Platform::Sensor
    }

    fn current_value(&self) -> Option<EntityValue> {
        let view = self.view.read();
        match self.kind {
            SensorKind::SunAzimuth => view
                .snapshot
                .as_ref()?
                .sun_azimuth
                .map(EntityValue::Number),
            SensorKind::SunElevation => view
                .snapshot
                .as_ref()?
                .sun_elevation
                .map(EntityValue::Number),
            SensorKind::TempCurrentMax => view
                .snapshot
                .as_ref()?
                .temp_current_max
                .map(EntityValue::Number),
            SensorKind::Status => {
                let text = match (&view.last_error, &view.snapshot) {
                    (Some(err), _) => err.clone(),
                    (None, Some(snapshot)) => {
                        snapshot.message.clone().unwrap_or_else(|| "ok".to_owned())
                    }
                    (None, None) => return None,
                };
                Some(EntityValue::Text(text))
            }
            SensorKind::LastMovement => view
                .last_movement
                .map(|ts| EntityValue::Text(ts.to_rfc3339())),
        }
    }

    fn set_value(&self, _value: EntityValue) -> Result<EntityCommand, EntityError> {
        Err(read_only(&self.entity_id))
    }

    fn attributes(&self) -> Value {
        let view = self.view.read();
        match (self.kind, &view.snapshot) {
            (SensorKind::Status, Some(snapshot)) => json!({
                "lock_mode": snapshot.lock_mode,
                "lock_active": snapshot.lock_active,
                "last_update_success": snapshot.last_update_success,
                "timestamp": snapshot.timestamp,
                "covers": snapshot.covers,
            }),
            (SensorKind::TempCurrentMax, _) => json!({ "unit_of_measurement": "°C" }),
            (SensorKind::SunAzimuth | SensorKind::SunElevation, _) => {
                json!({ "unit_of_measurement": "°" })
            }
            _ => Value::Object(Map::new()),
        }
    }
}

// ============= Binary sensor =============

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinarySensorKind {
    /// Cycle-fatal failure only
    Problem,
    TempHot,
    WeatherSunny,
    NighttimeBlockOpening,
    CloseCoversAfterSunset,
}

impl BinarySensorKind {
    pub const ALL: [BinarySensorKind; 5] = [
        Self::Problem,
        Self::TempHot,
        Self::WeatherSunny,
        Self::NighttimeBlockOpening,
        Self::CloseCoversAfterSunset,
    ];

    fn suffix(self) -> &'static str {
        match self {
            Self::Problem => "problem",
            Self::TempHot => "temp_hot",
            Self::WeatherSunny => "weather_sunny",
            Self::NighttimeBlockOpening => "nighttime_block_opening",
            Self::CloseCoversAfterSunset => "close_covers_after_sunset",
        }
    }
}

pub struct SnapshotBinarySensor {
    entity_id: String,
    kind: BinarySensorKind,
    view: SharedInstanceView,
}

impl SnapshotBinarySensor {
    pub fn new(prefix: &str, kind: BinarySensorKind, view: SharedInstanceView) -> Self {
        Self {
            entity_id: entity_id(Platform::BinarySensor, prefix, kind.suffix()),
            kind,
            view,
        }
    }
}

impl ControlEntity for SnapshotBinarySensor {
    fn entity_id(&self) -> &str {
        &self.entity_id
    }

    fn platform(&self) -> Platform {
        Platform::BinarySensor
    }

    fn current_value(&self) -> Option<EntityValue> {
        let view = self.view.read();
        let value = match self.kind {
            BinarySensorKind::Problem => view.last_error.is_some(),
            BinarySensorKind::TempHot => view.snapshot.as_ref()?.temp_hot,
            BinarySensorKind::WeatherSunny => view.snapshot.as_ref()?.weather_sunny,
            BinarySensorKind::NighttimeBlockOpening => view.settings.nighttime_block_opening,
            BinarySensorKind::CloseCoversAfterSunset => view.settings.close_covers_after_sunset,
        };
        Some(EntityValue::Bool(value))
    }

    fn set_value(&self, _value: EntityValue) -> Result<EntityCommand, EntityError> {
        Err(read_only(&self.entity_id))
    }

    fn attributes(&self) -> Value {
        match self.kind {
            BinarySensorKind::Problem => {
                json!({ "device_class": "problem", "error": self.view.read().last_error })
            }
            _ => Value::Object(Map::new()),
        }
    }
}

// ============= Entity set =============

/// Every control entity of one instance
pub struct EntitySet {
    entities: Vec<Box<dyn ControlEntity>>,
}

impl fmt::Debug for EntitySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.entities.iter().map(|e| e.entity_id()))
            .finish()
    }
}

impl EntitySet {
    /// Standard entities for an instance publishing under `prefix`
    pub fn for_instance(prefix: &str, view: &SharedInstanceView) -> Self {
        let mut entities: Vec<Box<dyn ControlEntity>> =
            vec![Box::new(LockModeSelect::new(prefix, view.clone()))];
        for key in SettingSwitch::KEYS {
            entities.push(Box::new(SettingSwitch::new(prefix, key, view.clone())));
        }
        for key in SettingNumber::KEYS {
            entities.push(Box::new(SettingNumber::new(prefix, key, view.clone())));
        }
        for kind in SensorKind::ALL {
            entities.push(Box::new(SnapshotSensor::new(prefix, kind, view.clone())));
        }
        for kind in BinarySensorKind::ALL {
            entities.push(Box::new(SnapshotBinarySensor::new(
                prefix,
                kind,
                view.clone(),
            )));
        }
        Self { entities }
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn ControlEntity> {
        self.entities.iter().map(AsRef::as_ref)
    }

    pub fn get(&self, entity_id: &str) -> Option<&dyn ControlEntity> {
        self.iter().find(|e| e.entity_id() == entity_id)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Route a host write to the matching entity
    pub fn set_value(
        &self,
        entity_id: &str,
        value: EntityValue,
    ) -> Result<EntityCommand, EntityError> {
        self.get(entity_id)
            .ok_or_else(|| EntityError::UnknownEntity(entity_id.to_owned()))?
            .set_value(value)
    }

    /// Push every read-only entity's state to the host. Returns how many were published.
    pub async fn publish(&self, publisher: &dyn StatePublisher) -> usize {
        let mut published = 0;
        for entity in self.iter().filter(|e| e.platform().is_read_only()) {
            let state = entity
                .current_value()
                .map_or_else(|| "unavailable".to_owned(), |v| v.to_state());
            match publisher
                .publish_state(entity.entity_id(), &state, entity.attributes())
                .await
            {
                Ok(()) => published += 1,
                Err(e) => warn!("⚠️ Failed to publish {}: {e:#}", entity.entity_id()),
            }
        }
        published
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::RecordingPublisher;

    fn view() -> SharedInstanceView {
        Arc::new(RwLock::new(InstanceView {
            instance_id: "south".to_owned(),
            ..Default::default()
        }))
    }

    #[test]
    fn test_lock_select_parses_options() {
        let view = view();
        let set = EntitySet::for_instance("sc_south", &view);

        let cmd = set
            .set_value(
                "select.sc_south_lock_mode",
                EntityValue::Text("force_close".to_owned()),
            )
            .unwrap();
        assert_eq!(cmd, EntityCommand::SetLockMode(LockMode::ForceClose));

        assert!(
            set.set_value(
                "select.sc_south_lock_mode",
                EntityValue::Text("sideways".to_owned())
            )
            .is_err()
        );
    }

    #[test]
    fn test_switch_and_number_produce_settings() {
        let view = view();
        let set = EntitySet::for_instance("sc", &view);

        let cmd = set
            .set_value("switch.sc_simulation_mode", EntityValue::Bool(true))
            .unwrap();
        let EntityCommand::ApplySettings(settings) = cmd else {
            panic!("expected settings");
        };
        assert!(settings.simulation_mode);

        let cmd = set
            .set_value("number.sc_temp_threshold", EntityValue::Number(27.5))
            .unwrap();
        let EntityCommand::ApplySettings(settings) = cmd else {
            panic!("expected settings");
        };
        assert_eq!(settings.temp_threshold, 27.5);
        // The view is only updated by the worker
        assert_eq!(view.read().settings.temp_threshold, 23.0);
    }

    #[test]
    fn test_number_range_checked() {
        let view = view();
        let set = EntitySet::for_instance("sc", &view);
        let err = set
            .set_value("number.sc_sun_azimuth_tolerance", EntityValue::Number(200.0))
            .unwrap_err();
        assert!(matches!(err, EntityError::Config(ConfigError::OutOfRange { .. })));

        let err = set
            .set_value("number.sc_temp_threshold", EntityValue::Bool(true))
            .unwrap_err();
        assert!(matches!(err, EntityError::WrongType { .. }));
    }

    #[test]
    fn test_sensors_are_read_only_and_unavailable_before_first_cycle() {
        let view = view();
        let set = EntitySet::for_instance("sc", &view);

        let sensor = set.get("sensor.sc_sun_azimuth").unwrap();
        assert!(!sensor.is_available());
        assert!(matches!(
            sensor.set_value(EntityValue::Number(1.0)),
            Err(EntityError::ReadOnly(_))
        ));

        view.write().snapshot = Some(CycleSnapshot {
            sun_azimuth: Some(181.25),
            temp_hot: true,
            ..Default::default()
        });
        assert_eq!(
            sensor.current_value(),
            Some(EntityValue::Number(181.25))
        );
        assert_eq!(
            set.get("binary_sensor.sc_temp_hot").unwrap().current_value(),
            Some(EntityValue::Bool(true))
        );
    }

    #[test]
    fn test_problem_reflects_cycle_failures_only() {
        let view = view();
        let set = EntitySet::for_instance("sc", &view);
        let problem = set.get("binary_sensor.sc_problem").unwrap();

        view.write().snapshot = Some(CycleSnapshot {
            message: Some("Weather forecast unavailable".to_owned()),
            ..Default::default()
        });
        assert_eq!(problem.current_value(), Some(EntityValue::Bool(false)));

        view.write().last_error = Some("Sun entity sun.sun unavailable".to_owned());
        assert_eq!(problem.current_value(), Some(EntityValue::Bool(true)));
    }

    #[tokio::test]
    async fn test_publish_only_read_only_entities() {
        let view = view();
        view.write().snapshot = Some(CycleSnapshot::default());
        let set = EntitySet::for_instance("sc", &view);
        let publisher = RecordingPublisher::default();

        let published = set.publish(&publisher).await;
        assert_eq!(
            published,
            SensorKind::ALL.len() + BinarySensorKind::ALL.len()
        );
        assert_eq!(publisher.count(), published);
        assert_eq!(
            publisher.state("sensor.sc_status").as_deref(),
            Some("ok")
        );
        assert_eq!(
            publisher.state("sensor.sc_sun_azimuth").as_deref(),
            Some("unavailable")
        );
        assert!(publisher.state("switch.sc_enabled").is_none());
    }

    #[test]
    fn test_state_strings() {
        assert_eq!(EntityValue::Bool(true).to_state(), "on");
        assert_eq!(EntityValue::Number(25.0).to_state(), "25");
        assert_eq!(EntityValue::Number(25.25).to_state(), "25.2");
    }
}
