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

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use smartcover_types::{CoverReading, LockMode, SunPosition, WindowState};
use std::fmt;
use std::sync::Arc;

use crate::errors::ServiceCallError;

/// Direction of a logged movement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveVerb {
    Opening,
    Closing,
}

impl MoveVerb {
    /// Direction of a move from `current` to `target`
    pub fn between(current: u8, target: u8) -> Self {
        if target > current {
            Self::Opening
        } else {
            Self::Closing
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Opening => "opening",
            Self::Closing => "closing",
        }
    }
}

/// Why the automation moved a cover
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveReason {
    HeatProtection,
    LetLightIn,
    CloseAfterSunset,
    LockForceOpen,
    LockForceClose,
}

impl MoveReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HeatProtection => "heat_protection",
            Self::LetLightIn => "let_light_in",
            Self::CloseAfterSunset => "close_after_sunset",
            Self::LockForceOpen => "lock_force_open",
            Self::LockForceClose => "lock_force_close",
        }
    }

    /// English phrase used in logbook messages
    pub fn describe(&self) -> &'static str {
        match self {
            Self::HeatProtection => "to protect from heat",
            Self::LetLightIn => "to let light in",
            Self::CloseAfterSunset => "after sunset",
            Self::LockForceOpen => "because the lock forces it open",
            Self::LockForceClose => "because the lock forces it closed",
        }
    }
}

impl fmt::Display for MoveReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One "why did this cover move" record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogbookEntry {
    pub verb: MoveVerb,
    pub entity_id: String,
    pub reason: MoveReason,
    pub target_position: u8,
}

impl LogbookEntry {
    pub fn new(entity_id: &str, verb: MoveVerb, reason: MoveReason, target_position: u8) -> Self {
        Self {
            verb,
            entity_id: entity_id.to_owned(),
            reason,
            target_position,
        }
    }

    /// Rendered English message
    pub fn message(&self) -> String {
        format!(
            "is {} {} (target position {}%)",
            self.verb.as_str(),
            self.reason.describe(),
            self.target_position
        )
    }
}

// ============= Capability traits =============

/// Sun geometry source. `Ok(None)` means the entity does not exist.
#[async_trait]
pub trait SunDataSource: Send + Sync {
    async fn read_sun(&self, entity_id: &str) -> Result<Option<SunPosition>>;

    fn name(&self) -> &str;
}

/// Weather forecast and condition source
#[async_trait]
pub trait WeatherDataSource: Send + Sync {
    /// Forecast maximum (°C) for the given local day, `None` if the forecast has no entry
    async fn max_forecast_temperature(
        &self,
        entity_id: &str,
        day: NaiveDate,
    ) -> Result<Option<f64>>;

    /// Current condition string (e.g. "sunny")
    async fn condition(&self, entity_id: &str) -> Result<Option<String>>;

    fn name(&self) -> &str;
}

/// Cover state reads and device commands
#[async_trait]
pub trait CoverController: Send + Sync {
    /// `Ok(None)` when the entity does not exist
    async fn get_cover_state(&self, entity_id: &str) -> Result<Option<CoverReading>>;

    /// Returns the position the device reports achieving
    async fn set_cover_position(
        &self,
        entity_id: &str,
        target: u8,
    ) -> std::result::Result<u8, ServiceCallError>;

    async fn open_cover(&self, entity_id: &str) -> std::result::Result<(), ServiceCallError>;

    async fn close_cover(&self, entity_id: &str) -> std::result::Result<(), ServiceCallError>;

    fn name(&self) -> &str;
}

/// Window contact source. `Ok(None)` when the state is unknown.
#[async_trait]
pub trait WindowSensorSource: Send + Sync {
    async fn get_window_state(&self, sensor_id: &str) -> Result<Option<WindowState>>;
}

/// Human-auditable movement trail
#[async_trait]
pub trait LogbookSink: Send + Sync {
    async fn record_event(&self, entry: &LogbookEntry) -> Result<()>;
}

/// Writes entity states to the host
#[async_trait]
pub trait StatePublisher: Send + Sync {
    async fn publish_state(&self, entity_id: &str, state: &str, attributes: Value) -> Result<()>;
}

/// External lock-mode control surface (e.g. an input_select), polled before each refresh
#[async_trait]
pub trait LockControlSource: Send + Sync {
    /// The requested mode when it changed since the last poll
    async fn poll_lock_mode(&self) -> Result<Option<LockMode>>;

    /// Instances the mode applies to, `None` for all
    fn targets(&self) -> Option<Vec<String>>;

    fn name(&self) -> &str;
}

/// Every capability one automation instance needs
#[derive(Clone)]
pub struct DataSources {
    pub sun: Arc<dyn SunDataSource>,
    pub weather: Arc<dyn WeatherDataSource>,
    pub covers: Arc<dyn CoverController>,
    pub windows: Arc<dyn WindowSensorSource>,
    pub logbook: Arc<dyn LogbookSink>,
}

impl fmt::Debug for DataSources {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataSources")
            .field("sun", &self.sun.name())
            .field("weather", &self.weather.name())
            .field("covers", &self.covers.name())
            .finish_non_exhaustive()
    }
}
