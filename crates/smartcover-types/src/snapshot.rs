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

use crate::cover::CoverStateKind;
use crate::lock::LockMode;

/// Per-cover result of one refresh cycle
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CoverSnapshot {
    pub entity_id: String,
    pub cover_azimuth: f64,
    pub state: Option<CoverStateKind>,
    pub supported_features: Option<u32>,
    pub pos_current: Option<u8>,
    /// Target before clamping and reconciliation
    pub pos_target_desired: Option<u8>,
    /// Target requested of the device (after clamping)
    pub pos_target_final: Option<u8>,
    /// Position the device reported achieving, when a command was sent
    pub pos_achieved: Option<u8>,
    pub moved: bool,
    pub sun_hitting: Option<bool>,
    /// Circular sun/cover azimuth difference, rounded to 0.1°
    pub sun_azimuth_diff: Option<f64>,
    pub lockout_protection: bool,
    pub manual_override_active: bool,
    pub lock_mode: LockMode,
    pub lock_active: bool,
    /// Recent positions, newest first
    pub position_history: Vec<u8>,
    /// Why the cover was not automated this cycle
    pub skipped_reason: Option<String>,
    /// Error that prevented movement this cycle
    pub error: Option<String>,
}

impl CoverSnapshot {
    pub fn new(entity_id: impl Into<String>, cover_azimuth: f64, lock_mode: LockMode) -> Self {
        Self {
            entity_id: entity_id.into(),
            cover_azimuth,
            lock_mode,
            lock_active: lock_mode.is_locked(),
            ..Default::default()
        }
    }
}

/// Host-visible result of one refresh cycle
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CycleSnapshot {
    /// Covers in configured order
    pub covers: Vec<CoverSnapshot>,
    pub sun_azimuth: Option<f64>,
    pub sun_elevation: Option<f64>,
    pub temp_current_max: Option<f64>,
    pub temp_hot: bool,
    pub weather_sunny: bool,
    pub lock_mode: LockMode,
    pub lock_active: bool,
    /// Human-readable status
    pub message: Option<String>,
    pub last_update_success: bool,
    pub timestamp: Option<DateTime<Utc>>,
}

impl CycleSnapshot {
    /// Valid snapshot with no covers
    pub fn empty(timestamp: DateTime<Utc>, lock_mode: LockMode, message: impl Into<String>) -> Self {
        Self {
            lock_mode,
            lock_active: lock_mode.is_locked(),
            message: Some(message.into()),
            last_update_success: true,
            timestamp: Some(timestamp),
            ..Default::default()
        }
    }

    pub fn cover(&self, entity_id: &str) -> Option<&CoverSnapshot> {
        self.covers.iter().find(|c| c.entity_id == entity_id)
    }

    /// Number of covers that were commanded this cycle
    pub fn moved_count(&self) -> usize {
        self.covers.iter().filter(|c| c.moved).count()
    }
}
