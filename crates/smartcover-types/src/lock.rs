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
use std::str::FromStr;

use crate::settings::ConfigError;

/// User-controlled override that preempts the automatic decision logic for every cover
/// of an automation instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockMode {
    /// Normal automation (sun/temperature logic runs)
    #[default]
    Unlocked,
    /// Freeze every cover where it is
    HoldPosition,
    /// Drive every cover fully open and keep it there
    ForceOpen,
    /// Drive every cover fully closed and keep it there
    ForceClose,
}

impl LockMode {
    /// Get human-readable name for the lock mode
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Unlocked => "Unlocked",
            Self::HoldPosition => "Hold position",
            Self::ForceOpen => "Force open",
            Self::ForceClose => "Force close",
        }
    }

    /// Get config string value (snake_case), also used as the select option
    pub fn to_config_value(&self) -> &'static str {
        match self {
            Self::Unlocked => "unlocked",
            Self::HoldPosition => "hold_position",
            Self::ForceOpen => "force_open",
            Self::ForceClose => "force_close",
        }
    }

    /// List all lock modes in select-option order
    pub fn all() -> &'static [LockMode] {
        &[
            Self::Unlocked,
            Self::HoldPosition,
            Self::ForceOpen,
            Self::ForceClose,
        ]
    }

    /// True for every mode except `Unlocked`
    pub fn is_locked(&self) -> bool {
        *self != Self::Unlocked
    }
}

impl fmt::Display for LockMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_config_value())
    }
}

impl FromStr for LockMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace([' ', '-'], "_");
        Self::all()
            .iter()
            .copied()
            .find(|mode| mode.to_config_value() == normalized)
            .ok_or_else(|| ConfigError::UnknownLockMode(s.to_owned()))
    }
}
