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
use serde_json::Value;

/// States HA reports for entities without a usable value
pub const UNUSABLE_STATES: [&str; 3] = ["unavailable", "unknown", ""];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HaEntityState {
    pub entity_id: String,
    pub state: String,
    #[serde(default)]
    pub attributes: Value,
    #[serde(default)]
    pub last_changed: String,
    #[serde(default)]
    pub last_updated: String,
}

impl HaEntityState {
    pub fn is_usable(&self) -> bool {
        !UNUSABLE_STATES.contains(&self.state.trim())
    }

    /// Numeric attribute, accepting numbers and numeric strings
    pub fn attr_f64(&self, name: &str) -> Option<f64> {
        match self.attributes.get(name)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn attr_str(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).and_then(Value::as_str)
    }
}

/// Body of `POST /api/states/<entity_id>`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HaStateUpdate {
    pub state: String,
    pub attributes: Value,
}
