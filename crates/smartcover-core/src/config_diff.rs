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

//! Distinguishes settings that can be applied to the next cycle in place from
//! changes that need the instance rebuilt.

use smartcover_types::{GlobalSettings, InstanceConfig, SettingKey};
use std::collections::BTreeSet;

/// Keys applied to the next cycle without rebuilding the instance
pub const HOT_RELOADABLE_KEYS: [SettingKey; 18] = SettingKey::ALL;

/// A change that requires rebuilding the instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum StructuralChange {
    /// Covers added, removed, reordered, or a cover's azimuth/window sensors changed
    Covers,
    WeatherEntity,
    SunEntity,
    LockControlEntity,
    PublishPrefix,
}

impl StructuralChange {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Covers => "covers",
            Self::WeatherEntity => "weather_entity",
            Self::SunEntity => "sun_entity",
            Self::LockControlEntity => "lock_control_entity",
            Self::PublishPrefix => "publish_prefix",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigDiff {
    changed_keys: BTreeSet<SettingKey>,
    structural: BTreeSet<StructuralChange>,
    cover_limits_changed: bool,
}

impl ConfigDiff {
    /// Changed setting keys between two resolved settings
    pub fn between_settings(old: &GlobalSettings, new: &GlobalSettings) -> Self {
        let old_map = old.to_map();
        let new_map = new.to_map();
        let changed_keys = SettingKey::ALL
            .into_iter()
            .filter(|key| old_map.get(key.as_str()) != new_map.get(key.as_str()))
            .collect();
        Self {
            changed_keys,
            ..Default::default()
        }
    }

    pub fn between(old: &InstanceConfig, new: &InstanceConfig) -> Self {
        let mut diff = Self::between_settings(&old.settings, &new.settings);

        let same_layout = old.covers.len() == new.covers.len()
            && old.covers.iter().zip(&new.covers).all(|(a, b)| {
                a.entity_id == b.entity_id
                    && a.azimuth.to_bits() == b.azimuth.to_bits()
                    && a.window_sensors == b.window_sensors
            });
        if same_layout {
            diff.cover_limits_changed = old
                .covers
                .iter()
                .zip(&new.covers)
                .any(|(a, b)| a.min_closure != b.min_closure || a.max_closure != b.max_closure);
        } else {
            diff.structural.insert(StructuralChange::Covers);
        }

        if old.weather_entity != new.weather_entity {
            diff.structural.insert(StructuralChange::WeatherEntity);
        }
        if old.sun_entity != new.sun_entity {
            diff.structural.insert(StructuralChange::SunEntity);
        }
        if old.lock_control_entity != new.lock_control_entity {
            diff.structural.insert(StructuralChange::LockControlEntity);
        }
        if old.publish_prefix() != new.publish_prefix() {
            diff.structural.insert(StructuralChange::PublishPrefix);
        }

        diff
    }

    pub fn changed_keys(&self) -> &BTreeSet<SettingKey> {
        &self.changed_keys
    }

    /// Changed keys that can be applied in place
    pub fn hot_keys(&self) -> impl Iterator<Item = SettingKey> + '_ {
        self.changed_keys
            .iter()
            .copied()
            .filter(|key| HOT_RELOADABLE_KEYS.contains(key))
    }

    pub fn structural_changes(&self) -> &BTreeSet<StructuralChange> {
        &self.structural
    }

    pub fn cover_limits_changed(&self) -> bool {
        self.cover_limits_changed
    }

    pub fn requires_reload(&self) -> bool {
        !self.structural.is_empty()
            || self
                .changed_keys
                .iter()
                .any(|key| !HOT_RELOADABLE_KEYS.contains(key))
    }

    pub fn is_empty(&self) -> bool {
        self.changed_keys.is_empty() && self.structural.is_empty() && !self.cover_limits_changed
    }

    pub fn merge(&mut self, other: ConfigDiff) {
        self.changed_keys.extend(other.changed_keys);
        self.structural.extend(other.structural);
        self.cover_limits_changed |= other.cover_limits_changed;
    }

    /// Comma-separated list of everything that changed
    pub fn describe(&self) -> String {
        let mut parts: Vec<&str> = self.changed_keys.iter().map(SettingKey::as_str).collect();
        parts.extend(self.structural.iter().map(StructuralChange::as_str));
        if self.cover_limits_changed {
            parts.push("cover_limits");
        }
        parts.join(", ")
    }
}
