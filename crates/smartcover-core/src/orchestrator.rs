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

//! Refresh cycle orchestration for one automation instance.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use smartcover_types::{
    CoverCapabilities, CoverConfig, CoverSnapshot, CycleSnapshot, ForecastTemperature,
    GlobalSettings, InstanceConfig, LockMode, WindowState, is_sunny_condition,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::commands::CoverCommander;
use crate::config_diff::ConfigDiff;
use crate::engine::{Action, CoverInputs, CycleSignals, Decision, Hold, decide};
use crate::errors::{CycleError, Result};
use crate::lock::LockState;
use crate::manual_override::ManualOverrideTracker;
use crate::position_history::PositionHistory;
use crate::traits::{DataSources, LogbookEntry, MoveReason, MoveVerb};

/// Runs refresh cycles for one instance, strictly one at a time
pub struct Orchestrator {
    config: InstanceConfig,
    sources: DataSources,
    clock: Arc<dyn Clock>,
    timezone: Tz,
    lock: LockState,
    overrides: ManualOverrideTracker,
    history: PositionHistory,
    /// Last observed forecast availability, for transition logging
    weather_available: Option<bool>,
    /// Last reported settings error, logged once
    settings_error: Option<String>,
    /// Target of the last simulated move per cover
    simulated: HashMap<String, u8>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("instance", &self.config.id)
            .field("covers", &self.config.covers.len())
            .field("lock", &self.lock.mode())
            .field("timezone", &self.timezone)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    pub fn new(
        config: InstanceConfig,
        sources: DataSources,
        clock: Arc<dyn Clock>,
        timezone: Tz,
    ) -> Self {
        let history = PositionHistory::new(config.settings.position_history_depth);
        Self {
            config,
            sources,
            clock,
            timezone,
            lock: LockState::default(),
            overrides: ManualOverrideTracker::new(),
            history,
            weather_available: None,
            settings_error: None,
            simulated: HashMap::new(),
        }
    }

    /// Restore a persisted lock mode
    pub fn with_lock_mode(mut self, mode: LockMode) -> Self {
        self.lock = LockState::new(mode);
        self
    }

    pub fn id(&self) -> &str {
        &self.config.id
    }

    pub fn config(&self) -> &InstanceConfig {
        &self.config
    }

    pub fn settings(&self) -> &GlobalSettings {
        &self.config.settings
    }

    pub fn lock_mode(&self) -> LockMode {
        self.lock.mode()
    }

    pub fn history(&self) -> &PositionHistory {
        &self.history
    }

    pub fn overrides(&self) -> &ManualOverrideTracker {
        &self.overrides
    }

    /// Takes effect on the next cycle. A transition clears manual overrides.
    pub fn set_lock_mode(&mut self, mode: LockMode) -> bool {
        let changed = self.lock.set_lock_mode(mode);
        if changed {
            self.overrides.clear();
        }
        changed
    }

    /// Apply hot-reloadable settings in place
    pub fn apply_settings(&mut self, settings: GlobalSettings) -> ConfigDiff {
        let diff = ConfigDiff::between_settings(&self.config.settings, &settings);
        if !diff.is_empty() {
            info!(
                "⚙️ [CONFIG] {}: applying {} changed setting(s): {}",
                self.config.id,
                diff.changed_keys().len(),
                diff.describe()
            );
            self.history.set_depth(settings.position_history_depth);
            self.config.settings = settings;
            self.settings_error = None;
        }
        diff
    }

    /// Apply a new instance configuration. Structural changes are not applied and
    /// the returned diff reports `requires_reload()`.
    pub fn apply_config(&mut self, config: InstanceConfig) -> ConfigDiff {
        let mut diff = ConfigDiff::between(&self.config, &config);
        if diff.requires_reload() {
            warn!(
                "⚙️ [CONFIG] {}: structural change ({}), instance must be rebuilt",
                self.config.id,
                diff.describe()
            );
            return diff;
        }

        if diff.cover_limits_changed() {
            self.config.covers = config.covers;
        }
        let settings_diff = self.apply_settings(config.settings);
        diff.merge(settings_diff);
        diff
    }

    /// Run one refresh cycle
    pub async fn run_cycle(&mut self) -> Result<CycleSnapshot> {
        let now = self.clock.now();
        let lock_mode = self.lock.mode();
        let settings = self.config.settings.clone();

        if self.config.covers.is_empty() {
            info!("ℹ️ [CYCLE] {}: no covers configured", self.config.id);
            return Ok(CycleSnapshot::empty(now, lock_mode, "No covers configured"));
        }

        if let Err(e) = settings.validate() {
            let message = e.to_string();
            if self.settings_error.as_deref() != Some(message.as_str()) {
                error!("❌ [CONFIG] {}: {}", self.config.id, message);
                self.settings_error = Some(message.clone());
            }
            return Ok(CycleSnapshot::empty(
                now,
                lock_mode,
                format!("Configuration error: {message}"),
            ));
        }
        self.settings_error = None;

        let local = now.with_timezone(&self.timezone);
        let sun = match self.sources.sun.read_sun(&self.config.sun_entity).await {
            Ok(Some(sun)) => sun,
            Ok(None) => {
                return Err(CycleError::sun_unavailable(
                    &self.config.sun_entity,
                    "entity not found",
                ));
            }
            Err(e) => {
                return Err(CycleError::sun_unavailable(
                    &self.config.sun_entity,
                    format!("{e:#}"),
                ));
            }
        };

        let forecast_day = forecast_day(local.date_naive(), local.time(), &settings);
        let temperature = self.read_temperature(forecast_day).await;
        let weather_sunny = match self
            .sources
            .weather
            .condition(&self.config.weather_entity)
            .await
        {
            Ok(condition) => is_sunny_condition(condition.as_deref()),
            Err(e) => {
                debug!("Weather condition unavailable: {e:#}");
                true
            }
        };

        let signals = CycleSignals {
            sun,
            temperature,
            weather_sunny,
            now,
            local_time: local.time(),
        };

        let mut snapshot = CycleSnapshot {
            covers: Vec::with_capacity(self.config.covers.len()),
            sun_azimuth: Some(sun.azimuth),
            sun_elevation: Some(sun.elevation),
            temp_current_max: temperature.value(),
            temp_hot: temperature.is_hot(settings.temp_threshold),
            weather_sunny,
            lock_mode,
            lock_active: lock_mode.is_locked(),
            message: None,
            last_update_success: true,
            timestamp: Some(now),
        };

        if let Some(reason) = disabled_reason(&settings, &signals) {
            info!("⏸️ [CYCLE] {}: {}", self.config.id, reason);
            for cover in &self.config.covers {
                let mut entry = CoverSnapshot::new(&cover.entity_id, cover.azimuth, lock_mode);
                entry.skipped_reason = Some("automation_disabled".to_owned());
                entry.position_history = self.history.positions(&cover.entity_id);
                snapshot.covers.push(entry);
            }
            snapshot.message = Some(reason);
            return Ok(snapshot);
        }

        let covers = self.config.covers.clone();
        for cover in &covers {
            let entry = self.process_cover(cover, &signals, &settings).await;
            snapshot.covers.push(entry);
        }

        let failed = snapshot.covers.iter().filter(|c| c.error.is_some()).count();
        snapshot.message = status_message(temperature, failed);

        info!(
            "✅ [CYCLE] {}: {} cover(s), {} moved, {} failed (sun {:.1}°/{:.1}°, max temp {})",
            self.config.id,
            snapshot.covers.len(),
            snapshot.moved_count(),
            failed,
            sun.elevation,
            sun.azimuth,
            temperature
                .value()
                .map_or_else(|| "n/a".to_owned(), |t| format!("{t:.1}°C"))
        );

        Ok(snapshot)
    }

    async fn read_temperature(&mut self, day: NaiveDate) -> ForecastTemperature {
        let result = self
            .sources
            .weather
            .max_forecast_temperature(&self.config.weather_entity, day)
            .await;

        let (temperature, failure) = match result {
            Ok(Some(t)) if t.is_finite() => (ForecastTemperature::Available(t), None),
            Ok(_) => (
                ForecastTemperature::Unavailable,
                Some(format!("no forecast entry for {day}")),
            ),
            Err(e) => (ForecastTemperature::Unavailable, Some(format!("{e:#}"))),
        };

        let available = temperature.is_available();
        if self.weather_available != Some(available) {
            match failure {
                Some(reason) => warn!(
                    "⚠️ [WEATHER] {}: forecast unavailable, heat protection inactive: {}",
                    self.config.weather_entity, reason
                ),
                None if self.weather_available.is_some() => info!(
                    "✅ [WEATHER] {}: forecast available again",
                    self.config.weather_entity
                ),
                None => {}
            }
            self.weather_available = Some(available);
        }

        temperature
    }

    async fn process_cover(
        &mut self,
        cover: &CoverConfig,
        signals: &CycleSignals,
        settings: &GlobalSettings,
    ) -> CoverSnapshot {
        let entity_id = cover.entity_id.as_str();
        let lock_mode = self.lock.mode();
        let mut entry = CoverSnapshot::new(entity_id, cover.azimuth, lock_mode);

        if let Err(e) = cover.validate() {
            warn!("[{entity_id}] Invalid cover configuration: {e}");
            entry.error = Some(e.to_string());
            return entry;
        }

        let reading = match self.sources.covers.get_cover_state(entity_id).await {
            Ok(Some(reading)) => reading,
            Ok(None) => {
                info!("[{entity_id}] Cover state unavailable, skipping");
                entry.skipped_reason = Some("state_unavailable".to_owned());
                return entry;
            }
            Err(e) => {
                warn!("[{entity_id}] Failed to read cover state: {e:#}");
                entry.error = Some(format!("{e:#}"));
                return entry;
            }
        };

        entry.state = Some(reading.state);
        entry.supported_features = Some(reading.supported_features);

        if !reading.state.is_usable() {
            info!("[{entity_id}] Cover state '{}' unsupported, skipping", reading.state);
            entry.skipped_reason = Some(format!("state_{}", reading.state));
            return entry;
        }
        if reading.state.is_transitional() {
            info!("[{entity_id}] Cover is currently moving, skipping");
            entry.skipped_reason = Some("moving".to_owned());
            entry.position_history = self.history.positions(entity_id);
            return entry;
        }

        let current = reading.normalized_position();
        entry.pos_current = Some(current);

        self.overrides.observe(entity_id, current, signals.now);
        let manual_override_active = lock_mode == LockMode::Unlocked
            && self
                .overrides
                .is_active(entity_id, signals.now, settings.manual_override_duration);
        entry.manual_override_active = manual_override_active;

        let window_open = self.any_window_open(cover).await;
        let inputs = CoverInputs {
            config: cover,
            current,
            window_open,
            manual_override_active,
            lock: self.lock.action(),
            capabilities: reading.capabilities,
        };

        let decision = match decide(&inputs, signals, settings) {
            Ok(decision) => decision,
            Err(e) => {
                warn!("[{entity_id}] {e}");
                entry.error = Some(e.to_string());
                self.record_unmoved(entity_id, current, signals.now);
                entry.position_history = self.history.positions(entity_id);
                return entry;
            }
        };

        fill_decision(&mut entry, &decision);
        log_decision(settings.verbose_logging, entity_id, current, &decision);

        match decision.action {
            Action::Move { target, .. } if self.already_simulated(entity_id, target) => {
                debug!("[{entity_id}] Move to {target}% already simulated, skipping");
                entry.skipped_reason = Some("already_simulated".to_owned());
                self.record_unmoved(entity_id, current, signals.now);
            }
            Action::Move { target, reason } => {
                self.execute_move(&mut entry, &reading.capabilities, target, reason, signals.now)
                    .await;
            }
            Action::Stay(hold) => {
                if hold != Hold::AtTarget {
                    entry.skipped_reason = Some(hold.as_str().to_owned());
                }
                self.simulated.remove(entity_id);
                self.record_unmoved(entity_id, current, signals.now);
            }
        }

        entry.position_history = self.history.positions(entity_id);
        entry
    }

    async fn execute_move(
        &mut self,
        entry: &mut CoverSnapshot,
        capabilities: &CoverCapabilities,
        target: u8,
        reason: MoveReason,
        now: DateTime<Utc>,
    ) {
        let entity_id = entry.entity_id.clone();
        let simulation = self.config.settings.simulation_mode;
        let commander = CoverCommander::new(self.sources.covers.as_ref(), simulation);
        let verb = MoveVerb::between(entry.pos_current.unwrap_or(target), target);

        match commander.move_to(&entity_id, target, *capabilities).await {
            Ok(achieved) => {
                info!("🪟 [{entity_id}] {} to {achieved}% ({reason})", verb.as_str());
                entry.pos_achieved = Some(achieved);
                entry.moved = true;
                self.history.add(&entity_id, achieved, true, now);
                // A simulated move leaves the device where it was
                let expected = if simulation {
                    entry.pos_current.unwrap_or(achieved)
                } else {
                    achieved
                };
                self.overrides.set_expected(&entity_id, expected);
                if simulation {
                    self.simulated.insert(entity_id.clone(), target);
                } else {
                    self.simulated.remove(&entity_id);
                }

                let logbook_entry = LogbookEntry::new(&entity_id, verb, reason, achieved);
                if let Err(e) = self.sources.logbook.record_event(&logbook_entry).await {
                    debug!("[{entity_id}] Logbook entry failed: {e:#}");
                }
            }
            Err(e) => {
                error!("❌ [{entity_id}] Failed to control cover: {e}");
                entry.error = Some(e.to_string());
                self.simulated.remove(&entity_id);
                let current = entry.pos_current.unwrap_or_default();
                self.record_unmoved(&entity_id, current, now);
            }
        }
    }

    fn already_simulated(&self, entity_id: &str, target: u8) -> bool {
        self.config.settings.simulation_mode && self.simulated.get(entity_id) == Some(&target)
    }

    fn record_unmoved(&mut self, entity_id: &str, current: u8, now: DateTime<Utc>) {
        self.history.add(entity_id, current, false, now);
        self.overrides.set_expected(entity_id, current);
    }

    /// An unreadable sensor counts as closed
    async fn any_window_open(&self, cover: &CoverConfig) -> bool {
        for sensor in &cover.window_sensors {
            match self.sources.windows.get_window_state(sensor).await {
                Ok(Some(WindowState::Open)) => {
                    debug!("[{}] Window {sensor} is open", cover.entity_id);
                    return true;
                }
                Ok(_) => {}
                Err(e) => warn!(
                    "⚠️ [{}] Window {sensor} unreadable, treating as closed: {e:#}",
                    cover.entity_id
                ),
            }
        }
        false
    }
}

/// Today's forecast before the cutover time, tomorrow's from then on
pub fn forecast_day(
    today: NaiveDate,
    local_time: chrono::NaiveTime,
    settings: &GlobalSettings,
) -> NaiveDate {
    if local_time >= settings.weather_hot_cutover_time {
        today + Duration::days(1)
    } else {
        today
    }
}

fn disabled_reason(settings: &GlobalSettings, signals: &CycleSignals) -> Option<String> {
    if !settings.enabled {
        return Some("Automation disabled".to_owned());
    }
    settings
        .automation_disabled_time_range
        .filter(|range| range.contains(signals.local_time))
        .map(|range| format!("Automation disabled during {range}"))
}

fn status_message(temperature: ForecastTemperature, failed: usize) -> Option<String> {
    let mut parts = Vec::new();
    if !temperature.is_available() {
        parts.push("Weather forecast unavailable, heat protection inactive".to_owned());
    }
    if failed > 0 {
        parts.push(format!("{failed} cover(s) could not be controlled"));
    }
    (!parts.is_empty()).then(|| parts.join("; "))
}

fn fill_decision(entry: &mut CoverSnapshot, decision: &Decision) {
    entry.pos_target_desired = Some(decision.desired);
    entry.pos_target_final = Some(decision.final_target);
    entry.lockout_protection = decision.lockout_protection;
    if let Some(hit) = decision.sun_hit {
        entry.sun_hitting = Some(hit.hitting);
        entry.sun_azimuth_diff = Some(hit.rounded_diff());
    }
}

fn log_decision(verbose: bool, entity_id: &str, current: u8, decision: &Decision) {
    let outcome = match decision.action {
        Action::Move { target, reason } => format!("move {current}% → {target}% ({reason})"),
        Action::Stay(hold) => format!("stay at {current}% ({})", hold.as_str()),
    };
    if verbose {
        info!(
            "[{entity_id}] desired {}%, final {}%: {outcome}",
            decision.desired, decision.final_target
        );
    } else {
        debug!(
            "[{entity_id}] desired {}%, final {}%: {outcome}",
            decision.desired, decision.final_target
        );
    }
}
