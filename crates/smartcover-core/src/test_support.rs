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

//! In-memory capability fakes for unit tests.

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::NaiveDate;
use parking_lot::Mutex;
use serde_json::Value;
use smartcover_types::{CoverReading, CoverStateKind, SunPosition, WindowState};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::commands::{SERVICE_CLOSE, SERVICE_OPEN, SERVICE_SET_POSITION};
use crate::errors::ServiceCallError;
use crate::traits::{
    CoverController, DataSources, LogbookEntry, LogbookSink, StatePublisher, SunDataSource,
    WeatherDataSource, WindowSensorSource,
};

#[derive(Debug, Default)]
pub struct FakeSun {
    position: Mutex<Option<SunPosition>>,
    fail: Mutex<bool>,
}

impl FakeSun {
    pub fn at(elevation: f64, azimuth: f64) -> Self {
        let sun = Self::default();
        sun.set(Some(SunPosition::new(elevation, azimuth)));
        sun
    }

    pub fn set(&self, position: Option<SunPosition>) {
        *self.position.lock() = position;
    }

    pub fn set_failing(&self, fail: bool) {
        *self.fail.lock() = fail;
    }
}

#[async_trait]
impl SunDataSource for FakeSun {
    async fn read_sun(&self, entity_id: &str) -> Result<Option<SunPosition>> {
        if *self.fail.lock() {
            return Err(anyhow!("{entity_id} read failed"));
        }
        Ok(*self.position.lock())
    }

    fn name(&self) -> &str {
        "fake_sun"
    }
}

#[derive(Debug, Default)]
pub struct FakeWeather {
    temperature: Mutex<Option<f64>>,
    fail: Mutex<bool>,
    condition: Mutex<Option<String>>,
    requested_days: Mutex<Vec<NaiveDate>>,
}

impl FakeWeather {
    pub fn with_temperature(temperature: f64) -> Self {
        let weather = Self::default();
        weather.set_temperature(Some(temperature));
        weather.set_condition(Some("sunny"));
        weather
    }

    pub fn set_temperature(&self, temperature: Option<f64>) {
        *self.temperature.lock() = temperature;
    }

    pub fn set_failing(&self, fail: bool) {
        *self.fail.lock() = fail;
    }

    pub fn set_condition(&self, condition: Option<&str>) {
        *self.condition.lock() = condition.map(str::to_owned);
    }

    pub fn requested_days(&self) -> Vec<NaiveDate> {
        self.requested_days.lock().clone()
    }
}

#[async_trait]
impl WeatherDataSource for FakeWeather {
    async fn max_forecast_temperature(
        &self,
        entity_id: &str,
        day: NaiveDate,
    ) -> Result<Option<f64>> {
        self.requested_days.lock().push(day);
        if *self.fail.lock() {
            return Err(anyhow!("{entity_id} forecast failed"));
        }
        Ok(*self.temperature.lock())
    }

    async fn condition(&self, _entity_id: &str) -> Result<Option<String>> {
        Ok(self.condition.lock().clone())
    }

    fn name(&self) -> &str {
        "fake_weather"
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SentCommand {
    SetPosition(String, u8),
    Open(String),
    Close(String),
}

#[derive(Debug, Default)]
struct FakeCoversInner {
    covers: HashMap<String, CoverReading>,
    achieved_override: HashMap<String, u8>,
    failing: HashSet<String>,
    commands: Vec<SentCommand>,
}

/// Covers that move instantly to whatever they are told
#[derive(Debug, Default)]
pub struct FakeCovers {
    inner: Mutex<FakeCoversInner>,
}

impl FakeCovers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_position_cover(&self, entity_id: &str, position: u8) {
        self.inner.lock().covers.insert(
            entity_id.to_owned(),
            CoverReading::new(state_for(position), Some(position), 15),
        );
    }

    pub fn add_binary_cover(&self, entity_id: &str, open: bool) {
        let state = if open {
            CoverStateKind::Open
        } else {
            CoverStateKind::Closed
        };
        self.inner
            .lock()
            .covers
            .insert(entity_id.to_owned(), CoverReading::new(state, None, 3));
    }

    /// Simulate someone moving the cover by hand
    pub fn move_externally(&self, entity_id: &str, position: u8) {
        if let Some(reading) = self.inner.lock().covers.get_mut(entity_id) {
            reading.position = Some(position);
            reading.state = state_for(position);
        }
    }

    pub fn set_state(&self, entity_id: &str, state: CoverStateKind) {
        if let Some(reading) = self.inner.lock().covers.get_mut(entity_id) {
            reading.state = state;
        }
    }

    pub fn set_achieved_override(&self, entity_id: &str, achieved: u8) {
        self.inner
            .lock()
            .achieved_override
            .insert(entity_id.to_owned(), achieved);
    }

    pub fn fail_commands_for(&self, entity_id: &str) {
        self.inner.lock().failing.insert(entity_id.to_owned());
    }

    pub fn position(&self, entity_id: &str) -> Option<u8> {
        self.inner
            .lock()
            .covers
            .get(entity_id)
            .map(CoverReading::normalized_position)
    }

    pub fn commands(&self) -> Vec<SentCommand> {
        self.inner.lock().commands.clone()
    }

    fn check_failing(&self, service: &str, entity_id: &str) -> Result<(), ServiceCallError> {
        if self.inner.lock().failing.contains(entity_id) {
            return Err(ServiceCallError::new(service, entity_id, "device offline"));
        }
        Ok(())
    }

    fn settle(&self, entity_id: &str, position: u8, binary: bool) {
        if let Some(reading) = self.inner.lock().covers.get_mut(entity_id) {
            reading.state = state_for(position);
            if !binary {
                reading.position = Some(position);
            }
        }
    }
}

fn state_for(position: u8) -> CoverStateKind {
    if position == 0 {
        CoverStateKind::Closed
    } else {
        CoverStateKind::Open
    }
}

#[async_trait]
impl CoverController for FakeCovers {
    async fn get_cover_state(&self, entity_id: &str) -> Result<Option<CoverReading>> {
        Ok(self.inner.lock().covers.get(entity_id).cloned())
    }

    async fn set_cover_position(&self, entity_id: &str, target: u8) -> Result<u8, ServiceCallError> {
        self.check_failing(SERVICE_SET_POSITION, entity_id)?;
        let achieved = {
            let mut inner = self.inner.lock();
            inner
                .commands
                .push(SentCommand::SetPosition(entity_id.to_owned(), target));
            inner
                .achieved_override
                .get(entity_id)
                .copied()
                .unwrap_or(target)
        };
        self.settle(entity_id, achieved, false);
        Ok(achieved)
    }

    async fn open_cover(&self, entity_id: &str) -> Result<(), ServiceCallError> {
        self.check_failing(SERVICE_OPEN, entity_id)?;
        self.inner
            .lock()
            .commands
            .push(SentCommand::Open(entity_id.to_owned()));
        self.settle(entity_id, 100, true);
        Ok(())
    }

    async fn close_cover(&self, entity_id: &str) -> Result<(), ServiceCallError> {
        self.check_failing(SERVICE_CLOSE, entity_id)?;
        self.inner
            .lock()
            .commands
            .push(SentCommand::Close(entity_id.to_owned()));
        self.settle(entity_id, 0, true);
        Ok(())
    }

    fn name(&self) -> &str {
        "fake_covers"
    }
}

#[derive(Debug, Default)]
pub struct FakeWindows {
    states: Mutex<HashMap<String, WindowState>>,
    failing: Mutex<HashSet<String>>,
}

impl FakeWindows {
    pub fn set(&self, sensor_id: &str, state: WindowState) {
        self.states.lock().insert(sensor_id.to_owned(), state);
    }

    pub fn set_failing(&self, sensor_id: &str) {
        self.failing.lock().insert(sensor_id.to_owned());
    }
}

#[async_trait]
impl WindowSensorSource for FakeWindows {
    async fn get_window_state(&self, sensor_id: &str) -> Result<Option<WindowState>> {
        if self.failing.lock().contains(sensor_id) {
            return Err(anyhow!("sensor {sensor_id} unreachable"));
        }
        Ok(self.states.lock().get(sensor_id).copied())
    }
}

#[derive(Debug, Default)]
pub struct RecordingLogbook {
    entries: Mutex<Vec<LogbookEntry>>,
}

impl RecordingLogbook {
    pub fn entries(&self) -> Vec<LogbookEntry> {
        self.entries.lock().clone()
    }
}

#[async_trait]
impl LogbookSink for RecordingLogbook {
    async fn record_event(&self, entry: &LogbookEntry) -> Result<()> {
        self.entries.lock().push(entry.clone());
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct RecordingPublisher {
    states: Mutex<HashMap<String, (String, Value)>>,
}

impl RecordingPublisher {
    pub fn state(&self, entity_id: &str) -> Option<String> {
        self.states.lock().get(entity_id).map(|(s, _)| s.clone())
    }

    pub fn count(&self) -> usize {
        self.states.lock().len()
    }
}

#[async_trait]
impl StatePublisher for RecordingPublisher {
    async fn publish_state(&self, entity_id: &str, state: &str, attributes: Value) -> Result<()> {
        self.states
            .lock()
            .insert(entity_id.to_owned(), (state.to_owned(), attributes));
        Ok(())
    }
}

/// Handles to every fake behind one `DataSources`
#[derive(Debug, Clone)]
pub struct Fakes {
    pub sun: Arc<FakeSun>,
    pub weather: Arc<FakeWeather>,
    pub covers: Arc<FakeCovers>,
    pub windows: Arc<FakeWindows>,
    pub logbook: Arc<RecordingLogbook>,
}

impl Fakes {
    pub fn new(temperature: f64, elevation: f64, azimuth: f64) -> Self {
        Self {
            sun: Arc::new(FakeSun::at(elevation, azimuth)),
            weather: Arc::new(FakeWeather::with_temperature(temperature)),
            covers: Arc::new(FakeCovers::new()),
            windows: Arc::new(FakeWindows::default()),
            logbook: Arc::new(RecordingLogbook::default()),
        }
    }

    pub fn sources(&self) -> DataSources {
        DataSources {
            sun: self.sun.clone(),
            weather: self.weather.clone(),
            covers: self.covers.clone(),
            windows: self.windows.clone(),
            logbook: self.logbook.clone(),
        }
    }
}
