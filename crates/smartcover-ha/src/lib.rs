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

pub mod adapters;
pub mod client;
pub mod errors;
pub mod lock_control;
pub mod types;
pub mod weather;

pub use adapters::{
    HaCoverAdapter, HaLogbookSink, HaStatePublisher, HaSunAdapter, HaWindowSensorAdapter,
};
pub use client::HomeAssistantClient;
pub use errors::{HaError, HaResult};
pub use lock_control::HaLockControl;
pub use types::HaEntityState;
pub use weather::HaWeatherAdapter;

use smartcover_core::DataSources;
use std::sync::Arc;

/// Every capability of one instance, backed by the same HA client
pub fn data_sources(client: &Arc<HomeAssistantClient>) -> DataSources {
    DataSources {
        sun: Arc::new(HaSunAdapter::new(client.clone())),
        weather: Arc::new(HaWeatherAdapter::new(client.clone())),
        covers: Arc::new(HaCoverAdapter::new(client.clone())),
        windows: Arc::new(HaWindowSensorAdapter::new(client.clone())),
        logbook: Arc::new(HaLogbookSink::new(client.clone())),
    }
}
