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

pub mod cover;
pub mod instance;
pub mod lock;
pub mod settings;
pub mod signals;
pub mod snapshot;

// Re-export common types for convenience
pub use cover::{
    ClosureLimits, CoverCapabilities, CoverConfig, CoverReading, CoverStateKind, POSITION_CLOSED,
    POSITION_OPEN, WindowState,
};
pub use instance::InstanceConfig;
pub use lock::LockMode;
pub use settings::{
    ConfigError, GlobalSettings, SettingKey, SettingKind, TimeRange, resolve_settings,
};
pub use signals::{ForecastTemperature, SunPosition, is_sunny_condition};
pub use snapshot::{CoverSnapshot, CycleSnapshot};
