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

//! Error taxonomy for the refresh cycle.
//!
//! Configuration errors come from `smartcover_types` and are reported through the
//! snapshot. Missing sun data and internal failures are cycle-fatal. Device command
//! failures are caught per cover.

use thiserror::Error;

pub use smartcover_types::ConfigError;

/// Cycle-fatal failures. The host marks the refresh unsuccessful and keeps the
/// previous snapshot visible.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("Sun entity {entity_id} unavailable: {reason}")]
    SunUnavailable { entity_id: String, reason: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CycleError {
    pub fn sun_unavailable(entity_id: &str, reason: impl Into<String>) -> Self {
        Self::SunUnavailable {
            entity_id: entity_id.to_owned(),
            reason: reason.into(),
        }
    }
}

impl From<anyhow::Error> for CycleError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(format!("{err:#}"))
    }
}

/// A device command that did not complete
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{service} failed for {entity_id}: {reason}")]
pub struct ServiceCallError {
    pub service: String,
    pub entity_id: String,
    pub reason: String,
}

impl ServiceCallError {
    pub fn new(service: &str, entity_id: &str, reason: impl Into<String>) -> Self {
        Self {
            service: service.to_owned(),
            entity_id: entity_id.to_owned(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CycleError>;
