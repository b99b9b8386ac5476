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

use thiserror::Error;

/// Home Assistant API errors
#[derive(Debug, Error)]
pub enum HaError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Entity not found: {0}")]
    EntityNotFound(String),

    #[error("Authentication failed")]
    AuthenticationFailed,

    #[error("API error (status {status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("Service call {service} failed: {reason}")]
    ServiceCallFailed { service: String, reason: String },

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl HaError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::EntityNotFound(_))
    }
}

pub type HaResult<T> = std::result::Result<T, HaError>;
