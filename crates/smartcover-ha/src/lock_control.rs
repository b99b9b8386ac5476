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

use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use smartcover_core::LockControlSource;
use smartcover_types::LockMode;
use std::sync::Arc;
use tracing::{info, warn};

use crate::client::HomeAssistantClient;

/// Lock-mode control surface backed by an HA `input_select`.
///
/// Reports a mode only when the select's value changed since the previous poll. The
/// first successful poll counts as a change so the select wins over persisted state.
pub struct HaLockControl {
    client: Arc<HomeAssistantClient>,
    entity_id: String,
    targets: Option<Vec<String>>,
    last_value: Mutex<Option<String>>,
}

impl HaLockControl {
    /// Control broadcasting to every instance
    pub fn broadcast(client: Arc<HomeAssistantClient>, entity_id: impl Into<String>) -> Self {
        Self {
            client,
            entity_id: entity_id.into(),
            targets: None,
            last_value: Mutex::new(None),
        }
    }

    /// Control for one instance
    pub fn for_instance(
        client: Arc<HomeAssistantClient>,
        entity_id: impl Into<String>,
        instance_id: impl Into<String>,
    ) -> Self {
        Self {
            targets: Some(vec![instance_id.into()]),
            ..Self::broadcast(client, entity_id)
        }
    }

    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }
}

#[async_trait]
impl LockControlSource for HaLockControl {
    async fn poll_lock_mode(&self) -> Result<Option<LockMode>> {
        let state = self
            .client
            .get_state(&self.entity_id)
            .await
            .with_context(|| format!("Failed to read lock control {}", self.entity_id))?;
        if !state.is_usable() {
            return Ok(None);
        }

        let value = state.state.trim().to_owned();
        {
            let mut last = self.last_value.lock();
            if last.as_deref() == Some(value.as_str()) {
                return Ok(None);
            }
            *last = Some(value.clone());
        }

        match value.parse::<LockMode>() {
            Ok(mode) => {
                info!("🔒 [LOCK] {} set to {}", self.entity_id, mode);
                Ok(Some(mode))
            }
            Err(e) => {
                warn!("⚠️ [LOCK] Ignoring {} value '{}': {}", self.entity_id, value, e);
                Ok(None)
            }
        }
    }

    fn targets(&self) -> Option<Vec<String>> {
        self.targets.clone()
    }

    fn name(&self) -> &str {
        &self.entity_id
    }
}
