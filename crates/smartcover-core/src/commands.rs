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

//! Device command dispatch for position-capable and binary covers.

use smartcover_types::{CoverCapabilities, POSITION_CLOSED, POSITION_OPEN};
use tracing::{debug, info};

use crate::errors::ServiceCallError;
use crate::traits::CoverController;

pub const SERVICE_SET_POSITION: &str = "cover.set_cover_position";
pub const SERVICE_OPEN: &str = "cover.open_cover";
pub const SERVICE_CLOSE: &str = "cover.close_cover";

/// Sends one command per call and reports the achieved position
pub struct CoverCommander<'a> {
    controller: &'a dyn CoverController,
    simulation: bool,
}

impl<'a> CoverCommander<'a> {
    pub fn new(controller: &'a dyn CoverController, simulation: bool) -> Self {
        Self {
            controller,
            simulation,
        }
    }

    /// Move a cover and return the position it reports achieving.
    ///
    /// In simulation mode nothing is sent and the requested position is assumed.
    pub async fn move_to(
        &self,
        entity_id: &str,
        target: u8,
        capabilities: CoverCapabilities,
    ) -> Result<u8, ServiceCallError> {
        if target > POSITION_OPEN {
            return Err(ServiceCallError::new(
                SERVICE_SET_POSITION,
                entity_id,
                format!("target {target} outside 0..=100"),
            ));
        }

        if capabilities.set_position {
            if self.simulation {
                info!("🧪 [SIMULATION] {entity_id} → {target}% (not sent)");
                return Ok(target);
            }
            let achieved = self.controller.set_cover_position(entity_id, target).await?;
            debug!("[{entity_id}] Requested {target}%, achieved {achieved}%");
            return Ok(achieved);
        }

        let open = capabilities.reachable_position(target) == POSITION_OPEN;
        let (service, achieved) = if open {
            (SERVICE_OPEN, POSITION_OPEN)
        } else {
            (SERVICE_CLOSE, POSITION_CLOSED)
        };

        if self.simulation {
            info!("🧪 [SIMULATION] {service} {entity_id} (not sent)");
            return Ok(achieved);
        }

        if open {
            self.controller.open_cover(entity_id).await?;
        } else {
            self.controller.close_cover(entity_id).await?;
        }
        Ok(achieved)
    }
}

impl std::fmt::Debug for CoverCommander<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoverCommander")
            .field("controller", &self.controller.name())
            .field("simulation", &self.simulation)
            .finish()
    }
}
