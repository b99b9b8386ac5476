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

use bevy_ecs::prelude::Resource;
use smartcover_types::LockMode;
use std::collections::BTreeMap;
use tracing::{info, warn};

use crate::entities::{EntityError, EntityValue};
use crate::worker::{InstanceHandle, WorkerCommand};

/// Where a routed command ended up
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Delivery {
    pub delivered: Vec<String>,
    /// Requested ids with no registered instance, or whose worker has stopped
    pub unknown: Vec<String>,
}

impl Delivery {
    pub fn is_complete(&self) -> bool {
        self.unknown.is_empty()
    }
}

/// Maps instance ids to their workers.
///
/// Only the process boundary (lock-mode control surface, ECS scheduler) uses this;
/// instances never look each other up.
#[derive(Resource, Debug, Clone, Default)]
pub struct InstanceRegistry {
    instances: BTreeMap<String, InstanceHandle>,
}

impl InstanceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a worker, replacing any previous one with the same id
    pub fn register(&mut self, handle: InstanceHandle) -> Option<InstanceHandle> {
        let id = handle.id().to_owned();
        let previous = self.instances.insert(id.clone(), handle);
        if previous.is_some() {
            warn!("Instance {} re-registered, previous worker replaced", id);
        }
        previous
    }

    pub fn remove(&mut self, id: &str) -> Option<InstanceHandle> {
        self.instances.remove(id)
    }

    pub fn get(&self, id: &str) -> Option<&InstanceHandle> {
        self.instances.get(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.instances.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Send a command to the listed instances, or to every instance when `None`
    pub fn dispatch(&self, command: &WorkerCommand, targets: Option<&[String]>) -> Delivery {
        let mut delivery = Delivery::default();
        let ids: Vec<&str> = match targets {
            Some(targets) => targets.iter().map(String::as_str).collect(),
            None => self.ids().collect(),
        };

        for id in ids {
            match self.instances.get(id) {
                Some(handle) if handle.send(command.clone()) => {
                    delivery.delivered.push(id.to_owned());
                }
                Some(_) => {
                    warn!("⚠️ Instance {} worker stopped, command dropped", id);
                    delivery.unknown.push(id.to_owned());
                }
                None => {
                    warn!("⚠️ Unknown instance id: {}", id);
                    delivery.unknown.push(id.to_owned());
                }
            }
        }
        delivery
    }

    /// Change the lock mode of the listed instances, broadcasting when `None`
    pub fn set_lock_mode(&self, mode: LockMode, targets: Option<&[String]>) -> Delivery {
        let delivery = self.dispatch(&WorkerCommand::SetLockMode(mode), targets);
        info!(
            "🔒 [LOCK] {} routed to {} instance(s){}",
            mode,
            delivery.delivered.len(),
            if delivery.unknown.is_empty() {
                String::new()
            } else {
                format!(", unknown: {}", delivery.unknown.join(", "))
            }
        );
        delivery
    }

    pub fn refresh_all(&self) -> Delivery {
        self.dispatch(&WorkerCommand::Refresh, None)
    }

    /// Route a host write to whichever instance owns `entity_id`
    pub fn set_entity_value(
        &self,
        entity_id: &str,
        value: EntityValue,
    ) -> Result<Delivery, EntityError> {
        let (id, handle) = self
            .instances
            .iter()
            .find(|(_, handle)| handle.entities().get(entity_id).is_some())
            .ok_or_else(|| EntityError::UnknownEntity(entity_id.to_owned()))?;
        let command = WorkerCommand::from(handle.entities().set_value(entity_id, value)?);
        Ok(self.dispatch(&command, Some(std::slice::from_ref(id))))
    }
}
