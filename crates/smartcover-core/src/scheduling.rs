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

//! ECS side of the refresh loop: schedule refreshes, collect outcomes.

use bevy_ecs::prelude::*;
use chrono::{DateTime, Utc};
use crossbeam_channel::{Receiver, Sender};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::async_runtime::AsyncRuntime;
use crate::registry::InstanceRegistry;
use crate::traits::LockControlSource;
use crate::worker::CycleOutcome;

/// Default refresh interval
pub const DEFAULT_UPDATE_INTERVAL_SECS: u64 = 60;

/// Channel capacity for cycle outcomes (one per instance per refresh)
const OUTCOME_CHANNEL_CAPACITY: usize = 100;

/// Resource: how often every instance is refreshed
#[derive(Resource, Debug, Clone)]
pub struct RefreshSchedule {
    pub interval: Duration,
    last: Option<Instant>,
}

impl RefreshSchedule {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    /// True on the first call and whenever `interval` has elapsed since the last due tick
    pub fn is_due(&mut self, now: Instant) -> bool {
        if let Some(last) = self.last
            && now.duration_since(last) < self.interval
        {
            return false;
        }
        self.last = Some(now);
        true
    }
}

impl Default for RefreshSchedule {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_UPDATE_INTERVAL_SECS))
    }
}

/// Resource: lock-mode control surfaces polled before each refresh
#[derive(Resource, Clone, Default)]
pub struct LockControlSources(pub Vec<Arc<dyn LockControlSource>>);

/// Resource: worker → ECS outcome channel
#[derive(Resource, Debug, Clone)]
pub struct CycleOutcomeChannel {
    pub sender: Sender<CycleOutcome>,
    pub receiver: Receiver<CycleOutcome>,
}

impl Default for CycleOutcomeChannel {
    fn default() -> Self {
        let (sender, receiver) = crossbeam_channel::bounded(OUTCOME_CHANNEL_CAPACITY);
        Self { sender, receiver }
    }
}

/// Message: one instance finished a refresh cycle
#[derive(Message, Debug, Clone)]
pub struct CycleCompleted(pub CycleOutcome);

#[derive(Debug, Clone, Default, PartialEq)]
pub struct InstanceStatus {
    pub cycles: u64,
    pub moves: u64,
    pub consecutive_failures: u32,
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

/// Resource: per-instance health as seen from the ECS world
#[derive(Resource, Debug, Clone, Default)]
pub struct InstanceStatusBoard {
    statuses: BTreeMap<String, InstanceStatus>,
}

impl InstanceStatusBoard {
    pub fn record(&mut self, outcome: &CycleOutcome) {
        let status = self
            .statuses
            .entry(outcome.instance_id.clone())
            .or_default();
        status.cycles += 1;
        match &outcome.result {
            Ok(snapshot) => {
                status.moves += snapshot.moved_count() as u64;
                status.consecutive_failures = 0;
                status.last_success = Some(outcome.finished_at);
                status.last_error = None;
            }
            Err(message) => {
                status.consecutive_failures += 1;
                status.last_error = Some(message.clone());
            }
        }
    }

    pub fn get(&self, instance_id: &str) -> Option<&InstanceStatus> {
        self.statuses.get(instance_id)
    }

    pub fn failing(&self) -> impl Iterator<Item = &str> {
        self.statuses
            .iter()
            .filter(|(_, s)| s.consecutive_failures > 0)
            .map(|(id, _)| id.as_str())
    }
}

/// Poll every lock control surface and route changes through the registry.
/// Returns the number of mode changes routed.
pub async fn poll_lock_sources(
    registry: &InstanceRegistry,
    sources: &[Arc<dyn LockControlSource>],
) -> usize {
    let mut routed = 0;
    for source in sources {
        match source.poll_lock_mode().await {
            Ok(Some(mode)) => {
                let targets = source.targets();
                registry.set_lock_mode(mode, targets.as_deref());
                routed += 1;
            }
            Ok(None) => {}
            Err(e) => warn!("⚠️ [LOCK] Failed to poll {}: {e:#}", source.name()),
        }
    }
    routed
}

/// System: when the refresh interval elapses, poll lock surfaces then queue a refresh
/// on every instance
pub fn refresh_scheduler_system(
    mut schedule: ResMut<RefreshSchedule>,
    registry: Res<InstanceRegistry>,
    lock_sources: Res<LockControlSources>,
    runtime: Res<AsyncRuntime>,
) {
    if !schedule.is_due(Instant::now()) || registry.is_empty() {
        return;
    }

    let registry = registry.clone();
    let sources = lock_sources.0.clone();
    debug!("⏰ Scheduling refresh for {} instance(s)", registry.len());

    runtime.spawn(async move {
        poll_lock_sources(&registry, &sources).await;
        let delivery = registry.refresh_all();
        if !delivery.is_complete() {
            warn!(
                "⚠️ Refresh not delivered to: {}",
                delivery.unknown.join(", ")
            );
        }
    });
}

/// System: drain cycle outcomes into the status board and emit `CycleCompleted`
pub fn collect_cycle_outcomes_system(
    channel: Res<CycleOutcomeChannel>,
    mut board: ResMut<InstanceStatusBoard>,
    mut completed: MessageWriter<CycleCompleted>,
) {
    while let Ok(outcome) = channel.receiver.try_recv() {
        match &outcome.result {
            Ok(snapshot) => debug!(
                "✅ {} cycle done ({} moved)",
                outcome.instance_id,
                snapshot.moved_count()
            ),
            Err(e) => info!("❌ {} cycle failed: {}", outcome.instance_id, e),
        }
        board.record(&outcome);
        completed.write(CycleCompleted(outcome));
    }
}
