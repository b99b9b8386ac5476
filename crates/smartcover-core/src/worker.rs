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

//! Per-instance async worker.
//!
//! One worker task owns one `Orchestrator` and processes its command queue strictly
//! in order, so two cycles of the same instance never overlap. Queued refresh
//! requests are coalesced into a single cycle.

use chrono::{DateTime, Utc};
use crossbeam_channel::Sender;
use parking_lot::RwLock;
use smartcover_types::{CycleSnapshot, GlobalSettings, InstanceConfig, LockMode};
use std::sync::Arc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::async_runtime::AsyncRuntime;
use crate::config_diff::ConfigDiff;
use crate::entities::{EntityCommand, EntitySet, InstanceView, SharedInstanceView};
use crate::orchestrator::Orchestrator;
use crate::persistence::LockStatePersistence;
use crate::traits::StatePublisher;

/// Commands accepted by an instance worker
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerCommand {
    Refresh,
    SetLockMode(LockMode),
    ApplySettings(GlobalSettings),
    ApplyConfig(Box<InstanceConfig>),
    Shutdown,
}

impl From<EntityCommand> for WorkerCommand {
    fn from(command: EntityCommand) -> Self {
        match command {
            EntityCommand::SetLockMode(mode) => Self::SetLockMode(mode),
            EntityCommand::ApplySettings(settings) => Self::ApplySettings(settings),
        }
    }
}

/// Result of one refresh cycle, sent back to the ECS world
#[derive(Debug, Clone)]
pub struct CycleOutcome {
    pub instance_id: String,
    /// Snapshot, or the cycle-fatal error message
    pub result: Result<CycleSnapshot, String>,
    pub finished_at: DateTime<Utc>,
}

impl CycleOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

pub struct InstanceWorker {
    orchestrator: Orchestrator,
    view: SharedInstanceView,
    entities: Arc<EntitySet>,
    publisher: Option<Arc<dyn StatePublisher>>,
    persistence: Option<Arc<LockStatePersistence>>,
    outcomes: Option<Sender<CycleOutcome>>,
}

impl std::fmt::Debug for InstanceWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstanceWorker")
            .field("orchestrator", &self.orchestrator)
            .field("entities", &self.entities.len())
            .finish_non_exhaustive()
    }
}

impl InstanceWorker {
    pub fn new(orchestrator: Orchestrator) -> Self {
        let view = Arc::new(RwLock::new(InstanceView {
            instance_id: orchestrator.id().to_owned(),
            settings: orchestrator.settings().clone(),
            lock_mode: orchestrator.lock_mode(),
            ..Default::default()
        }));
        let entities = Arc::new(EntitySet::for_instance(
            &orchestrator.config().publish_prefix(),
            &view,
        ));
        Self {
            orchestrator,
            view,
            entities,
            publisher: None,
            persistence: None,
            outcomes: None,
        }
    }

    /// Restore the persisted lock mode and persist future changes.
    ///
    /// An unreadable state file leaves the instance unlocked.
    pub fn with_persistence(mut self, persistence: Arc<LockStatePersistence>) -> Self {
        match persistence.mode_for(self.orchestrator.id()) {
            Ok(mode) => {
                if mode.is_locked() {
                    info!(
                        "🔒 [LOCK] {}: restored persisted lock mode {}",
                        self.orchestrator.id(),
                        mode
                    );
                }
                self.orchestrator = self.orchestrator.with_lock_mode(mode);
                self.view.write().lock_mode = mode;
            }
            Err(e) => warn!(
                "⚠️ [LOCK] {}: failed to load persisted lock mode: {e:#}",
                self.orchestrator.id()
            ),
        }
        self.persistence = Some(persistence);
        self
    }

    pub fn with_publisher(mut self, publisher: Arc<dyn StatePublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    pub fn with_outcomes(mut self, outcomes: Sender<CycleOutcome>) -> Self {
        self.outcomes = Some(outcomes);
        self
    }

    pub fn id(&self) -> &str {
        self.orchestrator.id()
    }

    pub fn view(&self) -> SharedInstanceView {
        self.view.clone()
    }

    pub fn entities(&self) -> &EntitySet {
        &self.entities
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    /// Change the lock mode for the next cycle. Returns whether it changed.
    pub fn set_lock_mode(&mut self, mode: LockMode) -> bool {
        if !self.orchestrator.set_lock_mode(mode) {
            return false;
        }
        self.view.write().lock_mode = mode;
        if let Some(persistence) = &self.persistence
            && let Err(e) = persistence.save_mode(self.orchestrator.id(), mode)
        {
            error!(
                "❌ [LOCK] {}: failed to persist lock mode {}: {e:#}",
                self.orchestrator.id(),
                mode
            );
        }
        true
    }

    pub fn apply_settings(&mut self, settings: GlobalSettings) -> ConfigDiff {
        let diff = self.orchestrator.apply_settings(settings);
        self.view.write().settings = self.orchestrator.settings().clone();
        diff
    }

    pub fn apply_config(&mut self, config: InstanceConfig) -> ConfigDiff {
        let diff = self.orchestrator.apply_config(config);
        self.view.write().settings = self.orchestrator.settings().clone();
        diff
    }

    /// Run one cycle, update the shared view, publish entities and report the outcome
    pub async fn refresh(&mut self) -> CycleOutcome {
        let result = self.orchestrator.run_cycle().await;
        let finished_at = Utc::now();

        let result = {
            let mut view = self.view.write();
            view.lock_mode = self.orchestrator.lock_mode();
            view.last_movement = self.orchestrator.history().last_movement_any();
            match result {
                Ok(snapshot) => {
                    view.last_error = None;
                    view.snapshot = Some(snapshot.clone());
                    Ok(snapshot)
                }
                Err(e) => {
                    error!("❌ [CYCLE] {}: {}", self.orchestrator.id(), e);
                    let message = e.to_string();
                    view.last_error = Some(message.clone());
                    // Previous snapshot stays visible, only the success flag drops
                    if let Some(previous) = view.snapshot.as_mut() {
                        previous.last_update_success = false;
                    }
                    Err(message)
                }
            }
        };

        if let Some(publisher) = &self.publisher {
            let published = self.entities.publish(publisher.as_ref()).await;
            debug!(
                "📤 [PUBLISH] {}: {} entity state(s)",
                self.orchestrator.id(),
                published
            );
        }

        let outcome = CycleOutcome {
            instance_id: self.orchestrator.id().to_owned(),
            result,
            finished_at,
        };
        if let Some(outcomes) = &self.outcomes
            && let Err(e) = outcomes.try_send(outcome.clone())
        {
            warn!("Failed to send cycle outcome to channel (buffer full?): {}", e);
        }
        outcome
    }

    /// Process commands until `Shutdown` or until every sender is dropped
    pub async fn run(mut self, mut commands: UnboundedReceiver<WorkerCommand>) {
        info!("🚀 [WORKER] {} started", self.orchestrator.id());

        while let Some(command) = commands.recv().await {
            let mut refresh = false;
            let mut shutdown = false;

            let queued = std::iter::from_fn(|| commands.try_recv().ok());
            for command in std::iter::once(command).chain(queued) {
                match command {
                    WorkerCommand::Refresh => refresh = true,
                    WorkerCommand::SetLockMode(mode) => {
                        self.set_lock_mode(mode);
                    }
                    WorkerCommand::ApplySettings(settings) => {
                        self.apply_settings(settings);
                    }
                    WorkerCommand::ApplyConfig(config) => {
                        self.apply_config(*config);
                    }
                    WorkerCommand::Shutdown => {
                        shutdown = true;
                        break;
                    }
                }
            }

            if shutdown {
                break;
            }
            if refresh {
                self.refresh().await;
            }
        }

        info!("🛑 [WORKER] {} stopped", self.orchestrator.id());
    }

    /// Spawn the worker on the runtime and return its command sender
    pub fn spawn(self, runtime: &AsyncRuntime) -> (InstanceHandle, JoinHandle<()>) {
        let (tx, rx) = unbounded_channel();
        let handle = InstanceHandle {
            id: self.id().to_owned(),
            view: self.view(),
            entities: self.entities.clone(),
            sender: tx,
        };
        let task = runtime.spawn(self.run(rx));
        (handle, task)
    }
}

/// Sending side of one instance worker
#[derive(Debug, Clone)]
pub struct InstanceHandle {
    id: String,
    view: SharedInstanceView,
    entities: Arc<EntitySet>,
    sender: UnboundedSender<WorkerCommand>,
}

impl InstanceHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn view(&self) -> SharedInstanceView {
        self.view.clone()
    }

    pub fn entities(&self) -> &EntitySet {
        &self.entities
    }

    /// Queue a command. Returns false when the worker has stopped.
    pub fn send(&self, command: WorkerCommand) -> bool {
        self.sender.send(command).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::test_support::{Fakes, RecordingPublisher};
    use chrono::TimeZone;
    use chrono_tz::Tz;
    use smartcover_types::CoverConfig;

    fn worker(fakes: &Fakes) -> InstanceWorker {
        let mut config = InstanceConfig::new("south");
        config.covers.push(CoverConfig::new("cover.office", 180.0));
        fakes.covers.add_position_cover("cover.office", 100);
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 7, 1, 10, 0, 0).unwrap(),
        ));
        InstanceWorker::new(Orchestrator::new(config, fakes.sources(), clock, Tz::UTC))
    }

    #[tokio::test]
    async fn test_refresh_updates_view_and_outcome() {
        let fakes = Fakes::new(30.0, 45.0, 180.0);
        let (tx, rx) = crossbeam_channel::bounded(4);
        let mut worker = worker(&fakes).with_outcomes(tx);

        let outcome = worker.refresh().await;
        assert!(outcome.is_success());
        assert_eq!(rx.try_recv().unwrap().instance_id, "south");

        let view = worker.view();
        let view = view.read();
        let snapshot = view.snapshot.as_ref().unwrap();
        assert_eq!(snapshot.cover("cover.office").unwrap().pos_target_final, Some(0));
        assert!(view.last_movement.is_some());
        assert!(view.last_error.is_none());
    }

    #[tokio::test]
    async fn test_sun_failure_keeps_previous_snapshot() {
        let fakes = Fakes::new(30.0, 45.0, 180.0);
        let mut worker = worker(&fakes);
        worker.refresh().await;

        fakes.sun.set(None);
        let outcome = worker.refresh().await;
        assert!(!outcome.is_success());

        let view = worker.view();
        let view = view.read();
        assert!(view.last_error.is_some());
        let previous = view.snapshot.as_ref().unwrap();
        assert!(!previous.last_update_success);
        assert_eq!(previous.covers.len(), 1);
    }

    #[tokio::test]
    async fn test_lock_mode_persisted_and_restored() {
        let dir = tempfile::tempdir().unwrap();
        let persistence = Arc::new(LockStatePersistence::in_dir(dir.path()));
        let fakes = Fakes::new(18.0, 45.0, 180.0);

        let mut first = worker(&fakes).with_persistence(persistence.clone());
        assert!(first.set_lock_mode(LockMode::ForceClose));
        assert!(!first.set_lock_mode(LockMode::ForceClose));
        assert_eq!(first.view().read().lock_mode, LockMode::ForceClose);

        let second = worker(&fakes).with_persistence(persistence);
        assert_eq!(second.orchestrator().lock_mode(), LockMode::ForceClose);
    }

    #[tokio::test]
    async fn test_publishes_after_cycle() {
        let fakes = Fakes::new(30.0, 45.0, 180.0);
        let publisher = Arc::new(RecordingPublisher::default());
        let mut worker = worker(&fakes).with_publisher(publisher.clone());

        worker.refresh().await;
        assert_eq!(
            publisher.state("binary_sensor.smart_cover_south_temp_hot").as_deref(),
            Some("on")
        );
        assert_eq!(
            publisher.state("sensor.smart_cover_south_sun_azimuth").as_deref(),
            Some("180")
        );
    }

    #[tokio::test]
    async fn test_run_coalesces_refreshes_and_applies_commands_first() {
        let fakes = Fakes::new(18.0, 45.0, 180.0);
        let (tx, rx) = crossbeam_channel::bounded(8);
        let worker = worker(&fakes).with_outcomes(tx);
        let (handle, task) = worker.spawn(&AsyncRuntime::current());

        // Queued before the task gets to run
        assert!(handle.send(WorkerCommand::Refresh));
        assert!(handle.send(WorkerCommand::SetLockMode(LockMode::ForceClose)));
        assert!(handle.send(WorkerCommand::Refresh));
        assert!(handle.send(WorkerCommand::Shutdown));
        task.await.unwrap();

        // Shutdown in the same batch wins over the pending refresh
        assert!(rx.try_recv().is_err());
        assert_eq!(handle.view().read().lock_mode, LockMode::ForceClose);
        assert!(handle.is_closed());
    }

    #[tokio::test]
    async fn test_run_single_cycle_for_burst_of_refreshes() {
        let fakes = Fakes::new(18.0, 45.0, 180.0);
        let (tx, rx) = crossbeam_channel::bounded(8);
        let worker = worker(&fakes).with_outcomes(tx);
        let (tx_cmd, rx_cmd) = unbounded_channel();
        for _ in 0..3 {
            tx_cmd.send(WorkerCommand::Refresh).unwrap();
        }
        drop(tx_cmd);

        worker.run(rx_cmd).await;
        assert_eq!(rx.try_iter().count(), 1);
    }

    #[test]
    fn test_entity_commands_map_to_worker_commands() {
        assert_eq!(
            WorkerCommand::from(EntityCommand::SetLockMode(LockMode::HoldPosition)),
            WorkerCommand::SetLockMode(LockMode::HoldPosition)
        );
    }
}
