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

pub mod async_runtime;
pub mod clock;
pub mod commands;
pub mod config_diff;
pub mod engine;
pub mod entities;
pub mod errors;
pub mod lock;
pub mod manual_override;
pub mod orchestrator;
pub mod persistence;
pub mod position_history;
pub mod registry;
pub mod scheduling;
pub mod sun;
pub mod traits;
pub mod worker;

#[cfg(test)]
pub(crate) mod test_support;

pub use async_runtime::AsyncRuntime;
use bevy_app::prelude::*;
use bevy_ecs::prelude::*;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config_diff::{ConfigDiff, HOT_RELOADABLE_KEYS, StructuralChange};
pub use engine::{Action, CoverInputs, CycleSignals, Decision, Hold, decide};
pub use entities::{
    ControlEntity, EntityCommand, EntityError, EntitySet, EntityValue, InstanceView, Platform,
    SharedInstanceView,
};
pub use errors::{CycleError, ServiceCallError};
pub use lock::{LockAction, LockState};
pub use orchestrator::{Orchestrator, forecast_day};
pub use persistence::{LOCK_STATE_FILE, LockStatePersistence};
pub use registry::{Delivery, InstanceRegistry};
pub use scheduling::{
    CycleCompleted, CycleOutcomeChannel, InstanceStatus, InstanceStatusBoard, LockControlSources,
    RefreshSchedule, collect_cycle_outcomes_system, poll_lock_sources, refresh_scheduler_system,
};
pub use sun::{SunHit, azimuth_difference};
pub use traits::{
    CoverController, DataSources, LockControlSource, LogbookEntry, LogbookSink, MoveReason,
    MoveVerb, StatePublisher, SunDataSource, WeatherDataSource, WindowSensorSource,
};
pub use worker::{CycleOutcome, InstanceHandle, InstanceWorker, WorkerCommand};

/// Core plugin: refresh scheduling and outcome collection.
///
/// `AsyncRuntime` must be inserted by the binary. Workers are registered in
/// `InstanceRegistry` and should report to `CycleOutcomeChannel::sender`.
pub struct SmartCoverCorePlugin;

impl Plugin for SmartCoverCorePlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<RefreshSchedule>()
            .init_resource::<InstanceRegistry>()
            .init_resource::<InstanceStatusBoard>()
            .init_resource::<LockControlSources>()
            .init_resource::<CycleOutcomeChannel>()
            .add_message::<CycleCompleted>()
            .add_systems(Startup, startup_banner_system)
            .add_systems(
                Update,
                (refresh_scheduler_system, collect_cycle_outcomes_system),
            );
    }
}

fn startup_banner_system(
    schedule: Res<RefreshSchedule>,
    registry: Res<InstanceRegistry>,
) {
    tracing::info!(
        "🏠 SmartCover running {} instance(s), refresh every {}s",
        registry.len(),
        schedule.interval.as_secs()
    );
}
