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

//! Lock modes routed through the registry, the HA input_select and persisted state.

use crossbeam_channel::{Receiver, unbounded};
use serde_json::json;
use smartcover_core::{
    AsyncRuntime, CycleOutcome, InstanceRegistry, InstanceWorker, LockControlSource,
    LockStatePersistence, poll_lock_sources,
};
use smartcover_ha::HaLockControl;
use smartcover_integration_tests::{
    FEATURES_POSITION, MockHa, instance, orchestrator, summer_morning,
};
use smartcover_types::LockMode;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

async fn collect_outcomes(rx: &Receiver<CycleOutcome>, count: usize) -> BTreeMap<String, CycleOutcome> {
    let rx = rx.clone();
    tokio::task::spawn_blocking(move || {
        let mut outcomes = BTreeMap::new();
        while outcomes.len() < count {
            let outcome = rx
                .recv_timeout(Duration::from_secs(5))
                .expect("cycle outcome within 5s");
            outcomes.insert(outcome.instance_id.clone(), outcome);
        }
        outcomes
    })
    .await
    .unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn test_force_close_routed_through_registry_and_persisted() {
    let mut ha = MockHa::start().await;
    ha.sun(45.0, 180.0).await;
    ha.weather("rainy", 15.0).await;
    ha.cover("cover.office", 100, FEATURES_POSITION).await;
    ha.logbook().await;
    let close = ha
        .expect_service(
            "cover.set_cover_position",
            json!({"entity_id": "cover.office", "position": 0}),
            1,
        )
        .await;

    let dir = tempfile::tempdir().unwrap();
    let persistence = Arc::new(LockStatePersistence::in_dir(dir.path()));
    let (tx, rx) = unbounded();

    let worker = InstanceWorker::new(orchestrator(
        &ha,
        instance("south", &[("cover.office", 180.0)]),
        summer_morning(),
    ))
    .with_persistence(persistence.clone())
    .with_outcomes(tx);
    let (handle, _task) = worker.spawn(&AsyncRuntime::current());

    let mut registry = InstanceRegistry::new();
    registry.register(handle);

    assert!(registry.set_lock_mode(LockMode::ForceClose, None).is_complete());
    assert!(registry.refresh_all().is_complete());

    let outcomes = collect_outcomes(&rx, 1).await;
    let snapshot = outcomes["south"].result.as_ref().unwrap();

    close.assert_async().await;
    assert_eq!(snapshot.lock_mode, LockMode::ForceClose);
    assert!(snapshot.lock_active);
    let cover = snapshot.cover("cover.office").unwrap();
    assert!(cover.lock_active);
    assert_eq!(cover.pos_achieved, Some(0));
    assert_eq!(persistence.mode_for("south").unwrap(), LockMode::ForceClose);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_instance_lock_select_holds_only_its_instance() {
    let mut ha = MockHa::start().await;
    ha.sun(45.0, 180.0).await;
    ha.weather("sunny", 30.0).await;
    ha.cover("cover.office", 100, FEATURES_POSITION).await;
    ha.cover("cover.bedroom", 100, FEATURES_POSITION).await;
    ha.entity("input_select.south_lock", "hold_position", json!({}))
        .await;
    ha.logbook().await;
    let held = ha
        .expect_service(
            "cover.set_cover_position",
            json!({"entity_id": "cover.office", "position": 0}),
            0,
        )
        .await;
    let closed = ha
        .expect_service(
            "cover.set_cover_position",
            json!({"entity_id": "cover.bedroom", "position": 0}),
            1,
        )
        .await;

    let (tx, rx) = unbounded();
    let runtime = AsyncRuntime::current();
    let mut registry = InstanceRegistry::new();
    for (id, cover) in [("south", "cover.office"), ("west", "cover.bedroom")] {
        let worker = InstanceWorker::new(orchestrator(
            &ha,
            instance(id, &[(cover, 180.0)]),
            summer_morning(),
        ))
        .with_outcomes(tx.clone());
        let (handle, _task) = worker.spawn(&runtime);
        registry.register(handle);
    }

    let sources: Vec<Arc<dyn LockControlSource>> = vec![Arc::new(HaLockControl::for_instance(
        ha.client(),
        "input_select.south_lock",
        "south",
    ))];
    assert_eq!(poll_lock_sources(&registry, &sources).await, 1);
    // Unchanged select value is not routed again
    assert_eq!(poll_lock_sources(&registry, &sources).await, 0);
    assert!(registry.refresh_all().is_complete());

    let outcomes = collect_outcomes(&rx, 2).await;

    let south = outcomes["south"].result.as_ref().unwrap();
    assert_eq!(south.lock_mode, LockMode::HoldPosition);
    let office = south.cover("cover.office").unwrap();
    assert!(!office.moved);
    assert_eq!(office.skipped_reason.as_deref(), Some("lock_hold_position"));

    let west = outcomes["west"].result.as_ref().unwrap();
    assert_eq!(west.lock_mode, LockMode::Unlocked);
    assert!(west.cover("cover.bedroom").unwrap().moved);

    held.assert_async().await;
    closed.assert_async().await;
}

#[tokio::test]
async fn test_persisted_force_open_restored_on_startup() {
    let mut ha = MockHa::start().await;
    ha.sun(45.0, 180.0).await;
    ha.weather("sunny", 30.0).await;
    ha.cover("cover.office", 0, FEATURES_POSITION).await;
    ha.logbook().await;
    let open = ha
        .expect_service(
            "cover.set_cover_position",
            json!({"entity_id": "cover.office", "position": 100}),
            1,
        )
        .await;

    let dir = tempfile::tempdir().unwrap();
    let persistence = Arc::new(LockStatePersistence::in_dir(dir.path()));
    persistence.save_mode("south", LockMode::ForceOpen).unwrap();

    let mut worker = InstanceWorker::new(orchestrator(
        &ha,
        instance("south", &[("cover.office", 180.0)]),
        summer_morning(),
    ))
    .with_persistence(persistence);
    assert_eq!(worker.orchestrator().lock_mode(), LockMode::ForceOpen);

    let outcome = worker.refresh().await;
    open.assert_async().await;
    let snapshot = outcome.result.unwrap();
    assert_eq!(snapshot.cover("cover.office").unwrap().pos_achieved, Some(100));
}
