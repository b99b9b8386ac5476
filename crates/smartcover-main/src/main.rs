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

mod config;

use anyhow::Result;
use bevy_app::{ScheduleRunnerPlugin, TaskPoolPlugin, prelude::*};
use chrono_tz::Tz;
use clap::Parser;
use std::path::PathBuf;
use std::{sync::Arc, time::Duration};
use tracing::{error, info, warn};
use tracing_subscriber::FmtSubscriber;

use smartcover_core::{
    AsyncRuntime, Clock, CycleOutcomeChannel, InstanceRegistry, InstanceWorker, LockControlSource,
    LockControlSources, LockStatePersistence, Orchestrator, RefreshSchedule, SmartCoverCorePlugin,
    SystemClock,
};
use smartcover_ha::{HaLockControl, HaStatePublisher, HomeAssistantClient};

use crate::config::AppConfig;

#[derive(Parser, Debug)]
#[command(
    name = "smartcover",
    version,
    about = "SmartCover - sun and heat driven cover automation for Home Assistant"
)]
struct Cli {
    /// Configuration file (TOML or JSON), skips the default lookup chain
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the directory for persisted lock state
    #[arg(long)]
    state_dir: Option<PathBuf>,

    /// Run a single refresh for every instance and exit
    #[arg(long)]
    once: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Create tokio runtime for async HTTP operations
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("Failed to create tokio runtime");

    // Run Bevy app in a blocking task so tokio can keep running async tasks
    runtime.block_on(async {
        tokio::task::spawn_blocking(move || initialize_and_run(cli))
            .await
            .expect("Bevy task panicked")
    })
}

fn initialize_and_run(cli: Cli) -> Result<()> {
    let (mut config, source) = match &cli.config {
        Some(path) => (
            AppConfig::load_from(path)?,
            config::ConfigSource::File(path.clone()),
        ),
        None => AppConfig::load()?,
    };
    if let Some(dir) = cli.state_dir {
        config.system.state_dir = dir;
    }

    // RUST_LOG wins over the configured level
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.system.log_level)),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    info!("🚀 Starting SmartCover v{}", env!("CARGO_PKG_VERSION"));
    info!("📋 Configuration loaded from {}", source);
    info!("   Instances: {}", config.instances.len());
    for instance in &config.instances {
        info!(
            "     - {} ({} covers, weather {}, sun {})",
            instance.id,
            instance.covers.len(),
            instance.weather_entity,
            instance.sun_entity
        );
    }
    info!(
        "   Update interval: {}s",
        config.system.update_interval_secs
    );
    info!("   State dir: {}", config.system.state_dir.display());

    let ha_client = if std::env::var("SUPERVISOR_TOKEN").is_ok() {
        info!("🏠 Initializing HA client using Supervisor API...");
        Arc::new(HomeAssistantClient::from_supervisor()?)
    } else {
        info!("🏠 Initializing HA client from configuration...");
        Arc::new(HomeAssistantClient::from_config(
            config.system.ha_base_url.clone(),
            config.system.ha_token.clone(),
        )?)
    };

    let runtime_handle = tokio::runtime::Handle::current();
    match runtime_handle.block_on(ha_client.ping()) {
        Ok(true) => info!("✅ Home Assistant reachable at {}", ha_client.base_url()),
        Ok(false) => warn!("⚠️ Home Assistant at {} did not answer the API check", ha_client.base_url()),
        Err(e) => warn!("⚠️ Home Assistant not reachable yet: {}", e),
    }
    let timezone = resolve_timezone(runtime_handle.block_on(ha_client.get_timezone()).ok());

    let persistence = Arc::new(LockStatePersistence::in_dir(&config.system.state_dir));
    let publisher = Arc::new(HaStatePublisher::new(ha_client.clone()));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let build_worker = |instance: &smartcover_types::InstanceConfig| {
        let orchestrator = Orchestrator::new(
            instance.clone(),
            smartcover_ha::data_sources(&ha_client),
            clock.clone(),
            timezone,
        );
        let worker = InstanceWorker::new(orchestrator).with_persistence(persistence.clone());
        if config.system.publish_entities {
            worker.with_publisher(publisher.clone())
        } else {
            worker
        }
    };

    if cli.once {
        for instance in &config.instances {
            let mut worker = build_worker(instance);
            let outcome = runtime_handle.block_on(worker.refresh());
            match &outcome.result {
                Ok(snapshot) => info!(
                    "✅ [{}] {} cover(s), {} moved: {}",
                    outcome.instance_id,
                    snapshot.covers.len(),
                    snapshot.moved_count(),
                    snapshot.message.as_deref().unwrap_or("ok")
                ),
                Err(e) => error!("❌ [{}] Refresh failed: {}", outcome.instance_id, e),
            }
        }
        return Ok(());
    }

    let async_runtime = AsyncRuntime::new(runtime_handle);
    let mut app = App::new();
    app.add_plugins(TaskPoolPlugin::default())
        .add_plugins(ScheduleRunnerPlugin::run_loop(Duration::from_millis(100)))
        .add_plugins(SmartCoverCorePlugin)
        .insert_resource(RefreshSchedule::new(config.update_interval()));

    let outcomes = app.world().resource::<CycleOutcomeChannel>().sender.clone();
    let mut registry = InstanceRegistry::new();
    let mut lock_sources: Vec<Arc<dyn LockControlSource>> = Vec::new();

    if let Some(entity_id) = &config.system.lock_control_entity {
        info!("🔒 Lock mode for all instances follows {}", entity_id);
        lock_sources.push(Arc::new(HaLockControl::broadcast(
            ha_client.clone(),
            entity_id.clone(),
        )));
    }

    for instance in &config.instances {
        let worker = build_worker(instance).with_outcomes(outcomes.clone());
        let (handle, _task) = worker.spawn(&async_runtime);
        if registry.register(handle).is_some() {
            warn!("Instance '{}' registered twice, keeping the newest", instance.id);
        }

        if let Some(entity_id) = &instance.lock_control_entity {
            info!("🔒 Lock mode for '{}' follows {}", instance.id, entity_id);
            lock_sources.push(Arc::new(HaLockControl::for_instance(
                ha_client.clone(),
                entity_id.clone(),
                instance.id.clone(),
            )));
        }
    }

    app.insert_resource(async_runtime)
        .insert_resource(registry)
        .insert_resource(LockControlSources(lock_sources));

    info!("✅ All systems initialized, starting main loop");
    app.run();

    Ok(())
}

/// HA timezone name, UTC when unknown or unparsable
fn resolve_timezone(name: Option<String>) -> Tz {
    match name {
        Some(name) => match name.parse::<Tz>() {
            Ok(tz) => {
                info!("🌍 Using Home Assistant timezone: {}", tz);
                tz
            }
            Err(_) => {
                warn!("⚠️ Unknown timezone '{}', falling back to UTC", name);
                Tz::UTC
            }
        },
        None => {
            warn!("⚠️ Could not fetch timezone from Home Assistant, using UTC");
            Tz::UTC
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_timezone() {
        assert_eq!(
            resolve_timezone(Some("Europe/Prague".to_owned())),
            chrono_tz::Europe::Prague
        );
        assert_eq!(resolve_timezone(Some("Mars/Olympus".to_owned())), Tz::UTC);
        assert_eq!(resolve_timezone(None), Tz::UTC);
    }

    #[test]
    fn test_cli_parses_flags() {
        let cli = Cli::parse_from(["smartcover", "--config", "x.toml", "--once"]);
        assert_eq!(cli.config, Some(PathBuf::from("x.toml")));
        assert!(cli.once);
        assert!(cli.state_dir.is_none());
    }
}
