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
use serde::{Deserialize, Serialize};
use smartcover_types::InstanceConfig;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

/// HA add-on options file
pub const ADDON_OPTIONS_PATH: &str = "/data/options.json";

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub system: SystemConfig,

    /// Automation instances (one or more)
    #[serde(default = "default_instances")]
    pub instances: Vec<InstanceConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfig {
    /// Home Assistant base URL (optional, defaults to supervisor)
    #[serde(default)]
    pub ha_base_url: Option<String>,

    /// Home Assistant token (optional, uses SUPERVISOR_TOKEN if not set)
    #[serde(default)]
    pub ha_token: Option<String>,

    /// Refresh interval (seconds)
    #[serde(default = "default_update_interval")]
    pub update_interval_secs: u64,

    /// Log level (debug, info, warn, error), `RUST_LOG` wins
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Directory for persisted lock state
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    /// input_select whose value is broadcast as lock mode to every instance
    #[serde(default)]
    pub lock_control_entity: Option<String>,

    /// Publish sensor/binary-sensor states to HA after each cycle
    #[serde(default = "default_publish_entities")]
    pub publish_entities: bool,
}

fn default_instances() -> Vec<InstanceConfig> {
    vec![InstanceConfig::new("default")]
}

fn default_update_interval() -> u64 {
    60
}

fn default_log_level() -> String {
    "info".to_owned()
}

fn default_state_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_publish_entities() -> bool {
    true
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            ha_base_url: None,
            ha_token: None,
            update_interval_secs: default_update_interval(),
            log_level: default_log_level(),
            state_dir: default_state_dir(),
            lock_control_entity: None,
            publish_entities: default_publish_entities(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            system: SystemConfig::default(),
            instances: default_instances(),
        }
    }
}

/// Where the configuration came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    AddonOptions,
    File(PathBuf),
    Environment,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AddonOptions => write!(f, "HA add-on options"),
            Self::File(path) => write!(f, "{}", path.display()),
            Self::Environment => write!(f, "defaults with environment overrides"),
        }
    }
}

impl AppConfig {
    /// Load from HA add-on options, then `config.toml`, then `config.json`, then
    /// defaults with environment overrides
    pub fn load() -> Result<(Self, ConfigSource)> {
        if let Ok(options_str) = std::fs::read_to_string(ADDON_OPTIONS_PATH) {
            let config: AppConfig =
                serde_json::from_str(&options_str).context("Failed to parse HA add-on options")?;
            config.validate()?;
            return Ok((config, ConfigSource::AddonOptions));
        }

        for candidate in ["config.toml", "config.json"] {
            let path = Path::new(candidate);
            if path.exists() {
                let config = Self::load_from(path)?;
                return Ok((config, ConfigSource::File(path.to_path_buf())));
            }
        }

        let config = Self::from_env();
        config.validate()?;
        Ok((config, ConfigSource::Environment))
    }

    /// Load a specific TOML or JSON file
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: AppConfig = if path.extension().is_some_and(|ext| ext == "json") {
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse {}", path.display()))?
        } else {
            toml::from_str(&contents)
                .with_context(|| format!("Failed to parse {}", path.display()))?
        };
        config.validate()?;
        Ok(config)
    }

    /// Defaults with environment variable overrides (development/testing)
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(url) = std::env::var("HA_BASE_URL") {
            config.system.ha_base_url = Some(url);
        }
        if let Ok(token) = std::env::var("HA_TOKEN") {
            config.system.ha_token = Some(token);
        }
        if let Ok(interval) = std::env::var("UPDATE_INTERVAL_SECS")
            && let Ok(secs) = interval.parse::<u64>()
        {
            config.system.update_interval_secs = secs;
        }
        if let Ok(dir) = std::env::var("SMARTCOVER_STATE_DIR") {
            config.system.state_dir = PathBuf::from(dir);
        }
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            config.system.log_level = level;
        }

        config
    }

    pub fn validate(&self) -> Result<()> {
        if self.instances.is_empty() {
            anyhow::bail!("Configuration must include at least one instance");
        }

        let mut seen = HashSet::new();
        for (idx, instance) in self.instances.iter().enumerate() {
            if instance.id.trim().is_empty() {
                anyhow::bail!("Instance {} has empty ID", idx);
            }
            if !seen.insert(instance.id.as_str()) {
                anyhow::bail!("Duplicate instance ID '{}'", instance.id);
            }
            if let Err(e) = instance.validate() {
                anyhow::bail!("Instance '{}': {}", instance.id, e);
            }
            if instance.covers.is_empty() {
                warn!("Instance '{}' has no covers configured", instance.id);
            }
        }

        if self.system.update_interval_secs < 10 {
            anyhow::bail!("update_interval_secs must be at least 10 seconds");
        }
        if self.system.update_interval_secs > 600 {
            warn!(
                "update_interval_secs is very high ({}s), consider reducing",
                self.system.update_interval_secs
            );
        }

        Ok(())
    }

    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.system.update_interval_secs)
    }
}
