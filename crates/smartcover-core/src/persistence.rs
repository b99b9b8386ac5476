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

//! Persistence of per-instance lock modes.

use anyhow::{Context, Result};
use parking_lot::Mutex;
use smartcover_types::LockMode;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// File name inside the state directory
pub const LOCK_STATE_FILE: &str = "lock_state.json";

/// Instance ID → lock mode
pub type LockModes = BTreeMap<String, LockMode>;

/// Lock-mode store shared by every instance worker.
///
/// Writes go through a read-modify-write under one mutex so concurrent workers
/// never lose each other's updates.
#[derive(Debug)]
pub struct LockStatePersistence {
    state_path: PathBuf,
    write_guard: Mutex<()>,
}

impl LockStatePersistence {
    pub fn new(state_path: impl Into<PathBuf>) -> Self {
        Self {
            state_path: state_path.into(),
            write_guard: Mutex::new(()),
        }
    }

    /// Store inside a state directory
    pub fn in_dir(state_dir: impl AsRef<Path>) -> Self {
        Self::new(state_dir.as_ref().join(LOCK_STATE_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.state_path
    }

    /// Load every persisted mode. A missing file yields an empty map.
    pub fn load(&self) -> Result<LockModes> {
        if !self.state_path.exists() {
            info!(
                "Lock state file not found at {}, all instances unlocked",
                self.state_path.display()
            );
            return Ok(LockModes::new());
        }

        let contents = fs::read_to_string(&self.state_path).with_context(|| {
            format!(
                "Failed to read lock state from {}",
                self.state_path.display()
            )
        })?;

        let modes: LockModes = serde_json::from_str(&contents).with_context(|| {
            format!(
                "Failed to parse lock state from {}",
                self.state_path.display()
            )
        })?;

        info!(
            "Loaded lock state for {} instance(s) from {}",
            modes.len(),
            self.state_path.display()
        );
        Ok(modes)
    }

    /// Persisted mode for one instance, `Unlocked` when unknown
    pub fn mode_for(&self, instance_id: &str) -> Result<LockMode> {
        Ok(self
            .load()?
            .get(instance_id)
            .copied()
            .unwrap_or_default())
    }

    /// Update one instance's mode, written atomically (temp file + rename)
    pub fn save_mode(&self, instance_id: &str, mode: LockMode) -> Result<()> {
        let _guard = self.write_guard.lock();

        let mut modes = self.load()?;
        modes.insert(instance_id.to_owned(), mode);

        if let Some(parent) = self.state_path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        let json = serde_json::to_string_pretty(&modes).context("Failed to serialize lock state")?;

        let temp_path = self.state_path.with_extension("tmp");
        fs::write(&temp_path, &json)
            .with_context(|| format!("Failed to write temp file {}", temp_path.display()))?;
        fs::rename(&temp_path, &self.state_path).with_context(|| {
            format!(
                "Failed to rename temp file to {}",
                self.state_path.display()
            )
        })?;

        info!(
            "🔒 Saved lock mode {} for instance {} to {}",
            mode,
            instance_id,
            self.state_path.display()
        );
        Ok(())
    }
}
