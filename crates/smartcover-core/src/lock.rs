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

//! Lock mode state machine.
//!
//! Transitions only happen through `set_lock_mode`. While locked, the per-cover
//! decision logic never runs.

use smartcover_types::{LockMode, POSITION_CLOSED, POSITION_OPEN};
use tracing::info;

use crate::traits::MoveReason;

/// What a lock mode asks of a single cover
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockAction {
    /// Normal automation
    Automate,
    /// Freeze in place
    Hold,
    /// Drive to a fixed position
    Enforce { target: u8, reason: MoveReason },
}

impl LockAction {
    pub fn for_mode(mode: LockMode) -> Self {
        match mode {
            LockMode::Unlocked => Self::Automate,
            LockMode::HoldPosition => Self::Hold,
            LockMode::ForceOpen => Self::Enforce {
                target: POSITION_OPEN,
                reason: MoveReason::LockForceOpen,
            },
            LockMode::ForceClose => Self::Enforce {
                target: POSITION_CLOSED,
                reason: MoveReason::LockForceClose,
            },
        }
    }
}

/// Per-instance lock state
#[derive(Debug, Clone, Default)]
pub struct LockState {
    mode: LockMode,
}

impl LockState {
    pub fn new(mode: LockMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> LockMode {
        self.mode
    }

    pub fn is_locked(&self) -> bool {
        self.mode.is_locked()
    }

    pub fn action(&self) -> LockAction {
        LockAction::for_mode(self.mode)
    }

    /// Returns true when the mode actually changed
    pub fn set_lock_mode(&mut self, mode: LockMode) -> bool {
        if self.mode == mode {
            return false;
        }

        info!(
            "🔒 [LOCK] {} → {}",
            self.mode.display_name(),
            mode.display_name()
        );
        self.mode = mode;
        true
    }
}
