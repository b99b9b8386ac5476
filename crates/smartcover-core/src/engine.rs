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

//! Per-cover decision logic.
//!
//! `decide` is pure: it turns cycle signals and one cover's inputs into a target
//! position and an action. Sending commands and recording history happen in the
//! orchestrator.

use chrono::{DateTime, Duration, NaiveTime, Utc};
use smartcover_types::{
    ConfigError, CoverCapabilities, CoverConfig, ForecastTemperature, GlobalSettings,
    POSITION_CLOSED, POSITION_OPEN, SunPosition,
};

use crate::lock::LockAction;
use crate::sun::SunHit;
use crate::traits::MoveReason;

/// Signals read once per cycle and shared by every cover
#[derive(Debug, Clone)]
pub struct CycleSignals {
    pub sun: SunPosition,
    pub temperature: ForecastTemperature,
    pub weather_sunny: bool,
    pub now: DateTime<Utc>,
    /// Wall-clock time in the instance's time zone
    pub local_time: NaiveTime,
}

impl CycleSignals {
    /// Hot forecast on a sunny day
    pub fn heat_expected(&self, settings: &GlobalSettings) -> bool {
        self.temperature.is_hot(settings.temp_threshold) && self.weather_sunny
    }

    /// Opening is suppressed inside the night window, or while the sun is down when
    /// no window is configured
    pub fn night_blocks_opening(&self, settings: &GlobalSettings) -> bool {
        if !settings.nighttime_block_opening {
            return false;
        }
        match settings.nighttime_time_range {
            Some(range) => range.contains(self.local_time),
            None => self.sun.is_below_horizon(),
        }
    }

    /// Sun is down and the configured delay since the last sunset has passed
    pub fn after_sunset(&self, settings: &GlobalSettings) -> bool {
        if !self.sun.is_below_horizon() {
            return false;
        }
        let delay = Duration::seconds(
            i64::try_from(settings.close_covers_after_sunset_delay).unwrap_or(i64::MAX),
        );
        self.sun
            .last_sunset
            .is_some_and(|sunset| self.now >= sunset + delay)
    }
}

/// Per-cover inputs for one cycle
#[derive(Debug, Clone, Copy)]
pub struct CoverInputs<'a> {
    pub config: &'a CoverConfig,
    /// Normalized current position
    pub current: u8,
    pub window_open: bool,
    pub manual_override_active: bool,
    pub lock: LockAction,
    pub capabilities: CoverCapabilities,
}

/// Why a cover stays where it is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hold {
    /// Lock mode `HoldPosition`
    Locked,
    ManualOverride,
    /// An open window vetoes closing
    WindowLockout,
    /// Opening suppressed at night
    NightBlock,
    AtTarget,
    /// Move smaller than `covers_min_position_delta`
    MinorAdjustment,
}

impl Hold {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Locked => "lock_hold_position",
            Self::ManualOverride => "manual_override",
            Self::WindowLockout => "window_lockout",
            Self::NightBlock => "nighttime_block_opening",
            Self::AtTarget => "at_target",
            Self::MinorAdjustment => "minor_adjustment",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Move { target: u8, reason: MoveReason },
    Stay(Hold),
}

/// Outcome of `decide` for one cover
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decision {
    /// Target before clamping and vetoes
    pub desired: u8,
    /// Target after clamping and vetoes
    pub final_target: u8,
    /// Not evaluated while a lock mode is active
    pub sun_hit: Option<SunHit>,
    pub lockout_protection: bool,
    pub action: Action,
}

impl Decision {
    fn stay(position: u8, hold: Hold) -> Self {
        Self {
            desired: position,
            final_target: position,
            sun_hit: None,
            lockout_protection: false,
            action: Action::Stay(hold),
        }
    }

    pub fn is_move(&self) -> bool {
        matches!(self.action, Action::Move { .. })
    }
}

/// Decide what one cover should do this cycle.
///
/// Fails only when the cover's effective closure limits are inverted.
pub fn decide(
    inputs: &CoverInputs<'_>,
    signals: &CycleSignals,
    settings: &GlobalSettings,
) -> Result<Decision, ConfigError> {
    let current = inputs.current;

    match inputs.lock {
        LockAction::Hold => return Ok(Decision::stay(current, Hold::Locked)),
        LockAction::Enforce { target, reason } => {
            let action = if current == target {
                Action::Stay(Hold::AtTarget)
            } else {
                Action::Move { target, reason }
            };
            return Ok(Decision {
                desired: target,
                final_target: target,
                sun_hit: None,
                lockout_protection: false,
                action,
            });
        }
        LockAction::Automate => {}
    }

    let limits = inputs.config.effective_limits(settings)?;
    let sun_hit = SunHit::evaluate(&signals.sun, inputs.config.azimuth, settings);

    if inputs.manual_override_active {
        return Ok(Decision {
            sun_hit: Some(sun_hit),
            ..Decision::stay(current, Hold::ManualOverride)
        });
    }

    let (desired, reason) = if settings.closes_after_sunset(&inputs.config.entity_id)
        && signals.after_sunset(settings)
    {
        (POSITION_CLOSED, MoveReason::CloseAfterSunset)
    } else if signals.heat_expected(settings) && sun_hit.hitting {
        (POSITION_CLOSED, MoveReason::HeatProtection)
    } else {
        (POSITION_OPEN, MoveReason::LetLightIn)
    };

    let clamped = limits.clamp(desired);
    // Comparisons use where the device can actually end up
    let reachable = inputs.capabilities.reachable_position(clamped);

    let veto = if inputs.window_open && reachable < current {
        Some(Hold::WindowLockout)
    } else if reachable > current && signals.night_blocks_opening(settings) {
        Some(Hold::NightBlock)
    } else {
        None
    };
    let lockout_protection = veto == Some(Hold::WindowLockout);

    let (final_target, action) = match veto {
        Some(hold) => (current, Action::Stay(hold)),
        None if reachable == current => (clamped, Action::Stay(Hold::AtTarget)),
        None if reachable.abs_diff(current) < settings.covers_min_position_delta => {
            (clamped, Action::Stay(Hold::MinorAdjustment))
        }
        None => (
            clamped,
            Action::Move {
                target: clamped,
                reason,
            },
        ),
    };

    Ok(Decision {
        desired,
        final_target,
        sun_hit: Some(sun_hit),
        lockout_protection,
        action,
    })
}
