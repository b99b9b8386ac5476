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

//! Detection and expiry of human-initiated cover moves.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tracing::debug;

/// An externally detected move
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManualOverrideRecord {
    pub timestamp: DateTime<Utc>,
    pub position: u8,
}

impl ManualOverrideRecord {
    /// Active from `timestamp` (inclusive) until `timestamp + duration` (exclusive).
    /// A record from the future is never active.
    pub fn is_active(&self, now: DateTime<Utc>, duration_secs: u64) -> bool {
        if now < self.timestamp {
            return false;
        }
        let duration = Duration::seconds(i64::try_from(duration_secs).unwrap_or(i64::MAX));
        now - self.timestamp < duration
    }
}

#[derive(Debug, Clone, Default)]
pub struct ManualOverrideTracker {
    /// Position the automation left each cover at
    expected: HashMap<String, u8>,
    records: HashMap<String, ManualOverrideRecord>,
}

impl ManualOverrideTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compare the observed position with the one the automation left the cover at.
    ///
    /// A difference creates or refreshes the record. Returns true when a new external
    /// move was detected this call.
    pub fn observe(&mut self, entity_id: &str, current: u8, now: DateTime<Utc>) -> bool {
        let Some(&expected) = self.expected.get(entity_id) else {
            self.expected.insert(entity_id.to_owned(), current);
            return false;
        };

        if expected == current {
            return false;
        }

        debug!(
            "[{}] External move detected: expected {}%, found {}%",
            entity_id, expected, current
        );
        self.records.insert(
            entity_id.to_owned(),
            ManualOverrideRecord {
                timestamp: now,
                position: current,
            },
        );
        self.expected.insert(entity_id.to_owned(), current);
        true
    }

    /// Remember where the automation left the cover this cycle
    pub fn set_expected(&mut self, entity_id: &str, position: u8) {
        self.expected.insert(entity_id.to_owned(), position);
    }

    pub fn record(&self, entity_id: &str) -> Option<&ManualOverrideRecord> {
        self.records.get(entity_id)
    }

    pub fn is_active(&self, entity_id: &str, now: DateTime<Utc>, duration_secs: u64) -> bool {
        self.records
            .get(entity_id)
            .is_some_and(|record| record.is_active(now, duration_secs))
    }

    /// Drop every record, handing authority straight back to the automation
    pub fn clear(&mut self) {
        self.records.clear();
    }
}
