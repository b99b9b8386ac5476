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

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

/// One recorded cover position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionEntry {
    pub position: u8,
    pub moved: bool,
    pub timestamp: DateTime<Utc>,
}

/// Recent positions per cover, newest first.
///
/// With the default depth of 1 each `add` overwrites the previous entry.
#[derive(Debug, Clone)]
pub struct PositionHistory {
    depth: usize,
    entries: HashMap<String, VecDeque<PositionEntry>>,
    last_moved: HashMap<String, DateTime<Utc>>,
}

impl PositionHistory {
    pub fn new(depth: usize) -> Self {
        Self {
            depth: depth.max(1),
            entries: HashMap::new(),
            last_moved: HashMap::new(),
        }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn set_depth(&mut self, depth: usize) {
        self.depth = depth.max(1);
        for entries in self.entries.values_mut() {
            entries.truncate(self.depth);
        }
    }

    pub fn add(&mut self, entity_id: &str, position: u8, moved: bool, timestamp: DateTime<Utc>) {
        let entries = self.entries.entry(entity_id.to_owned()).or_default();
        entries.push_front(PositionEntry {
            position,
            moved,
            timestamp,
        });
        entries.truncate(self.depth);

        if moved {
            self.last_moved.insert(entity_id.to_owned(), timestamp);
        }
    }

    /// Newest entry, `None` for a cover with no history
    pub fn latest(&self, entity_id: &str) -> Option<&PositionEntry> {
        self.entries.get(entity_id).and_then(VecDeque::front)
    }

    pub fn positions(&self, entity_id: &str) -> Vec<u8> {
        self.entries
            .get(entity_id)
            .map(|entries| entries.iter().map(|e| e.position).collect())
            .unwrap_or_default()
    }

    /// When the automation last physically moved this cover
    pub fn last_movement(&self, entity_id: &str) -> Option<DateTime<Utc>> {
        self.last_moved.get(entity_id).copied()
    }

    /// Most recent movement across all covers
    pub fn last_movement_any(&self) -> Option<DateTime<Utc>> {
        self.last_moved.values().max().copied()
    }
}

impl Default for PositionHistory {
    fn default() -> Self {
        Self::new(1)
    }
}
