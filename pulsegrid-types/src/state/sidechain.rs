//! Sidechain link matrix: which instruments duck which.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::InstrumentId;

/// Upper bound on simultaneously enabled links.
pub const MAX_SC_LINKS: usize = 6;

/// Duck envelope applied to a target whenever one of its triggers fires.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DuckSettings {
    pub amount_db: f32,
    pub attack_ms: f32,
    pub release_ms: f32,
}

impl Default for DuckSettings {
    fn default() -> Self {
        Self {
            amount_db: 6.0,
            attack_ms: 12.0,
            release_ms: 180.0,
        }
    }
}

impl DuckSettings {
    pub fn set_amount_db(&mut self, db: f32) {
        if db.is_finite() {
            self.amount_db = db.clamp(0.0, 24.0);
        }
    }

    pub fn set_attack_ms(&mut self, ms: f32) {
        if ms.is_finite() {
            self.attack_ms = ms.clamp(1.0, 100.0);
        }
    }

    pub fn set_release_ms(&mut self, ms: f32) {
        if ms.is_finite() {
            self.release_ms = ms.clamp(10.0, 1000.0);
        }
    }

    /// Gain at the bottom of the dip.
    pub fn dip_gain(&self) -> f32 {
        crate::db_to_gain(-self.amount_db)
    }
}

/// Set of enabled `(target, trigger)` pairs plus per-target duck settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SidechainMatrix {
    links: BTreeSet<(InstrumentId, InstrumentId)>,
    #[serde(default)]
    duck: BTreeMap<InstrumentId, DuckSettings>,
}

impl SidechainMatrix {
    /// Enable or disable a link. Enabling past [`MAX_SC_LINKS`] or linking an
    /// instrument to itself is rejected; disabling always succeeds.
    ///
    /// Returns whether the matrix changed.
    pub fn set_link(&mut self, target: InstrumentId, trigger: InstrumentId, enabled: bool) -> bool {
        if !enabled {
            return self.links.remove(&(target, trigger));
        }
        if target == trigger || self.links.contains(&(target, trigger)) {
            return false;
        }
        if self.links.len() >= MAX_SC_LINKS {
            return false;
        }
        self.links.insert((target, trigger))
    }

    pub fn is_linked(&self, target: InstrumentId, trigger: InstrumentId) -> bool {
        self.links.contains(&(target, trigger))
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    pub fn links(&self) -> impl Iterator<Item = (InstrumentId, InstrumentId)> + '_ {
        self.links.iter().copied()
    }

    /// Targets ducked when `trigger` fires.
    pub fn targets_of(&self, trigger: InstrumentId) -> impl Iterator<Item = InstrumentId> + '_ {
        self.links
            .iter()
            .filter(move |(_, t)| *t == trigger)
            .map(|(target, _)| *target)
    }

    pub fn duck(&self, target: InstrumentId) -> DuckSettings {
        self.duck.get(&target).copied().unwrap_or_default()
    }

    pub fn duck_mut(&mut self, target: InstrumentId) -> &mut DuckSettings {
        self.duck.entry(target).or_default()
    }
}
