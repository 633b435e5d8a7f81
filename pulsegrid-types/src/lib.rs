//! # pulsegrid-types
//!
//! Shared type definitions for the pulsegrid step sequencer.
//! This crate holds the pattern/time model, the mix and routing parameters,
//! and the pure reducers that mutate them. Nothing here touches audio or I/O,
//! so both the control thread and the UI side can depend on it.

pub mod action;
mod audio;
pub mod reduce;
pub mod state;

pub use action::*;
pub use audio::AudioFeedback;

// Re-export all state types at crate root for convenience
pub use state::*;

/// Steps in one bar (one sixteenth-note slot each).
pub const STEPS_PER_BAR: usize = 16;

/// Sixteenth-note steps per quarter-note beat.
pub const STEPS_PER_BEAT: usize = 4;

pub const MIN_BPM: u16 = 60;
pub const MAX_BPM: u16 = 200;
pub const DEFAULT_BPM: u16 = 120;

/// Identifier for one of the fixed roster instruments.
///
/// The roster is static, so the id doubles as an index into per-instrument
/// arrays. Ids are only minted for valid roster slots.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(try_from = "u8", into = "u8")]
pub struct InstrumentId(u8);

impl TryFrom<u8> for InstrumentId {
    type Error = String;

    fn try_from(index: u8) -> Result<Self, Self::Error> {
        Self::new(index).ok_or_else(|| format!("no instrument with id {}", index))
    }
}

impl From<InstrumentId> for u8 {
    fn from(id: InstrumentId) -> u8 {
        id.0
    }
}

impl InstrumentId {
    pub const KICK: InstrumentId = InstrumentId(0);
    pub const SNARE: InstrumentId = InstrumentId(1);
    pub const CLAP: InstrumentId = InstrumentId(2);
    pub const RIM: InstrumentId = InstrumentId(3);
    pub const HIHAT: InstrumentId = InstrumentId(4);
    pub const OPEN_HIHAT: InstrumentId = InstrumentId(5);
    pub const TOM: InstrumentId = InstrumentId(6);
    pub const COWBELL: InstrumentId = InstrumentId(7);

    /// Build an id from a roster index. Returns `None` outside the roster.
    pub fn new(index: u8) -> Option<Self> {
        if (index as usize) < NUM_INSTRUMENTS {
            Some(Self(index))
        } else {
            None
        }
    }

    /// Look up an id by its roster key (e.g. `"openhihat"`).
    pub fn from_key(key: &str) -> Option<Self> {
        ROSTER.iter().find(|def| def.key == key).map(|def| def.id)
    }

    pub fn get(self) -> u8 {
        self.0
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub fn key(self) -> &'static str {
        ROSTER[self.index()].key
    }

    pub fn label(self) -> &'static str {
        ROSTER[self.index()].label
    }

    /// Every roster instrument, in roster order.
    pub fn all() -> impl Iterator<Item = InstrumentId> {
        (0..NUM_INSTRUMENTS as u8).map(InstrumentId)
    }
}

impl std::fmt::Display for InstrumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// Identifier for a sample pack (a named set of one buffer per instrument).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct PackId(String);

impl PackId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for PackId {
    fn default() -> Self {
        Self("default".to_string())
    }
}

impl std::fmt::Display for PackId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Seconds per sixteenth-note step at the given tempo.
pub fn seconds_per_step(bpm: u16) -> f64 {
    60.0 / bpm.max(1) as f64 / STEPS_PER_BEAT as f64
}

/// Seconds per quarter-note beat at the given tempo.
pub fn seconds_per_beat(bpm: u16) -> f64 {
    60.0 / bpm.max(1) as f64
}

/// Convert decibels to a linear gain multiplier.
pub fn db_to_gain(db: f32) -> f32 {
    10.0_f32.powf(db / 20.0)
}
