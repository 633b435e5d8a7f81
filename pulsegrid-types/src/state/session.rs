//! Session state: the single authoritative transport and mix configuration.

use serde::{Deserialize, Serialize};

use super::sidechain::SidechainMatrix;
use super::sum_bus::SumBusState;
use crate::{PackId, DEFAULT_BPM, MAX_BPM, MIN_BPM};

/// Upper bound for the global swing percentage.
pub const MAX_GLOBAL_SWING: f32 = 200.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetronomeMode {
    #[default]
    Off,
    Beats,
    All,
}

impl MetronomeMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "off" => Some(MetronomeMode::Off),
            "beats" => Some(MetronomeMode::Beats),
            "all" => Some(MetronomeMode::All),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MetronomeMode::Off => "off",
            MetronomeMode::Beats => "beats",
            MetronomeMode::All => "all",
        }
    }
}

/// Tempo, metronome, pack and bus settings shared by the scheduler and the
/// bus manager. The control loop holds exactly one copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub bpm: u16,
    pub metronome: MetronomeMode,
    /// Click level (0.0 - 1.0)
    pub metronome_level: f32,
    /// Global swing percentage, scales every instrument's local amount.
    pub global_swing: f32,
    pub pack: PackId,
    /// Live record armed
    #[serde(default)]
    pub recording: bool,
    #[serde(default)]
    pub sidechain: SidechainMatrix,
    #[serde(default)]
    pub sum_bus: SumBusState,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            bpm: DEFAULT_BPM,
            metronome: MetronomeMode::Off,
            metronome_level: 0.7,
            global_swing: 100.0,
            pack: PackId::default(),
            recording: false,
            sidechain: SidechainMatrix::default(),
            sum_bus: SumBusState::default(),
        }
    }
}

impl SessionState {
    pub fn set_bpm(&mut self, bpm: u16) {
        self.bpm = bpm.clamp(MIN_BPM, MAX_BPM);
    }

    pub fn set_global_swing(&mut self, amount: f32) {
        if amount.is_finite() {
            self.global_swing = amount.clamp(0.0, MAX_GLOBAL_SWING);
        }
    }

    pub fn set_metronome_level(&mut self, level: f32) {
        if level.is_finite() {
            self.metronome_level = level.clamp(0.0, 1.0);
        }
    }

    pub fn seconds_per_step(&self) -> f64 {
        crate::seconds_per_step(self.bpm)
    }

    pub fn seconds_per_beat(&self) -> f64 {
        crate::seconds_per_beat(self.bpm)
    }
}
