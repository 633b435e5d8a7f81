//! Shared delay and reverb buses, addressed per instrument by mode and wet amount.

use serde::{Deserialize, Serialize};

/// Mode selector for a bank of shared FX buses. Each mode owns one bus.
pub trait FxMode: Copy + Eq + 'static {
    const ALL: [Self; 3];

    fn index(self) -> usize;
}

/// Delay time as a note division.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DelayMode {
    #[serde(rename = "1/16")]
    N16,
    #[default]
    #[serde(rename = "1/8")]
    N8,
    #[serde(rename = "3/4")]
    N3_4,
}

impl DelayMode {
    /// Delay length in beats.
    pub fn beats(self) -> f64 {
        match self {
            DelayMode::N16 => 0.25,
            DelayMode::N8 => 0.5,
            DelayMode::N3_4 => 0.75,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "1/16" => Some(DelayMode::N16),
            "1/8" => Some(DelayMode::N8),
            "3/4" => Some(DelayMode::N3_4),
            _ => None,
        }
    }
}

impl FxMode for DelayMode {
    const ALL: [Self; 3] = [DelayMode::N16, DelayMode::N8, DelayMode::N3_4];

    fn index(self) -> usize {
        self as usize
    }
}

/// Reverb tail length, measured in steps of the current tempo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReverbMode {
    Short,
    #[default]
    Medium,
    Long,
}

impl ReverbMode {
    pub fn steps(self) -> usize {
        match self {
            ReverbMode::Short => 4,
            ReverbMode::Medium => 8,
            ReverbMode::Long => 16,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "short" => Some(ReverbMode::Short),
            "medium" => Some(ReverbMode::Medium),
            "long" => Some(ReverbMode::Long),
            _ => None,
        }
    }
}

impl FxMode for ReverbMode {
    const ALL: [Self; 3] = [ReverbMode::Short, ReverbMode::Medium, ReverbMode::Long];

    fn index(self) -> usize {
        self as usize
    }
}

/// An instrument's send into one bank of FX buses.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FxSend<M> {
    pub mode: M,
    /// Wet amount in percent (0-100).
    pub wet: f32,
}

impl<M: FxMode + Default> Default for FxSend<M> {
    fn default() -> Self {
        Self {
            mode: M::default(),
            wet: 0.0,
        }
    }
}

impl<M: FxMode> FxSend<M> {
    pub fn set_wet(&mut self, wet: f32) {
        if wet.is_finite() {
            self.wet = wet.clamp(0.0, 100.0);
        }
    }

    /// Send gain into each bus of the bank. Only the bus for the active mode
    /// receives signal.
    pub fn send_levels(&self) -> [f32; 3] {
        let mut levels = [0.0; 3];
        levels[self.mode.index()] = self.wet / 100.0;
        levels
    }
}
