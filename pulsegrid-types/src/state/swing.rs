//! Swing calculator: forward-only micro-timing per instrument and step.

use serde::{Deserialize, Serialize};

use crate::STEPS_PER_BEAT;

/// Largest swing offset, as a fraction of one step. Keeps a swung step from
/// landing on or after the step that follows it.
pub const MAX_SWING_STEP_FRACTION: f64 = 0.75;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SwingType {
    #[default]
    #[serde(rename = "none")]
    None,
    #[serde(rename = "8")]
    Eighth,
    #[serde(rename = "16")]
    Sixteenth,
    #[serde(rename = "32")]
    ThirtySecond,
}

impl SwingType {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "none" | "off" => Some(SwingType::None),
            "8" => Some(SwingType::Eighth),
            "16" => Some(SwingType::Sixteenth),
            "32" => Some(SwingType::ThirtySecond),
            _ => None,
        }
    }

    /// Delay at full swing for a step at `pos` (step index mod 4) within a beat,
    /// or `None` when that position is not swung.
    fn full_delay(self, pos: usize, secs_per_beat: f64) -> Option<f64> {
        match (self, pos) {
            (SwingType::Eighth, 2) => Some(secs_per_beat / 6.0),
            (SwingType::Sixteenth, 1 | 3) => Some(secs_per_beat / 4.0 / 3.0),
            (SwingType::ThirtySecond, 1 | 3) => Some(secs_per_beat / 8.0 / 3.0),
            _ => None,
        }
    }
}

/// Per-instrument swing: type plus local amount in percent (0-100).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SwingSettings {
    pub kind: SwingType,
    pub amount: f32,
}

impl Default for SwingSettings {
    fn default() -> Self {
        Self {
            kind: SwingType::None,
            amount: 50.0,
        }
    }
}

/// Time offset in seconds for `step` under the given swing.
///
/// Effective amount is `(local/100) * (global/100)`. The result is never
/// negative and never exceeds [`MAX_SWING_STEP_FRACTION`] of a step.
pub fn swing_offset(
    swing: &SwingSettings,
    global_amount: f32,
    step: usize,
    secs_per_beat: f64,
) -> f64 {
    if swing.kind == SwingType::None {
        return 0.0;
    }
    let amount = (swing.amount as f64 / 100.0) * (global_amount as f64 / 100.0);
    if amount.is_nan() || amount <= 0.0 {
        return 0.0;
    }
    let Some(full) = swing.kind.full_delay(step % STEPS_PER_BEAT, secs_per_beat) else {
        return 0.0;
    };
    let secs_per_step = secs_per_beat / STEPS_PER_BEAT as f64;
    (amount * full).min(secs_per_step * MAX_SWING_STEP_FRACTION)
}
