//! Pattern store: two alternating 16-step velocity rows per instrument.

use serde::{Deserialize, Serialize};

use crate::STEPS_PER_BAR;

/// Velocities a step passes through when cycled; the step turns off after the last.
pub const STEP_CYCLE: [f32; 4] = [0.45, 0.6, 0.75, 1.0];

const CYCLE_EPSILON: f32 = 1e-4;

/// One of the two alternate rows of a pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Row {
    #[default]
    A,
    B,
}

impl Row {
    pub const ALL: [Row; 2] = [Row::A, Row::B];

    pub fn index(self) -> usize {
        match self {
            Row::A => 0,
            Row::B => 1,
        }
    }

    pub fn other(self) -> Row {
        match self {
            Row::A => Row::B,
            Row::B => Row::A,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Row::A => "A",
            Row::B => "B",
        }
    }
}

/// Next velocity in the step cycle: off -> 0.45 -> 0.6 -> 0.75 -> 1.0 -> off.
///
/// Values that are not on the cycle (from a bulk load) advance to the next
/// cycle value above them.
pub fn next_velocity(current: f32) -> f32 {
    if current.is_nan() || current <= CYCLE_EPSILON {
        return STEP_CYCLE[0];
    }
    STEP_CYCLE
        .iter()
        .copied()
        .find(|&v| v > current + CYCLE_EPSILON)
        .unwrap_or(0.0)
}

/// Step velocities for both rows. 0.0 means the step is off.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    rows: [[f32; STEPS_PER_BAR]; 2],
}

impl Default for Pattern {
    fn default() -> Self {
        Self {
            rows: [[0.0; STEPS_PER_BAR]; 2],
        }
    }
}

impl Pattern {
    pub fn row(&self, row: Row) -> &[f32; STEPS_PER_BAR] {
        &self.rows[row.index()]
    }

    /// Velocity at a step; out-of-range steps read as off.
    pub fn velocity(&self, row: Row, step: usize) -> f32 {
        self.rows[row.index()].get(step).copied().unwrap_or(0.0)
    }

    /// Advance one step through the velocity cycle and return the new value.
    pub fn cycle_step(&mut self, row: Row, step: usize) -> Option<f32> {
        let slot = self.rows[row.index()].get_mut(step)?;
        *slot = next_velocity(*slot);
        Some(*slot)
    }

    /// Write a velocity directly. Non-finite input turns the step off.
    pub fn set_step(&mut self, row: Row, step: usize, velocity: f32) -> bool {
        match self.rows[row.index()].get_mut(step) {
            Some(slot) => {
                *slot = sanitize_velocity(velocity);
                true
            }
            None => false,
        }
    }

    pub fn clear_row(&mut self, row: Row) {
        self.rows[row.index()] = [0.0; STEPS_PER_BAR];
    }

    /// Bulk-load a whole row. Rejected unless exactly 16 values are given.
    pub fn load_row(&mut self, row: Row, steps: &[f32]) -> bool {
        if steps.len() != STEPS_PER_BAR {
            return false;
        }
        for (slot, &v) in self.rows[row.index()].iter_mut().zip(steps) {
            *slot = sanitize_velocity(v);
        }
        true
    }

    pub fn is_row_empty(&self, row: Row) -> bool {
        self.rows[row.index()].iter().all(|&v| v <= 0.0)
    }
}

fn sanitize_velocity(v: f32) -> f32 {
    if v.is_finite() {
        v.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Which rows of an instrument take part in playback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowActivity {
    pub a: bool,
    pub b: bool,
}

impl Default for RowActivity {
    fn default() -> Self {
        Self { a: true, b: false }
    }
}

impl RowActivity {
    pub fn is_active(&self, row: Row) -> bool {
        match row {
            Row::A => self.a,
            Row::B => self.b,
        }
    }

    pub fn set(&mut self, row: Row, active: bool) {
        match row {
            Row::A => self.a = active,
            Row::B => self.b = active,
        }
    }

    /// Latched row for the next bar given the row latched for the previous bar.
    ///
    /// Both active alternates, one active locks to it, none active holds.
    pub fn next_latch(&self, previous: Row) -> Row {
        match (self.a, self.b) {
            (true, true) => previous.other(),
            (true, false) => Row::A,
            (false, true) => Row::B,
            (false, false) => previous,
        }
    }

    /// Latch for the first bar after a fresh start: the first active row.
    pub fn initial_latch(&self, previous: Row) -> Row {
        match (self.a, self.b) {
            (true, _) => Row::A,
            (false, true) => Row::B,
            (false, false) => previous,
        }
    }
}
