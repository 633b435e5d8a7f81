//! Audio-related types shared across crates.

use crate::{InstrumentId, Row, NUM_INSTRUMENTS};

/// Feedback messages from the control thread to the main thread.
#[derive(Debug, Clone, PartialEq)]
pub enum AudioFeedback {
    PlayingChanged(bool),
    /// Step that was just scheduled (0-15).
    StepPosition(u8),
    /// Rows latched for the bar starting now, indexed by instrument.
    LatchedRows([Row; NUM_INSTRUMENTS]),
    /// Sum-bus peak in dBFS.
    Meter(f32),
    /// A live hit was quantised and written into the pattern.
    StepRecorded {
        instrument: InstrumentId,
        row: Row,
        step: usize,
        velocity: f32,
    },
    SampleMissing {
        instrument: InstrumentId,
    },
}
