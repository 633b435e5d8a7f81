use serde::{Deserialize, Serialize};

use crate::{
    DelayMode, InstrumentId, MetronomeMode, PackId, ReverbMode, Row, SwingType,
};

/// Pattern edits. Step indices outside 0..16 are ignored by the reducer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PatternAction {
    CycleStep {
        instrument: InstrumentId,
        row: Row,
        step: usize,
    },
    SetStep {
        instrument: InstrumentId,
        row: Row,
        step: usize,
        velocity: f32,
    },
    ClearRow(InstrumentId, Row),
    /// Bulk load; ignored unless exactly 16 velocities are supplied.
    LoadRow(InstrumentId, Row, Vec<f32>),
    SetRowActive(InstrumentId, Row, bool),
}

/// Channel strip and selection actions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MixerAction {
    Select(InstrumentId),
    SetVolume(InstrumentId, f32),
    ToggleMute(InstrumentId),
    SetMute(InstrumentId, bool),
    SetPitch(InstrumentId, i32),
    /// Solo the selected instrument, or release solo.
    ToggleSolo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SwingAction {
    SetType(InstrumentId, SwingType),
    SetAmount(InstrumentId, f32),
    SetGlobal(f32),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FxAction {
    SetDelayMode(InstrumentId, DelayMode),
    SetDelayWet(InstrumentId, f32),
    SetReverbMode(InstrumentId, ReverbMode),
    SetReverbWet(InstrumentId, f32),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SidechainAction {
    SetLink {
        target: InstrumentId,
        trigger: InstrumentId,
        enabled: bool,
    },
    SetAmount(InstrumentId, f32),
    SetAttack(InstrumentId, f32),
    SetRelease(InstrumentId, f32),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SumBusAction {
    SetThreshold(f32),
    SetRatio(f32),
    SetAttack(f32),
    SetRelease(f32),
    SetKnee(f32),
    SetLimiter(bool),
    SetMakeup(f32),
    SetHighpass(Option<f32>),
    SetLowpass(Option<f32>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SessionAction {
    SetBpm(u16),
    SetMetronome(MetronomeMode),
    SetMetronomeLevel(f32),
    SetPack(PackId),
    SetRecording(bool),
}

/// Every state mutation the engine understands. Reduced identically on the
/// main thread and on the control thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DomainAction {
    Pattern(PatternAction),
    Mixer(MixerAction),
    Swing(SwingAction),
    Fx(FxAction),
    Sidechain(SidechainAction),
    SumBus(SumBusAction),
    Session(SessionAction),
}
