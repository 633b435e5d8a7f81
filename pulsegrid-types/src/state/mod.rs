mod fx;
mod instrument_state;
mod mixer;
mod pattern;
mod roster;
mod session;
mod sidechain;
mod sum_bus;
mod swing;

pub use fx::{DelayMode, FxMode, FxSend, ReverbMode};
pub use instrument_state::{InstrumentSlot, InstrumentState};
pub use mixer::{ChannelStrip, MAX_PITCH, MAX_VOLUME_DB, MIN_PITCH, MIN_VOLUME_DB};
pub use pattern::{next_velocity, Pattern, Row, RowActivity, STEP_CYCLE};
pub use roster::{choke_targets, InstrumentDef, CHOKE_GROUPS, NUM_INSTRUMENTS, ROSTER};
pub use session::{MetronomeMode, SessionState, MAX_GLOBAL_SWING};
pub use sidechain::{DuckSettings, SidechainMatrix, MAX_SC_LINKS};
pub use sum_bus::{peak_to_dbfs, CompressorParams, SumBusState, METER_FLOOR_DB};
pub use swing::{swing_offset, SwingSettings, SwingType, MAX_SWING_STEP_FRACTION};
