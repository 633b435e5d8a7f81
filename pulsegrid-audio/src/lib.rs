//! # pulsegrid-audio
//!
//! Lookahead scheduling and the audio graph for the pulsegrid step
//! sequencer. The control thread owns an [`AudioEngine`] and a
//! [`transport::Transport`]; the main thread talks to it through
//! [`AudioHandle`].

mod audio_thread;
pub mod click_tick;
pub mod commands;
pub mod engine;
pub mod handle;
pub mod step_tick;
pub mod telemetry;
pub mod transport;

pub use commands::{AudioCmd, AudioFeedback};
pub use engine::backend::{AudioBackend, BackendError, NullBackend};
pub use engine::osc_backend::OscBackend;
pub use engine::samples::SampleBuffer;
pub use engine::AudioEngine;
pub use handle::{AudioHandle, AudioReadState};
pub use transport::TransportConfig;

use pulsegrid_types::{InstrumentState, SessionState};

/// Types that hold the session and instrument state the control thread
/// mirrors. Implemented by the core's dispatcher so this crate never depends
/// on it.
pub trait AudioStateProvider {
    fn session(&self) -> &SessionState;
    fn instruments(&self) -> &InstrumentState;
}
