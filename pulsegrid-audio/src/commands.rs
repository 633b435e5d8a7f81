//! Commands from the main thread to the control thread.

use std::fmt;

use pulsegrid_types::{DomainAction, InstrumentId, InstrumentState, PackId, SessionState};

use crate::engine::backend::AudioBackend;
use crate::engine::samples::SampleBuffer;

pub use pulsegrid_types::AudioFeedback;

pub enum AudioCmd {
    // ── Backend ───────────────────────────────────────────────────
    /// Replace the render backend and rebuild the graph on it.
    AttachBackend(Box<dyn AudioBackend>),

    // ── State ─────────────────────────────────────────────────────
    /// Replace the thread's copy wholesale (session load).
    UpdateState {
        instruments: Box<InstrumentState>,
        session: Box<SessionState>,
    },
    /// Apply one mutation to the thread's copy with the shared reducer.
    Action(DomainAction),
    SampleDecoded {
        pack: PackId,
        instrument: InstrumentId,
        buffer: SampleBuffer,
    },

    // ── Transport ─────────────────────────────────────────────────
    Play,
    Stop,
    ResetPosition,

    // ── Live input ────────────────────────────────────────────────
    /// Pad hit; recorded into the pattern when recording and playing.
    LiveHit {
        instrument: InstrumentId,
        velocity: f32,
    },
    /// Play an instrument once, now.
    Audition {
        instrument: InstrumentId,
        velocity: f32,
    },

    Shutdown,
}

impl AudioCmd {
    /// Commands that go through the priority channel.
    pub fn is_priority(&self) -> bool {
        matches!(
            self,
            AudioCmd::LiveHit { .. } | AudioCmd::Audition { .. } | AudioCmd::Play | AudioCmd::Stop
        )
    }

    fn name(&self) -> &'static str {
        match self {
            AudioCmd::AttachBackend(_) => "AttachBackend",
            AudioCmd::UpdateState { .. } => "UpdateState",
            AudioCmd::Action(_) => "Action",
            AudioCmd::SampleDecoded { .. } => "SampleDecoded",
            AudioCmd::Play => "Play",
            AudioCmd::Stop => "Stop",
            AudioCmd::ResetPosition => "ResetPosition",
            AudioCmd::LiveHit { .. } => "LiveHit",
            AudioCmd::Audition { .. } => "Audition",
            AudioCmd::Shutdown => "Shutdown",
        }
    }
}

impl fmt::Debug for AudioCmd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AudioCmd::Action(action) => write!(f, "Action({:?})", action),
            AudioCmd::SampleDecoded {
                pack, instrument, ..
            } => write!(f, "SampleDecoded({}/{})", pack, instrument),
            AudioCmd::LiveHit {
                instrument,
                velocity,
            }
            | AudioCmd::Audition {
                instrument,
                velocity,
            } => write!(f, "{}({}, {:.2})", self.name(), instrument, velocity),
            other => f.write_str(other.name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn live_input_and_transport_are_priority() {
        assert!(AudioCmd::Play.is_priority());
        assert!(AudioCmd::LiveHit {
            instrument: InstrumentId::KICK,
            velocity: 1.0
        }
        .is_priority());
        assert!(!AudioCmd::ResetPosition.is_priority());
        assert!(!AudioCmd::Action(DomainAction::Mixer(pulsegrid_types::MixerAction::ToggleSolo))
            .is_priority());
    }

    #[test]
    fn debug_names_variant() {
        let cmd = AudioCmd::Audition {
            instrument: InstrumentId::TOM,
            velocity: 0.5,
        };
        assert_eq!(format!("{:?}", cmd), "Audition(tom, 0.50)");
    }
}
