//! LocalDispatcher: applies actions to the main-thread state and mirrors
//! them to the control thread.

use std::io;
use std::path::Path;

use pulsegrid_audio::{AudioFeedback, AudioHandle, AudioStateProvider};
use pulsegrid_types::reduce::reduce_action;
use pulsegrid_types::{
    DomainAction, InstrumentState, PatternAction, SessionAction, SessionState,
};

use crate::samples::{LoadResult, PackLoader};
use crate::session;

/// Main-thread copy of everything the control thread mirrors.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppState {
    pub session: SessionState,
    pub instruments: InstrumentState,
}

impl AudioStateProvider for AppState {
    fn session(&self) -> &SessionState {
        &self.session
    }

    fn instruments(&self) -> &InstrumentState {
        &self.instruments
    }
}

/// Both sides run the same reducer on their own copy, so only the action
/// crosses the channel.
pub struct LocalDispatcher {
    state: AppState,
    audio: AudioHandle,
    loader: Option<PackLoader>,
}

impl LocalDispatcher {
    /// Pushes the initial state to the control thread and asks the loader
    /// for the current pack.
    pub fn new(state: AppState, audio: AudioHandle, loader: Option<PackLoader>) -> Self {
        let mut dispatcher = Self {
            state,
            audio,
            loader,
        };
        dispatcher.sync_all();
        dispatcher
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn audio(&self) -> &AudioHandle {
        &self.audio
    }

    /// Apply an action. Returns true if the state changed.
    pub fn dispatch(&mut self, action: DomainAction) -> bool {
        let changed = reduce_action(&action, &mut self.state.instruments, &mut self.state.session);
        if !changed {
            return false;
        }
        if let DomainAction::Session(SessionAction::SetPack(pack)) = &action {
            if let Some(loader) = &mut self.loader {
                loader.request_pack(pack);
            }
        }
        self.audio.dispatch(action);
        true
    }

    /// Forward finished decodes and fold control-thread feedback into the
    /// main copy. Call once per UI frame.
    pub fn poll(&mut self) -> Vec<AudioFeedback> {
        if let Some(loader) = &mut self.loader {
            for result in loader.drain() {
                match result {
                    LoadResult::Decoded {
                        pack,
                        instrument,
                        buffer,
                    } => self.audio.sample_decoded(pack, instrument, buffer),
                    LoadResult::Failed {
                        pack,
                        instrument,
                        reason,
                    } => {
                        log::debug!(
                            target: "audio::samples",
                            "{}/{} keeps its previous buffer: {}",
                            pack,
                            instrument,
                            reason
                        );
                    }
                }
            }
        }
        let feedback = self.audio.drain_feedback();
        for fb in &feedback {
            self.apply_feedback(fb);
        }
        feedback
    }

    /// A live hit was quantised on the control thread. The write goes
    /// through `dispatch` like any edit so both copies see the same order.
    fn apply_feedback(&mut self, feedback: &AudioFeedback) {
        if let AudioFeedback::StepRecorded {
            instrument,
            row,
            step,
            velocity,
        } = feedback
        {
            self.dispatch(DomainAction::Pattern(PatternAction::SetStep {
                instrument: *instrument,
                row: *row,
                step: *step,
                velocity: *velocity,
            }));
        }
    }

    pub fn save(&self, path: &Path) -> io::Result<()> {
        session::save_session(path, &self.state.session, &self.state.instruments)
    }

    /// Replace the whole state from a session file.
    pub fn load(&mut self, path: &Path, defaults: &SessionState) -> io::Result<()> {
        let (session, instruments) = session::load_session(path, defaults)?;
        self.state = AppState {
            session,
            instruments,
        };
        self.sync_all();
        Ok(())
    }

    fn sync_all(&mut self) {
        self.audio
            .update_state(self.state.instruments(), self.state.session());
        if let Some(loader) = &mut self.loader {
            loader.request_pack(&self.state.session.pack);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    use super::*;
    use crate::samples::test_support::write_wav;
    use crate::samples::DirectorySource;
    use pulsegrid_audio::engine::backend::{NodeKind, SharedTestBackend, TestBackend};
    use pulsegrid_audio::TransportConfig;
    use pulsegrid_types::{InstrumentId, MixerAction, PackId, Row};

    fn dispatcher(loader: Option<PackLoader>) -> LocalDispatcher {
        LocalDispatcher::new(
            AppState::default(),
            AudioHandle::new(TransportConfig::default()),
            loader,
        )
    }

    #[test]
    fn unchanged_actions_are_not_forwarded() {
        let mut d = dispatcher(None);
        assert!(d.dispatch(DomainAction::Session(SessionAction::SetBpm(140))));
        assert_eq!(d.state().session.bpm, 140);
        assert!(!d.dispatch(DomainAction::Session(SessionAction::SetBpm(140))));
        assert!(d.dispatch(DomainAction::Mixer(MixerAction::ToggleMute(InstrumentId::TOM))));
        assert!(d.state().instruments.instrument(InstrumentId::TOM).unwrap().strip.muted);
    }

    #[test]
    fn recorded_steps_are_mirrored() {
        let mut d = dispatcher(None);
        d.apply_feedback(&AudioFeedback::StepRecorded {
            instrument: InstrumentId::CLAP,
            row: Row::B,
            step: 11,
            velocity: 0.6,
        });
        let clap = d.state().instruments.instrument(InstrumentId::CLAP).unwrap();
        assert_eq!(clap.pattern.velocity(Row::B, 11), 0.6);
    }

    #[test]
    fn recorded_step_is_ordered_with_local_edits() {
        let mut d = dispatcher(None);
        let cycle = DomainAction::Pattern(PatternAction::CycleStep {
            instrument: InstrumentId::SNARE,
            row: Row::A,
            step: 5,
        });
        let recorded = AudioFeedback::StepRecorded {
            instrument: InstrumentId::SNARE,
            row: Row::A,
            step: 5,
            velocity: 0.8,
        };
        d.dispatch(cycle.clone());
        d.apply_feedback(&recorded);
        d.dispatch(cycle.clone());

        let mut replica = AppState::default();
        for action in [
            cycle.clone(),
            DomainAction::Pattern(PatternAction::SetStep {
                instrument: InstrumentId::SNARE,
                row: Row::A,
                step: 5,
                velocity: 0.8,
            }),
            cycle,
        ] {
            reduce_action(&action, &mut replica.instruments, &mut replica.session);
        }
        assert_eq!(d.state(), &replica);
        let snare = d.state().instruments.instrument(InstrumentId::SNARE).unwrap();
        assert_eq!(snare.pattern.velocity(Row::A, 5), 1.0);
    }

    #[test]
    fn save_and_load_through_dispatcher() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s.json");
        let mut d = dispatcher(None);
        d.dispatch(DomainAction::Pattern(PatternAction::CycleStep {
            instrument: InstrumentId::KICK,
            row: Row::A,
            step: 0,
        }));
        d.save(&path).unwrap();
        let mut fresh = dispatcher(None);
        fresh.load(&path, &SessionState::default()).unwrap();
        assert_eq!(fresh.state(), d.state());
    }

    #[test]
    fn decoded_pack_reaches_the_engine() {
        let dir = tempfile::tempdir().unwrap();
        write_wav(&dir.path().join("default").join("kick.wav"), 4_410, 12_000);
        let loader = PackLoader::new(Arc::new(DirectorySource::new(dir.path())));
        let mut d = dispatcher(Some(loader));
        let backend = Arc::new(TestBackend::new());
        d.audio()
            .attach_backend(Box::new(SharedTestBackend(backend.clone())));

        let deadline = Instant::now() + Duration::from_secs(5);
        let mut played = false;
        while !played && Instant::now() < deadline {
            d.poll();
            d.audio().audition(InstrumentId::KICK, 1.0);
            thread::sleep(Duration::from_millis(10));
            played = backend
                .started_nodes()
                .iter()
                .any(|(_, kind, _)| matches!(kind, NodeKind::Sampler { .. }));
        }
        assert!(played);
        assert!(d.dispatch(DomainAction::Session(SessionAction::SetPack(PackId::new("909")))));
    }
}
