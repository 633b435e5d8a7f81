//! AudioHandle: main-thread interface to the control thread.
//!
//! Owns the command/feedback channels. The AudioEngine, the transport and
//! the control thread's state copy live on the other side.

use std::sync::mpsc::{self, Receiver};
use std::thread::{self, JoinHandle};

use crossbeam_channel::Sender as CrossbeamSender;
use pulsegrid_types::{
    DomainAction, InstrumentId, InstrumentState, PackId, Row, SessionState, METER_FLOOR_DB,
    NUM_INSTRUMENTS,
};

use super::commands::{AudioCmd, AudioFeedback};
use super::engine::backend::AudioBackend;
use super::engine::samples::SampleBuffer;
use super::transport::TransportConfig;

/// Values the control thread is the authority on. The UI reads these for
/// display; feedback updates them.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioReadState {
    pub playing: bool,
    pub step: u8,
    pub latched: [Row; NUM_INSTRUMENTS],
    pub meter_db: f32,
}

impl Default for AudioReadState {
    fn default() -> Self {
        Self {
            playing: false,
            step: 0,
            latched: [Row::A; NUM_INSTRUMENTS],
            meter_db: METER_FLOOR_DB,
        }
    }
}

/// Main-thread handle to the control thread.
///
/// Separate priority and normal channels keep live hits ahead of bulk
/// state traffic.
pub struct AudioHandle {
    /// Priority commands: live hits, auditions, play/stop
    priority_tx: CrossbeamSender<AudioCmd>,
    /// Normal commands: state sync, samples, backend attach
    normal_tx: CrossbeamSender<AudioCmd>,
    feedback_rx: Receiver<AudioFeedback>,
    audio_state: AudioReadState,
    join_handle: Option<JoinHandle<()>>,
}

impl AudioHandle {
    pub fn new(config: TransportConfig) -> Self {
        let (priority_tx, priority_rx) = crossbeam_channel::unbounded();
        let (normal_tx, normal_rx) = crossbeam_channel::unbounded();
        let (feedback_tx, feedback_rx) = mpsc::channel();

        let join_handle = thread::Builder::new()
            .name("pulsegrid-audio".into())
            .spawn(move || {
                let thread =
                    super::audio_thread::AudioThread::new(priority_rx, normal_rx, feedback_tx, config);
                thread.run();
            })
            .map_err(|e| log::error!(target: "audio", "failed to spawn control thread: {}", e))
            .ok();

        Self {
            priority_tx,
            normal_tx,
            feedback_rx,
            audio_state: AudioReadState::default(),
            join_handle,
        }
    }

    /// Send a command to the control thread, routing to priority or normal channel.
    pub fn send_cmd(&self, cmd: AudioCmd) -> Result<(), String> {
        if cmd.is_priority() {
            self.priority_tx
                .send(cmd)
                .map_err(|_| "Audio thread disconnected".to_string())
        } else {
            self.normal_tx
                .send(cmd)
                .map_err(|_| "Audio thread disconnected".to_string())
        }
    }

    /// Fire-and-forget: send a command and log if the thread is gone.
    fn send(&self, cmd: AudioCmd) {
        if let Err(e) = self.send_cmd(cmd) {
            log::warn!(target: "audio", "command dropped: {}", e);
        }
    }

    pub fn attach_backend(&self, backend: Box<dyn AudioBackend>) {
        self.send(AudioCmd::AttachBackend(backend));
    }

    /// Replace the control thread's whole state copy.
    pub fn update_state(&self, instruments: &InstrumentState, session: &SessionState) {
        self.send(AudioCmd::UpdateState {
            instruments: Box::new(instruments.clone()),
            session: Box::new(session.clone()),
        });
    }

    /// Forward an action already applied to the main copy.
    pub fn dispatch(&self, action: DomainAction) {
        self.send(AudioCmd::Action(action));
    }

    pub fn sample_decoded(&self, pack: PackId, instrument: InstrumentId, buffer: SampleBuffer) {
        self.send(AudioCmd::SampleDecoded {
            pack,
            instrument,
            buffer,
        });
    }

    pub fn play(&self) {
        self.send(AudioCmd::Play);
    }

    pub fn stop(&self) {
        self.send(AudioCmd::Stop);
    }

    pub fn reset_position(&self) {
        self.send(AudioCmd::ResetPosition);
    }

    pub fn live_hit(&self, instrument: InstrumentId, velocity: f32) {
        self.send(AudioCmd::LiveHit {
            instrument,
            velocity,
        });
    }

    pub fn audition(&self, instrument: InstrumentId, velocity: f32) {
        self.send(AudioCmd::Audition {
            instrument,
            velocity,
        });
    }

    pub fn drain_feedback(&mut self) -> Vec<AudioFeedback> {
        let mut out = Vec::new();
        while let Ok(msg) = self.feedback_rx.try_recv() {
            self.apply_feedback(&msg);
            out.push(msg);
        }
        out
    }

    fn apply_feedback(&mut self, feedback: &AudioFeedback) {
        match feedback {
            AudioFeedback::PlayingChanged(playing) => {
                self.audio_state.playing = *playing;
            }
            AudioFeedback::StepPosition(step) => {
                self.audio_state.step = *step;
            }
            AudioFeedback::LatchedRows(rows) => {
                self.audio_state.latched = *rows;
            }
            AudioFeedback::Meter(db) => {
                self.audio_state.meter_db = *db;
            }
            AudioFeedback::StepRecorded { .. } => {}
            AudioFeedback::SampleMissing { .. } => {}
        }
    }

    pub fn read_state(&self) -> &AudioReadState {
        &self.audio_state
    }

    pub fn is_playing(&self) -> bool {
        self.audio_state.playing
    }

    /// Stop the control thread and wait for it.
    pub fn shutdown(&mut self) {
        let _ = self.send_cmd(AudioCmd::Shutdown);
        if let Some(handle) = self.join_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for AudioHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl Default for AudioHandle {
    fn default() -> Self {
        Self::new(TransportConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    use super::*;
    use crate::engine::backend::{NodeKind, SharedTestBackend, TestBackend};

    fn wait_for(handle: &mut AudioHandle, pred: impl Fn(&AudioFeedback) -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if handle.drain_feedback().iter().any(&pred) {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn play_and_stop_round_trip() {
        let mut handle = AudioHandle::default();
        let backend = Arc::new(TestBackend::new());
        handle.attach_backend(Box::new(SharedTestBackend(backend.clone())));
        handle.play();
        assert!(wait_for(&mut handle, |f| *f == AudioFeedback::PlayingChanged(true)));
        assert!(handle.is_playing());
        handle.stop();
        assert!(wait_for(&mut handle, |f| *f == AudioFeedback::PlayingChanged(false)));
        assert!(!handle.read_state().playing);
        handle.shutdown();
    }

    #[test]
    fn audition_reaches_backend() {
        let mut handle = AudioHandle::default();
        let backend = Arc::new(TestBackend::new());
        handle.attach_backend(Box::new(SharedTestBackend(backend.clone())));
        handle.sample_decoded(
            PackId::default(),
            InstrumentId::COWBELL,
            SampleBuffer {
                sample_rate: 48_000,
                channels: 1,
                data: vec![0.3; 4_800].into(),
            },
        );
        handle.audition(InstrumentId::COWBELL, 0.9);
        // priority and normal queues race; retry until the buffer is in
        let deadline = Instant::now() + Duration::from_secs(2);
        let mut started = 0;
        while Instant::now() < deadline && started == 0 {
            thread::sleep(Duration::from_millis(10));
            started = backend
                .started_nodes()
                .iter()
                .filter(|(_, kind, _)| matches!(kind, NodeKind::Sampler { .. }))
                .count();
            if started == 0 {
                handle.audition(InstrumentId::COWBELL, 0.9);
            }
        }
        assert!(started >= 1);
        handle.shutdown();
    }

    #[test]
    fn feedback_updates_read_state() {
        let (tx, rx) = mpsc::channel();
        let (priority_tx, _) = crossbeam_channel::unbounded();
        let (normal_tx, _) = crossbeam_channel::unbounded();
        let mut handle = AudioHandle {
            priority_tx,
            normal_tx,
            feedback_rx: rx,
            audio_state: AudioReadState::default(),
            join_handle: None,
        };
        let mut latched = [Row::A; NUM_INSTRUMENTS];
        latched[2] = Row::B;
        tx.send(AudioFeedback::StepPosition(7)).unwrap();
        tx.send(AudioFeedback::LatchedRows(latched)).unwrap();
        tx.send(AudioFeedback::Meter(-12.0)).unwrap();
        assert_eq!(handle.drain_feedback().len(), 3);
        let state = handle.read_state();
        assert_eq!(state.step, 7);
        assert_eq!(state.latched[2], Row::B);
        assert_eq!(state.meter_db, -12.0);
    }
}
