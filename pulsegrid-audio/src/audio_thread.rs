use std::sync::mpsc::Sender;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, TryRecvError};
use pulsegrid_types::reduce::reduce_action;
use pulsegrid_types::{InstrumentId, InstrumentState, SessionState};

use super::commands::{AudioCmd, AudioFeedback};
use super::engine::AudioEngine;
use super::step_tick::tick_sequencer;
use super::telemetry::ControlTelemetry;
use super::transport::{Transport, TransportConfig};

const CLEANUP_INTERVAL: Duration = Duration::from_millis(100);
const SUMMARY_INTERVAL: Duration = Duration::from_secs(5);

pub(crate) struct AudioThread {
    engine: AudioEngine,
    /// Priority commands: live hits, auditions, play/stop
    priority_rx: Receiver<AudioCmd>,
    /// Normal commands: state sync, samples, backend attach
    normal_rx: Receiver<AudioCmd>,
    feedback_tx: Sender<AudioFeedback>,
    instruments: InstrumentState,
    session: SessionState,
    transport: Transport,
    telemetry: ControlTelemetry,
    last_tick: Instant,
    last_cleanup: Instant,
    last_summary: Instant,
}

impl AudioThread {
    pub(crate) fn new(
        priority_rx: Receiver<AudioCmd>,
        normal_rx: Receiver<AudioCmd>,
        feedback_tx: Sender<AudioFeedback>,
        config: TransportConfig,
    ) -> Self {
        let mut engine = AudioEngine::new();
        engine.min_lead_secs = config.min_lead_secs;
        Self {
            engine,
            priority_rx,
            normal_rx,
            feedback_tx,
            instruments: InstrumentState::new(),
            session: SessionState::default(),
            transport: Transport::new(config),
            telemetry: ControlTelemetry::new(),
            last_tick: Instant::now(),
            last_cleanup: Instant::now(),
            last_summary: Instant::now(),
        }
    }

    pub(crate) fn run(mut self) {
        let tick_interval = self.transport.config().lookahead;

        loop {
            let remaining = tick_interval.saturating_sub(self.last_tick.elapsed());

            crossbeam_channel::select! {
                recv(self.priority_rx) -> result => {
                    match result {
                        Ok(cmd) => {
                            if self.handle_cmd(cmd) {
                                break;
                            }
                        }
                        Err(_) => break,
                    }
                }
                recv(self.normal_rx) -> result => {
                    match result {
                        Ok(cmd) => {
                            if self.handle_cmd(cmd) {
                                break;
                            }
                        }
                        Err(_) => break,
                    }
                }
                default(remaining) => {}
            }

            if self.drain_priority_commands() {
                break;
            }
            if self.drain_normal_commands() {
                break;
            }

            let now = Instant::now();
            if now.duration_since(self.last_tick) >= tick_interval {
                self.last_tick = now;
                self.tick();
                self.telemetry
                    .record_tick(now.elapsed(), tick_interval.as_micros() as u32);
            }

            self.poll_engine();
        }
        self.engine.cancel_pending();
        log::info!(target: "audio::transport", "control thread exiting");
    }

    /// Time-budgeted drain so a burst of pad hits cannot starve the scheduler.
    fn drain_priority_commands(&mut self) -> bool {
        const MAX_DRAIN: usize = 128;
        const BUDGET: Duration = Duration::from_micros(200);
        let start = Instant::now();
        for _ in 0..MAX_DRAIN {
            if start.elapsed() >= BUDGET {
                return false;
            }
            match self.priority_rx.try_recv() {
                Ok(cmd) => {
                    if self.handle_cmd(cmd) {
                        return true;
                    }
                }
                Err(TryRecvError::Empty) => return false,
                Err(TryRecvError::Disconnected) => return true,
            }
        }
        false
    }

    fn drain_normal_commands(&mut self) -> bool {
        const MAX_DRAIN: usize = 64;
        const BUDGET: Duration = Duration::from_micros(100);
        let start = Instant::now();
        for _ in 0..MAX_DRAIN {
            if start.elapsed() >= BUDGET {
                return false;
            }
            match self.normal_rx.try_recv() {
                Ok(cmd) => {
                    if self.handle_cmd(cmd) {
                        return true;
                    }
                }
                Err(TryRecvError::Empty) => return false,
                Err(TryRecvError::Disconnected) => return true,
            }
        }
        false
    }

    /// Returns true when the thread should exit.
    pub(crate) fn handle_cmd(&mut self, cmd: AudioCmd) -> bool {
        match cmd {
            AudioCmd::AttachBackend(backend) => {
                if let Err(e) = self
                    .engine
                    .attach_backend(backend, &self.instruments, &self.session)
                {
                    log::error!(target: "audio::nodes", "graph build failed: {}", e);
                }
            }
            AudioCmd::UpdateState {
                instruments,
                session,
            } => {
                self.instruments = *instruments;
                self.session = *session;
                self.sync_engine();
            }
            AudioCmd::Action(action) => {
                if reduce_action(&action, &mut self.instruments, &mut self.session) {
                    self.sync_engine();
                }
            }
            AudioCmd::SampleDecoded {
                pack,
                instrument,
                buffer,
            } => {
                if let Err(e) = self.engine.install_sample(&pack, instrument, &buffer) {
                    log::warn!(target: "audio::samples", "install {}/{}: {}", pack, instrument, e);
                }
            }
            AudioCmd::Play => {
                let now = self.engine.now();
                if self.transport.start(now, self.session.seconds_per_step()) {
                    let _ = self.feedback_tx.send(AudioFeedback::PlayingChanged(true));
                }
            }
            AudioCmd::Stop => {
                if self.transport.stop() {
                    self.engine.cancel_pending();
                    let _ = self.feedback_tx.send(AudioFeedback::PlayingChanged(false));
                }
            }
            AudioCmd::ResetPosition => {
                self.transport.reset_position();
                let _ = self.feedback_tx.send(AudioFeedback::StepPosition(0));
            }
            AudioCmd::LiveHit {
                instrument,
                velocity,
            } => self.live_hit(instrument, velocity),
            AudioCmd::Audition {
                instrument,
                velocity,
            } => self.audition(instrument, velocity),
            AudioCmd::Shutdown => return true,
        }
        false
    }

    fn sync_engine(&mut self) {
        if let Err(e) = self.engine.sync(&self.instruments, &self.session) {
            log::warn!(target: "audio::nodes", "engine sync failed: {}", e);
        }
    }

    fn audition(&mut self, instrument: InstrumentId, velocity: f32) {
        let Some(slot) = self.instruments.instrument(instrument) else {
            return;
        };
        match self.engine.audition(slot, velocity, &self.session) {
            Ok(true) => {}
            Ok(false) => {
                let _ = self
                    .feedback_tx
                    .send(AudioFeedback::SampleMissing { instrument });
            }
            Err(e) => log::warn!(target: "audio::voices", "audition {}: {}", instrument, e),
        }
    }

    /// Play the hit now and, while recording, report the cell it belongs to.
    ///
    /// The pattern write comes back from the main thread as an ordinary
    /// action, so both copies apply it in the same order as any other edit.
    fn live_hit(&mut self, instrument: InstrumentId, velocity: f32) {
        self.audition(instrument, velocity);
        if !self.session.recording || !self.transport.is_running() {
            return;
        }
        let Some(slot) = self.instruments.instrument(instrument) else {
            return;
        };
        let cell = self
            .transport
            .locate_hit(slot, self.engine.now(), self.session.seconds_per_step());
        if let Some(position) = cell.pending {
            self.transport.suppress(instrument, position);
        }
        let _ = self.feedback_tx.send(AudioFeedback::StepRecorded {
            instrument,
            row: cell.row,
            step: cell.step,
            velocity: velocity.clamp(0.0, 1.0),
        });
        log::debug!(
            target: "audio::transport",
            "recorded {} at {} step {}",
            instrument,
            cell.row.as_str(),
            cell.step
        );
    }

    pub(crate) fn tick(&mut self) {
        tick_sequencer(
            &mut self.transport,
            &mut self.engine,
            &self.instruments,
            &self.session,
            &self.feedback_tx,
            &mut self.telemetry,
        );
        if self.engine.is_running() {
            let _ = self
                .feedback_tx
                .send(AudioFeedback::Meter(self.engine.read_meter_db()));
        }
    }

    fn poll_engine(&mut self) {
        self.engine.process_node_ends();

        if self.last_cleanup.elapsed() >= CLEANUP_INTERVAL {
            self.last_cleanup = Instant::now();
            self.engine.cleanup_expired_voices();
        }

        if self.last_summary.elapsed() >= SUMMARY_INTERVAL {
            self.last_summary = Instant::now();
            let s = self.telemetry.take_summary();
            log::debug!(
                target: "audio::transport",
                "tick avg {}us p95 {}us max {}us overruns {} | {} steps, min lead {:?} ms, resyncs {}",
                s.avg_tick_us,
                s.p95_tick_us,
                s.max_tick_us,
                s.overruns,
                s.scheduled,
                s.min_lead_ms,
                s.resyncs
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;
    use std::sync::Arc;

    use super::*;
    use crate::engine::backend::{NodeKind, SharedTestBackend, TestBackend};
    use crate::engine::samples::SampleBuffer;
    use crate::engine::CLICK_HIGH_HZ;
    use pulsegrid_types::{
        DomainAction, MetronomeMode, MixerAction, PackId, PatternAction, Row, SessionAction,
    };

    struct Harness {
        thread: AudioThread,
        backend: Arc<TestBackend>,
        rx: mpsc::Receiver<AudioFeedback>,
    }

    fn harness() -> Harness {
        let (_ptx, prx) = crossbeam_channel::unbounded();
        let (_ntx, nrx) = crossbeam_channel::unbounded();
        let (tx, rx) = mpsc::channel();
        let mut thread = AudioThread::new(prx, nrx, tx, TransportConfig::default());
        let backend = Arc::new(TestBackend::new());
        thread.handle_cmd(AudioCmd::AttachBackend(Box::new(SharedTestBackend(
            backend.clone(),
        ))));
        for instrument in InstrumentId::all() {
            thread.handle_cmd(AudioCmd::SampleDecoded {
                pack: PackId::default(),
                instrument,
                buffer: SampleBuffer {
                    sample_rate: 48_000,
                    channels: 1,
                    data: vec![0.2; 9_600].into(),
                },
            });
        }
        Harness {
            thread,
            backend,
            rx,
        }
    }

    impl Harness {
        fn act(&mut self, action: DomainAction) {
            assert!(!self.thread.handle_cmd(AudioCmd::Action(action)));
        }

        /// Tick every 25 ms of audio time from `from` through `to`.
        fn run(&mut self, from: f64, to: f64) {
            let mut i = 0;
            loop {
                let t = from + i as f64 * 0.025;
                if t > to + 1e-9 {
                    break;
                }
                self.backend.set_time(t);
                self.thread.tick();
                i += 1;
            }
        }

        /// Write reported hits back the way the dispatcher does.
        fn record_hits(&mut self) -> Vec<AudioFeedback> {
            let feedback: Vec<_> = self.rx.try_iter().collect();
            for fb in &feedback {
                if let AudioFeedback::StepRecorded {
                    instrument,
                    row,
                    step,
                    velocity,
                } = *fb
                {
                    self.act(DomainAction::Pattern(PatternAction::SetStep {
                        instrument,
                        row,
                        step,
                        velocity,
                    }));
                }
            }
            feedback
        }

        fn hit(&mut self, at: f64, instrument: InstrumentId, velocity: f32) {
            self.backend.set_time(at);
            self.thread.handle_cmd(AudioCmd::LiveHit {
                instrument,
                velocity,
            });
        }

        fn starts(&self, pred: impl Fn(&NodeKind) -> bool) -> Vec<f64> {
            self.backend
                .started_nodes()
                .into_iter()
                .filter(|(_, kind, _)| pred(kind))
                .map(|(_, _, at)| at)
                .collect()
        }
    }

    fn set_step(instrument: InstrumentId, step: usize, velocity: f32) -> DomainAction {
        DomainAction::Pattern(PatternAction::SetStep {
            instrument,
            row: Row::A,
            step,
            velocity,
        })
    }

    #[test]
    fn four_on_the_floor_with_metronome() {
        let mut h = harness();
        for step in [0, 4, 8, 12] {
            h.act(set_step(InstrumentId::KICK, step, 1.0));
        }
        h.act(DomainAction::Session(SessionAction::SetMetronome(
            MetronomeMode::Beats,
        )));
        h.thread.handle_cmd(AudioCmd::Play);
        h.run(0.0, 1.9);

        let expected: Vec<f64> = [0, 4, 8, 12].iter().map(|k| 0.05 + *k as f64 * 0.125).collect();
        let kicks = h.starts(|k| matches!(k, NodeKind::Sampler { .. }));
        let clicks = h.starts(|k| matches!(k, NodeKind::Click { freq, .. } if *freq == CLICK_HIGH_HZ));
        assert_eq!(kicks.len(), 4);
        assert_eq!(clicks.len(), 4);
        for ((kick, click), want) in kicks.iter().zip(&clicks).zip(&expected) {
            assert!((kick - want).abs() < 1e-9, "kick {} vs {}", kick, want);
            assert!((click - want).abs() < 1e-9, "click {} vs {}", click, want);
        }
        let feedback: Vec<_> = h.rx.try_iter().collect();
        assert!(feedback.contains(&AudioFeedback::PlayingChanged(true)));
        assert!(feedback.contains(&AudioFeedback::StepPosition(15)));
    }

    #[test]
    fn live_hit_on_upcoming_step_is_not_doubled() {
        let mut h = harness();
        h.act(DomainAction::Session(SessionAction::SetRecording(true)));
        h.thread.handle_cmd(AudioCmd::Play);
        h.run(0.0, 0.55);
        h.backend.clear();
        // next step (5) is due at 0.675; a hit at 0.62 quantises onto it
        h.hit(0.62, InstrumentId::SNARE, 0.8);
        assert_eq!(h.thread.transport.step(), 5);
        let slot = h.thread.instruments.instrument(InstrumentId::SNARE).unwrap();
        assert!(slot.pattern.is_row_empty(Row::A), "written only via the main thread");

        let feedback = h.record_hits();
        assert!(feedback.contains(&AudioFeedback::StepRecorded {
            instrument: InstrumentId::SNARE,
            row: Row::A,
            step: 5,
            velocity: 0.8,
        }));
        let slot = h.thread.instruments.instrument(InstrumentId::SNARE).unwrap();
        assert_eq!(slot.pattern.velocity(Row::A, 5), 0.8);
        h.run(0.625, 0.75);
        let snares = h.starts(|k| matches!(k, NodeKind::Sampler { .. }));
        assert_eq!(snares.len(), 1, "only the live audition plays");

        // next bar plays it
        h.run(0.775, 2.8);
        let snares = h.starts(|k| matches!(k, NodeKind::Sampler { .. }));
        assert_eq!(snares.len(), 2);
        assert!((snares[1] - 2.675).abs() < 1e-9);
    }

    #[test]
    fn hit_just_before_the_bar_records_into_the_next_latched_row() {
        let mut h = harness();
        h.act(DomainAction::Session(SessionAction::SetBpm(60)));
        h.act(DomainAction::Session(SessionAction::SetRecording(true)));
        h.act(DomainAction::Pattern(PatternAction::SetRowActive(
            InstrumentId::SNARE,
            Row::B,
            true,
        )));
        h.thread.handle_cmd(AudioCmd::Play);
        h.run(0.0, 3.9);
        // bar two starts at 4.05 and flips the snare to row B
        h.hit(3.94, InstrumentId::SNARE, 0.8);
        let feedback = h.record_hits();
        assert!(feedback.contains(&AudioFeedback::StepRecorded {
            instrument: InstrumentId::SNARE,
            row: Row::B,
            step: 0,
            velocity: 0.8,
        }));
        h.run(3.95, 12.1);
        let snares = h.starts(|k| matches!(k, NodeKind::Sampler { .. }));
        assert_eq!(snares.len(), 2, "{:?}", snares);
        assert!((snares[0] - 3.945).abs() < 1e-9);
        assert!((snares[1] - 12.05).abs() < 1e-9);
    }

    #[test]
    fn hit_recorded_then_muted_plays_after_unmute() {
        let mut h = harness();
        h.act(DomainAction::Session(SessionAction::SetBpm(60)));
        h.act(DomainAction::Session(SessionAction::SetRecording(true)));
        h.thread.handle_cmd(AudioCmd::Play);
        h.run(0.0, 3.9);
        h.hit(3.94, InstrumentId::SNARE, 0.8);
        h.record_hits();
        h.act(DomainAction::Mixer(MixerAction::SetMute(InstrumentId::SNARE, true)));
        h.run(3.95, 5.0);
        h.act(DomainAction::Mixer(MixerAction::SetMute(InstrumentId::SNARE, false)));
        h.run(5.025, 12.1);
        let snares = h.starts(|k| matches!(k, NodeKind::Sampler { .. }));
        let expected = [3.945, 8.05, 12.05];
        assert_eq!(snares.len(), expected.len(), "{:?}", snares);
        for (got, want) in snares.iter().zip(expected) {
            assert!((got - want).abs() < 1e-9, "{} vs {}", got, want);
        }
    }

    #[test]
    fn live_hit_while_not_recording_only_plays() {
        let mut h = harness();
        h.thread.handle_cmd(AudioCmd::Play);
        h.run(0.0, 0.2);
        h.thread.handle_cmd(AudioCmd::LiveHit {
            instrument: InstrumentId::CLAP,
            velocity: 1.0,
        });
        let slot = h.thread.instruments.instrument(InstrumentId::CLAP).unwrap();
        assert!(slot.pattern.is_row_empty(Row::A));
        assert_eq!(h.starts(|k| matches!(k, NodeKind::Sampler { .. })).len(), 1);
    }

    #[test]
    fn stop_halts_scheduling_and_keeps_position() {
        let mut h = harness();
        h.act(set_step(InstrumentId::KICK, 0, 1.0));
        h.thread.handle_cmd(AudioCmd::Play);
        h.run(0.0, 0.3);
        h.thread.handle_cmd(AudioCmd::Stop);
        let step = h.thread.transport.step();
        h.backend.clear();
        h.run(0.325, 3.0);
        assert!(h.backend.started_nodes().is_empty());
        assert_eq!(h.thread.transport.step(), step);
        let feedback: Vec<_> = h.rx.try_iter().collect();
        assert!(feedback.contains(&AudioFeedback::PlayingChanged(false)));
    }

    #[test]
    fn tempo_change_applies_to_following_steps() {
        let mut h = harness();
        for step in 0..16 {
            h.act(set_step(InstrumentId::HIHAT, step, 0.6));
        }
        h.thread.handle_cmd(AudioCmd::Play);
        h.run(0.0, 0.0);
        // step 0 at 0.05 scheduled at 120 bpm
        h.act(DomainAction::Session(SessionAction::SetBpm(60)));
        h.run(0.025, 0.35);
        let starts = h.starts(|k| matches!(k, NodeKind::Sampler { .. }));
        // step 1 still at 0.175; step 2 and later are a 60 bpm step apart
        assert!((starts[0] - 0.05).abs() < 1e-9);
        assert!((starts[1] - 0.175).abs() < 1e-9);
        assert!((starts[2] - 0.425).abs() < 1e-9);
    }

    #[test]
    fn shutdown_and_meter() {
        let mut h = harness();
        h.run(0.0, 0.0);
        let feedback: Vec<_> = h.rx.try_iter().collect();
        assert!(feedback.contains(&AudioFeedback::Meter(pulsegrid_types::METER_FLOOR_DB)));
        assert!(h.thread.handle_cmd(AudioCmd::Shutdown));
    }
}
