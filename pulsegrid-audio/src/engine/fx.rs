//! Tempo-synced delay and reverb buses and the per-instrument sends into them.

use super::backend::{FilterKind, ImpulseResponse, NodeId, NodeKind, ParamEvent};
use super::param_timeline::ParamTimeline;
use super::AudioEngine;
use pulsegrid_types::{
    seconds_per_beat, seconds_per_step, DelayMode, FxMode, InstrumentSlot, ReverbMode,
};

pub const DELAY_MAX_SECS: f32 = 2.0;
pub const DELAY_FEEDBACK: f32 = 0.35;
pub const DELAY_LOWPASS_HZ: f32 = 3000.0;
const DELAY_LOWPASS_Q: f32 = 0.707;
/// Send level changes and delay retunes ramp over this window.
pub const PARAM_RAMP_SECS: f64 = 0.01;

/// input → delay → lowpass → wet → destination, with lowpass → feedback → delay.
#[derive(Debug, Clone, Copy)]
pub(crate) struct DelayBus {
    pub input: NodeId,
    pub delay: NodeId,
    pub filter: NodeId,
    pub feedback: NodeId,
    pub wet: NodeId,
    pub time: f32,
}

/// input → convolver → wet → destination.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ReverbBus {
    pub input: NodeId,
    pub convolver: NodeId,
    pub wet: NodeId,
    pub steps: usize,
}

fn delay_time(mode: DelayMode, secs_per_beat: f64) -> f32 {
    (mode.beats() * secs_per_beat).min(DELAY_MAX_SECS as f64) as f32
}

impl AudioEngine {
    pub(crate) fn build_delay_bus(
        &mut self,
        mode: DelayMode,
        dest: NodeId,
        secs_per_beat: f64,
    ) -> Result<DelayBus, String> {
        let time = delay_time(mode, secs_per_beat);
        let input = self.create(NodeKind::Gain { gain: 1.0 })?;
        let delay = self.create(NodeKind::Delay {
            max_secs: DELAY_MAX_SECS,
            time,
        })?;
        let filter = self.create(NodeKind::Filter {
            kind: FilterKind::Lowpass,
            freq: DELAY_LOWPASS_HZ,
            q: DELAY_LOWPASS_Q,
        })?;
        let feedback = self.create(NodeKind::Gain {
            gain: DELAY_FEEDBACK,
        })?;
        let wet = self.create(NodeKind::Gain { gain: 1.0 })?;
        self.connect(input, delay)?;
        self.connect(delay, filter)?;
        self.connect(filter, wet)?;
        self.connect(filter, feedback)?;
        self.connect(feedback, delay)?;
        self.connect(wet, dest)?;
        Ok(DelayBus {
            input,
            delay,
            filter,
            feedback,
            wet,
            time,
        })
    }

    pub(crate) fn build_reverb_bus(
        &mut self,
        mode: ReverbMode,
        dest: NodeId,
        secs_per_step: f64,
    ) -> Result<ReverbBus, String> {
        let input = self.create(NodeKind::Gain { gain: 1.0 })?;
        let convolver = self.create(NodeKind::Convolver)?;
        let wet = self.create(NodeKind::Gain { gain: 1.0 })?;
        self.connect(input, convolver)?;
        self.connect(convolver, wet)?;
        self.connect(wet, dest)?;
        let bus = ReverbBus {
            input,
            convolver,
            wet,
            steps: mode.steps(),
        };
        self.load_impulse(&bus, secs_per_step)?;
        Ok(bus)
    }

    fn load_impulse(&mut self, bus: &ReverbBus, secs_per_step: f64) -> Result<(), String> {
        let backend = self.backend.as_ref().ok_or("Not connected")?;
        let sample_rate = backend.sample_rate();
        let duration = bus.steps as f64 * secs_per_step;
        let ir = generate_impulse(duration, sample_rate, &mut self.rng_state);
        let backend = self.backend.as_ref().ok_or("Not connected")?;
        backend
            .set_impulse_response(bus.convolver, &ir)
            .map_err(|e| e.to_string())
    }

    /// Retarget delay times and regenerate reverb tails for a new tempo.
    /// Delay times ramp; impulse responses are swapped whole.
    pub(crate) fn retune_fx(&mut self, bpm: u16) -> Result<(), String> {
        let spb = seconds_per_beat(bpm);
        let sps = seconds_per_step(bpm);
        let now = self.now();
        let (delays, reverbs) = {
            let graph = self.graph()?;
            (graph.delay_buses.clone(), graph.reverb_buses.clone())
        };

        for (mode, bus) in DelayMode::ALL.into_iter().zip(&delays) {
            let target = delay_time(mode, spb);
            if target == bus.time {
                continue;
            }
            self.ramp_param(bus.delay, "time", bus.time, target, now)?;
            if let Some(graph) = self.graph.as_mut() {
                graph.delay_buses[mode.index()].time = target;
            }
        }
        for bus in &reverbs {
            self.load_impulse(bus, sps)?;
        }
        self.applied.bpm = Some(bpm);
        log::debug!(target: "audio::fx", "fx retuned for {} bpm", bpm);
        Ok(())
    }

    /// Ramp send gains that differ from what the backend last received.
    pub(crate) fn sync_sends(&mut self, slot: &InstrumentSlot) -> Result<(), String> {
        let idx = slot.id.index();
        let delay_levels = slot.delay.send_levels();
        let reverb_levels = slot.reverb.send_levels();
        if self.applied.delay_levels[idx] == delay_levels
            && self.applied.reverb_levels[idx] == reverb_levels
        {
            return Ok(());
        }
        let (delay_sends, reverb_sends) = {
            let nodes = self.instrument_nodes(slot.id)?;
            (nodes.delay_sends, nodes.reverb_sends)
        };
        let now = self.now();
        if self.applied.delay_levels[idx] != delay_levels {
            let prev = self.applied.delay_levels[idx];
            self.ramp_family(delay_sends, prev, delay_levels, now)?;
        }
        if self.applied.reverb_levels[idx] != reverb_levels {
            let prev = self.applied.reverb_levels[idx];
            self.ramp_family(reverb_sends, prev, reverb_levels, now)?;
        }
        self.applied.delay_levels[idx] = delay_levels;
        self.applied.reverb_levels[idx] = reverb_levels;
        Ok(())
    }

    /// Move one family of sends to `levels`. Closing sends fade out first and
    /// the opening send only rises once they are silent, so at most one send
    /// of the family carries signal at any instant.
    fn ramp_family(
        &mut self,
        sends: [NodeId; 3],
        prev: [f32; 3],
        levels: [f32; 3],
        now: f64,
    ) -> Result<(), String> {
        let mut current = [0.0; 3];
        let mut settled = [0.0; 3];
        for i in 0..3 {
            (current[i], settled[i]) = self.param_state(sends[i], "gain", prev[i], now);
        }
        for i in 0..3 {
            if current[i] == levels[i] && settled[i] == levels[i] {
                continue;
            }
            let others_open = (0..3).any(|j| j != i && current[j] > 0.0);
            let start = if levels[i] > 0.0 && others_open {
                now + PARAM_RAMP_SECS
            } else {
                now
            };
            self.ramp_param(sends[i], "gain", prev[i], levels[i], start)?;
        }
        Ok(())
    }

    /// Value of a ramped param at `now` and the value it settles at.
    fn param_state(&self, node: NodeId, param: &'static str, fallback: f32, now: f64) -> (f32, f32) {
        match self.ramps.get(&(node, param)) {
            Some(timeline) => (timeline.value_at(now), timeline.value_at(f64::INFINITY)),
            None => (fallback, fallback),
        }
    }

    /// Replace whatever is scheduled on a param with a linear ramp to `to`
    /// over `[start, start + PARAM_RAMP_SECS]`. The param holds its present
    /// value until `start`, so retargeting mid-ramp never jumps.
    fn ramp_param(
        &mut self,
        node: NodeId,
        param: &'static str,
        fallback: f32,
        to: f32,
        start: f64,
    ) -> Result<(), String> {
        let now = self.now();
        let start = start.max(now);
        let (from, _) = self.param_state(node, param, fallback, now);
        let mut events = vec![ParamEvent::SetValue { value: from, at: now }];
        if start > now {
            events.push(ParamEvent::SetValue { value: from, at: start });
        }
        events.push(ParamEvent::LinearRampTo {
            value: to,
            end: start + PARAM_RAMP_SECS,
        });

        let backend = self.backend.as_ref().ok_or("Not connected")?;
        backend
            .cancel_scheduled(node, param, now)
            .map_err(|e| e.to_string())?;
        let mut timeline = ParamTimeline::new(from);
        for event in events {
            backend
                .schedule_param(node, param, event)
                .map_err(|e| e.to_string())?;
            timeline.push(event);
        }
        self.ramps.insert((node, param), timeline);
        Ok(())
    }
}

/// Stereo decaying-noise impulse response with a small early-reflection bump.
pub fn generate_impulse(duration_secs: f64, sample_rate: u32, rng_state: &mut u64) -> ImpulseResponse {
    let frames = ((duration_secs.max(0.01)) * sample_rate as f64) as usize;
    let early_start = (0.01 * sample_rate as f64) as usize;
    let early_end = (0.03 * sample_rate as f64) as usize;
    let mut data = Vec::with_capacity(frames * 2);
    for i in 0..frames {
        let t = i as f64 / frames as f64;
        let mut env = (-6.0 * t).exp();
        if (early_start..early_end).contains(&i) {
            env *= 1.5;
        }
        for _ in 0..2 {
            *rng_state = rng_state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            let noise = ((*rng_state >> 33) as f64 / (1u64 << 31) as f64) * 2.0 - 1.0;
            data.push((noise * env) as f32);
        }
    }
    ImpulseResponse {
        sample_rate,
        channels: 2,
        data,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::backend::TestOp;
    use crate::engine::test_support::engine_with_samples;
    use pulsegrid_types::{InstrumentId, InstrumentState, SessionState};

    #[test]
    fn impulse_length_and_decay() {
        let mut rng = 1;
        let ir = generate_impulse(0.5, 48_000, &mut rng);
        assert_eq!(ir.channels, 2);
        assert_eq!(ir.frames(), 24_000);
        let energy = |range: std::ops::Range<usize>| -> f32 {
            ir.data[range].iter().map(|s| s * s).sum()
        };
        let head = energy(0..4_800);
        let tail = energy(ir.data.len() - 4_800..ir.data.len());
        assert!(head > tail * 10.0);
        assert!(ir.data.iter().all(|s| s.abs() <= 1.5));
    }

    #[test]
    fn delay_times_follow_tempo() {
        let instruments = InstrumentState::new();
        let session = SessionState::default();
        let (engine, backend) = engine_with_samples(&instruments, &session);
        let graph = engine.graph_for_test();
        let times: Vec<f32> = graph.delay_buses.iter().map(|b| b.time).collect();
        assert_eq!(times, vec![0.125, 0.25, 0.375]);
        for bus in &graph.delay_buses {
            assert!(backend.is_connected(bus.filter, bus.feedback));
            assert!(backend.is_connected(bus.feedback, bus.delay));
            assert!(backend.is_connected(bus.wet, graph.sum.input));
        }
        assert_eq!(
            backend.count(|op| matches!(op, TestOp::SetImpulseResponse { .. })),
            3
        );
    }

    #[test]
    fn tempo_change_ramps_delays_and_rebuilds_tails() {
        let instruments = InstrumentState::new();
        let mut session = SessionState::default();
        let (mut engine, backend) = engine_with_samples(&instruments, &session);
        backend.set_time(3.0);
        backend.clear();
        session.set_bpm(60);
        engine.sync(&instruments, &session).unwrap();

        let delay = engine.graph_for_test().delay_buses[1].delay;
        assert_eq!(backend.param_value_at(delay, "time", 3.0), Some(0.25));
        let end = backend.param_value_at(delay, "time", 3.0 + PARAM_RAMP_SECS).unwrap();
        assert!((end - 0.5).abs() < 1e-6);
        // 16 steps at 60 bpm
        let long = engine.graph_for_test().reverb_buses[2].convolver;
        assert_eq!(
            backend.find(|op| matches!(op, TestOp::SetImpulseResponse { id, .. } if *id == long)),
            Some(TestOp::SetImpulseResponse {
                id: long,
                frames: 4 * 48_000
            })
        );
    }

    #[test]
    fn mode_switch_keeps_one_send_open() {
        let mut instruments = InstrumentState::new();
        let session = SessionState::default();
        instruments
            .instrument_mut(InstrumentId::SNARE)
            .unwrap()
            .delay
            .set_wet(50.0);
        let (mut engine, backend) = engine_with_samples(&instruments, &session);
        backend.set_time(1.0);
        instruments.instrument_mut(InstrumentId::SNARE).unwrap().delay.mode = DelayMode::N3_4;
        engine.sync(&instruments, &session).unwrap();

        let sends = engine.graph_for_test().instruments[InstrumentId::SNARE.index()].delay_sends;
        let gains = |t: f64| -> Vec<f32> {
            sends
                .iter()
                .map(|&n| backend.param_value_at(n, "gain", t).unwrap())
                .collect()
        };
        for i in 0..=40 {
            let t = 0.99 + i as f64 * 0.001;
            let open = gains(t).iter().filter(|g| **g > 0.0).count();
            assert!(open <= 1, "{} sends open at {}: {:?}", open, t, gains(t));
        }
        let old = gains(1.005)[DelayMode::N8.index()];
        assert!(old > 0.0 && old < 0.5);
        assert_eq!(gains(1.0 + PARAM_RAMP_SECS), vec![0.0, 0.0, 0.0]);
        let settled = gains(1.0 + 2.0 * PARAM_RAMP_SECS);
        assert_eq!(settled, vec![0.0, 0.0, 0.5]);
    }

    #[test]
    fn retarget_mid_ramp_starts_from_current_level() {
        let mut instruments = InstrumentState::new();
        let session = SessionState::default();
        let (mut engine, backend) = engine_with_samples(&instruments, &session);
        let send = engine.graph_for_test().instruments[InstrumentId::KICK.index()].reverb_sends
            [ReverbMode::Medium.index()];

        backend.set_time(2.0);
        instruments.instrument_mut(InstrumentId::KICK).unwrap().reverb.set_wet(80.0);
        engine.sync(&instruments, &session).unwrap();
        backend.set_time(2.005);
        let before = backend.param_value_at(send, "gain", 2.005).unwrap();
        assert!((before - 0.4).abs() < 1e-4);

        instruments.instrument_mut(InstrumentId::KICK).unwrap().reverb.set_wet(20.0);
        engine.sync(&instruments, &session).unwrap();
        let after = backend.param_value_at(send, "gain", 2.005).unwrap();
        assert!((after - before).abs() < 1e-4, "jumped from {} to {}", before, after);
        let end = backend.param_value_at(send, "gain", 2.005 + PARAM_RAMP_SECS).unwrap();
        assert!((end - 0.2).abs() < 1e-6);
    }

    #[test]
    fn wet_change_touches_active_send_only() {
        let mut instruments = InstrumentState::new();
        let session = SessionState::default();
        let (mut engine, backend) = engine_with_samples(&instruments, &session);
        backend.clear();
        instruments
            .instrument_mut(InstrumentId::KICK)
            .unwrap()
            .reverb
            .set_wet(30.0);
        engine.sync(&instruments, &session).unwrap();
        let medium = engine.graph_for_test().instruments[0].reverb_sends[ReverbMode::Medium.index()];
        let touched: Vec<_> = backend
            .operations()
            .into_iter()
            .filter_map(|op| match op {
                TestOp::ScheduleParam { id, .. } => Some(id),
                _ => None,
            })
            .collect();
        assert!(!touched.is_empty());
        assert!(touched.iter().all(|&id| id == medium));
    }
}
