//! Voice lifecycle: step triggers, chokes, metronome clicks and cleanup.

use super::backend::{NodeId, NodeKind, ParamEvent, OUTPUT_NODE};
use super::AudioEngine;
use pulsegrid_types::{choke_targets, InstrumentId, InstrumentSlot, SessionState};

/// Linear fade applied to a choked voice.
pub const CHOKE_RELEASE_SECS: f64 = 0.02;
/// Gap between the end of the choke fade and the hard stop.
pub const CHOKE_STOP_DELAY_SECS: f64 = 0.005;
/// Grace period after a voice's expected end before the timer reclaims it.
const VOICE_END_MARGIN_SECS: f64 = 0.1;
const CLICK_LENGTH_SECS: f64 = 0.05;
const NEAR_ZERO_GAIN: f32 = 0.0001;

pub const CLICK_HIGH_HZ: f32 = 1500.0;
pub const CLICK_LOW_HZ: f32 = 1000.0;

/// A live buffer-backed playback instance.
#[derive(Debug, Clone)]
pub(crate) struct Voice {
    pub instrument: InstrumentId,
    pub source: NodeId,
    pub gain: NodeId,
    pub velocity: f32,
    pub start: f64,
    /// Expected end on the audio clock; pulled in when choked.
    pub end: f64,
    pub choked: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct ClickVoice {
    pub node: NodeId,
    pub start: f64,
    pub end: f64,
}

impl AudioEngine {
    /// Realize one scheduled step for an instrument: chokes, then ducks, then
    /// the voice itself, all at `when`.
    ///
    /// Returns `Ok(false)` when the instrument has no buffer in the current
    /// pack and the trigger was skipped.
    pub fn trigger_step(
        &mut self,
        slot: &InstrumentSlot,
        velocity: f32,
        when: f64,
        session: &SessionState,
    ) -> Result<bool, String> {
        let when = self.clamp_time(when);
        for &target in choke_targets(slot.id) {
            if let Err(e) = self.choke_instrument(target, when) {
                log::warn!(target: "audio::voices", "choke {} failed: {}", target, e);
            }
        }
        if let Err(e) = self.apply_ducks(slot.id, when, &session.sidechain) {
            log::warn!(target: "audio::duck", "duck from {} failed: {}", slot.id, e);
        }
        self.start_voice(slot.id, velocity, slot.strip.playback_rate(), when)
    }

    /// Play an instrument as soon as the lead time allows, through the full graph.
    pub fn audition(
        &mut self,
        slot: &InstrumentSlot,
        velocity: f32,
        session: &SessionState,
    ) -> Result<bool, String> {
        let when = self.now() + self.min_lead_secs;
        self.trigger_step(slot, velocity, when, session)
    }

    fn start_voice(
        &mut self,
        instrument: InstrumentId,
        velocity: f32,
        rate: f64,
        when: f64,
    ) -> Result<bool, String> {
        let Some(buffer) = self.samples.active(instrument) else {
            log::warn!(
                target: "audio::samples",
                "no buffer for {} in pack {}, trigger skipped",
                instrument,
                self.samples.current_pack()
            );
            return Ok(false);
        };
        let mix_sum = self.instrument_nodes(instrument)?.mix_sum;
        let velocity = if velocity.is_finite() {
            velocity.clamp(0.0, 1.0)
        } else {
            0.0
        };

        let source = self.create(NodeKind::Sampler {
            buffer,
            rate: rate as f32,
        })?;
        let gain = self.create(NodeKind::Gain { gain: velocity })?;
        self.connect(source, gain)?;
        self.connect(gain, mix_sum)?;
        let backend = self.backend.as_ref().ok_or("Not connected")?;
        backend
            .start_node(source, when)
            .map_err(|e| e.to_string())?;

        let length = self.samples.duration(buffer).unwrap_or(1.0) / rate.max(1e-3);
        self.voices.push(Voice {
            instrument,
            source,
            gain,
            velocity,
            start: when,
            end: when + length,
            choked: false,
        });
        log::trace!(
            target: "audio::voices",
            "{} voice {} at {:.4} vel {:.2}",
            instrument,
            source,
            when,
            velocity
        );
        Ok(true)
    }

    /// Cut every voice of `target` that is sounding at `when`: a short linear
    /// fade to near-silence, then a hard stop.
    pub fn choke_instrument(&mut self, target: InstrumentId, when: f64) -> Result<(), String> {
        let t = self.clamp_time(when);
        let backend = self.backend.as_ref().ok_or("Not connected")?;
        for voice in self
            .voices
            .iter_mut()
            .filter(|v| v.instrument == target && !v.choked && v.start < t && v.end > t)
        {
            backend
                .cancel_scheduled(voice.gain, "gain", t)
                .map_err(|e| e.to_string())?;
            backend
                .schedule_param(
                    voice.gain,
                    "gain",
                    ParamEvent::SetValue {
                        value: voice.velocity,
                        at: t,
                    },
                )
                .map_err(|e| e.to_string())?;
            backend
                .schedule_param(
                    voice.gain,
                    "gain",
                    ParamEvent::LinearRampTo {
                        value: NEAR_ZERO_GAIN,
                        end: t + CHOKE_RELEASE_SECS,
                    },
                )
                .map_err(|e| e.to_string())?;
            let stop_at = t + CHOKE_RELEASE_SECS + CHOKE_STOP_DELAY_SECS;
            backend
                .stop_node(voice.source, stop_at)
                .map_err(|e| e.to_string())?;
            voice.choked = true;
            voice.end = voice.end.min(stop_at);
            log::trace!(target: "audio::voices", "choked {} voice {} at {:.4}", target, voice.source, t);
        }
        Ok(())
    }

    /// Metronome click straight to the output. Downbeats use the high click.
    pub fn spawn_click(&mut self, is_downbeat: bool, level: f32, when: f64) -> Result<(), String> {
        let when = self.clamp_time(when);
        let freq = if is_downbeat { CLICK_HIGH_HZ } else { CLICK_LOW_HZ };
        let node = self.create(NodeKind::Click {
            freq,
            amp: level.clamp(0.0, 1.0),
        })?;
        self.connect(node, OUTPUT_NODE)?;
        let backend = self.backend.as_ref().ok_or("Not connected")?;
        backend.start_node(node, when).map_err(|e| e.to_string())?;
        backend
            .stop_node(node, when + CLICK_LENGTH_SECS)
            .map_err(|e| e.to_string())?;
        self.clicks.push(ClickVoice {
            node,
            start: when,
            end: when + CLICK_LENGTH_SECS,
        });
        Ok(())
    }

    /// Stop anything scheduled that the audio clock has not reached yet.
    /// Commands already in the render timeline cannot be recalled; voices
    /// are stopped before they start instead.
    pub fn cancel_pending(&mut self) {
        let now = self.now();
        let Some(backend) = self.backend.as_ref() else {
            return;
        };
        let mut cancelled = 0;
        for voice in self.voices.iter_mut().filter(|v| v.start > now) {
            if let Err(e) = backend.stop_node(voice.source, now) {
                log::warn!(target: "audio::voices", "stop {}: {}", voice.source, e);
            }
            voice.end = now;
            cancelled += 1;
        }
        for click in self.clicks.iter_mut().filter(|c| c.start > now) {
            if let Err(e) = backend.stop_node(click.node, now) {
                log::warn!(target: "audio::voices", "stop click {}: {}", click.node, e);
            }
            click.end = now;
            cancelled += 1;
        }
        self.reset_ducks(now);
        log::debug!(target: "audio::voices", "cancelled {} pending voices", cancelled);
    }

    /// Authoritative cleanup from the backend's end-of-playback notices.
    pub fn process_node_ends(&mut self) {
        let ended = match &self.backend {
            Some(b) => b.drain_ended(),
            None => return,
        };
        for node_id in ended {
            if let Some(pos) = self.voices.iter().position(|v| v.source == node_id) {
                let voice = self.voices.swap_remove(pos);
                self.free(voice.source);
                self.free(voice.gain);
            } else if let Some(pos) = self.clicks.iter().position(|c| c.node == node_id) {
                let click = self.clicks.swap_remove(pos);
                self.free(click.node);
            } else {
                self.node_registry.unregister(node_id);
            }
        }
    }

    /// Timer fallback for voices whose end notice never arrived.
    pub fn cleanup_expired_voices(&mut self) {
        let now = self.now();
        let (expired, live): (Vec<_>, Vec<_>) = std::mem::take(&mut self.voices)
            .into_iter()
            .partition(|v| v.end + VOICE_END_MARGIN_SECS < now);
        self.voices = live;
        for voice in expired {
            self.free(voice.source);
            self.free(voice.gain);
        }
        let (expired, live): (Vec<_>, Vec<_>) = std::mem::take(&mut self.clicks)
            .into_iter()
            .partition(|c| c.end + VOICE_END_MARGIN_SECS < now);
        self.clicks = live;
        for click in expired {
            self.free(click.node);
        }
    }

    pub fn active_voice_count(&self, instrument: InstrumentId) -> usize {
        self.voices
            .iter()
            .filter(|v| v.instrument == instrument && !v.choked)
            .count()
    }

    pub fn voice_count(&self) -> usize {
        self.voices.len()
    }
}
