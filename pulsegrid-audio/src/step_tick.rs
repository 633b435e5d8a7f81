//! Per-step scheduling: latch, click, instrument triggers, step position.

use std::sync::mpsc::Sender;

use pulsegrid_types::{swing_offset, AudioFeedback, InstrumentState, SessionState};

use super::click_tick::tick_click;
use super::engine::AudioEngine;
use super::telemetry::ControlTelemetry;
use super::transport::Transport;

/// Schedule every step that falls inside the lookahead window.
///
/// Returns the number of steps scheduled.
pub fn tick_sequencer(
    transport: &mut Transport,
    engine: &mut AudioEngine,
    instruments: &InstrumentState,
    session: &SessionState,
    feedback_tx: &Sender<AudioFeedback>,
    telemetry: &mut ControlTelemetry,
) -> usize {
    if !transport.is_running() || !engine.is_running() {
        return 0;
    }
    let now = engine.now();
    if transport.is_behind(now) {
        transport.resync(now, session.seconds_per_step());
        telemetry.record_resync();
    }
    let mut scheduled = 0;
    while transport.is_due(now) {
        process_step(transport, engine, instruments, session, feedback_tx, telemetry, now);
        // tempo is read per step so a change only affects what follows
        transport.advance(session.seconds_per_step());
        scheduled += 1;
    }
    scheduled
}

fn process_step(
    transport: &mut Transport,
    engine: &mut AudioEngine,
    instruments: &InstrumentState,
    session: &SessionState,
    feedback_tx: &Sender<AudioFeedback>,
    telemetry: &mut ControlTelemetry,
    now: f64,
) {
    let step = transport.step();
    let step_time = transport.next_event_time();

    if step == 0 {
        let latched = transport.relatch(instruments);
        let _ = feedback_tx.send(AudioFeedback::LatchedRows(latched));
    }

    tick_click(engine, session, step, step_time);

    let suppressed = transport.take_suppressed();
    let secs_per_beat = session.seconds_per_beat();
    for slot in &instruments.instruments {
        if suppressed[slot.id.index()] {
            log::debug!(
                target: "audio::transport",
                "{} step {} already played live",
                slot.id,
                step
            );
            continue;
        }
        let row = transport.latched_row(slot.id);
        let velocity = slot.pattern.velocity(row, step);
        if velocity <= 0.0 || slot.strip.muted {
            continue;
        }
        let when = step_time + swing_offset(&slot.swing, session.global_swing, step, secs_per_beat);
        match engine.trigger_step(slot, velocity, when, session) {
            Ok(true) => telemetry.record_lead(when - now),
            Ok(false) => {
                let _ = feedback_tx.send(AudioFeedback::SampleMissing {
                    instrument: slot.id,
                });
            }
            Err(e) => {
                log::warn!(
                    target: "audio::transport",
                    "{} at step {} failed: {}",
                    slot.id,
                    step,
                    e
                );
            }
        }
    }

    let _ = feedback_tx.send(AudioFeedback::StepPosition(step as u8));
}
