//! Metronome clicks for one scheduled step.

use pulsegrid_types::{MetronomeMode, SessionState, STEPS_PER_BEAT};

use super::engine::AudioEngine;

/// Click for `step`, scheduled at `when`. "beats" clicks on each beat with
/// the high click; "all" clicks every step, high on beats and low between.
pub fn tick_click(engine: &mut AudioEngine, session: &SessionState, step: usize, when: f64) {
    let on_beat = step % STEPS_PER_BEAT == 0;
    let is_downbeat = match session.metronome {
        MetronomeMode::Off => return,
        MetronomeMode::Beats if !on_beat => return,
        MetronomeMode::Beats => true,
        MetronomeMode::All => on_beat,
    };
    if !engine.is_running() {
        return;
    }
    if let Err(e) = engine.spawn_click(is_downbeat, session.metronome_level, when) {
        log::warn!(target: "audio::transport", "click at step {} failed: {}", step, e);
    }
}
