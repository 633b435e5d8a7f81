//! Lookahead transport: converts the 16-step bar into audio-clock times.
//!
//! The control loop wakes every `lookahead` and schedules every step whose
//! time falls inside `[now, now + schedule_ahead)`. Step times are computed
//! from the tempo at the moment each step is processed, so a tempo change
//! only affects steps not yet scheduled.

use std::time::Duration;

use pulsegrid_types::{
    InstrumentId, InstrumentSlot, InstrumentState, Row, RowActivity, NUM_INSTRUMENTS, STEPS_PER_BAR,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransportConfig {
    /// Control-loop period.
    pub lookahead: Duration,
    /// How far past the audio clock steps are scheduled.
    pub schedule_ahead_secs: f64,
    /// Delay between Play and the first step.
    pub lead_in_secs: f64,
    /// Minimum distance between the audio clock and anything scheduled.
    pub min_lead_secs: f64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            lookahead: Duration::from_millis(25),
            schedule_ahead_secs: 0.1,
            lead_in_secs: 0.05,
            min_lead_secs: 0.005,
        }
    }
}

/// Pattern cell a live hit belongs to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HitCell {
    pub row: Row,
    pub step: usize,
    /// Absolute position of the step when it has not been scheduled yet.
    pub pending: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct Transport {
    config: TransportConfig,
    running: bool,
    /// Next step to schedule (0-15).
    step: usize,
    /// Steps scheduled since creation; never rewinds.
    position: u64,
    next_event_time: f64,
    loop_start_time: f64,
    latched: [Row; NUM_INSTRUMENTS],
    /// Latches of the bar before the current one.
    previous_latched: [Row; NUM_INSTRUMENTS],
    /// False until the first bar boundary after a position reset.
    primed: bool,
    /// Live-recorded hits, by absolute position, whose step must not trigger.
    suppressed: Vec<(InstrumentId, u64)>,
}

impl Transport {
    pub fn new(config: TransportConfig) -> Self {
        Self {
            config,
            running: false,
            step: 0,
            position: 0,
            next_event_time: 0.0,
            loop_start_time: 0.0,
            latched: [Row::A; NUM_INSTRUMENTS],
            previous_latched: [Row::A; NUM_INSTRUMENTS],
            primed: false,
            suppressed: Vec::new(),
        }
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn step(&self) -> usize {
        self.step
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn next_event_time(&self) -> f64 {
        self.next_event_time
    }

    /// Audio time at which the current bar started (or would have).
    pub fn loop_start_time(&self) -> f64 {
        self.loop_start_time
    }

    pub fn latched(&self) -> [Row; NUM_INSTRUMENTS] {
        self.latched
    }

    pub fn latched_row(&self, id: InstrumentId) -> Row {
        self.latched[id.index()]
    }

    /// Start from the current step. Returns false if already running.
    pub fn start(&mut self, now: f64, secs_per_step: f64) -> bool {
        if self.running {
            return false;
        }
        self.loop_start_time = now - (self.step % STEPS_PER_BAR) as f64 * secs_per_step;
        self.next_event_time = now + self.config.lead_in_secs;
        self.running = true;
        log::info!(
            target: "audio::transport",
            "start at step {} (clock {:.3})",
            self.step,
            now
        );
        true
    }

    /// Halt scheduling. Position, latches and pattern are kept.
    pub fn stop(&mut self) -> bool {
        if !self.running {
            return false;
        }
        self.running = false;
        self.suppressed.clear();
        log::info!(target: "audio::transport", "stop at step {}", self.step);
        true
    }

    /// Rewind to step 0; the next bar boundary picks the initial latch again.
    pub fn reset_position(&mut self) {
        self.step = 0;
        self.primed = false;
        self.suppressed.clear();
    }

    /// True while the next step falls inside the scheduling window.
    pub fn is_due(&self, now: f64) -> bool {
        self.running && self.next_event_time < now + self.config.schedule_ahead_secs
    }

    /// The control loop fell so far behind that the next step would land
    /// inside the minimum lead.
    pub fn is_behind(&self, now: f64) -> bool {
        self.running && self.next_event_time < now + self.config.min_lead_secs
    }

    /// Drop the missed time and continue from the current step.
    pub fn resync(&mut self, now: f64, secs_per_step: f64) {
        let missed = now + self.config.min_lead_secs - self.next_event_time;
        log::warn!(
            target: "audio::transport",
            "scheduler behind by {:.1} ms, resyncing at step {}",
            missed * 1000.0,
            self.step
        );
        self.next_event_time = now + self.config.min_lead_secs;
        self.loop_start_time = self.next_event_time - self.step as f64 * secs_per_step;
    }

    pub fn advance(&mut self, secs_per_step: f64) {
        self.next_event_time += secs_per_step;
        self.step = (self.step + 1) % STEPS_PER_BAR;
        self.position += 1;
        if self.step == 0 {
            self.loop_start_time = self.next_event_time;
        }
    }

    /// Recompute every instrument's latched row at a bar boundary.
    pub fn relatch(&mut self, instruments: &InstrumentState) -> [Row; NUM_INSTRUMENTS] {
        self.previous_latched = self.latched;
        for slot in &instruments.instruments {
            self.latched[slot.id.index()] = self.next_latch(slot.id, &slot.rows);
        }
        self.primed = true;
        self.latched
    }

    /// Row the next bar boundary will latch for an instrument.
    fn next_latch(&self, id: InstrumentId, rows: &RowActivity) -> Row {
        let previous = self.latched[id.index()];
        if self.primed {
            rows.next_latch(previous)
        } else {
            rows.initial_latch(previous)
        }
    }

    /// Steps between the next unscheduled step and the step nearest `now`.
    /// Negative for steps already scheduled.
    fn offset_to_nearest(&self, now: f64, secs_per_step: f64) -> i64 {
        -((self.next_event_time - now) / secs_per_step).round() as i64
    }

    /// Step a hit at `now` belongs to: the nearest step boundary.
    pub fn quantize(&self, now: f64, secs_per_step: f64) -> usize {
        let offset = self.offset_to_nearest(now, secs_per_step);
        (self.step as i64 + offset).rem_euclid(STEPS_PER_BAR as i64) as usize
    }

    /// Cell a hit at `now` belongs to, with the row that will actually be
    /// playing when that step sounds.
    pub fn locate_hit(&self, slot: &InstrumentSlot, now: f64, secs_per_step: f64) -> HitCell {
        let offset = self.offset_to_nearest(now, secs_per_step);
        let absolute = self.step as i64 + offset;
        let step = absolute.rem_euclid(STEPS_PER_BAR as i64) as usize;
        let idx = slot.id.index();
        if offset < 0 {
            let row = if absolute < 0 {
                self.previous_latched[idx]
            } else {
                self.latched[idx]
            };
            return HitCell {
                row,
                step,
                pending: None,
            };
        }
        let crosses_bar = self.step == 0 || absolute >= STEPS_PER_BAR as i64;
        let row = if crosses_bar {
            self.next_latch(slot.id, &slot.rows)
        } else {
            self.latched[idx]
        };
        HitCell {
            row,
            step,
            pending: Some(self.position + offset as u64),
        }
    }

    /// Skip `id`'s trigger when the step at `position` is scheduled.
    pub fn suppress(&mut self, id: InstrumentId, position: u64) {
        if position >= self.position && !self.suppressed.contains(&(id, position)) {
            self.suppressed.push((id, position));
        }
    }

    /// Instruments whose trigger on the step about to be scheduled must be
    /// skipped. Entries for this step and any earlier one are dropped.
    pub fn take_suppressed(&mut self) -> [bool; NUM_INSTRUMENTS] {
        let mut skip = [false; NUM_INSTRUMENTS];
        let position = self.position;
        self.suppressed.retain(|&(id, at)| {
            if at == position {
                skip[id.index()] = true;
            }
            at > position
        });
        skip
    }
}
