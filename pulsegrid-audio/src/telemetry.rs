//! Control-loop telemetry: tick durations and scheduling lead margins.
//!
//! Fixed-size ring buffers, no allocation on the record path.

use std::time::Duration;

const TICK_BUFFER_SIZE: usize = 256;

/// Snapshot returned by [`ControlTelemetry::take_summary`].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TelemetrySummary {
    pub avg_tick_us: u32,
    pub max_tick_us: u32,
    pub p95_tick_us: u32,
    /// Ticks over budget since startup.
    pub overruns: u64,
    /// Smallest distance between scheduling and an event's audio time, this window.
    pub min_lead_ms: Option<f32>,
    /// Steps scheduled this window.
    pub scheduled: u64,
    /// Times the scheduler had to resync since startup.
    pub resyncs: u64,
}

pub struct ControlTelemetry {
    tick_durations_us: [u32; TICK_BUFFER_SIZE],
    tick_idx: usize,
    sample_count: usize,
    max_tick_us: u32,
    overrun_count: u64,
    min_lead_secs: Option<f64>,
    scheduled: u64,
    resyncs: u64,
}

impl Default for ControlTelemetry {
    fn default() -> Self {
        Self::new()
    }
}

impl ControlTelemetry {
    pub fn new() -> Self {
        Self {
            tick_durations_us: [0; TICK_BUFFER_SIZE],
            tick_idx: 0,
            sample_count: 0,
            max_tick_us: 0,
            overrun_count: 0,
            min_lead_secs: None,
            scheduled: 0,
            resyncs: 0,
        }
    }

    #[inline]
    pub fn record_tick(&mut self, duration: Duration, budget_us: u32) {
        let us = duration.as_micros().min(u32::MAX as u128) as u32;
        self.tick_durations_us[self.tick_idx] = us;
        self.tick_idx = (self.tick_idx + 1) % TICK_BUFFER_SIZE;
        if self.sample_count < TICK_BUFFER_SIZE {
            self.sample_count += 1;
        }
        self.max_tick_us = self.max_tick_us.max(us);
        if us > budget_us {
            self.overrun_count += 1;
        }
    }

    /// Record how far ahead of the audio clock a step was scheduled.
    #[inline]
    pub fn record_lead(&mut self, lead_secs: f64) {
        self.scheduled += 1;
        self.min_lead_secs = Some(match self.min_lead_secs {
            Some(min) => min.min(lead_secs),
            None => lead_secs,
        });
    }

    pub fn record_resync(&mut self) {
        self.resyncs += 1;
    }

    /// Summarize and start a new window. Overruns and resyncs stay cumulative.
    pub fn take_summary(&mut self) -> TelemetrySummary {
        let mut summary = TelemetrySummary {
            overruns: self.overrun_count,
            resyncs: self.resyncs,
            scheduled: self.scheduled,
            min_lead_ms: self.min_lead_secs.map(|s| (s * 1000.0) as f32),
            ..Default::default()
        };
        if self.sample_count > 0 {
            let samples = &self.tick_durations_us[..self.sample_count];
            let sum: u64 = samples.iter().map(|&x| x as u64).sum();
            summary.avg_tick_us = (sum / self.sample_count as u64) as u32;
            let mut sorted = self.tick_durations_us;
            sorted[..self.sample_count].sort_unstable();
            let p95_idx = (self.sample_count * 95 / 100).max(1) - 1;
            summary.p95_tick_us = sorted[p95_idx.min(self.sample_count - 1)];
            summary.max_tick_us = self.max_tick_us;
        }
        self.max_tick_us = 0;
        self.min_lead_secs = None;
        self.scheduled = 0;
        summary
    }
}
