//! Evaluation of scheduled parameter automation.
//!
//! Used by `TestBackend` to answer "what is this gain at time t" the way a
//! render server would: set-value events jump, ramps run from the previous
//! event's time and value to their own end.

use super::backend::ParamEvent;

#[derive(Debug, Clone)]
pub struct ParamTimeline {
    initial: f32,
    events: Vec<ParamEvent>,
}

impl ParamTimeline {
    pub fn new(initial: f32) -> Self {
        Self {
            initial,
            events: Vec::new(),
        }
    }

    /// Insert an event, keeping events ordered by time. Events at equal times
    /// keep insertion order.
    pub fn push(&mut self, event: ParamEvent) {
        let t = event.time();
        let pos = self.events.partition_point(|e| e.time() <= t);
        self.events.insert(pos, event);
    }

    /// Remove every event at or after `from`.
    pub fn cancel_from(&mut self, from: f64) {
        self.events.retain(|e| e.time() < from);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn value_at(&self, t: f64) -> f32 {
        let mut prev_time = f64::NEG_INFINITY;
        let mut prev_value = self.initial;
        for event in &self.events {
            let time = event.time();
            if time > t {
                return match *event {
                    ParamEvent::SetValue { .. } => prev_value,
                    ParamEvent::LinearRampTo { value, end } => {
                        if !prev_time.is_finite() {
                            return prev_value;
                        }
                        let frac = ((t - prev_time) / (end - prev_time)) as f32;
                        prev_value + (value - prev_value) * frac
                    }
                    ParamEvent::ExponentialRampTo { value, end } => {
                        if !prev_time.is_finite() || prev_value <= 0.0 || value <= 0.0 {
                            return prev_value;
                        }
                        let frac = (t - prev_time) / (end - prev_time);
                        let ratio = (value / prev_value) as f64;
                        (prev_value as f64 * ratio.powf(frac)) as f32
                    }
                };
            }
            prev_time = time;
            prev_value = event.value();
        }
        prev_value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exponential_ramp_is_geometric() {
        let mut tl = ParamTimeline::new(1.0);
        tl.push(ParamEvent::SetValue { value: 1.0, at: 0.0 });
        tl.push(ParamEvent::ExponentialRampTo { value: 0.25, end: 2.0 });
        assert!((tl.value_at(1.0) - 0.5).abs() < 1e-6);
        assert!((tl.value_at(2.0) - 0.25).abs() < 1e-6);
    }

    #[test]
    fn cancel_drops_future_events() {
        let mut tl = ParamTimeline::new(1.0);
        tl.push(ParamEvent::SetValue { value: 0.5, at: 1.0 });
        tl.push(ParamEvent::SetValue { value: 0.1, at: 2.0 });
        tl.cancel_from(1.5);
        assert_eq!(tl.len(), 1);
        assert_eq!(tl.value_at(5.0), 0.5);
    }

    #[test]
    fn before_first_event_reads_initial() {
        let mut tl = ParamTimeline::new(0.8);
        tl.push(ParamEvent::SetValue { value: 0.2, at: 1.0 });
        assert_eq!(tl.value_at(0.5), 0.8);
        assert_eq!(tl.value_at(1.0), 0.2);
    }
}
