//! Master chain: tone filters, glue compressor, optional limiter, makeup,
//! and the peak meter tap.

use super::backend::{CompressorSpec, FilterKind, NodeId, NodeKind, OUTPUT_NODE};
use super::AudioEngine;
use pulsegrid_types::{db_to_gain, peak_to_dbfs, CompressorParams, SumBusState, METER_FLOOR_DB};

/// Cutoffs used while a tone filter is switched off; both pass the audible band.
pub const NEUTRAL_HIGHPASS_HZ: f32 = 10.0;
pub const NEUTRAL_LOWPASS_HZ: f32 = 22_000.0;
const TONE_Q: f32 = 0.707;

const LIMITER: CompressorSpec = CompressorSpec {
    threshold_db: -1.0,
    ratio: 20.0,
    attack: 0.001,
    release: 0.05,
    knee_db: 0.0,
};

#[derive(Debug, Clone, Copy)]
pub(crate) struct SumBusNodes {
    pub input: NodeId,
    pub meter: NodeId,
    pub highpass: NodeId,
    pub lowpass: NodeId,
    pub compressor: NodeId,
    pub limiter: NodeId,
    pub makeup: NodeId,
}

fn compressor_spec(c: &CompressorParams) -> CompressorSpec {
    CompressorSpec {
        threshold_db: c.threshold_db,
        ratio: c.ratio,
        attack: c.attack,
        release: c.release,
        knee_db: c.knee_db,
    }
}

impl AudioEngine {
    pub(crate) fn build_sum_bus(&mut self, state: &SumBusState) -> Result<SumBusNodes, String> {
        let input = self.create(NodeKind::Gain { gain: 1.0 })?;
        let meter = self.create(NodeKind::Meter)?;
        let highpass = self.create(NodeKind::Filter {
            kind: FilterKind::Highpass,
            freq: state.highpass_hz.unwrap_or(NEUTRAL_HIGHPASS_HZ),
            q: TONE_Q,
        })?;
        let lowpass = self.create(NodeKind::Filter {
            kind: FilterKind::Lowpass,
            freq: state.lowpass_hz.unwrap_or(NEUTRAL_LOWPASS_HZ),
            q: TONE_Q,
        })?;
        let compressor = self.create(NodeKind::Compressor(compressor_spec(&state.compressor)))?;
        let limiter = self.create(NodeKind::Compressor(LIMITER))?;
        let makeup = self.create(NodeKind::Gain {
            gain: db_to_gain(state.makeup_db),
        })?;

        self.connect(input, meter)?;
        self.connect(input, highpass)?;
        self.connect(highpass, lowpass)?;
        self.connect(lowpass, compressor)?;
        if state.limiter_enabled {
            self.connect(compressor, limiter)?;
            self.connect(limiter, makeup)?;
        } else {
            self.connect(compressor, makeup)?;
        }
        self.connect(makeup, OUTPUT_NODE)?;
        Ok(SumBusNodes {
            input,
            meter,
            highpass,
            lowpass,
            compressor,
            limiter,
            makeup,
        })
    }

    /// Push whatever changed in the master chain since the last sync.
    pub(crate) fn sync_sum_bus(&mut self, state: &SumBusState) -> Result<(), String> {
        let prev = match &self.applied.sum_bus {
            Some(prev) if prev == state => return Ok(()),
            Some(prev) => prev.clone(),
            None => SumBusState::default(),
        };
        let nodes = self.graph()?.sum;

        {
            let backend = self.backend.as_ref().ok_or("Not connected")?;
            let set = |id: NodeId, param: &str, value: f32| {
                backend.set_param(id, param, value).map_err(|e| e.to_string())
            };
            let (c, p) = (&state.compressor, &prev.compressor);
            if c.threshold_db != p.threshold_db {
                set(nodes.compressor, "threshold", c.threshold_db)?;
            }
            if c.ratio != p.ratio {
                set(nodes.compressor, "ratio", c.ratio)?;
            }
            if c.attack != p.attack {
                set(nodes.compressor, "attack", c.attack)?;
            }
            if c.release != p.release {
                set(nodes.compressor, "release", c.release)?;
            }
            if c.knee_db != p.knee_db {
                set(nodes.compressor, "knee", c.knee_db)?;
            }
            if state.makeup_db != prev.makeup_db {
                set(nodes.makeup, "gain", db_to_gain(state.makeup_db))?;
            }
            if state.highpass_hz != prev.highpass_hz {
                set(
                    nodes.highpass,
                    "freq",
                    state.highpass_hz.unwrap_or(NEUTRAL_HIGHPASS_HZ),
                )?;
            }
            if state.lowpass_hz != prev.lowpass_hz {
                set(
                    nodes.lowpass,
                    "freq",
                    state.lowpass_hz.unwrap_or(NEUTRAL_LOWPASS_HZ),
                )?;
            }
        }

        if state.limiter_enabled != prev.limiter_enabled {
            if state.limiter_enabled {
                self.disconnect(nodes.compressor, nodes.makeup);
                self.connect(nodes.compressor, nodes.limiter)?;
                self.connect(nodes.limiter, nodes.makeup)?;
            } else {
                self.disconnect(nodes.compressor, nodes.limiter);
                self.disconnect(nodes.limiter, nodes.makeup);
                self.connect(nodes.compressor, nodes.makeup)?;
            }
            log::debug!(
                target: "audio::sum",
                "limiter {}",
                if state.limiter_enabled { "in" } else { "bypassed" }
            );
        }
        self.applied.sum_bus = Some(state.clone());
        Ok(())
    }

    /// Peak level at the sum-bus input, in dBFS.
    pub fn read_meter_db(&self) -> f32 {
        let Some(graph) = self.graph.as_ref() else {
            return METER_FLOOR_DB;
        };
        self.backend
            .as_ref()
            .and_then(|b| b.read_peak(graph.sum.meter))
            .map(peak_to_dbfs)
            .unwrap_or(METER_FLOOR_DB)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::backend::TestOp;
    use crate::engine::test_support::engine_with_samples;
    use pulsegrid_types::{InstrumentState, SessionState};

    #[test]
    fn limiter_toggle_reroutes() {
        let instruments = InstrumentState::new();
        let mut session = SessionState::default();
        let (mut engine, backend) = engine_with_samples(&instruments, &session);
        let sum = engine.graph_for_test().sum;
        assert!(backend.is_connected(sum.compressor, sum.limiter));
        assert!(backend.is_connected(sum.limiter, sum.makeup));
        assert!(backend.is_connected(sum.makeup, OUTPUT_NODE));

        session.sum_bus.limiter_enabled = false;
        engine.sync(&instruments, &session).unwrap();
        assert!(backend.is_connected(sum.compressor, sum.makeup));
        assert!(!backend.is_connected(sum.compressor, sum.limiter));

        session.sum_bus.limiter_enabled = true;
        engine.sync(&instruments, &session).unwrap();
        assert!(!backend.is_connected(sum.compressor, sum.makeup));
        assert!(backend.is_connected(sum.limiter, sum.makeup));
    }

    #[test]
    fn only_changed_params_are_sent() {
        let instruments = InstrumentState::new();
        let mut session = SessionState::default();
        let (mut engine, backend) = engine_with_samples(&instruments, &session);
        backend.clear();
        session.sum_bus.compressor.set_ratio(8.0);
        session.sum_bus.set_makeup_db(6.0);
        engine.sync(&instruments, &session).unwrap();
        let sum = engine.graph_for_test().sum;
        let ops = backend.operations();
        assert_eq!(ops.len(), 2);
        assert!(ops.contains(&TestOp::SetParam {
            id: sum.compressor,
            param: "ratio".to_string(),
            value: 8.0
        }));
        let makeup = backend.param_value_at(sum.makeup, "gain", 0.0).unwrap();
        assert!((makeup - db_to_gain(6.0)).abs() < 1e-6);
    }

    #[test]
    fn clearing_a_tone_filter_restores_neutral_cutoff() {
        let instruments = InstrumentState::new();
        let mut session = SessionState::default();
        session.sum_bus.highpass_hz = Some(120.0);
        let (mut engine, backend) = engine_with_samples(&instruments, &session);
        let sum = engine.graph_for_test().sum;
        assert_eq!(backend.param_value_at(sum.highpass, "freq", 0.0), Some(120.0));
        session.sum_bus.highpass_hz = None;
        engine.sync(&instruments, &session).unwrap();
        assert_eq!(
            backend.param_value_at(sum.highpass, "freq", 0.0),
            Some(NEUTRAL_HIGHPASS_HZ)
        );
    }

    #[test]
    fn meter_reads_floor_until_signal() {
        let instruments = InstrumentState::new();
        let session = SessionState::default();
        let (engine, backend) = engine_with_samples(&instruments, &session);
        assert_eq!(engine.read_meter_db(), METER_FLOOR_DB);
        backend.set_peak(engine.graph_for_test().sum.meter, 0.5);
        assert!((engine.read_meter_db() + 6.0206).abs() < 1e-3);
    }
}
