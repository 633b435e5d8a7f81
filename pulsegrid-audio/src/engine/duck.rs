//! Sidechain ducking. Each enabled (target, trigger) pair owns one gain stage
//! in the target's chain between mix_sum and post; stages multiply.

use super::backend::{NodeId, NodeKind, ParamEvent};
use super::AudioEngine;
use pulsegrid_types::{DuckSettings, InstrumentId, SidechainMatrix};

/// Exponential ramps cannot reach zero.
const MIN_DUCK_GAIN: f32 = 0.0001;

impl AudioEngine {
    /// Make sure the (target, trigger) gain stage exists, splicing it onto the
    /// tail of the target's chain the first time. Disabled links keep their
    /// stage at unity.
    pub(crate) fn ensure_duck_link(
        &mut self,
        target: InstrumentId,
        trigger: InstrumentId,
    ) -> Result<NodeId, String> {
        let nodes = self.instrument_nodes(target)?;
        if let Some(&(_, node)) = nodes.duck_chain.iter().find(|(t, _)| *t == trigger) {
            return Ok(node);
        }
        let tail = nodes
            .duck_chain
            .last()
            .map(|&(_, n)| n)
            .unwrap_or(nodes.mix_sum);
        let post = nodes.post;

        let node = self.create(NodeKind::Gain { gain: 1.0 })?;
        self.disconnect(tail, post);
        self.connect(tail, node)?;
        self.connect(node, post)?;
        if let Some(graph) = self.graph.as_mut() {
            graph.instruments[target.index()]
                .duck_chain
                .push((trigger, node));
        }
        log::debug!(
            target: "audio::duck",
            "duck stage {} for {} <- {}",
            node,
            target,
            trigger
        );
        Ok(node)
    }

    /// Duck every target linked to `trigger`, starting at `when`.
    pub(crate) fn apply_ducks(
        &mut self,
        trigger: InstrumentId,
        when: f64,
        matrix: &SidechainMatrix,
    ) -> Result<(), String> {
        let targets: Vec<InstrumentId> = matrix.targets_of(trigger).collect();
        for target in targets {
            let node = self.ensure_duck_link(target, trigger)?;
            self.schedule_duck(node, matrix.duck(target), when)?;
        }
        Ok(())
    }

    /// Dip to the duck floor over the attack, recover to unity over the
    /// release. A retrigger mid-envelope restarts from unity.
    fn schedule_duck(&self, node: NodeId, duck: DuckSettings, when: f64) -> Result<(), String> {
        let t = self.clamp_time(when);
        let attack = duck.attack_ms as f64 / 1000.0;
        let release = duck.release_ms as f64 / 1000.0;
        let dip = duck.dip_gain().max(MIN_DUCK_GAIN);

        let backend = self.backend.as_ref().ok_or("Not connected")?;
        backend
            .cancel_scheduled(node, "gain", t)
            .map_err(|e| e.to_string())?;
        backend
            .schedule_param(node, "gain", ParamEvent::SetValue { value: 1.0, at: t })
            .map_err(|e| e.to_string())?;
        backend
            .schedule_param(
                node,
                "gain",
                ParamEvent::ExponentialRampTo {
                    value: dip,
                    end: t + attack,
                },
            )
            .map_err(|e| e.to_string())?;
        backend
            .schedule_param(
                node,
                "gain",
                ParamEvent::ExponentialRampTo {
                    value: 1.0,
                    end: t + attack + release,
                },
            )
            .map_err(|e| e.to_string())?;
        Ok(())
    }

    /// Drop pending envelopes and return every duck stage to unity.
    pub(crate) fn reset_ducks(&mut self, now: f64) {
        let Some(graph) = self.graph.as_ref() else {
            return;
        };
        let Some(backend) = self.backend.as_ref() else {
            return;
        };
        for nodes in &graph.instruments {
            for &(_, node) in &nodes.duck_chain {
                let result = backend.cancel_scheduled(node, "gain", now).and_then(|_| {
                    backend.schedule_param(node, "gain", ParamEvent::SetValue { value: 1.0, at: now })
                });
                if let Err(e) = result {
                    log::warn!(target: "audio::duck", "reset duck {}: {}", node, e);
                }
            }
        }
    }
}
