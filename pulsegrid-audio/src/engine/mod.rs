pub mod backend;
mod duck;
mod fx;
pub mod node_registry;
pub mod osc_backend;
pub mod param_timeline;
pub mod samples;
mod sum_bus;
mod voices;

use std::collections::HashMap;

use pulsegrid_types::{
    DelayMode, FxMode, InstrumentId, InstrumentSlot, InstrumentState, ReverbMode, SessionState,
    SumBusState, NUM_INSTRUMENTS,
};

use backend::{AudioBackend, NodeId, NodeKind, OUTPUT_NODE};
use fx::{DelayBus, ReverbBus};
use node_registry::NodeRegistry;
use param_timeline::ParamTimeline;
use samples::SampleCache;
use sum_bus::SumBusNodes;
use voices::{ClickVoice, Voice};

pub use fx::generate_impulse;
pub use sum_bus::{NEUTRAL_HIGHPASS_HZ, NEUTRAL_LOWPASS_HZ};
pub use voices::{CHOKE_RELEASE_SECS, CHOKE_STOP_DELAY_SECS, CLICK_HIGH_HZ, CLICK_LOW_HZ};

/// First id handed out for engine-created nodes. Ids below are reserved for
/// backend-owned nodes such as the output.
const FIRST_NODE_ID: NodeId = 1000;

/// Node ids for one instrument's mix path:
/// mix_sum → duck links (series) → post → {sum bus, delay sends, reverb sends}.
#[derive(Debug, Clone)]
pub(crate) struct InstrumentNodes {
    pub mix_sum: NodeId,
    /// Duck links in chain order, keyed by trigger instrument. Allocated the
    /// first time a link is enabled and kept afterwards.
    pub duck_chain: Vec<(InstrumentId, NodeId)>,
    pub post: NodeId,
    pub delay_sends: [NodeId; 3],
    pub reverb_sends: [NodeId; 3],
}

#[derive(Debug, Clone)]
pub(crate) struct Graph {
    pub instruments: Vec<InstrumentNodes>,
    pub delay_buses: Vec<DelayBus>,
    pub reverb_buses: Vec<ReverbBus>,
    pub sum: SumBusNodes,
}

/// Values last pushed to the backend, so sync only sends what changed.
#[derive(Debug, Default)]
struct AppliedMix {
    post_gain: [Option<f32>; NUM_INSTRUMENTS],
    delay_levels: [[f32; 3]; NUM_INSTRUMENTS],
    reverb_levels: [[f32; 3]; NUM_INSTRUMENTS],
    bpm: Option<u16>,
    sum_bus: Option<SumBusState>,
}

pub struct AudioEngine {
    backend: Option<Box<dyn AudioBackend>>,
    node_registry: NodeRegistry,
    next_node_id: NodeId,
    graph: Option<Graph>,
    voices: Vec<Voice>,
    clicks: Vec<ClickVoice>,
    samples: SampleCache,
    applied: AppliedMix,
    /// Copy of the ramps scheduled on send gains and delay times
    ramps: HashMap<(NodeId, &'static str), ParamTimeline>,
    /// Simple LCG seed for impulse-response noise
    rng_state: u64,
    /// Minimum time ahead of the audio clock for anything scheduled "now"
    pub min_lead_secs: f64,
}

impl Default for AudioEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioEngine {
    pub fn new() -> Self {
        Self {
            backend: None,
            node_registry: NodeRegistry::new(),
            next_node_id: FIRST_NODE_ID,
            graph: None,
            voices: Vec::new(),
            clicks: Vec::new(),
            samples: SampleCache::default(),
            applied: AppliedMix::default(),
            ramps: HashMap::new(),
            rng_state: 12345,
            min_lead_secs: 0.005,
        }
    }

    pub fn is_running(&self) -> bool {
        self.backend.is_some() && self.graph.is_some()
    }

    /// Current audio clock time, or 0 when detached.
    pub fn now(&self) -> f64 {
        self.backend.as_ref().map(|b| b.current_time()).unwrap_or(0.0)
    }

    /// Replace the render backend and build the whole graph on it.
    ///
    /// Everything the previous backend held is forgotten, including uploaded
    /// buffers; callers re-send decoded samples after attaching.
    pub fn attach_backend(
        &mut self,
        backend: Box<dyn AudioBackend>,
        instruments: &InstrumentState,
        session: &SessionState,
    ) -> Result<(), String> {
        self.backend = Some(backend);
        self.node_registry.invalidate_all();
        self.node_registry.register(OUTPUT_NODE);
        self.graph = None;
        self.voices.clear();
        self.clicks.clear();
        self.samples = SampleCache::default();
        self.applied = AppliedMix::default();
        self.ramps.clear();
        self.build_graph(instruments, session)?;
        log::info!(
            target: "audio::nodes",
            "graph built: {} nodes",
            self.node_registry.live_count()
        );
        Ok(())
    }

    fn build_graph(
        &mut self,
        instruments: &InstrumentState,
        session: &SessionState,
    ) -> Result<(), String> {
        let sum = self.build_sum_bus(&session.sum_bus)?;
        let secs_per_beat = session.seconds_per_beat();

        let mut delay_buses = Vec::with_capacity(3);
        for mode in DelayMode::ALL {
            delay_buses.push(self.build_delay_bus(mode, sum.input, secs_per_beat)?);
        }
        let mut reverb_buses = Vec::with_capacity(3);
        for mode in ReverbMode::ALL {
            reverb_buses.push(self.build_reverb_bus(mode, sum.input, session.seconds_per_step())?);
        }

        let mut nodes = Vec::with_capacity(NUM_INSTRUMENTS);
        for slot in &instruments.instruments {
            let mix_sum = self.create(NodeKind::Gain { gain: 1.0 })?;
            let post_gain = slot.strip.post_gain();
            let post = self.create(NodeKind::Gain { gain: post_gain })?;
            self.connect(mix_sum, post)?;
            self.connect(post, sum.input)?;
            let mut delay_sends = [0; 3];
            for (send, bus) in delay_sends.iter_mut().zip(&delay_buses) {
                *send = self.create(NodeKind::Gain { gain: 0.0 })?;
                self.connect(post, *send)?;
                self.connect(*send, bus.input)?;
            }
            let mut reverb_sends = [0; 3];
            for (send, bus) in reverb_sends.iter_mut().zip(&reverb_buses) {
                *send = self.create(NodeKind::Gain { gain: 0.0 })?;
                self.connect(post, *send)?;
                self.connect(*send, bus.input)?;
            }
            self.applied.post_gain[slot.id.index()] = Some(post_gain);
            nodes.push(InstrumentNodes {
                mix_sum,
                duck_chain: Vec::new(),
                post,
                delay_sends,
                reverb_sends,
            });
        }

        self.graph = Some(Graph {
            instruments: nodes,
            delay_buses,
            reverb_buses,
            sum,
        });
        self.applied.bpm = Some(session.bpm);
        self.applied.sum_bus = Some(session.sum_bus.clone());
        self.sync(instruments, session)
    }

    /// Push every mix-relevant difference between `session`/`instruments` and
    /// what the backend last received.
    pub fn sync(
        &mut self,
        instruments: &InstrumentState,
        session: &SessionState,
    ) -> Result<(), String> {
        if self.graph.is_none() {
            return Ok(());
        }
        if self.applied.bpm != Some(session.bpm) {
            self.retune_fx(session.bpm)?;
        }
        for slot in &instruments.instruments {
            self.sync_strip(slot)?;
            self.sync_sends(slot)?;
        }
        for (target, trigger) in session.sidechain.links() {
            self.ensure_duck_link(target, trigger)?;
        }
        self.sync_sum_bus(&session.sum_bus)?;
        if *self.samples.current_pack() != session.pack {
            self.switch_pack(&session.pack);
        }
        Ok(())
    }

    /// Mute and volume land on the already-connected post stage.
    fn sync_strip(&mut self, slot: &InstrumentSlot) -> Result<(), String> {
        let gain = slot.strip.post_gain();
        if self.applied.post_gain[slot.id.index()] == Some(gain) {
            return Ok(());
        }
        let post = self.instrument_nodes(slot.id)?.post;
        let backend = self.backend.as_ref().ok_or("Not connected")?;
        backend
            .set_param(post, "gain", gain)
            .map_err(|e| e.to_string())?;
        self.applied.post_gain[slot.id.index()] = Some(gain);
        Ok(())
    }

    // =========================================================================
    // Node helpers
    // =========================================================================

    fn create(&mut self, kind: NodeKind) -> Result<NodeId, String> {
        let backend = self.backend.as_ref().ok_or("Not connected")?;
        let id = self.next_node_id;
        self.next_node_id += 1;
        backend.create_node(id, &kind).map_err(|e| e.to_string())?;
        self.node_registry.register(id);
        Ok(id)
    }

    fn free(&mut self, id: NodeId) {
        self.node_registry.unregister(id);
        if let Some(backend) = &self.backend {
            if let Err(e) = backend.free_node(id) {
                log::debug!(target: "audio::nodes", "free {}: {}", id, e);
            }
        }
    }

    fn connect(&mut self, from: NodeId, to: NodeId) -> Result<(), String> {
        if !self.node_registry.connect(from, to) {
            return Ok(());
        }
        let backend = self.backend.as_ref().ok_or("Not connected")?;
        backend.connect(from, to).map_err(|e| e.to_string())
    }

    /// Disconnecting an edge that is already gone is a no-op.
    fn disconnect(&mut self, from: NodeId, to: NodeId) {
        if !self.node_registry.disconnect(from, to) {
            return;
        }
        if let Some(backend) = &self.backend {
            if let Err(e) = backend.disconnect(from, to) {
                log::debug!(target: "audio::nodes", "disconnect {} -> {}: {}", from, to, e);
            }
        }
    }

    /// Never schedule into the past.
    fn clamp_time(&self, when: f64) -> f64 {
        when.max(self.now())
    }

    fn graph(&self) -> Result<&Graph, String> {
        self.graph.as_ref().ok_or_else(|| "Graph not built".to_string())
    }

    fn instrument_nodes(&self, id: InstrumentId) -> Result<&InstrumentNodes, String> {
        self.graph()?
            .instruments
            .get(id.index())
            .ok_or_else(|| format!("no nodes for instrument {}", id))
    }

    #[cfg(test)]
    pub(crate) fn graph_for_test(&self) -> &Graph {
        self.graph.as_ref().unwrap()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use super::backend::{SharedTestBackend, TestBackend};
    use super::samples::SampleBuffer;
    use super::AudioEngine;
    use pulsegrid_types::{InstrumentId, InstrumentState, PackId, SessionState};

    /// Engine attached to a fresh `TestBackend`, with a 0.5 s buffer loaded
    /// for every instrument of the default pack.
    pub fn engine_with_samples(
        instruments: &InstrumentState,
        session: &SessionState,
    ) -> (AudioEngine, Arc<TestBackend>) {
        let backend = Arc::new(TestBackend::new());
        let mut engine = AudioEngine::new();
        engine
            .attach_backend(Box::new(SharedTestBackend(backend.clone())), instruments, session)
            .unwrap();
        let buffer = SampleBuffer {
            sample_rate: 48_000,
            channels: 1,
            data: vec![0.1; 24_000].into(),
        };
        for id in InstrumentId::all() {
            engine.install_sample(&PackId::default(), id, &buffer).unwrap();
        }
        (engine, backend)
    }
}
