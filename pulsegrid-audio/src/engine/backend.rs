//! Audio backend trait: the render-side contract the engine schedules against.
//!
//! `AudioBackend` captures what the engine *means* to do (create a gain stage,
//! ramp a parameter at a given audio time, start a sample voice) independently
//! of how a render server realizes it. The engine is the sole owner of node
//! topology; a backend only has to execute scheduled operations on its clock.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex};

use super::param_timeline::ParamTimeline;
use super::samples::SampleBuffer;

/// Result type for backend operations.
pub type BackendResult<T = ()> = Result<T, BackendError>;

pub type NodeId = i32;
pub type BufferId = u32;

/// The render backend's final output node. Always exists.
pub const OUTPUT_NODE: NodeId = 0;

/// Error from a backend operation.
#[derive(Debug, Clone)]
pub struct BackendError(pub String);

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for BackendError {}

impl From<std::io::Error> for BackendError {
    fn from(e: std::io::Error) -> Self {
        BackendError(e.to_string())
    }
}

impl From<String> for BackendError {
    fn from(s: String) -> Self {
        BackendError(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    Lowpass,
    Highpass,
}

impl FilterKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FilterKind::Lowpass => "lowpass",
            FilterKind::Highpass => "highpass",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompressorSpec {
    pub threshold_db: f32,
    pub ratio: f32,
    pub attack: f32,
    pub release: f32,
    pub knee_db: f32,
}

/// Node types the engine builds its graph from. Initial parameter values are
/// carried in the variant.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Gain { gain: f32 },
    Filter { kind: FilterKind, freq: f32, q: f32 },
    Delay { max_secs: f32, time: f32 },
    Convolver,
    Compressor(CompressorSpec),
    /// Peak follower; read back through [`AudioBackend::read_peak`].
    Meter,
    /// One-shot buffer player. Plays once from `start_node` until the buffer ends.
    Sampler { buffer: BufferId, rate: f32 },
    /// Short synthetic metronome click.
    Click { freq: f32, amp: f32 },
}

impl NodeKind {
    /// Parameter names and their initial values.
    pub fn initial_params(&self) -> Vec<(&'static str, f32)> {
        match self {
            NodeKind::Gain { gain } => vec![("gain", *gain)],
            NodeKind::Filter { freq, q, .. } => vec![("freq", *freq), ("q", *q)],
            NodeKind::Delay { time, .. } => vec![("time", *time)],
            NodeKind::Compressor(c) => vec![
                ("threshold", c.threshold_db),
                ("ratio", c.ratio),
                ("attack", c.attack),
                ("release", c.release),
                ("knee", c.knee_db),
            ],
            NodeKind::Sampler { rate, .. } => vec![("rate", *rate)],
            NodeKind::Click { freq, amp } => vec![("freq", *freq), ("amp", *amp)],
            NodeKind::Convolver | NodeKind::Meter => Vec::new(),
        }
    }
}

/// A parameter automation event on the audio clock.
///
/// Ramps run from the previous event on the same parameter to `end`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamEvent {
    SetValue { value: f32, at: f64 },
    LinearRampTo { value: f32, end: f64 },
    ExponentialRampTo { value: f32, end: f64 },
}

impl ParamEvent {
    pub fn time(&self) -> f64 {
        match *self {
            ParamEvent::SetValue { at, .. } => at,
            ParamEvent::LinearRampTo { end, .. } | ParamEvent::ExponentialRampTo { end, .. } => end,
        }
    }

    pub fn value(&self) -> f32 {
        match *self {
            ParamEvent::SetValue { value, .. }
            | ParamEvent::LinearRampTo { value, .. }
            | ParamEvent::ExponentialRampTo { value, .. } => value,
        }
    }
}

/// Convolution impulse response, interleaved.
#[derive(Debug, Clone, PartialEq)]
pub struct ImpulseResponse {
    pub sample_rate: u32,
    pub channels: u16,
    pub data: Vec<f32>,
}

impl ImpulseResponse {
    pub fn frames(&self) -> usize {
        self.data.len() / self.channels.max(1) as usize
    }

    pub fn duration_secs(&self) -> f64 {
        self.frames() as f64 / self.sample_rate.max(1) as f64
    }
}

/// Semantic-level render backend.
///
/// Every time argument is in seconds on the backend's own audio clock, as
/// reported by [`AudioBackend::current_time`].
pub trait AudioBackend: Send {
    /// Monotonically increasing audio clock, in seconds.
    fn current_time(&self) -> f64;

    fn sample_rate(&self) -> u32;

    fn create_node(&self, id: NodeId, kind: &NodeKind) -> BackendResult;

    fn free_node(&self, id: NodeId) -> BackendResult;

    fn connect(&self, from: NodeId, to: NodeId) -> BackendResult;

    fn disconnect(&self, from: NodeId, to: NodeId) -> BackendResult;

    /// Set a parameter immediately.
    fn set_param(&self, id: NodeId, param: &str, value: f32) -> BackendResult;

    /// Append an automation event to a parameter's timeline.
    fn schedule_param(&self, id: NodeId, param: &str, event: ParamEvent) -> BackendResult;

    /// Drop every event on a parameter at or after `from`.
    fn cancel_scheduled(&self, id: NodeId, param: &str, from: f64) -> BackendResult;

    fn start_node(&self, id: NodeId, at: f64) -> BackendResult;

    fn stop_node(&self, id: NodeId, at: f64) -> BackendResult;

    fn load_buffer(&self, id: BufferId, buffer: &SampleBuffer) -> BackendResult;

    fn free_buffer(&self, id: BufferId) -> BackendResult;

    fn set_impulse_response(&self, id: NodeId, ir: &ImpulseResponse) -> BackendResult;

    /// Latest linear peak seen by a meter node, if any.
    fn read_peak(&self, id: NodeId) -> Option<f32>;

    /// Nodes that finished playing since the last call.
    fn drain_ended(&self) -> Vec<NodeId>;
}

// ─── Test Backend ───────────────────────────────────────────────────

/// An operation recorded by `TestBackend` for assertion in tests.
#[derive(Debug, Clone, PartialEq)]
pub enum TestOp {
    CreateNode { id: NodeId, kind: NodeKind },
    FreeNode(NodeId),
    Connect(NodeId, NodeId),
    Disconnect(NodeId, NodeId),
    SetParam { id: NodeId, param: String, value: f32 },
    ScheduleParam { id: NodeId, param: String, event: ParamEvent },
    CancelScheduled { id: NodeId, param: String, from: f64 },
    StartNode { id: NodeId, at: f64 },
    StopNode { id: NodeId, at: f64 },
    LoadBuffer { id: BufferId, frames: usize },
    FreeBuffer(BufferId),
    SetImpulseResponse { id: NodeId, frames: usize },
}

/// A test backend that records all operations and evaluates scheduled
/// parameter curves. The audio clock only moves when a test moves it.
/// Uses `Mutex` for interior mutability so the backend is `Send + Sync`
/// (needed for `Arc<TestBackend>` sharing).
pub struct TestBackend {
    ops: Mutex<Vec<TestOp>>,
    clock: Mutex<f64>,
    sample_rate: u32,
    timelines: Mutex<HashMap<(NodeId, String), ParamTimeline>>,
    edges: Mutex<HashSet<(NodeId, NodeId)>>,
    peaks: Mutex<HashMap<NodeId, f32>>,
    ended: Mutex<Vec<NodeId>>,
}

impl TestBackend {
    pub fn new() -> Self {
        Self {
            ops: Mutex::new(Vec::new()),
            clock: Mutex::new(0.0),
            sample_rate: 48_000,
            timelines: Mutex::new(HashMap::new()),
            edges: Mutex::new(HashSet::new()),
            peaks: Mutex::new(HashMap::new()),
            ended: Mutex::new(Vec::new()),
        }
    }

    pub fn set_time(&self, t: f64) {
        *self.clock.lock().unwrap() = t;
    }

    pub fn advance(&self, secs: f64) {
        *self.clock.lock().unwrap() += secs;
    }

    /// Return all recorded operations.
    pub fn operations(&self) -> Vec<TestOp> {
        self.ops.lock().unwrap().clone()
    }

    /// Clear recorded operations.
    pub fn clear(&self) {
        self.ops.lock().unwrap().clear();
    }

    /// Count operations matching a predicate.
    pub fn count<F: Fn(&TestOp) -> bool>(&self, f: F) -> usize {
        self.ops.lock().unwrap().iter().filter(|op| f(op)).count()
    }

    /// Find the first operation matching a predicate.
    pub fn find<F: Fn(&TestOp) -> bool>(&self, f: F) -> Option<TestOp> {
        self.ops.lock().unwrap().iter().find(|op| f(op)).cloned()
    }

    /// Kind a node was created with.
    pub fn node_kind(&self, id: NodeId) -> Option<NodeKind> {
        self.ops.lock().unwrap().iter().find_map(|op| match op {
            TestOp::CreateNode { id: n, kind } if *n == id => Some(kind.clone()),
            _ => None,
        })
    }

    /// Every `start_node` call with the kind of node started, in call order.
    pub fn started_nodes(&self) -> Vec<(NodeId, NodeKind, f64)> {
        let ops = self.ops.lock().unwrap();
        ops.iter()
            .filter_map(|op| match op {
                TestOp::StartNode { id, at } => {
                    let kind = ops.iter().find_map(|o| match o {
                        TestOp::CreateNode { id: n, kind } if n == id => Some(kind.clone()),
                        _ => None,
                    })?;
                    Some((*id, kind, *at))
                }
                _ => None,
            })
            .collect()
    }

    /// Latest stop time requested for a node.
    pub fn stop_time(&self, id: NodeId) -> Option<f64> {
        self.ops.lock().unwrap().iter().rev().find_map(|op| match op {
            TestOp::StopNode { id: n, at } if *n == id => Some(*at),
            _ => None,
        })
    }

    /// Evaluate a parameter's value at audio time `t`.
    pub fn param_value_at(&self, id: NodeId, param: &str, t: f64) -> Option<f32> {
        self.timelines
            .lock()
            .unwrap()
            .get(&(id, param.to_string()))
            .map(|tl| tl.value_at(t))
    }

    pub fn is_connected(&self, from: NodeId, to: NodeId) -> bool {
        self.edges.lock().unwrap().contains(&(from, to))
    }

    /// Nodes `from` currently feeds.
    pub fn outputs_of(&self, from: NodeId) -> Vec<NodeId> {
        let mut out: Vec<NodeId> = self
            .edges
            .lock()
            .unwrap()
            .iter()
            .filter(|(f, _)| *f == from)
            .map(|(_, t)| *t)
            .collect();
        out.sort_unstable();
        out
    }

    pub fn set_peak(&self, id: NodeId, peak: f32) {
        self.peaks.lock().unwrap().insert(id, peak);
    }

    /// Simulate the render side reporting that a node finished.
    pub fn end_node(&self, id: NodeId) {
        self.ended.lock().unwrap().push(id);
    }

    fn record(&self, op: TestOp) {
        self.ops.lock().unwrap().push(op);
    }
}

impl Default for TestBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioBackend for TestBackend {
    fn current_time(&self) -> f64 {
        *self.clock.lock().unwrap()
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn create_node(&self, id: NodeId, kind: &NodeKind) -> BackendResult {
        let mut timelines = self.timelines.lock().unwrap();
        for (param, value) in kind.initial_params() {
            timelines.insert((id, param.to_string()), ParamTimeline::new(value));
        }
        drop(timelines);
        self.record(TestOp::CreateNode {
            id,
            kind: kind.clone(),
        });
        Ok(())
    }

    fn free_node(&self, id: NodeId) -> BackendResult {
        self.edges
            .lock()
            .unwrap()
            .retain(|(from, to)| *from != id && *to != id);
        self.record(TestOp::FreeNode(id));
        Ok(())
    }

    fn connect(&self, from: NodeId, to: NodeId) -> BackendResult {
        self.edges.lock().unwrap().insert((from, to));
        self.record(TestOp::Connect(from, to));
        Ok(())
    }

    fn disconnect(&self, from: NodeId, to: NodeId) -> BackendResult {
        self.edges.lock().unwrap().remove(&(from, to));
        self.record(TestOp::Disconnect(from, to));
        Ok(())
    }

    fn set_param(&self, id: NodeId, param: &str, value: f32) -> BackendResult {
        let now = self.current_time();
        self.timelines
            .lock()
            .unwrap()
            .entry((id, param.to_string()))
            .or_insert_with(|| ParamTimeline::new(value))
            .push(ParamEvent::SetValue { value, at: now });
        self.record(TestOp::SetParam {
            id,
            param: param.to_string(),
            value,
        });
        Ok(())
    }

    fn schedule_param(&self, id: NodeId, param: &str, event: ParamEvent) -> BackendResult {
        self.timelines
            .lock()
            .unwrap()
            .entry((id, param.to_string()))
            .or_insert_with(|| ParamTimeline::new(event.value()))
            .push(event);
        self.record(TestOp::ScheduleParam {
            id,
            param: param.to_string(),
            event,
        });
        Ok(())
    }

    fn cancel_scheduled(&self, id: NodeId, param: &str, from: f64) -> BackendResult {
        if let Some(tl) = self.timelines.lock().unwrap().get_mut(&(id, param.to_string())) {
            tl.cancel_from(from);
        }
        self.record(TestOp::CancelScheduled {
            id,
            param: param.to_string(),
            from,
        });
        Ok(())
    }

    fn start_node(&self, id: NodeId, at: f64) -> BackendResult {
        self.record(TestOp::StartNode { id, at });
        Ok(())
    }

    fn stop_node(&self, id: NodeId, at: f64) -> BackendResult {
        self.record(TestOp::StopNode { id, at });
        Ok(())
    }

    fn load_buffer(&self, id: BufferId, buffer: &SampleBuffer) -> BackendResult {
        self.record(TestOp::LoadBuffer {
            id,
            frames: buffer.frames(),
        });
        Ok(())
    }

    fn free_buffer(&self, id: BufferId) -> BackendResult {
        self.record(TestOp::FreeBuffer(id));
        Ok(())
    }

    fn set_impulse_response(&self, id: NodeId, ir: &ImpulseResponse) -> BackendResult {
        self.record(TestOp::SetImpulseResponse {
            id,
            frames: ir.frames(),
        });
        Ok(())
    }

    fn read_peak(&self, id: NodeId) -> Option<f32> {
        self.peaks.lock().unwrap().get(&id).copied()
    }

    fn drain_ended(&self) -> Vec<NodeId> {
        std::mem::take(&mut *self.ended.lock().unwrap())
    }
}

/// Wraps `Arc<TestBackend>` to implement `AudioBackend` so the engine can
/// own a `Box<dyn AudioBackend>` while tests retain an `Arc` for assertions.
pub struct SharedTestBackend(pub Arc<TestBackend>);

impl AudioBackend for SharedTestBackend {
    fn current_time(&self) -> f64 {
        self.0.current_time()
    }
    fn sample_rate(&self) -> u32 {
        self.0.sample_rate()
    }
    fn create_node(&self, id: NodeId, kind: &NodeKind) -> BackendResult {
        self.0.create_node(id, kind)
    }
    fn free_node(&self, id: NodeId) -> BackendResult {
        self.0.free_node(id)
    }
    fn connect(&self, from: NodeId, to: NodeId) -> BackendResult {
        self.0.connect(from, to)
    }
    fn disconnect(&self, from: NodeId, to: NodeId) -> BackendResult {
        self.0.disconnect(from, to)
    }
    fn set_param(&self, id: NodeId, param: &str, value: f32) -> BackendResult {
        self.0.set_param(id, param, value)
    }
    fn schedule_param(&self, id: NodeId, param: &str, event: ParamEvent) -> BackendResult {
        self.0.schedule_param(id, param, event)
    }
    fn cancel_scheduled(&self, id: NodeId, param: &str, from: f64) -> BackendResult {
        self.0.cancel_scheduled(id, param, from)
    }
    fn start_node(&self, id: NodeId, at: f64) -> BackendResult {
        self.0.start_node(id, at)
    }
    fn stop_node(&self, id: NodeId, at: f64) -> BackendResult {
        self.0.stop_node(id, at)
    }
    fn load_buffer(&self, id: BufferId, buffer: &SampleBuffer) -> BackendResult {
        self.0.load_buffer(id, buffer)
    }
    fn free_buffer(&self, id: BufferId) -> BackendResult {
        self.0.free_buffer(id)
    }
    fn set_impulse_response(&self, id: NodeId, ir: &ImpulseResponse) -> BackendResult {
        self.0.set_impulse_response(id, ir)
    }
    fn read_peak(&self, id: NodeId) -> Option<f32> {
        self.0.read_peak(id)
    }
    fn drain_ended(&self) -> Vec<NodeId> {
        self.0.drain_ended()
    }
}

// ─── NullBackend ────────────────────────────────────────────────────

/// A no-op backend that silently succeeds. Its clock follows wall time so
/// the transport still advances when no render server is attached.
pub struct NullBackend {
    started: std::time::Instant,
}

impl NullBackend {
    pub fn new() -> Self {
        Self {
            started: std::time::Instant::now(),
        }
    }
}

impl Default for NullBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioBackend for NullBackend {
    fn current_time(&self) -> f64 { self.started.elapsed().as_secs_f64() }
    fn sample_rate(&self) -> u32 { 48_000 }
    fn create_node(&self, _: NodeId, _: &NodeKind) -> BackendResult { Ok(()) }
    fn free_node(&self, _: NodeId) -> BackendResult { Ok(()) }
    fn connect(&self, _: NodeId, _: NodeId) -> BackendResult { Ok(()) }
    fn disconnect(&self, _: NodeId, _: NodeId) -> BackendResult { Ok(()) }
    fn set_param(&self, _: NodeId, _: &str, _: f32) -> BackendResult { Ok(()) }
    fn schedule_param(&self, _: NodeId, _: &str, _: ParamEvent) -> BackendResult { Ok(()) }
    fn cancel_scheduled(&self, _: NodeId, _: &str, _: f64) -> BackendResult { Ok(()) }
    fn start_node(&self, _: NodeId, _: f64) -> BackendResult { Ok(()) }
    fn stop_node(&self, _: NodeId, _: f64) -> BackendResult { Ok(()) }
    fn load_buffer(&self, _: BufferId, _: &SampleBuffer) -> BackendResult { Ok(()) }
    fn free_buffer(&self, _: BufferId) -> BackendResult { Ok(()) }
    fn set_impulse_response(&self, _: NodeId, _: &ImpulseResponse) -> BackendResult { Ok(()) }
    fn read_peak(&self, _: NodeId) -> Option<f32> { None }
    fn drain_ended(&self) -> Vec<NodeId> { Vec::new() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_evaluates_scheduled_ramps() {
        let backend = TestBackend::new();
        backend.create_node(5, &NodeKind::Gain { gain: 1.0 }).unwrap();
        backend
            .schedule_param(5, "gain", ParamEvent::SetValue { value: 1.0, at: 1.0 })
            .unwrap();
        backend
            .schedule_param(5, "gain", ParamEvent::LinearRampTo { value: 0.0, end: 2.0 })
            .unwrap();
        assert_eq!(backend.param_value_at(5, "gain", 0.5), Some(1.0));
        let mid = backend.param_value_at(5, "gain", 1.5).unwrap();
        assert!((mid - 0.5).abs() < 1e-6);
        assert_eq!(backend.param_value_at(5, "gain", 3.0), Some(0.0));
    }

    #[test]
    fn test_backend_tracks_edges() {
        let backend = TestBackend::new();
        backend.connect(1, 2).unwrap();
        backend.connect(1, 3).unwrap();
        assert_eq!(backend.outputs_of(1), vec![2, 3]);
        backend.free_node(2).unwrap();
        assert_eq!(backend.outputs_of(1), vec![3]);
    }

    #[test]
    fn clock_moves_only_when_told() {
        let backend = TestBackend::new();
        assert_eq!(backend.current_time(), 0.0);
        backend.advance(0.25);
        backend.advance(0.25);
        assert!((backend.current_time() - 0.5).abs() < 1e-12);
        backend.set_time(10.0);
        assert_eq!(backend.current_time(), 10.0);
    }
}
