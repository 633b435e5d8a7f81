//! `AudioBackend` over OSC/UDP to an external render server.
//!
//! Anything that must land at an exact audio time goes out as a timetagged
//! bundle; topology and immediate parameter changes are plain messages. The
//! audio clock is monotonic time since connect, and timetags are derived from
//! the same anchor so both sides agree on what "t" means.

use std::collections::HashMap;
use std::net::UdpSocket;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use rosc::{OscBundle, OscMessage, OscPacket, OscTime, OscType};

use super::backend::{
    AudioBackend, BackendError, BackendResult, BufferId, ImpulseResponse, NodeId, NodeKind,
    ParamEvent,
};
use super::samples::SampleBuffer;

/// Seconds between the NTP epoch (1900) and the Unix epoch.
const NTP_UNIX_OFFSET: u64 = 2_208_988_800;
/// Floats per blob when streaming sample data; keeps datagrams well under 64 KiB.
const BLOB_FLOATS: usize = 4096;

#[derive(Debug, Default)]
struct Replies {
    peaks: HashMap<NodeId, f32>,
    ended: Vec<NodeId>,
}

pub struct OscBackend {
    socket: UdpSocket,
    server_addr: String,
    sample_rate: u32,
    anchor: Instant,
    anchor_wall: f64,
    replies: Arc<Mutex<Replies>>,
    /// Checked by the receive loop between read timeouts.
    shutdown: Arc<AtomicBool>,
    recv_thread: Option<JoinHandle<()>>,
}

/// Convert an absolute wall-clock time (Unix seconds) to an OSC timetag.
fn osc_time_at(wall_secs: f64) -> OscTime {
    let secs = wall_secs.trunc() as u64 + NTP_UNIX_OFFSET;
    let frac = (wall_secs.fract() * u32::MAX as f64) as u32;
    OscTime {
        seconds: secs as u32,
        fractional: frac,
    }
}

fn int_arg(arg: Option<&OscType>) -> Option<i32> {
    match arg {
        Some(OscType::Int(v)) => Some(*v),
        Some(OscType::Float(v)) => Some(*v as i32),
        _ => None,
    }
}

fn handle_osc_packet(packet: &OscPacket, replies: &Mutex<Replies>) {
    match packet {
        OscPacket::Message(msg) => match msg.addr.as_str() {
            // /pg/peak node value
            "/pg/peak" => {
                let Some(node) = int_arg(msg.args.first()) else {
                    return;
                };
                let peak = match msg.args.get(1) {
                    Some(OscType::Float(v)) => *v,
                    _ => return,
                };
                if let Ok(mut r) = replies.lock() {
                    r.peaks.insert(node, peak);
                }
            }
            // /pg/n_end node
            "/pg/n_end" => {
                if let (Some(node), Ok(mut r)) = (int_arg(msg.args.first()), replies.lock()) {
                    r.ended.push(node);
                }
            }
            other => log::trace!(target: "audio::osc", "ignored reply {}", other),
        },
        OscPacket::Bundle(bundle) => {
            for p in &bundle.content {
                handle_osc_packet(p, replies);
            }
        }
    }
}

fn msg(addr: &str, args: Vec<OscType>) -> OscMessage {
    OscMessage {
        addr: addr.to_string(),
        args,
    }
}

fn floats_to_blob(data: &[f32]) -> Vec<u8> {
    data.iter().flat_map(|s| s.to_le_bytes()).collect()
}

/// Wire form of a node kind: a type name followed by its parameters.
fn node_args(id: NodeId, kind: &NodeKind) -> Vec<OscType> {
    let type_name = match kind {
        NodeKind::Gain { .. } => "gain".to_string(),
        NodeKind::Filter { kind, .. } => kind.as_str().to_string(),
        NodeKind::Delay { .. } => "delay".to_string(),
        NodeKind::Convolver => "convolver".to_string(),
        NodeKind::Compressor(_) => "compressor".to_string(),
        NodeKind::Meter => "meter".to_string(),
        NodeKind::Sampler { .. } => "sampler".to_string(),
        NodeKind::Click { .. } => "click".to_string(),
    };
    let mut args = vec![OscType::Int(id), OscType::String(type_name)];
    match kind {
        NodeKind::Delay { max_secs, .. } => {
            args.push(OscType::String("max".to_string()));
            args.push(OscType::Float(*max_secs));
        }
        NodeKind::Sampler { buffer, .. } => {
            args.push(OscType::String("buffer".to_string()));
            args.push(OscType::Int(*buffer as i32));
        }
        _ => {}
    }
    for (name, value) in kind.initial_params() {
        args.push(OscType::String(name.to_string()));
        args.push(OscType::Float(value));
    }
    args
}

fn event_message(id: NodeId, param: &str, event: ParamEvent) -> OscMessage {
    let (curve, value) = match event {
        ParamEvent::SetValue { value, .. } => ("set", value),
        ParamEvent::LinearRampTo { value, .. } => ("lin", value),
        ParamEvent::ExponentialRampTo { value, .. } => ("exp", value),
    };
    msg(
        "/pg/ramp",
        vec![
            OscType::Int(id),
            OscType::String(param.to_string()),
            OscType::String(curve.to_string()),
            OscType::Float(value),
            OscType::Double(event.time()),
        ],
    )
}

impl OscBackend {
    pub fn connect(server_addr: &str, sample_rate: u32) -> BackendResult<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        let recv_socket = socket.try_clone()?;
        recv_socket.set_read_timeout(Some(Duration::from_millis(50)))?;
        let replies = Arc::new(Mutex::new(Replies::default()));
        let thread_replies = Arc::clone(&replies);
        let shutdown = Arc::new(AtomicBool::new(false));
        let thread_shutdown = Arc::clone(&shutdown);

        let handle = thread::Builder::new()
            .name("pulsegrid-osc-recv".to_string())
            .spawn(move || {
                let mut buf = [0u8; 4096];
                while !thread_shutdown.load(Ordering::Relaxed) {
                    match recv_socket.recv(&mut buf) {
                        Ok(n) => {
                            if let Ok((_, packet)) = rosc::decoder::decode_udp(&buf[..n]) {
                                handle_osc_packet(&packet, &thread_replies);
                            }
                        }
                        Err(ref e)
                            if e.kind() == std::io::ErrorKind::WouldBlock
                                || e.kind() == std::io::ErrorKind::TimedOut =>
                        {
                            continue
                        }
                        Err(e) => {
                            log::debug!(target: "audio::osc", "receive loop ended: {}", e);
                            break;
                        }
                    }
                }
            })?;

        let anchor_wall = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs_f64();
        let backend = Self {
            socket,
            server_addr: server_addr.to_string(),
            sample_rate,
            anchor: Instant::now(),
            anchor_wall,
            replies,
            shutdown,
            recv_thread: Some(handle),
        };
        backend.send(msg("/pg/notify", vec![OscType::Int(1)]))?;
        log::info!(target: "audio::osc", "render server at {}", server_addr);
        Ok(backend)
    }

    /// Timetag for audio time `t`.
    fn time_tag(&self, t: f64) -> OscTime {
        osc_time_at(self.anchor_wall + t)
    }

    fn send_packet(&self, packet: &OscPacket) -> BackendResult {
        let buf = rosc::encoder::encode(packet).map_err(|e| BackendError(e.to_string()))?;
        self.socket.send_to(&buf, &self.server_addr)?;
        Ok(())
    }

    fn send(&self, message: OscMessage) -> BackendResult {
        self.send_packet(&OscPacket::Message(message))
    }

    fn send_at(&self, at: f64, messages: Vec<OscMessage>) -> BackendResult {
        self.send_packet(&OscPacket::Bundle(OscBundle {
            timetag: self.time_tag(at),
            content: messages.into_iter().map(OscPacket::Message).collect(),
        }))
    }

    /// Header message, then the interleaved data in numbered blobs.
    fn stream_floats(&self, header: OscMessage, data_addr: &str, id: i32, data: &[f32]) -> BackendResult {
        self.send(header)?;
        for (chunk_idx, chunk) in data.chunks(BLOB_FLOATS).enumerate() {
            self.send(msg(
                data_addr,
                vec![
                    OscType::Int(id),
                    OscType::Int((chunk_idx * BLOB_FLOATS) as i32),
                    OscType::Blob(floats_to_blob(chunk)),
                ],
            ))?;
        }
        Ok(())
    }
}

impl AudioBackend for OscBackend {
    fn current_time(&self) -> f64 {
        self.anchor.elapsed().as_secs_f64()
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn create_node(&self, id: NodeId, kind: &NodeKind) -> BackendResult {
        self.send(msg("/pg/new", node_args(id, kind)))
    }

    fn free_node(&self, id: NodeId) -> BackendResult {
        self.send(msg("/pg/free", vec![OscType::Int(id)]))
    }

    fn connect(&self, from: NodeId, to: NodeId) -> BackendResult {
        self.send(msg("/pg/connect", vec![OscType::Int(from), OscType::Int(to)]))
    }

    fn disconnect(&self, from: NodeId, to: NodeId) -> BackendResult {
        self.send(msg("/pg/disconnect", vec![OscType::Int(from), OscType::Int(to)]))
    }

    fn set_param(&self, id: NodeId, param: &str, value: f32) -> BackendResult {
        self.send(msg(
            "/pg/set",
            vec![
                OscType::Int(id),
                OscType::String(param.to_string()),
                OscType::Float(value),
            ],
        ))
    }

    fn schedule_param(&self, id: NodeId, param: &str, event: ParamEvent) -> BackendResult {
        // ramps are anchored by their own end time on the server
        self.send(event_message(id, param, event))
    }

    fn cancel_scheduled(&self, id: NodeId, param: &str, from: f64) -> BackendResult {
        self.send(msg(
            "/pg/cancel",
            vec![
                OscType::Int(id),
                OscType::String(param.to_string()),
                OscType::Double(from),
            ],
        ))
    }

    fn start_node(&self, id: NodeId, at: f64) -> BackendResult {
        self.send_at(at, vec![msg("/pg/start", vec![OscType::Int(id)])])
    }

    fn stop_node(&self, id: NodeId, at: f64) -> BackendResult {
        self.send_at(at, vec![msg("/pg/stop", vec![OscType::Int(id)])])
    }

    fn load_buffer(&self, id: BufferId, buffer: &SampleBuffer) -> BackendResult {
        let header = msg(
            "/pg/buffer",
            vec![
                OscType::Int(id as i32),
                OscType::Int(buffer.frames() as i32),
                OscType::Int(buffer.channels as i32),
                OscType::Int(buffer.sample_rate as i32),
            ],
        );
        self.stream_floats(header, "/pg/buffer_data", id as i32, &buffer.data)
    }

    fn free_buffer(&self, id: BufferId) -> BackendResult {
        self.send(msg("/pg/buffer_free", vec![OscType::Int(id as i32)]))
    }

    fn set_impulse_response(&self, id: NodeId, ir: &ImpulseResponse) -> BackendResult {
        let header = msg(
            "/pg/ir",
            vec![
                OscType::Int(id),
                OscType::Int(ir.frames() as i32),
                OscType::Int(ir.channels as i32),
                OscType::Int(ir.sample_rate as i32),
            ],
        );
        self.stream_floats(header, "/pg/ir_data", id, &ir.data)
    }

    fn read_peak(&self, id: NodeId) -> Option<f32> {
        self.replies.lock().ok()?.peaks.get(&id).copied()
    }

    fn drain_ended(&self) -> Vec<NodeId> {
        self.replies
            .lock()
            .map(|mut r| std::mem::take(&mut r.ended))
            .unwrap_or_default()
    }
}

impl Drop for OscBackend {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.recv_thread.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recv_packet(socket: &UdpSocket) -> OscPacket {
        let mut buf = [0u8; 65_536];
        let n = socket.recv(&mut buf).unwrap();
        rosc::decoder::decode_udp(&buf[..n]).unwrap().1
    }

    fn server() -> (UdpSocket, String) {
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        socket
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        let addr = socket.local_addr().unwrap().to_string();
        (socket, addr)
    }

    #[test]
    fn timetag_has_ntp_epoch() {
        let tag = osc_time_at(1.5);
        assert_eq!(tag.seconds as u64, NTP_UNIX_OFFSET + 1);
        assert!((tag.fractional as f64 / u32::MAX as f64 - 0.5).abs() < 1e-6);
    }

    #[test]
    fn node_args_carry_initial_params() {
        let args = node_args(
            1001,
            &NodeKind::Sampler {
                buffer: 3,
                rate: 2.0,
            },
        );
        assert_eq!(
            args,
            vec![
                OscType::Int(1001),
                OscType::String("sampler".to_string()),
                OscType::String("buffer".to_string()),
                OscType::Int(3),
                OscType::String("rate".to_string()),
                OscType::Float(2.0),
            ]
        );
    }

    #[test]
    fn start_goes_out_as_timetagged_bundle() {
        let (server, addr) = server();
        let backend = OscBackend::connect(&addr, 48_000).unwrap();
        let _notify = recv_packet(&server);
        backend.start_node(1005, 2.25).unwrap();
        match recv_packet(&server) {
            OscPacket::Bundle(bundle) => {
                assert_eq!(bundle.timetag, backend.time_tag(2.25));
                match &bundle.content[0] {
                    OscPacket::Message(m) => {
                        assert_eq!(m.addr, "/pg/start");
                        assert_eq!(m.args, vec![OscType::Int(1005)]);
                    }
                    other => panic!("unexpected {:?}", other),
                }
            }
            other => panic!("expected bundle, got {:?}", other),
        }
    }

    #[test]
    fn buffers_stream_in_chunks() {
        let (server, addr) = server();
        let backend = OscBackend::connect(&addr, 48_000).unwrap();
        let _notify = recv_packet(&server);
        let buffer = SampleBuffer {
            sample_rate: 44_100,
            channels: 1,
            data: vec![0.25; BLOB_FLOATS + 10].into(),
        };
        backend.load_buffer(7, &buffer).unwrap();
        let mut addrs = Vec::new();
        for _ in 0..3 {
            if let OscPacket::Message(m) = recv_packet(&server) {
                addrs.push(m.addr);
            }
        }
        assert_eq!(addrs, vec!["/pg/buffer", "/pg/buffer_data", "/pg/buffer_data"]);
    }

    #[test]
    fn replies_update_peaks_and_ends() {
        let replies = Mutex::new(Replies::default());
        let packet = OscPacket::Bundle(OscBundle {
            timetag: OscTime {
                seconds: 0,
                fractional: 1,
            },
            content: vec![
                OscPacket::Message(msg("/pg/peak", vec![OscType::Int(12), OscType::Float(0.5)])),
                OscPacket::Message(msg("/pg/n_end", vec![OscType::Int(1040)])),
            ],
        });
        handle_osc_packet(&packet, &replies);
        let r = replies.lock().unwrap();
        assert_eq!(r.peaks.get(&12), Some(&0.5));
        assert_eq!(r.ended, vec![1040]);
    }

    #[test]
    fn drop_joins_the_receive_thread() {
        let (server, addr) = server();
        let backend = OscBackend::connect(&addr, 48_000).unwrap();
        let _notify = recv_packet(&server);
        let replies = Arc::clone(&backend.replies);
        assert_eq!(Arc::strong_count(&replies), 3);
        let started = Instant::now();
        drop(backend);
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(Arc::strong_count(&replies), 1);
    }
}
