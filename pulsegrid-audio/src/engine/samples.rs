use std::collections::HashMap;
use std::sync::Arc;

use super::backend::BufferId;
use super::AudioEngine;
use pulsegrid_types::{InstrumentId, PackId, NUM_INSTRUMENTS};

/// Decoded sample data, interleaved.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBuffer {
    pub sample_rate: u32,
    pub channels: u16,
    pub data: Arc<[f32]>,
}

impl SampleBuffer {
    pub fn frames(&self) -> usize {
        self.data.len() / self.channels.max(1) as usize
    }

    pub fn duration_secs(&self) -> f64 {
        self.frames() as f64 / self.sample_rate.max(1) as f64
    }
}

/// Pack → instrument → uploaded buffer, plus the buffer each instrument
/// currently plays. Buffers stay uploaded for the process lifetime so
/// switching back to a pack costs nothing.
#[derive(Debug, Default)]
pub struct SampleCache {
    packs: HashMap<PackId, HashMap<InstrumentId, BufferId>>,
    durations: HashMap<BufferId, f64>,
    active: [Option<BufferId>; NUM_INSTRUMENTS],
    current: PackId,
    next_buffer_id: BufferId,
}

impl SampleCache {
    pub fn current_pack(&self) -> &PackId {
        &self.current
    }

    pub fn active(&self, instrument: InstrumentId) -> Option<BufferId> {
        self.active.get(instrument.index()).copied().flatten()
    }

    pub fn cached(&self, pack: &PackId, instrument: InstrumentId) -> Option<BufferId> {
        self.packs.get(pack).and_then(|m| m.get(&instrument)).copied()
    }

    pub fn duration(&self, buffer: BufferId) -> Option<f64> {
        self.durations.get(&buffer).copied()
    }

    fn allocate(&mut self) -> BufferId {
        let id = self.next_buffer_id;
        self.next_buffer_id += 1;
        id
    }

    fn insert(&mut self, pack: &PackId, instrument: InstrumentId, id: BufferId, duration: f64) {
        self.packs
            .entry(pack.clone())
            .or_default()
            .insert(instrument, id);
        self.durations.insert(id, duration);
        if *pack == self.current {
            self.active[instrument.index()] = Some(id);
        }
    }

    /// Make `pack` current and swap in every buffer it already has. Returns the
    /// instruments still waiting on a decode; they keep their previous buffer.
    fn select_pack(&mut self, pack: &PackId) -> Vec<InstrumentId> {
        self.current = pack.clone();
        let mut missing = Vec::new();
        for id in InstrumentId::all() {
            match self.cached(pack, id) {
                Some(buffer) => self.active[id.index()] = Some(buffer),
                None => missing.push(id),
            }
        }
        missing
    }
}

impl AudioEngine {
    /// Upload a decoded buffer and cache it for `pack`. Takes effect
    /// immediately when `pack` is the current pack.
    pub fn install_sample(
        &mut self,
        pack: &PackId,
        instrument: InstrumentId,
        buffer: &SampleBuffer,
    ) -> Result<(), String> {
        let backend = self.backend.as_ref().ok_or("Not connected")?;
        if let Some(existing) = self.samples.cached(pack, instrument) {
            log::debug!(
                target: "audio::samples",
                "{}/{} already cached as buffer {}",
                pack,
                instrument,
                existing
            );
            return Ok(());
        }
        let id = self.samples.allocate();
        backend.load_buffer(id, buffer).map_err(|e| e.to_string())?;
        self.samples
            .insert(pack, instrument, id, buffer.duration_secs());
        log::debug!(
            target: "audio::samples",
            "installed {}/{} as buffer {} ({:.3}s)",
            pack,
            instrument,
            id,
            buffer.duration_secs()
        );
        Ok(())
    }

    /// Switch the active pack. Every ringing voice is choked first, then each
    /// instrument whose buffer is already cached swaps over.
    pub fn switch_pack(&mut self, pack: &PackId) -> Vec<InstrumentId> {
        if self.samples.current_pack() == pack {
            return Vec::new();
        }
        let now = self.now();
        for id in InstrumentId::all() {
            if let Err(e) = self.choke_instrument(id, now) {
                log::warn!(target: "audio::samples", "choke on pack switch failed: {}", e);
            }
        }
        let missing = self.samples.select_pack(pack);
        log::info!(
            target: "audio::samples",
            "switched to pack {} ({} instruments awaiting decode)",
            pack,
            missing.len()
        );
        missing
    }

    pub fn sample_cache(&self) -> &SampleCache {
        &self.samples
    }
}
