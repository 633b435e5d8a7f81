//! Instrument collection state.

use serde::{Deserialize, Serialize};

use super::fx::{DelayMode, FxSend, ReverbMode};
use super::mixer::ChannelStrip;
use super::pattern::{Pattern, RowActivity};
use super::roster::NUM_INSTRUMENTS;
use super::swing::SwingSettings;
use crate::InstrumentId;

/// Everything the engine knows about one roster instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentSlot {
    pub id: InstrumentId,
    pub pattern: Pattern,
    pub rows: RowActivity,
    pub strip: ChannelStrip,
    pub swing: SwingSettings,
    pub delay: FxSend<DelayMode>,
    pub reverb: FxSend<ReverbMode>,
}

impl InstrumentSlot {
    pub fn new(id: InstrumentId) -> Self {
        Self {
            id,
            pattern: Pattern::default(),
            rows: RowActivity::default(),
            strip: ChannelStrip::default(),
            swing: SwingSettings::default(),
            delay: FxSend::default(),
            reverb: FxSend::default(),
        }
    }
}

/// The fixed roster. `instruments[id.index()]` is always the slot for `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentState {
    pub instruments: Vec<InstrumentSlot>,
    pub selected: InstrumentId,
    /// Mute state saved when solo was engaged; `Some` while solo is active.
    #[serde(default)]
    pub solo_saved_mutes: Option<[bool; NUM_INSTRUMENTS]>,
}

impl Default for InstrumentState {
    fn default() -> Self {
        Self::new()
    }
}

impl InstrumentState {
    pub fn new() -> Self {
        Self {
            instruments: InstrumentId::all().map(InstrumentSlot::new).collect(),
            selected: InstrumentId::KICK,
            solo_saved_mutes: None,
        }
    }

    pub fn instrument(&self, id: InstrumentId) -> Option<&InstrumentSlot> {
        self.instruments.get(id.index())
    }

    pub fn instrument_mut(&mut self, id: InstrumentId) -> Option<&mut InstrumentSlot> {
        self.instruments.get_mut(id.index())
    }

    pub fn selected_instrument(&self) -> Option<&InstrumentSlot> {
        self.instrument(self.selected)
    }

    pub fn is_solo_active(&self) -> bool {
        self.solo_saved_mutes.is_some()
    }

    /// Engage solo on the selected instrument, or release it and restore the
    /// mutes that were in place before.
    pub fn toggle_solo(&mut self) {
        match self.solo_saved_mutes.take() {
            Some(saved) => {
                for (slot, muted) in self.instruments.iter_mut().zip(saved) {
                    slot.strip.muted = muted;
                }
            }
            None => {
                let mut saved = [false; NUM_INSTRUMENTS];
                for (dst, slot) in saved.iter_mut().zip(&self.instruments) {
                    *dst = slot.strip.muted;
                }
                self.solo_saved_mutes = Some(saved);
                self.apply_solo_mutes();
            }
        }
    }

    /// Change selection. While solo is active the solo follows the selection.
    pub fn select(&mut self, id: InstrumentId) {
        self.selected = id;
        if self.is_solo_active() {
            self.apply_solo_mutes();
        }
    }

    fn apply_solo_mutes(&mut self) {
        let selected = self.selected;
        for slot in &mut self.instruments {
            slot.strip.muted = slot.id != selected;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slots_are_indexed_by_id() {
        let state = InstrumentState::new();
        assert_eq!(state.instruments.len(), NUM_INSTRUMENTS);
        for id in InstrumentId::all() {
            assert_eq!(state.instrument(id).map(|s| s.id), Some(id));
        }
    }

    #[test]
    fn solo_mutes_others_and_restores() {
        let mut state = InstrumentState::new();
        state.instrument_mut(InstrumentId::TOM).unwrap().strip.muted = true;
        state.select(InstrumentId::SNARE);
        state.toggle_solo();
        for slot in &state.instruments {
            assert_eq!(slot.strip.muted, slot.id != InstrumentId::SNARE);
        }
        state.toggle_solo();
        for slot in &state.instruments {
            assert_eq!(slot.strip.muted, slot.id == InstrumentId::TOM);
        }
        assert!(!state.is_solo_active());
    }

    #[test]
    fn solo_follows_selection() {
        let mut state = InstrumentState::new();
        state.toggle_solo();
        state.select(InstrumentId::CLAP);
        for slot in &state.instruments {
            assert_eq!(slot.strip.muted, slot.id != InstrumentId::CLAP);
        }
        state.toggle_solo();
        assert!(state.instruments.iter().all(|s| !s.strip.muted));
    }
}
