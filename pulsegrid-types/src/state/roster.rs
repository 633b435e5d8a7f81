//! The fixed instrument roster and its choke groups.

use crate::InstrumentId;

pub const NUM_INSTRUMENTS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstrumentDef {
    pub id: InstrumentId,
    pub key: &'static str,
    pub label: &'static str,
}

pub const ROSTER: [InstrumentDef; NUM_INSTRUMENTS] = [
    InstrumentDef { id: InstrumentId::KICK, key: "kick", label: "Kick" },
    InstrumentDef { id: InstrumentId::SNARE, key: "snare", label: "Snare" },
    InstrumentDef { id: InstrumentId::CLAP, key: "clap", label: "Clap" },
    InstrumentDef { id: InstrumentId::RIM, key: "rim", label: "Rim" },
    InstrumentDef { id: InstrumentId::HIHAT, key: "hihat", label: "Closed Hat" },
    InstrumentDef { id: InstrumentId::OPEN_HIHAT, key: "openhihat", label: "Open Hat" },
    InstrumentDef { id: InstrumentId::TOM, key: "tom", label: "Tom" },
    InstrumentDef { id: InstrumentId::COWBELL, key: "cowbell", label: "Cowbell" },
];

/// Instrument -> instruments whose ringing voices it cuts when it fires.
pub const CHOKE_GROUPS: &[(InstrumentId, &[InstrumentId])] =
    &[(InstrumentId::HIHAT, &[InstrumentId::OPEN_HIHAT])];

/// Instruments choked when `id` fires. Empty for most of the roster.
pub fn choke_targets(id: InstrumentId) -> &'static [InstrumentId] {
    CHOKE_GROUPS
        .iter()
        .find(|(source, _)| *source == id)
        .map(|(_, targets)| *targets)
        .unwrap_or(&[])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roster_ids_match_positions() {
        for (idx, def) in ROSTER.iter().enumerate() {
            assert_eq!(def.id.index(), idx);
        }
    }

    #[test]
    fn closed_hat_chokes_open_hat_only() {
        assert_eq!(choke_targets(InstrumentId::HIHAT), &[InstrumentId::OPEN_HIHAT]);
        assert!(choke_targets(InstrumentId::OPEN_HIHAT).is_empty());
        assert!(choke_targets(InstrumentId::KICK).is_empty());
    }
}
