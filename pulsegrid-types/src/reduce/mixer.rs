use crate::{FxAction, InstrumentState, MixerAction, SessionState, SwingAction};

pub(super) fn reduce(action: &MixerAction, instruments: &mut InstrumentState) -> bool {
    match action {
        MixerAction::Select(id) => {
            if instruments.instrument(*id).is_none() {
                return false;
            }
            instruments.select(*id);
            true
        }
        MixerAction::SetVolume(id, db) => {
            let Some(slot) = instruments.instrument_mut(*id) else {
                return false;
            };
            let before = slot.strip.volume_db;
            slot.strip.set_volume_db(*db);
            slot.strip.volume_db != before
        }
        MixerAction::ToggleMute(id) => match instruments.instrument_mut(*id) {
            Some(slot) => {
                slot.strip.muted = !slot.strip.muted;
                true
            }
            None => false,
        },
        MixerAction::SetMute(id, muted) => match instruments.instrument_mut(*id) {
            Some(slot) if slot.strip.muted != *muted => {
                slot.strip.muted = *muted;
                true
            }
            _ => false,
        },
        MixerAction::SetPitch(id, semitones) => {
            let Some(slot) = instruments.instrument_mut(*id) else {
                return false;
            };
            let before = slot.strip.pitch;
            slot.strip.set_pitch(*semitones);
            slot.strip.pitch != before
        }
        MixerAction::ToggleSolo => {
            instruments.toggle_solo();
            true
        }
    }
}

pub(super) fn reduce_swing(
    action: &SwingAction,
    instruments: &mut InstrumentState,
    session: &mut SessionState,
) -> bool {
    match action {
        SwingAction::SetType(id, kind) => match instruments.instrument_mut(*id) {
            Some(slot) => {
                slot.swing.kind = *kind;
                true
            }
            None => false,
        },
        SwingAction::SetAmount(id, amount) => match instruments.instrument_mut(*id) {
            Some(slot) if amount.is_finite() => {
                slot.swing.amount = amount.clamp(0.0, 100.0);
                true
            }
            _ => false,
        },
        SwingAction::SetGlobal(amount) => {
            let before = session.global_swing;
            session.set_global_swing(*amount);
            session.global_swing != before
        }
    }
}

pub(super) fn reduce_fx(action: &FxAction, instruments: &mut InstrumentState) -> bool {
    let id = match action {
        FxAction::SetDelayMode(id, _)
        | FxAction::SetDelayWet(id, _)
        | FxAction::SetReverbMode(id, _)
        | FxAction::SetReverbWet(id, _) => *id,
    };
    let Some(slot) = instruments.instrument_mut(id) else {
        return false;
    };
    match action {
        FxAction::SetDelayMode(_, mode) => slot.delay.mode = *mode,
        FxAction::SetDelayWet(_, wet) => slot.delay.set_wet(*wet),
        FxAction::SetReverbMode(_, mode) => slot.reverb.mode = *mode,
        FxAction::SetReverbWet(_, wet) => slot.reverb.set_wet(*wet),
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DelayMode, InstrumentId, MAX_VOLUME_DB};

    #[test]
    fn delay_mode_switch_keeps_one_send() {
        let mut inst = InstrumentState::new();
        reduce_fx(&FxAction::SetDelayMode(InstrumentId::KICK, DelayMode::N16), &mut inst);
        reduce_fx(&FxAction::SetDelayWet(InstrumentId::KICK, 50.0), &mut inst);
        reduce_fx(&FxAction::SetDelayMode(InstrumentId::KICK, DelayMode::N8), &mut inst);
        let levels = inst.instruments[0].delay.send_levels();
        assert_eq!(levels.iter().filter(|l| **l > 0.0).count(), 1);
        assert_eq!(levels[DelayMode::N8 as usize], 0.5);
    }

    #[test]
    fn volume_clamped_and_nan_ignored() {
        let mut inst = InstrumentState::new();
        assert!(reduce(&MixerAction::SetVolume(InstrumentId::TOM, 99.0), &mut inst));
        assert_eq!(inst.instruments[6].strip.volume_db, MAX_VOLUME_DB);
        assert!(!reduce(&MixerAction::SetVolume(InstrumentId::TOM, f32::NAN), &mut inst));
    }

    #[test]
    fn swing_amount_clamps() {
        let mut inst = InstrumentState::new();
        let mut session = SessionState::default();
        reduce_swing(&SwingAction::SetAmount(InstrumentId::RIM, 130.0), &mut inst, &mut session);
        assert_eq!(inst.instruments[3].swing.amount, 100.0);
        assert!(reduce_swing(&SwingAction::SetGlobal(150.0), &mut inst, &mut session));
        assert_eq!(session.global_swing, 150.0);
    }
}
