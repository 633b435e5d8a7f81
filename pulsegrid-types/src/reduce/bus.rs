use crate::{SessionState, SidechainAction, SumBusAction, SumBusState};

pub(super) fn reduce_sidechain(action: &SidechainAction, session: &mut SessionState) -> bool {
    let matrix = &mut session.sidechain;
    match action {
        SidechainAction::SetLink {
            target,
            trigger,
            enabled,
        } => matrix.set_link(*target, *trigger, *enabled),
        SidechainAction::SetAmount(target, db) => {
            matrix.duck_mut(*target).set_amount_db(*db);
            true
        }
        SidechainAction::SetAttack(target, ms) => {
            matrix.duck_mut(*target).set_attack_ms(*ms);
            true
        }
        SidechainAction::SetRelease(target, ms) => {
            matrix.duck_mut(*target).set_release_ms(*ms);
            true
        }
    }
}

pub(super) fn reduce_sum_bus(action: &SumBusAction, session: &mut SessionState) -> bool {
    let bus = &mut session.sum_bus;
    let before = bus.clone();
    match action {
        SumBusAction::SetThreshold(db) => bus.compressor.set_threshold_db(*db),
        SumBusAction::SetRatio(r) => bus.compressor.set_ratio(*r),
        SumBusAction::SetAttack(s) => bus.compressor.set_attack(*s),
        SumBusAction::SetRelease(s) => bus.compressor.set_release(*s),
        SumBusAction::SetKnee(db) => bus.compressor.set_knee_db(*db),
        SumBusAction::SetLimiter(on) => bus.limiter_enabled = *on,
        SumBusAction::SetMakeup(db) => bus.set_makeup_db(*db),
        SumBusAction::SetHighpass(hz) => bus.highpass_hz = SumBusState::clamp_cutoff(*hz),
        SumBusAction::SetLowpass(hz) => bus.lowpass_hz = SumBusState::clamp_cutoff(*hz),
    }
    *bus != before
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InstrumentId;

    #[test]
    fn disabling_missing_link_reports_no_change() {
        let mut session = SessionState::default();
        let off = SidechainAction::SetLink {
            target: InstrumentId::SNARE,
            trigger: InstrumentId::KICK,
            enabled: false,
        };
        assert!(!reduce_sidechain(&off, &mut session));
    }

    #[test]
    fn makeup_clamps() {
        let mut session = SessionState::default();
        assert!(reduce_sum_bus(&SumBusAction::SetMakeup(40.0), &mut session));
        assert_eq!(session.sum_bus.makeup_db, 24.0);
        assert!(!reduce_sum_bus(&SumBusAction::SetMakeup(f32::NAN), &mut session));
    }
}
