//! Pure state-mutation reducers for pulsegrid.
//!
//! The main thread and the control thread both call [`reduce_action`] on
//! their own copy of the state, so the two copies stay identical without
//! sharing memory.
//!
//! Reducers clamp out-of-range values and reject cap violations as no-ops.
//! They do not touch the audio graph.

mod bus;
mod mixer;
mod pattern;
mod session;

use crate::{DomainAction, InstrumentState, SessionState};

/// Apply an action's state mutations to the given state.
/// Returns true if the state changed.
pub fn reduce_action(
    action: &DomainAction,
    instruments: &mut InstrumentState,
    session: &mut SessionState,
) -> bool {
    match action {
        DomainAction::Pattern(a) => pattern::reduce(a, instruments),
        DomainAction::Mixer(a) => mixer::reduce(a, instruments),
        DomainAction::Swing(a) => mixer::reduce_swing(a, instruments, session),
        DomainAction::Fx(a) => mixer::reduce_fx(a, instruments),
        DomainAction::Sidechain(a) => bus::reduce_sidechain(a, session),
        DomainAction::SumBus(a) => bus::reduce_sum_bus(a, session),
        DomainAction::Session(a) => session::reduce(a, session),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::*;

    fn state() -> (InstrumentState, SessionState) {
        (InstrumentState::new(), SessionState::default())
    }

    #[test]
    fn cap_violation_is_a_noop() {
        let (mut inst, mut session) = state();
        for target in 1..=MAX_SC_LINKS as u8 {
            let action = DomainAction::Sidechain(SidechainAction::SetLink {
                target: InstrumentId::new(target).unwrap(),
                trigger: InstrumentId::KICK,
                enabled: true,
            });
            assert!(reduce_action(&action, &mut inst, &mut session));
        }
        let before = session.clone();
        let over = DomainAction::Sidechain(SidechainAction::SetLink {
            target: InstrumentId::COWBELL,
            trigger: InstrumentId::SNARE,
            enabled: true,
        });
        assert!(!reduce_action(&over, &mut inst, &mut session));
        assert_eq!(session, before);
    }

    #[test]
    fn two_copies_stay_in_sync() {
        let (mut a_inst, mut a_session) = state();
        let (mut b_inst, mut b_session) = state();
        let actions = vec![
            DomainAction::Pattern(PatternAction::CycleStep {
                instrument: InstrumentId::KICK,
                row: Row::A,
                step: 0,
            }),
            DomainAction::Mixer(MixerAction::SetVolume(InstrumentId::SNARE, -6.0)),
            DomainAction::Swing(SwingAction::SetType(InstrumentId::HIHAT, SwingType::Sixteenth)),
            DomainAction::Fx(FxAction::SetReverbWet(InstrumentId::CLAP, 35.0)),
            DomainAction::SumBus(SumBusAction::SetLimiter(false)),
            DomainAction::Session(SessionAction::SetBpm(96)),
        ];
        for action in &actions {
            reduce_action(action, &mut a_inst, &mut a_session);
            reduce_action(action, &mut b_inst, &mut b_session);
        }
        assert_eq!(a_inst, b_inst);
        assert_eq!(a_session, b_session);
        assert_eq!(a_session.bpm, 96);
        assert!(!a_session.sum_bus.limiter_enabled);
    }
}
