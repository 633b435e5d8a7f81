use crate::{InstrumentState, PatternAction};

pub(super) fn reduce(action: &PatternAction, instruments: &mut InstrumentState) -> bool {
    match action {
        PatternAction::CycleStep {
            instrument,
            row,
            step,
        } => instruments
            .instrument_mut(*instrument)
            .and_then(|slot| slot.pattern.cycle_step(*row, *step))
            .is_some(),
        PatternAction::SetStep {
            instrument,
            row,
            step,
            velocity,
        } => match instruments.instrument_mut(*instrument) {
            Some(slot) => slot.pattern.set_step(*row, *step, *velocity),
            None => false,
        },
        PatternAction::ClearRow(instrument, row) => match instruments.instrument_mut(*instrument) {
            Some(slot) if !slot.pattern.is_row_empty(*row) => {
                slot.pattern.clear_row(*row);
                true
            }
            _ => false,
        },
        PatternAction::LoadRow(instrument, row, steps) => match instruments.instrument_mut(*instrument) {
            Some(slot) => slot.pattern.load_row(*row, steps),
            None => false,
        },
        PatternAction::SetRowActive(instrument, row, active) => {
            match instruments.instrument_mut(*instrument) {
                Some(slot) if slot.rows.is_active(*row) != *active => {
                    slot.rows.set(*row, *active);
                    true
                }
                _ => false,
            }
        }
    }
}
