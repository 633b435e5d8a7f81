use crate::{SessionAction, SessionState};

pub(super) fn reduce(action: &SessionAction, session: &mut SessionState) -> bool {
    match action {
        SessionAction::SetBpm(bpm) => {
            let before = session.bpm;
            session.set_bpm(*bpm);
            session.bpm != before
        }
        SessionAction::SetMetronome(mode) => {
            session.metronome = *mode;
            true
        }
        SessionAction::SetMetronomeLevel(level) => {
            session.set_metronome_level(*level);
            true
        }
        SessionAction::SetPack(pack) => {
            if session.pack == *pack {
                return false;
            }
            session.pack = pack.clone();
            true
        }
        SessionAction::SetRecording(on) => {
            session.recording = *on;
            true
        }
    }
}
