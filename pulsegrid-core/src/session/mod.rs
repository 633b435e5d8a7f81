//! Session persistence: one JSON document holding tempo, mix, routing and
//! both pattern rows of every instrument.
//!
//! Loading never fails on content. Malformed documents fall back to the
//! caller's defaults, and each malformed field falls back on its own.

mod decode;
mod encode;

use std::io;
use std::path::Path;

use pulsegrid_types::{InstrumentState, SessionState};

/// Version written into new session files.
pub const FORMAT_VERSION: u64 = 1;

/// Serialize the session and instrument state to pretty-printed JSON.
pub fn encode_session(session: &SessionState, instruments: &InstrumentState) -> String {
    let value = encode::encode(session, instruments);
    serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string())
}

/// Decode a session document on top of `defaults`. Live-record arming is
/// never restored.
pub fn decode_session(json: &str, defaults: &SessionState) -> (SessionState, InstrumentState) {
    decode::decode(json, defaults)
}

/// Write atomically: the previous file stays intact if the write fails.
pub fn save_session(
    path: &Path,
    session: &SessionState,
    instruments: &InstrumentState,
) -> io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, encode_session(session, instruments))?;
    std::fs::rename(&tmp, path)?;
    log::info!(target: "session", "saved {}", path.display());
    Ok(())
}

/// Only I/O errors are reported; content problems are logged and defaulted.
pub fn load_session(path: &Path, defaults: &SessionState) -> io::Result<(SessionState, InstrumentState)> {
    let contents = std::fs::read_to_string(path)?;
    log::info!(target: "session", "loaded {}", path.display());
    Ok(decode_session(&contents, defaults))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulsegrid_types::*;

    fn edited() -> (SessionState, InstrumentState) {
        let mut session = SessionState::default();
        session.bpm = 97;
        session.metronome = MetronomeMode::All;
        session.global_swing = 150.0;
        session.pack = PackId::new("808");
        session.sum_bus.limiter_enabled = false;
        session.sum_bus.highpass_hz = Some(40.0);
        session.sidechain.set_link(InstrumentId::SNARE, InstrumentId::KICK, true);
        session.sidechain.duck_mut(InstrumentId::SNARE).set_amount_db(9.0);

        let mut instruments = InstrumentState::new();
        let hat = instruments.instrument_mut(InstrumentId::HIHAT).unwrap();
        hat.pattern.set_step(Row::B, 3, 0.75);
        hat.rows.set(Row::B, true);
        hat.strip.set_volume_db(-6.0);
        hat.strip.set_pitch(-3);
        hat.swing.kind = SwingType::Sixteenth;
        hat.delay.mode = DelayMode::N3_4;
        hat.delay.set_wet(30.0);
        hat.reverb.mode = ReverbMode::Long;
        instruments.select(InstrumentId::HIHAT);
        (session, instruments)
    }

    #[test]
    fn save_then_load_restores_everything() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sets").join("groove.json");
        let (mut session, instruments) = edited();
        session.recording = true;
        save_session(&path, &session, &instruments).unwrap();

        let (loaded, loaded_instruments) = load_session(&path, &SessionState::default()).unwrap();
        session.recording = false;
        assert_eq!(loaded, session);
        assert_eq!(loaded_instruments, instruments);
    }

    #[test]
    fn garbage_yields_defaults() {
        let defaults = SessionState::default();
        for doc in ["", "not json", "[1,2,3]", "{\"bpm\": "] {
            let (session, instruments) = decode_session(doc, &defaults);
            assert_eq!(session, defaults);
            assert_eq!(instruments, InstrumentState::new());
        }
    }

    #[test]
    fn bad_fields_fall_back_one_by_one() {
        let doc = r#"{
            "bpm": 500,
            "metronome": "sometimes",
            "metronome_level": 0.4,
            "global_swing": "lots",
            "sum_bus": { "ratio": 0.5, "makeup_db": 3.0, "lowpass_hz": -1 },
            "instruments": {
                "kick": {
                    "rows": { "A": [1, 0, 0, 0, 1, 0, 0, 0, 1, 0, 0, 0, 1, 0, 0, 9], "B": [1, 1] },
                    "volume_db": 1e9,
                    "pitch": 5,
                    "swing": { "type": "7", "amount": 80 },
                    "delay": { "mode": "1/16", "wet": 250 }
                },
                "gong": { "muted": true }
            }
        }"#;
        let (session, instruments) = decode_session(doc, &SessionState::default());
        assert_eq!(session.bpm, DEFAULT_BPM);
        assert_eq!(session.metronome, MetronomeMode::Off);
        assert_eq!(session.metronome_level, 0.4);
        assert_eq!(session.global_swing, 100.0);
        assert_eq!(session.sum_bus.compressor.ratio, CompressorParams::default().ratio);
        assert_eq!(session.sum_bus.makeup_db, 3.0);
        assert_eq!(session.sum_bus.lowpass_hz, None);

        let kick = instruments.instrument(InstrumentId::KICK).unwrap();
        assert_eq!(kick.pattern.velocity(Row::A, 4), 1.0);
        assert_eq!(kick.pattern.velocity(Row::A, 15), 0.0);
        assert!(kick.pattern.is_row_empty(Row::B));
        assert_eq!(kick.strip.volume_db, 0.0);
        assert_eq!(kick.strip.pitch, 5);
        assert_eq!(kick.swing.kind, SwingType::None);
        assert_eq!(kick.swing.amount, 80.0);
        assert_eq!(kick.delay.mode, DelayMode::N16);
        assert_eq!(kick.delay.wet, 0.0);
    }

    #[test]
    fn sidechain_cap_applies_on_load() {
        let links: Vec<String> = ["snare", "clap", "rim", "hihat", "openhihat", "tom", "cowbell"]
            .iter()
            .map(|t| format!(r#"{{ "target": "{}", "trigger": "kick" }}"#, t))
            .collect();
        let doc = format!(
            r#"{{ "sidechain": {{ "links": [{}, {{ "target": "kick", "trigger": "kick" }}] }} }}"#,
            links.join(",")
        );
        let (session, _) = decode_session(&doc, &SessionState::default());
        assert_eq!(session.sidechain.link_count(), MAX_SC_LINKS);
        assert!(!session.sidechain.is_linked(InstrumentId::COWBELL, InstrumentId::KICK));
        assert!(!session.sidechain.is_linked(InstrumentId::KICK, InstrumentId::KICK));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_session(&dir.path().join("nope.json"), &SessionState::default()).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
