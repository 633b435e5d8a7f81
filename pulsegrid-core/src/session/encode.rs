use serde_json::{json, Map, Value};

use pulsegrid_types::{
    DelayMode, InstrumentSlot, InstrumentState, ReverbMode, Row, SessionState, SwingType,
};

use super::FORMAT_VERSION;

pub(super) fn encode(session: &SessionState, instruments: &InstrumentState) -> Value {
    let bus = &session.sum_bus;
    let links: Vec<Value> = session
        .sidechain
        .links()
        .map(|(target, trigger)| json!({ "target": target.key(), "trigger": trigger.key() }))
        .collect();
    let mut duck = Map::new();
    for (target, _) in session.sidechain.links() {
        let settings = session.sidechain.duck(target);
        duck.insert(
            target.key().to_string(),
            json!({
                "amount_db": settings.amount_db,
                "attack_ms": settings.attack_ms,
                "release_ms": settings.release_ms,
            }),
        );
    }
    let mut slots = Map::new();
    for slot in &instruments.instruments {
        slots.insert(slot.id.key().to_string(), encode_slot(slot));
    }

    json!({
        "version": FORMAT_VERSION,
        "bpm": session.bpm,
        "metronome": session.metronome.as_str(),
        "metronome_level": session.metronome_level,
        "global_swing": session.global_swing,
        "pack": session.pack.as_str(),
        "sum_bus": {
            "threshold_db": bus.compressor.threshold_db,
            "ratio": bus.compressor.ratio,
            "attack": bus.compressor.attack,
            "release": bus.compressor.release,
            "knee_db": bus.compressor.knee_db,
            "limiter": bus.limiter_enabled,
            "makeup_db": bus.makeup_db,
            "highpass_hz": bus.highpass_hz,
            "lowpass_hz": bus.lowpass_hz,
        },
        "sidechain": { "links": links, "duck": duck },
        "selected": instruments.selected.key(),
        "solo_saved_mutes": instruments.solo_saved_mutes,
        "instruments": slots,
    })
}

fn encode_slot(slot: &InstrumentSlot) -> Value {
    let mut rows = Map::new();
    let mut active = Map::new();
    for row in Row::ALL {
        rows.insert(row.as_str().to_string(), json!(slot.pattern.row(row).to_vec()));
        active.insert(row.as_str().to_string(), json!(slot.rows.is_active(row)));
    }
    json!({
        "rows": rows,
        "active": active,
        "volume_db": slot.strip.volume_db,
        "muted": slot.strip.muted,
        "pitch": slot.strip.pitch,
        "swing": { "type": swing_name(slot.swing.kind), "amount": slot.swing.amount },
        "delay": { "mode": delay_name(slot.delay.mode), "wet": slot.delay.wet },
        "reverb": { "mode": reverb_name(slot.reverb.mode), "wet": slot.reverb.wet },
    })
}

fn swing_name(kind: SwingType) -> &'static str {
    match kind {
        SwingType::None => "none",
        SwingType::Eighth => "8",
        SwingType::Sixteenth => "16",
        SwingType::ThirtySecond => "32",
    }
}

fn delay_name(mode: DelayMode) -> &'static str {
    match mode {
        DelayMode::N16 => "1/16",
        DelayMode::N8 => "1/8",
        DelayMode::N3_4 => "3/4",
    }
}

fn reverb_name(mode: ReverbMode) -> &'static str {
    match mode {
        ReverbMode::Short => "short",
        ReverbMode::Medium => "medium",
        ReverbMode::Long => "long",
    }
}
