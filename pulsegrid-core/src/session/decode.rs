//! Lenient session decoding. Every field is validated on its own; a bad
//! value is logged and left at its default instead of failing the load.

use std::ops::RangeInclusive;

use serde_json::{Map, Value};

use pulsegrid_types::{
    DelayMode, InstrumentId, InstrumentSlot, InstrumentState, MetronomeMode, PackId, ReverbMode,
    Row, SessionState, SumBusState, SwingType, MAX_BPM, MAX_GLOBAL_SWING, MAX_PITCH,
    MAX_VOLUME_DB, MIN_BPM, MIN_PITCH, MIN_VOLUME_DB, NUM_INSTRUMENTS, STEPS_PER_BAR,
};

use super::FORMAT_VERSION;

type Object = Map<String, Value>;

pub(super) fn decode(json: &str, base: &SessionState) -> (SessionState, InstrumentState) {
    let mut session = base.clone();
    session.recording = false;
    let mut instruments = InstrumentState::new();

    let root = match serde_json::from_str::<Value>(json) {
        Ok(Value::Object(root)) => root,
        Ok(_) => {
            log::warn!(target: "session", "session root is not an object, using defaults");
            return (session, instruments);
        }
        Err(e) => {
            log::warn!(target: "session", "unreadable session ({}), using defaults", e);
            return (session, instruments);
        }
    };

    if let Some(version) = root.get("version").and_then(Value::as_u64) {
        if version > FORMAT_VERSION {
            log::warn!(
                target: "session",
                "session format {} is newer than {}, reading known fields only",
                version,
                FORMAT_VERSION
            );
        }
    }

    decode_session_fields(&root, &mut session);
    if let Some(bus) = object(&root, "sum_bus", "") {
        decode_sum_bus(bus, &mut session.sum_bus);
    }
    if let Some(sc) = object(&root, "sidechain", "") {
        decode_sidechain(sc, &mut session);
    }
    if let Some(slots) = object(&root, "instruments", "") {
        for (key, value) in slots {
            let Some(id) = InstrumentId::from_key(key) else {
                log::warn!(target: "session", "unknown instrument {:?} ignored", key);
                continue;
            };
            let Value::Object(fields) = value else {
                log::warn!(target: "session", "instruments.{}: expected an object", key);
                continue;
            };
            if let Some(slot) = instruments.instrument_mut(id) {
                decode_slot(fields, slot);
            }
        }
    }
    if let Some(id) = parsed(&root, "selected", "", InstrumentId::from_key) {
        instruments.selected = id;
    }
    instruments.solo_saved_mutes = solo_mutes(&root);

    (session, instruments)
}

fn decode_session_fields(root: &Object, session: &mut SessionState) {
    if let Some(bpm) = integer(root, "bpm", "", MIN_BPM as i64..=MAX_BPM as i64) {
        session.bpm = bpm as u16;
    }
    if let Some(mode) = parsed(root, "metronome", "", MetronomeMode::parse) {
        session.metronome = mode;
    }
    if let Some(level) = number(root, "metronome_level", "", 0.0..=1.0) {
        session.metronome_level = level;
    }
    if let Some(swing) = number(root, "global_swing", "", 0.0..=MAX_GLOBAL_SWING) {
        session.global_swing = swing;
    }
    if let Some(pack) = string(root, "pack", "").filter(|p| !p.is_empty()) {
        session.pack = PackId::new(pack);
    }
}

fn decode_sum_bus(bus: &Object, state: &mut SumBusState) {
    const CTX: &str = "sum_bus.";
    let comp = &mut state.compressor;
    if let Some(v) = number(bus, "threshold_db", CTX, -60.0..=0.0) {
        comp.threshold_db = v;
    }
    if let Some(v) = number(bus, "ratio", CTX, 1.0..=20.0) {
        comp.ratio = v;
    }
    if let Some(v) = number(bus, "attack", CTX, 0.0..=1.0) {
        comp.attack = v;
    }
    if let Some(v) = number(bus, "release", CTX, 0.0..=1.0) {
        comp.release = v;
    }
    if let Some(v) = number(bus, "knee_db", CTX, 0.0..=40.0) {
        comp.knee_db = v;
    }
    if let Some(v) = boolean(bus, "limiter", CTX) {
        state.limiter_enabled = v;
    }
    if let Some(v) = number(bus, "makeup_db", CTX, -12.0..=24.0) {
        state.makeup_db = v;
    }
    state.highpass_hz = cutoff(bus, "highpass_hz");
    state.lowpass_hz = cutoff(bus, "lowpass_hz");
}

fn cutoff(bus: &Object, key: &str) -> Option<f32> {
    match bus.get(key) {
        None | Some(Value::Null) => None,
        Some(v) => {
            let hz = v.as_f64().map(|hz| hz as f32);
            let clamped = SumBusState::clamp_cutoff(hz);
            if clamped.is_none() {
                log::warn!(target: "session", "sum_bus.{}: invalid cutoff {}, filter off", key, v);
            }
            clamped
        }
    }
}

fn decode_sidechain(sc: &Object, session: &mut SessionState) {
    match sc.get("links") {
        None | Some(Value::Array(_)) => {}
        Some(other) => invalid("sidechain.", "links", other),
    }
    if let Some(links) = sc.get("links").and_then(Value::as_array) {
        for link in links {
            let ids = link.as_object().and_then(|l| {
                let target = l.get("target")?.as_str().and_then(InstrumentId::from_key)?;
                let trigger = l.get("trigger")?.as_str().and_then(InstrumentId::from_key)?;
                Some((target, trigger))
            });
            match ids {
                Some((target, trigger)) => {
                    if !session.sidechain.set_link(target, trigger, true) {
                        log::warn!(
                            target: "session",
                            "sidechain link {} <- {} rejected",
                            target,
                            trigger
                        );
                    }
                }
                None => log::warn!(target: "session", "sidechain.links: malformed entry {}", link),
            }
        }
    }
    if let Some(duck) = object(sc, "duck", "sidechain.") {
        for (key, value) in duck {
            let (Some(id), Value::Object(fields)) = (InstrumentId::from_key(key), value) else {
                log::warn!(target: "session", "sidechain.duck.{}: ignored", key);
                continue;
            };
            let ctx = format!("sidechain.duck.{}.", key);
            let settings = session.sidechain.duck_mut(id);
            if let Some(v) = number(fields, "amount_db", &ctx, 0.0..=24.0) {
                settings.amount_db = v;
            }
            if let Some(v) = number(fields, "attack_ms", &ctx, 1.0..=100.0) {
                settings.attack_ms = v;
            }
            if let Some(v) = number(fields, "release_ms", &ctx, 10.0..=1000.0) {
                settings.release_ms = v;
            }
        }
    }
}

fn decode_slot(fields: &Object, slot: &mut InstrumentSlot) {
    let ctx = format!("instruments.{}.", slot.id.key());

    if let Some(rows) = object(fields, "rows", &ctx) {
        for row in Row::ALL {
            if let Some(steps) = velocities(rows, row.as_str(), &ctx) {
                slot.pattern.load_row(row, &steps);
            }
        }
    }
    if let Some(active) = object(fields, "active", &ctx) {
        for row in Row::ALL {
            if let Some(on) = boolean(active, row.as_str(), &ctx) {
                slot.rows.set(row, on);
            }
        }
    }
    if let Some(db) = number(fields, "volume_db", &ctx, MIN_VOLUME_DB..=MAX_VOLUME_DB) {
        slot.strip.volume_db = db;
    }
    if let Some(muted) = boolean(fields, "muted", &ctx) {
        slot.strip.muted = muted;
    }
    if let Some(pitch) = integer(fields, "pitch", &ctx, MIN_PITCH as i64..=MAX_PITCH as i64) {
        slot.strip.pitch = pitch as i8;
    }
    if let Some(swing) = object(fields, "swing", &ctx) {
        let ctx = format!("{}swing.", ctx);
        if let Some(kind) = parsed(swing, "type", &ctx, SwingType::parse) {
            slot.swing.kind = kind;
        }
        if let Some(amount) = number(swing, "amount", &ctx, 0.0..=100.0) {
            slot.swing.amount = amount;
        }
    }
    if let Some(delay) = object(fields, "delay", &ctx) {
        let ctx = format!("{}delay.", ctx);
        if let Some(mode) = parsed(delay, "mode", &ctx, DelayMode::parse) {
            slot.delay.mode = mode;
        }
        if let Some(wet) = number(delay, "wet", &ctx, 0.0..=100.0) {
            slot.delay.wet = wet;
        }
    }
    if let Some(reverb) = object(fields, "reverb", &ctx) {
        let ctx = format!("{}reverb.", ctx);
        if let Some(mode) = parsed(reverb, "mode", &ctx, ReverbMode::parse) {
            slot.reverb.mode = mode;
        }
        if let Some(wet) = number(reverb, "wet", &ctx, 0.0..=100.0) {
            slot.reverb.wet = wet;
        }
    }
}

/// A row of exactly 16 velocities. Single out-of-range steps are turned off.
fn velocities(rows: &Object, key: &str, ctx: &str) -> Option<Vec<f32>> {
    let value = rows.get(key)?;
    let Some(arr) = value.as_array().filter(|a| a.len() == STEPS_PER_BAR) else {
        log::warn!(target: "session", "{}rows.{}: expected {} steps", ctx, key, STEPS_PER_BAR);
        return None;
    };
    let mut bad = 0;
    let steps: Vec<f32> = arr
        .iter()
        .map(|v| match v.as_f64() {
            Some(x) if (0.0..=1.0).contains(&x) => x as f32,
            _ => {
                bad += 1;
                0.0
            }
        })
        .collect();
    if bad > 0 {
        log::warn!(target: "session", "{}rows.{}: {} invalid steps turned off", ctx, key, bad);
    }
    Some(steps)
}

fn solo_mutes(root: &Object) -> Option<[bool; NUM_INSTRUMENTS]> {
    let value = root.get("solo_saved_mutes")?;
    if value.is_null() {
        return None;
    }
    let parsed = serde_json::from_value::<[bool; NUM_INSTRUMENTS]>(value.clone()).ok();
    if parsed.is_none() {
        log::warn!(target: "session", "solo_saved_mutes: invalid, solo released");
    }
    parsed
}

// ── field readers ─────────────────────────────────────────────────
// Absent keys return None quietly; present but invalid keys log first.

fn invalid(ctx: &str, key: &str, value: &Value) {
    log::warn!(target: "session", "{}{}: invalid value {}, using default", ctx, key, value);
}

fn object<'a>(obj: &'a Object, key: &str, ctx: &str) -> Option<&'a Object> {
    let value = obj.get(key)?;
    let found = value.as_object();
    if found.is_none() {
        invalid(ctx, key, value);
    }
    found
}

fn number(obj: &Object, key: &str, ctx: &str, range: RangeInclusive<f32>) -> Option<f32> {
    let value = obj.get(key)?;
    let found = value
        .as_f64()
        .map(|v| v as f32)
        .filter(|v| v.is_finite() && range.contains(v));
    if found.is_none() {
        invalid(ctx, key, value);
    }
    found
}

fn integer(obj: &Object, key: &str, ctx: &str, range: RangeInclusive<i64>) -> Option<i64> {
    let value = obj.get(key)?;
    let found = value.as_i64().filter(|v| range.contains(v));
    if found.is_none() {
        invalid(ctx, key, value);
    }
    found
}

fn boolean(obj: &Object, key: &str, ctx: &str) -> Option<bool> {
    let value = obj.get(key)?;
    let found = value.as_bool();
    if found.is_none() {
        invalid(ctx, key, value);
    }
    found
}

fn string<'a>(obj: &'a Object, key: &str, ctx: &str) -> Option<&'a str> {
    let value = obj.get(key)?;
    let found = value.as_str();
    if found.is_none() {
        invalid(ctx, key, value);
    }
    found
}

fn parsed<T>(obj: &Object, key: &str, ctx: &str, parse: impl Fn(&str) -> Option<T>) -> Option<T> {
    let value = obj.get(key)?;
    let found = value.as_str().and_then(parse);
    if found.is_none() {
        invalid(ctx, key, value);
    }
    found
}
