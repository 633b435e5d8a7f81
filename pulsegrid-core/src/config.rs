use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use pulsegrid_audio::TransportConfig;
use pulsegrid_types::{MetronomeMode, PackId, SessionState, MAX_BPM, MAX_GLOBAL_SWING, MIN_BPM};

const DEFAULT_CONFIG: &str = include_str!("../config.toml");
const DEFAULT_SERVER_ADDR: &str = "127.0.0.1:57110";

#[derive(Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    defaults: DefaultsConfig,
    #[serde(default)]
    transport: TransportSection,
    #[serde(default)]
    samples: SamplesConfig,
    #[serde(default)]
    server: ServerConfig,
}

#[derive(Deserialize, Default)]
struct DefaultsConfig {
    bpm: Option<u16>,
    metronome: Option<String>,
    pack: Option<String>,
    global_swing: Option<f32>,
}

#[derive(Deserialize, Default)]
struct TransportSection {
    lookahead_ms: Option<u64>,
    schedule_ahead_ms: Option<u64>,
    lead_in_ms: Option<u64>,
    min_lead_ms: Option<u64>,
}

#[derive(Deserialize, Default)]
struct SamplesConfig {
    packs_dir: Option<PathBuf>,
}

#[derive(Deserialize, Default)]
struct ServerConfig {
    addr: Option<String>,
}

pub struct Config {
    defaults: DefaultsConfig,
    transport: TransportSection,
    samples: SamplesConfig,
    server: ServerConfig,
}

impl Config {
    /// Embedded defaults merged with `<config_dir>/pulsegrid/config.toml`.
    pub fn load() -> Self {
        match user_config_path() {
            Some(path) => Self::load_from(&path),
            None => Self::from_user_toml(None),
        }
    }

    /// Embedded defaults merged with the file at `path`, if it exists.
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::from_user_toml(None);
        }
        match std::fs::read_to_string(path) {
            Ok(contents) => {
                if let Err(e) = toml::from_str::<ConfigFile>(&contents) {
                    log::warn!(target: "config", "ignoring malformed config {}: {}", path.display(), e);
                    return Self::from_user_toml(None);
                }
                Self::from_user_toml(Some(&contents))
            }
            Err(e) => {
                log::warn!(target: "config", "could not read config {}: {}", path.display(), e);
                Self::from_user_toml(None)
            }
        }
    }

    fn from_user_toml(user: Option<&str>) -> Self {
        let mut base: ConfigFile = toml::from_str(DEFAULT_CONFIG).unwrap_or_else(|e| {
            log::error!(target: "config", "embedded config.toml is invalid: {}", e);
            ConfigFile::default()
        });
        if let Some(user) = user.and_then(|s| toml::from_str::<ConfigFile>(s).ok()) {
            merge_defaults(&mut base.defaults, user.defaults);
            merge_transport(&mut base.transport, user.transport);
            if user.samples.packs_dir.is_some() {
                base.samples.packs_dir = user.samples.packs_dir;
            }
            if user.server.addr.is_some() {
                base.server.addr = user.server.addr;
            }
        }
        Config {
            defaults: base.defaults,
            transport: base.transport,
            samples: base.samples,
            server: base.server,
        }
    }

    /// Session state for a fresh project. Out-of-range values fall back to
    /// the built-in defaults.
    pub fn session_defaults(&self) -> SessionState {
        let mut session = SessionState::default();
        if let Some(bpm) = self.defaults.bpm {
            if (MIN_BPM..=MAX_BPM).contains(&bpm) {
                session.bpm = bpm;
            } else {
                log::warn!(target: "config", "bpm {} out of range, using {}", bpm, session.bpm);
            }
        }
        if let Some(mode) = self.defaults.metronome.as_deref() {
            match MetronomeMode::parse(mode) {
                Some(mode) => session.metronome = mode,
                None => log::warn!(target: "config", "unknown metronome mode {:?}", mode),
            }
        }
        if let Some(pack) = self.defaults.pack.as_deref().filter(|p| !p.is_empty()) {
            session.pack = PackId::new(pack);
        }
        if let Some(swing) = self.defaults.global_swing {
            if swing.is_finite() && (0.0..=MAX_GLOBAL_SWING).contains(&swing) {
                session.global_swing = swing;
            } else {
                log::warn!(target: "config", "global_swing {} out of range", swing);
            }
        }
        session
    }

    pub fn transport(&self) -> TransportConfig {
        let fallback = TransportConfig::default();
        let secs = |ms: Option<u64>, default: f64| ms.map(|ms| ms as f64 / 1000.0).unwrap_or(default);
        TransportConfig {
            lookahead: self
                .transport
                .lookahead_ms
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis)
                .unwrap_or(fallback.lookahead),
            schedule_ahead_secs: secs(self.transport.schedule_ahead_ms, fallback.schedule_ahead_secs),
            lead_in_secs: secs(self.transport.lead_in_ms, fallback.lead_in_secs),
            min_lead_secs: secs(self.transport.min_lead_ms, fallback.min_lead_secs),
        }
    }

    /// Root directory holding one subdirectory per sample pack.
    pub fn packs_dir(&self) -> PathBuf {
        self.samples.packs_dir.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("pulsegrid")
                .join("packs")
        })
    }

    pub fn server_addr(&self) -> String {
        self.server
            .addr
            .clone()
            .unwrap_or_else(|| DEFAULT_SERVER_ADDR.to_string())
    }
}

fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("pulsegrid").join("config.toml"))
}

fn merge_defaults(base: &mut DefaultsConfig, user: DefaultsConfig) {
    if user.bpm.is_some() {
        base.bpm = user.bpm;
    }
    if user.metronome.is_some() {
        base.metronome = user.metronome;
    }
    if user.pack.is_some() {
        base.pack = user.pack;
    }
    if user.global_swing.is_some() {
        base.global_swing = user.global_swing;
    }
}

fn merge_transport(base: &mut TransportSection, user: TransportSection) {
    if user.lookahead_ms.is_some() {
        base.lookahead_ms = user.lookahead_ms;
    }
    if user.schedule_ahead_ms.is_some() {
        base.schedule_ahead_ms = user.schedule_ahead_ms;
    }
    if user.lead_in_ms.is_some() {
        base.lead_in_ms = user.lead_in_ms;
    }
    if user.min_lead_ms.is_some() {
        base.min_lead_ms = user.min_lead_ms;
    }
}
