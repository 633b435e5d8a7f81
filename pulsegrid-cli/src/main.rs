//! Headless pulsegrid runner: loads a session, connects to an OSC render
//! server and plays the pattern.

use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use pulsegrid_audio::{AudioBackend, AudioFeedback, AudioHandle, NullBackend, OscBackend};
use pulsegrid_core::config::Config;
use pulsegrid_core::dispatch::{AppState, LocalDispatcher};
use pulsegrid_core::samples::{DirectorySource, PackLoader};
use pulsegrid_types::{DomainAction, InstrumentId, PatternAction, Row};

const SAMPLE_RATE: u32 = 48_000;
const POLL_INTERVAL: Duration = Duration::from_millis(16);

#[derive(Debug, Default, PartialEq)]
struct Args {
    verbose: bool,
    seconds: Option<f64>,
    server: Option<String>,
    offline: bool,
    session: Option<PathBuf>,
}

fn parse_args(args: &[String]) -> Result<Args, String> {
    let mut parsed = Args::default();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--verbose" | "-v" => parsed.verbose = true,
            "--offline" => parsed.offline = true,
            "--seconds" => {
                let value = iter.next().ok_or("--seconds needs a value")?;
                let secs: f64 = value
                    .parse()
                    .map_err(|_| format!("invalid --seconds {:?}", value))?;
                if !secs.is_finite() || secs <= 0.0 {
                    return Err(format!("invalid --seconds {:?}", value));
                }
                parsed.seconds = Some(secs);
            }
            "--server" => {
                let value = iter.next().ok_or("--server needs an address")?;
                parsed.server = Some(value.clone());
            }
            other if other.starts_with('-') => return Err(format!("unknown option {}", other)),
            path => parsed.session = Some(PathBuf::from(path)),
        }
    }
    Ok(parsed)
}

fn init_logging(verbose: bool) {
    use simplelog::*;

    let log_level = if verbose { LevelFilter::Debug } else { LevelFilter::Warn };

    let log_path = dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("pulsegrid")
        .join("pulsegrid.log");

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let log_file = match File::create(&log_path) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("cannot create {}: {}", log_path.display(), e);
            return;
        }
    };

    if let Err(e) = WriteLogger::init(log_level, simplelog::Config::default(), log_file) {
        eprintln!("logger init failed: {}", e);
        return;
    }

    log::info!("pulsegrid starting (log level: {:?})", log_level);
}

/// Four on the floor with offbeat hats, for runs without a session file.
fn demo_actions() -> Vec<DomainAction> {
    let mut actions = Vec::new();
    for step in (0..16).step_by(4) {
        actions.push(DomainAction::Pattern(PatternAction::SetStep {
            instrument: InstrumentId::KICK,
            row: Row::A,
            step,
            velocity: 1.0,
        }));
        actions.push(DomainAction::Pattern(PatternAction::SetStep {
            instrument: InstrumentId::HIHAT,
            row: Row::A,
            step: step + 2,
            velocity: 0.6,
        }));
    }
    actions
}

fn main() {
    let raw: Vec<String> = std::env::args().skip(1).collect();
    let args = match parse_args(&raw) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{}", e);
            eprintln!("usage: pulsegrid [--verbose] [--seconds N] [--server ADDR] [--offline] [SESSION.json]");
            std::process::exit(2);
        }
    };
    init_logging(args.verbose);

    let config = Config::load();
    let defaults = config.session_defaults();

    let backend: Box<dyn AudioBackend> = if args.offline {
        Box::new(NullBackend::new())
    } else {
        let addr = args.server.clone().unwrap_or_else(|| config.server_addr());
        match OscBackend::connect(&addr, SAMPLE_RATE) {
            Ok(backend) => Box::new(backend),
            Err(e) => {
                eprintln!("cannot reach render server at {}: {}", addr, e);
                std::process::exit(1);
            }
        }
    };

    let audio = AudioHandle::new(config.transport());
    let loader = PackLoader::new(Arc::new(DirectorySource::new(config.packs_dir())));
    let state = AppState {
        session: defaults.clone(),
        ..Default::default()
    };
    let mut dispatcher = LocalDispatcher::new(state, audio, Some(loader));
    dispatcher.audio().attach_backend(backend);

    match &args.session {
        Some(path) => {
            if let Err(e) = dispatcher.load(path, &defaults) {
                eprintln!("cannot load {}: {}", path.display(), e);
                std::process::exit(1);
            }
        }
        None => {
            for action in demo_actions() {
                dispatcher.dispatch(action);
            }
        }
    }

    dispatcher.audio().play();
    let started = Instant::now();
    loop {
        for fb in dispatcher.poll() {
            if let AudioFeedback::SampleMissing { instrument } = fb {
                log::debug!(target: "audio::samples", "{} silent: no buffer", instrument);
            }
        }
        if let Some(limit) = args.seconds {
            if started.elapsed().as_secs_f64() >= limit {
                break;
            }
        }
        thread::sleep(POLL_INTERVAL);
    }
    dispatcher.audio().stop();
    log::info!("pulsegrid exiting");
}
