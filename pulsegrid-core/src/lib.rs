//! # pulsegrid-core
//!
//! Application glue for the pulsegrid step sequencer: configuration,
//! session files, sample packs and the dispatcher that keeps the
//! main-thread state and the control thread in step.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use pulsegrid_core::config::Config;
//! use pulsegrid_core::dispatch::{AppState, LocalDispatcher};
//! use pulsegrid_core::samples::{DirectorySource, PackLoader};
//! use pulsegrid_audio::{AudioHandle, OscBackend};
//!
//! let config = Config::load();
//! let state = AppState { session: config.session_defaults(), ..Default::default() };
//! let audio = AudioHandle::new(config.transport());
//! let loader = PackLoader::new(Arc::new(DirectorySource::new(config.packs_dir())));
//! let mut dispatcher = LocalDispatcher::new(state, audio, Some(loader));
//! dispatcher.audio().attach_backend(Box::new(OscBackend::connect(&config.server_addr(), 48_000)?));
//! dispatcher.audio().play();
//! loop {
//!     dispatcher.poll();
//! }
//! ```
//!
//! ## Module Overview
//!
//! - [`config`]: embedded `config.toml` merged with the user's copy
//! - [`session`]: JSON session files with per-field fallback on load
//! - [`samples`]: WAV sample source and background pack loader
//! - [`dispatch`]: `AppState` and `LocalDispatcher`

pub mod config;
pub mod dispatch;
pub mod samples;
pub mod session;

pub use pulsegrid_types as types;
