use serde::{Deserialize, Serialize};

use crate::db_to_gain;

pub const MIN_VOLUME_DB: f32 = -60.0;
pub const MAX_VOLUME_DB: f32 = 6.0;
pub const MIN_PITCH: i8 = -12;
pub const MAX_PITCH: i8 = 12;

/// Per-instrument channel strip: post-fader volume, mute and pitch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChannelStrip {
    pub volume_db: f32,
    pub muted: bool,
    /// Semitone offset applied to the sample playback rate.
    pub pitch: i8,
}

impl Default for ChannelStrip {
    fn default() -> Self {
        Self {
            volume_db: 0.0,
            muted: false,
            pitch: 0,
        }
    }
}

impl ChannelStrip {
    pub fn set_volume_db(&mut self, db: f32) {
        if db.is_finite() {
            self.volume_db = db.clamp(MIN_VOLUME_DB, MAX_VOLUME_DB);
        }
    }

    pub fn set_pitch(&mut self, semitones: i32) {
        self.pitch = semitones.clamp(MIN_PITCH as i32, MAX_PITCH as i32) as i8;
    }

    /// Linear gain of the post fader; zero while muted.
    pub fn post_gain(&self) -> f32 {
        if self.muted {
            0.0
        } else {
            db_to_gain(self.volume_db)
        }
    }

    pub fn playback_rate(&self) -> f64 {
        2f64.powf(self.pitch as f64 / 12.0)
    }
}
