use serde::{Deserialize, Serialize};

/// Lowest level the sum-bus meter reports.
pub const METER_FLOOR_DB: f32 = -100.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompressorParams {
    pub threshold_db: f32,
    pub ratio: f32,
    /// Seconds.
    pub attack: f32,
    /// Seconds.
    pub release: f32,
    pub knee_db: f32,
}

impl Default for CompressorParams {
    fn default() -> Self {
        Self {
            threshold_db: -18.0,
            ratio: 4.0,
            attack: 0.003,
            release: 0.25,
            knee_db: 6.0,
        }
    }
}

impl CompressorParams {
    pub fn set_threshold_db(&mut self, db: f32) {
        if db.is_finite() {
            self.threshold_db = db.clamp(-60.0, 0.0);
        }
    }

    pub fn set_ratio(&mut self, ratio: f32) {
        if ratio.is_finite() {
            self.ratio = ratio.clamp(1.0, 20.0);
        }
    }

    pub fn set_attack(&mut self, secs: f32) {
        if secs.is_finite() {
            self.attack = secs.clamp(0.0, 1.0);
        }
    }

    pub fn set_release(&mut self, secs: f32) {
        if secs.is_finite() {
            self.release = secs.clamp(0.0, 1.0);
        }
    }

    pub fn set_knee_db(&mut self, db: f32) {
        if db.is_finite() {
            self.knee_db = db.clamp(0.0, 40.0);
        }
    }
}

/// Master processing chain settings: glue compressor, brickwall limiter,
/// makeup gain and the optional tone filters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SumBusState {
    pub compressor: CompressorParams,
    pub limiter_enabled: bool,
    pub makeup_db: f32,
    #[serde(default)]
    pub highpass_hz: Option<f32>,
    #[serde(default)]
    pub lowpass_hz: Option<f32>,
}

impl Default for SumBusState {
    fn default() -> Self {
        Self {
            compressor: CompressorParams::default(),
            limiter_enabled: true,
            makeup_db: 0.0,
            highpass_hz: None,
            lowpass_hz: None,
        }
    }
}

impl SumBusState {
    pub fn set_makeup_db(&mut self, db: f32) {
        if db.is_finite() {
            self.makeup_db = db.clamp(-12.0, 24.0);
        }
    }

    /// Set or clear a tone filter cutoff. Cutoffs are kept within 20 Hz-20 kHz.
    pub fn clamp_cutoff(hz: Option<f32>) -> Option<f32> {
        hz.filter(|v| v.is_finite() && *v > 0.0)
            .map(|v| v.clamp(20.0, 20_000.0))
    }
}

/// Convert a linear peak to dBFS, floored at [`METER_FLOOR_DB`].
pub fn peak_to_dbfs(peak: f32) -> f32 {
    if peak.is_nan() || peak <= 0.0 {
        return METER_FLOOR_DB;
    }
    (20.0 * peak.log10()).max(METER_FLOOR_DB)
}
