//! Audio-response presets (§3 expansion), grounded in
//! `vj_server/config.py`'s `AudioConfig`/`PRESETS`.

use serde::{Deserialize, Serialize};

/// Tunable parameters controlling how aggressively the server reacts to
/// incoming audio. Seeded by a named preset via [`AudioConfig::preset`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AudioConfig {
    pub attack: f64,
    pub release: f64,
    pub beat_threshold: f64,
    pub agc_max_gain: f64,
    pub beat_sensitivity: f64,
    pub bass_weight: f64,
    pub band_sensitivity: [f64; 5],
    pub auto_calibrate: bool,
}

impl AudioConfig {
    /// Looks up a named preset, falling back to `"auto"` for unknown names
    /// (matches the original's `get_preset` fallback semantics).
    pub fn preset(name: &str) -> Self {
        match name {
            "edm" => Self {
                attack: 0.7,
                release: 0.15,
                beat_threshold: 1.1,
                agc_max_gain: 10.0,
                beat_sensitivity: 1.5,
                bass_weight: 0.85,
                band_sensitivity: [1.5, 0.8, 0.9, 1.2, 1.0],
                auto_calibrate: false,
            },
            "chill" => Self {
                attack: 0.25,
                release: 0.05,
                beat_threshold: 1.6,
                agc_max_gain: 6.0,
                beat_sensitivity: 0.7,
                bass_weight: 0.5,
                band_sensitivity: [0.9, 1.0, 1.1, 1.2, 1.3],
                auto_calibrate: false,
            },
            "rock" => Self {
                attack: 0.5,
                release: 0.12,
                beat_threshold: 1.3,
                agc_max_gain: 8.0,
                beat_sensitivity: 1.2,
                bass_weight: 0.65,
                band_sensitivity: [1.2, 1.0, 1.0, 0.9, 0.8],
                auto_calibrate: false,
            },
            "hiphop" => Self {
                attack: 0.6,
                release: 0.1,
                beat_threshold: 1.2,
                agc_max_gain: 9.0,
                beat_sensitivity: 1.3,
                bass_weight: 0.8,
                band_sensitivity: [1.4, 0.9, 1.0, 1.1, 0.9],
                auto_calibrate: false,
            },
            "classical" => Self {
                attack: 0.2,
                release: 0.04,
                beat_threshold: 1.8,
                agc_max_gain: 5.0,
                beat_sensitivity: 0.5,
                bass_weight: 0.4,
                band_sensitivity: [0.8, 1.0, 1.2, 1.3, 1.4],
                auto_calibrate: false,
            },
            _ => Self::auto(),
        }
    }

    pub fn auto() -> Self {
        Self {
            attack: 0.35,
            release: 0.08,
            beat_threshold: 1.3,
            agc_max_gain: 8.0,
            beat_sensitivity: 1.0,
            bass_weight: 0.7,
            band_sensitivity: [1.0, 1.0, 1.0, 1.0, 1.0],
            auto_calibrate: true,
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self::auto()
    }
}

/// Names of every recognized preset, in table order.
pub const PRESET_NAMES: &[&str] = &["auto", "edm", "chill", "rock", "hiphop", "classical"];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_preset_falls_back_to_auto() {
        assert_eq!(AudioConfig::preset("dubstep"), AudioConfig::auto());
    }

    #[test]
    fn edm_preset_matches_documented_values() {
        let edm = AudioConfig::preset("edm");
        assert_eq!(edm.attack, 0.7);
        assert_eq!(edm.beat_sensitivity, 1.5);
        assert_eq!(edm.band_sensitivity, [1.5, 0.8, 0.9, 1.2, 1.0]);
        assert!(!edm.auto_calibrate);
    }

    #[test]
    fn every_documented_preset_name_resolves() {
        for name in PRESET_NAMES {
            let _ = AudioConfig::preset(name);
        }
    }
}
