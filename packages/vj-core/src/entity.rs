//! Shared value types for audio frames and pattern-engine entities.

use serde::{Deserialize, Serialize};

use crate::protocol_constants::BAND_COUNT;

/// A single DJ's latest audio frame, sanitized at the trust boundary (C1).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioFrame {
    pub bands: [f64; BAND_COUNT],
    pub peak: f64,
    pub beat: bool,
    pub beat_intensity: f64,
    pub bpm: f64,
    pub tempo_confidence: f64,
    pub beat_phase: f64,
    pub instant_bass: f64,
    pub instant_kick: bool,
    pub seq: u64,
    pub ts: Option<f64>,
}

impl Default for AudioFrame {
    fn default() -> Self {
        Self {
            bands: [0.0; BAND_COUNT],
            peak: 0.0,
            beat: false,
            beat_intensity: 0.0,
            bpm: 120.0,
            tempo_confidence: 0.0,
            beat_phase: 0.0,
            instant_bass: 0.0,
            instant_kick: false,
            seq: 0,
            ts: None,
        }
    }
}

impl AudioFrame {
    /// Decays bands/peak/beat_intensity by `factor`, used for the fallback
    /// audio source when no DJ is active (visualization fades out smoothly).
    pub fn decay(&mut self, factor: f64) {
        for b in self.bands.iter_mut() {
            *b *= factor;
        }
        self.peak *= factor;
        self.beat_intensity *= factor;
        self.beat = false;
        self.instant_kick = false;
    }
}

/// Input to the pattern engine (C7): the current audio state plus frame counter.
#[derive(Debug, Clone, Copy)]
pub struct AudioState {
    pub bands: [f64; BAND_COUNT],
    pub amplitude: f64,
    pub is_beat: bool,
    pub beat_intensity: f64,
    pub frame_counter: u64,
}

/// One addressable visual element produced by a pattern (C7) or forwarded
/// to the renderer/browsers (post sanitization, post effects).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub scale: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rotation: Option<f64>,
    pub brightness: u8,
    pub interpolation: u8,
    pub glow: bool,
    pub visible: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub material: Option<String>,
}

impl Entity {
    /// Re-clamps every bounded field to its documented range. Used after
    /// every effect deformation (spec invariant 4: entity bounds).
    pub fn reclamp(&mut self) {
        self.x = self.x.clamp(0.0, 1.0);
        self.y = self.y.clamp(0.0, 1.0);
        self.z = self.z.clamp(0.0, 1.0);
        self.scale = self.scale.clamp(0.0, 4.0);
        if let Some(r) = self.rotation {
            self.rotation = Some(r.clamp(0.0, 360.0));
        }
    }
}
