//! Band-clustered bar layout: entities are split into `BAND_COUNT` groups,
//! one per frequency band, each laid out along a horizontal bar whose
//! height tracks that band's energy.

use crate::entity::{AudioState, Entity};
use crate::protocol_constants::BAND_COUNT;

use super::{Pattern, PatternConfig};

pub struct Spectrum;

impl Pattern for Spectrum {
    fn name(&self) -> &'static str {
        "spectrum"
    }

    fn render(&self, audio: &AudioState, config: &PatternConfig) -> Vec<Entity> {
        let count = super::clamp_entity_count(config.entity_count) as usize;
        let per_band = (count / BAND_COUNT).max(1);
        let boost = if audio.is_beat { config.beat_boost } else { 1.0 };

        (0..count)
            .map(|i| {
                let band_idx = (i / per_band).min(BAND_COUNT - 1);
                let slot_in_band = i % per_band;
                let energy = audio.bands[band_idx];

                let x = (band_idx as f64 + 0.5) / BAND_COUNT as f64;
                let y = (slot_in_band as f64 + 0.5) / per_band as f64 * energy.max(0.05);
                let z = 0.5;

                let scale = (config.base_scale + energy * boost * (config.max_scale - config.base_scale))
                    .clamp(0.0, config.max_scale);

                let mut entity = Entity {
                    id: format!("spectrum-{i}"),
                    x,
                    y,
                    z,
                    scale,
                    rotation: None,
                    brightness: (5.0 + energy * 10.0) as u8,
                    interpolation: 40,
                    glow: audio.is_beat,
                    visible: true,
                    material: None,
                };
                entity.reclamp();
                entity
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn audio(bands: [f64; BAND_COUNT], is_beat: bool) -> AudioState {
        AudioState {
            bands,
            amplitude: bands.iter().sum::<f64>() / BAND_COUNT as f64,
            is_beat,
            beat_intensity: if is_beat { 1.0 } else { 0.0 },
            frame_counter: 0,
        }
    }

    #[test]
    fn produces_exactly_the_configured_entity_count() {
        let config = PatternConfig {
            entity_count: 20,
            ..PatternConfig::default()
        };
        let entities = Spectrum.render(&audio([0.2; BAND_COUNT], false), &config);
        assert_eq!(entities.len(), 20);
    }

    #[test]
    fn silent_bands_still_produce_bounded_entities() {
        let config = PatternConfig::default();
        let entities = Spectrum.render(&audio([0.0; BAND_COUNT], false), &config);
        for e in &entities {
            assert!((0.0..=1.0).contains(&e.x));
            assert!((0.0..=1.0).contains(&e.y));
            assert!(e.scale <= config.max_scale);
        }
    }

    #[test]
    fn beat_boosts_scale_relative_to_no_beat() {
        let config = PatternConfig::default();
        let bands = [0.8; BAND_COUNT];
        let quiet = Spectrum.render(&audio(bands, false), &config);
        let loud = Spectrum.render(&audio(bands, true), &config);
        assert!(loud[0].scale >= quiet[0].scale);
    }
}
