//! Uniform grid: a square lattice of entities that pulse together on
//! amplitude/beats, with no per-band differentiation.

use crate::entity::{AudioState, Entity};

use super::{Pattern, PatternConfig};

pub struct PulseGrid;

impl Pattern for PulseGrid {
    fn name(&self) -> &'static str {
        "pulse_grid"
    }

    fn render(&self, audio: &AudioState, config: &PatternConfig) -> Vec<Entity> {
        let count = super::clamp_entity_count(config.entity_count) as usize;
        let side = (count as f64).sqrt().ceil() as usize;
        let pulse = if audio.is_beat {
            config.beat_boost * audio.beat_intensity.max(0.3)
        } else {
            1.0 + audio.amplitude * 0.2
        };

        (0..count)
            .map(|i| {
                let row = i / side;
                let col = i % side;
                let x = (col as f64 + 0.5) / side as f64;
                let y = (row as f64 + 0.5) / side as f64;
                let z = 0.5;

                let scale = (config.base_scale * pulse).clamp(0.0, config.max_scale);

                let mut entity = Entity {
                    id: format!("pulse_grid-{i}"),
                    x,
                    y,
                    z,
                    scale,
                    rotation: None,
                    brightness: 15,
                    interpolation: 30,
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
    use crate::protocol_constants::BAND_COUNT;

    fn audio(amplitude: f64, is_beat: bool) -> AudioState {
        AudioState {
            bands: [amplitude; BAND_COUNT],
            amplitude,
            is_beat,
            beat_intensity: if is_beat { 1.0 } else { 0.0 },
            frame_counter: 0,
        }
    }

    #[test]
    fn lays_out_a_square_ish_grid() {
        let config = PatternConfig {
            entity_count: 16,
            ..PatternConfig::default()
        };
        let entities = PulseGrid.render(&audio(0.1, false), &config);
        assert_eq!(entities.len(), 16);
    }

    #[test]
    fn every_entity_pulses_identically_on_beat() {
        let config = PatternConfig::default();
        let entities = PulseGrid.render(&audio(0.5, true), &config);
        let first_scale = entities[0].scale;
        assert!(entities.iter().all(|e| e.scale == first_scale));
    }
}
