//! Circular layout: entities sit evenly spaced around a ring that slowly
//! rotates with `frame_counter`, bulging outward on amplitude/beats.

use std::f64::consts::PI;

use crate::entity::{AudioState, Entity};

use super::{Pattern, PatternConfig};

/// Ring revolutions per frame (one full turn roughly every 10 seconds at 60Hz).
const ROTATION_PER_FRAME: f64 = 2.0 * PI / 600.0;

pub struct Radial;

impl Pattern for Radial {
    fn name(&self) -> &'static str {
        "radial"
    }

    fn render(&self, audio: &AudioState, config: &PatternConfig) -> Vec<Entity> {
        let count = super::clamp_entity_count(config.entity_count) as usize;
        let boost = if audio.is_beat {
            config.beat_boost * audio.beat_intensity.max(0.3)
        } else {
            1.0
        };
        let rotation_offset = (audio.frame_counter as f64) * ROTATION_PER_FRAME;

        (0..count)
            .map(|i| {
                let theta = rotation_offset + (i as f64 / count as f64) * 2.0 * PI;
                let radius = 0.5 * (1.0 + audio.amplitude * 0.4);

                let x = 0.5 + radius * theta.cos() * 0.5;
                let y = 0.5 + radius * theta.sin() * 0.5;
                let z = 0.5 + audio.amplitude * 0.2;

                let scale = (config.base_scale * boost).clamp(0.0, config.max_scale);

                let mut entity = Entity {
                    id: format!("radial-{i}"),
                    x,
                    y,
                    z,
                    scale,
                    rotation: Some((theta.to_degrees()).rem_euclid(360.0)),
                    brightness: 12,
                    interpolation: 60,
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

    fn audio(frame_counter: u64, amplitude: f64, is_beat: bool) -> AudioState {
        AudioState {
            bands: [amplitude; BAND_COUNT],
            amplitude,
            is_beat,
            beat_intensity: if is_beat { 0.8 } else { 0.0 },
            frame_counter,
        }
    }

    #[test]
    fn entities_stay_within_the_unit_cube() {
        let config = PatternConfig::default();
        let entities = Radial.render(&audio(0, 0.9, true), &config);
        for e in &entities {
            assert!((0.0..=1.0).contains(&e.x));
            assert!((0.0..=1.0).contains(&e.y));
            assert!((0.0..=1.0).contains(&e.z));
        }
    }

    #[test]
    fn ring_rotates_as_frame_counter_advances() {
        let config = PatternConfig::default();
        let first = Radial.render(&audio(0, 0.3, false), &config);
        let later = Radial.render(&audio(300, 0.3, false), &config);
        assert_ne!(first[0].rotation, later[0].rotation);
    }
}
