//! Effect compositor (C8).
//!
//! Effects are time-bounded deformations layered onto the pattern engine's
//! entity output. Exact formulas are grounded in `vj_server.py`'s
//! `_apply_effects` (flash/strobe/pulse/wave/spiral/explode).

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::entity::Entity;
use crate::utils::now_secs;

/// Effect kinds an operator can trigger from the browser control plane.
///
/// `Blackout`/`Freeze` are toggles, not timed deformations: they never go
/// through [`ActiveEffect::apply`] and are instead tracked as flags on
/// `BroadcastState`, applied at the top of the broadcast loop (§4.11).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectKind {
    Flash,
    Strobe,
    Pulse,
    Wave,
    Spiral,
    Explode,
    Blackout,
    Freeze,
}

/// A currently-running, time-bounded effect instance.
#[derive(Debug, Clone)]
pub struct ActiveEffect {
    pub kind: EffectKind,
    pub intensity: f64,
    pub start_time: f64,
    pub duration_secs: f64,
}

impl ActiveEffect {
    pub fn trigger(kind: EffectKind, intensity: f64, duration_ms: u64) -> Self {
        Self {
            kind,
            intensity: intensity.clamp(0.0, 1.0),
            start_time: now_secs(),
            duration_secs: (duration_ms as f64 / 1000.0).max(0.001),
        }
    }

    pub fn is_expired(&self) -> bool {
        now_secs() - self.start_time >= self.duration_secs
    }

    fn progress(&self, now: f64) -> f64 {
        ((now - self.start_time) / self.duration_secs).clamp(0.0, 1.0)
    }

    /// Applies this effect's deformation to `entities` in place.
    pub fn apply(&self, entities: &mut [Entity]) {
        let now = now_secs();
        let elapsed = now - self.start_time;
        let progress = self.progress(now);
        let n = entities.len().max(1) as f64;
        let intensity = self.intensity;

        match self.kind {
            EffectKind::Flash => {
                for e in entities.iter_mut() {
                    e.scale += intensity * (1.0 - progress) * 0.5;
                    e.y += intensity * (1.0 - progress) * 0.2;
                }
            }
            EffectKind::Strobe => {
                let window_on = (elapsed * 8.0) as i64 % 2 == 0;
                if window_on {
                    for (i, e) in entities.iter_mut().enumerate() {
                        if i % 2 == 1 {
                            e.scale = 0.01;
                        }
                    }
                }
            }
            EffectKind::Pulse => {
                for e in entities.iter_mut() {
                    e.scale *= 1.0 + (elapsed * 4.0 * PI).sin() * intensity * 0.5;
                }
            }
            EffectKind::Wave => {
                for (i, e) in entities.iter_mut().enumerate() {
                    e.y += (elapsed * 3.0 + i as f64 * 2.0 * PI / n).sin() * intensity * 0.3;
                }
            }
            EffectKind::Spiral => {
                let radius = 0.3 * intensity * (1.0 - progress * 0.5);
                for (i, e) in entities.iter_mut().enumerate() {
                    let angle = elapsed * 2.0 + i as f64 * 2.0 * PI / n;
                    e.x = 0.5 + radius * angle.cos();
                    e.z = 0.5 + radius * angle.sin();
                }
            }
            EffectKind::Explode => {
                for e in entities.iter_mut() {
                    let (dx, dy, dz) = (e.x - 0.5, e.y - 0.5, e.z - 0.5);
                    let dist = (dx * dx + dy * dy + dz * dz).sqrt().max(0.001);
                    let force = intensity * (1.0 - progress) / dist * 0.3;
                    e.x += dx * force;
                    e.y += dy * force;
                    e.z += dz * force;
                    e.scale *= 1.0 + 0.5 * force;
                }
            }
            // Toggles, never pushed onto `active_effects`; `apply_all` never
            // sees them. Kept here only so this match stays exhaustive.
            EffectKind::Blackout | EffectKind::Freeze => {}
        }

        for e in entities.iter_mut() {
            e.reclamp();
        }
    }
}

/// Applies every active (non-expired) effect to `entities`, in trigger
/// order, and returns which are still running afterward.
pub fn apply_all(active: Vec<ActiveEffect>, entities: &mut [Entity]) -> Vec<ActiveEffect> {
    let mut still_running = Vec::with_capacity(active.len());
    for effect in active {
        if effect.is_expired() {
            continue;
        }
        effect.apply(entities);
        still_running.push(effect);
    }
    still_running
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_entities(n: usize) -> Vec<Entity> {
        (0..n)
            .map(|i| Entity {
                id: format!("e{i}"),
                x: 0.5,
                y: 0.5,
                z: 0.5,
                scale: 1.0,
                rotation: None,
                brightness: 15,
                interpolation: 0,
                glow: false,
                visible: true,
                material: None,
            })
            .collect()
    }

    #[test]
    fn flash_increases_scale_and_y_at_start() {
        let effect = ActiveEffect {
            kind: EffectKind::Flash,
            intensity: 1.0,
            start_time: now_secs(),
            duration_secs: 1.0,
        };
        let mut entities = sample_entities(3);
        effect.apply(&mut entities);
        assert!(entities[0].scale > 1.0);
        assert!(entities[0].y > 0.5);
    }

    #[test]
    fn strobe_hides_odd_indexed_entities_in_on_window() {
        let effect = ActiveEffect {
            kind: EffectKind::Strobe,
            intensity: 1.0,
            // elapsed ~ 0 -> (0*8) as i64 % 2 == 0 -> "on" window
            start_time: now_secs(),
            duration_secs: 1.0,
        };
        let mut entities = sample_entities(4);
        effect.apply(&mut entities);
        assert_eq!(entities[1].scale, 0.01);
        assert_eq!(entities[3].scale, 0.01);
        assert_ne!(entities[0].scale, 0.01);
    }

    #[test]
    fn every_effect_keeps_entities_within_documented_bounds() {
        for kind in [
            EffectKind::Flash,
            EffectKind::Strobe,
            EffectKind::Pulse,
            EffectKind::Wave,
            EffectKind::Spiral,
            EffectKind::Explode,
        ] {
            let effect = ActiveEffect::trigger(kind, 1.0, 500);
            let mut entities = sample_entities(8);
            effect.apply(&mut entities);
            for e in &entities {
                assert!((0.0..=1.0).contains(&e.x), "{kind:?} x out of bounds");
                assert!((0.0..=1.0).contains(&e.y), "{kind:?} y out of bounds");
                assert!((0.0..=1.0).contains(&e.z), "{kind:?} z out of bounds");
                assert!(e.scale <= 4.0, "{kind:?} scale out of bounds");
            }
        }
    }

    #[test]
    fn expired_effects_are_dropped_by_apply_all() {
        let effect = ActiveEffect {
            kind: EffectKind::Pulse,
            intensity: 1.0,
            start_time: now_secs() - 10.0,
            duration_secs: 1.0,
        };
        let mut entities = sample_entities(2);
        let still_running = apply_all(vec![effect], &mut entities);
        assert!(still_running.is_empty());
    }
}
