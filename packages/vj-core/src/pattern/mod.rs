//! Pattern engine (C7).
//!
//! The original server's pattern bodies were authored in Lua and never
//! filtered into this codebase's source history — only the call-site
//! contract survived (`AudioState` in, `Vec<Entity>` out, keyed by a
//! `PatternConfig`). These three built-in patterns are authored fresh
//! against that contract.

mod pulse_grid;
mod radial;
mod spectrum;

use serde::{Deserialize, Serialize};

use crate::entity::{AudioState, Entity};

/// Tunable parameters shared by every pattern (§3 `PatternConfigInfo`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternConfig {
    pub entity_count: u32,
    pub zone_size: f64,
    pub beat_boost: f64,
    pub base_scale: f64,
    pub max_scale: f64,
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            entity_count: 32,
            zone_size: 16.0,
            beat_boost: 1.5,
            base_scale: 1.0,
            max_scale: 3.0,
        }
    }
}

/// A visualization pattern: maps the current audio state to a set of
/// entities. Implementations are pure functions of `(AudioState, PatternConfig)`
/// plus their own name — no internal mutable state survives across calls.
pub trait Pattern: Send + Sync {
    fn name(&self) -> &'static str;
    fn render(&self, audio: &AudioState, config: &PatternConfig) -> Vec<Entity>;
}

/// Looks up a built-in pattern by name. Returns `None` for unknown names
/// (callers should fall back to `"spectrum"`, per §4.7).
pub fn get_pattern(name: &str) -> Option<Box<dyn Pattern>> {
    match name {
        "spectrum" => Some(Box::new(spectrum::Spectrum)),
        "radial" => Some(Box::new(radial::Radial)),
        "pulse_grid" => Some(Box::new(pulse_grid::PulseGrid)),
        _ => None,
    }
}

/// Names of every built-in pattern, in display order.
pub fn list_patterns() -> Vec<&'static str> {
    vec!["spectrum", "radial", "pulse_grid"]
}

/// Clamps an entity count to the documented bounds.
pub fn clamp_entity_count(requested: u32) -> u32 {
    requested.clamp(
        crate::protocol_constants::ENTITY_COUNT_MIN,
        crate::protocol_constants::ENTITY_COUNT_MAX,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_pattern_name_returns_none() {
        assert!(get_pattern("does-not-exist").is_none());
    }

    #[test]
    fn list_patterns_includes_all_built_ins() {
        let names = list_patterns();
        assert_eq!(names.len(), 3);
        assert!(names.contains(&"spectrum"));
        assert!(names.contains(&"radial"));
        assert!(names.contains(&"pulse_grid"));
    }

    #[test]
    fn clamp_entity_count_respects_bounds() {
        assert_eq!(clamp_entity_count(0), 1);
        assert_eq!(clamp_entity_count(10_000), 256);
        assert_eq!(clamp_entity_count(64), 64);
    }
}
