//! DJ arbitration: connections, roster, pending queue, and the lifecycle
//! operations that tie them together (§4.4-§4.6).

pub mod connection;
pub mod pending;
pub mod roster;

use connection::DjConnection;
use pending::PendingQueue;
use roster::DjRoster;

use crate::protocol::{DjOutbound, PatternConfigInfo, RouteMode};

/// BPM candidate search window.
const BPM_MIN: f64 = 60.0;
const BPM_MAX: f64 = 200.0;

/// Picks the half/double-time candidate closest to the prior BPM, then
/// EMA-blends it in (α=0.25 on a jump >8 BPM, else α=0.4), clamping the
/// result to [60, 200].
pub fn stabilize_bpm(prior_bpm: f64, raw_bpm: f64) -> f64 {
    if raw_bpm <= 0.0 {
        return prior_bpm.clamp(BPM_MIN, BPM_MAX);
    }

    let mut candidates = vec![raw_bpm];
    if raw_bpm * 2.0 <= BPM_MAX {
        candidates.push(raw_bpm * 2.0);
    }
    if raw_bpm / 2.0 >= BPM_MIN {
        candidates.push(raw_bpm / 2.0);
    }

    let chosen = candidates
        .into_iter()
        .filter(|c| (BPM_MIN..=BPM_MAX).contains(c))
        .min_by(|a, b| {
            (a - prior_bpm)
                .abs()
                .partial_cmp(&(b - prior_bpm).abs())
                .unwrap()
        })
        .unwrap_or(raw_bpm);

    let jump = (chosen - prior_bpm).abs();
    let alpha = if jump > 8.0 { 0.25 } else { 0.4 };
    ((1.0 - alpha) * prior_bpm + alpha * chosen).clamp(BPM_MIN, BPM_MAX)
}

/// Outcome of a phase-beat-assist evaluation.
pub struct PhaseAssist {
    pub should_assist: bool,
    pub assisted_intensity: f64,
}

/// Synthesizes a beat when the detector misses one but the phase estimate
/// says a beat boundary just passed, per §4.4's stated thresholds.
pub fn apply_phase_beat_assist(
    beat_detected: bool,
    tempo_confidence: f64,
    bpm: f64,
    beat_phase: f64,
    beat_intensity: f64,
    now: f64,
    last_assist_time: f64,
) -> PhaseAssist {
    if beat_detected || tempo_confidence < 0.60 || bpm < BPM_MIN {
        return PhaseAssist {
            should_assist: false,
            assisted_intensity: beat_intensity,
        };
    }

    let near_boundary = beat_phase < 0.08 || beat_phase > 0.92;
    if !near_boundary {
        return PhaseAssist {
            should_assist: false,
            assisted_intensity: beat_intensity,
        };
    }

    let beat_period = 60.0 / bpm;
    if now - last_assist_time < 0.60 * beat_period {
        return PhaseAssist {
            should_assist: false,
            assisted_intensity: beat_intensity,
        };
    }

    let assisted = beat_intensity.max((0.50 + tempo_confidence * 0.25).min(1.0));
    PhaseAssist {
        should_assist: true,
        assisted_intensity: assisted,
    }
}

/// Owns roster, pending queue, and arbitration logic. Holds no lock itself
/// — callers take `roster.inner.lock()` for the duration of a unit of work.
pub struct DjManager {
    pub roster: DjRoster,
    pub pending: PendingQueue,
}

impl DjManager {
    pub fn new() -> Self {
        Self {
            roster: DjRoster::new(),
            pending: PendingQueue::new(),
        }
    }

    /// Sets the active DJ and notifies the whole roster (§4.4
    /// `_set_active_dj_locked`): every DJ gets `status_update`, then every
    /// DJ (active or not) gets a fresh `stream_route` so inactive DJs fall
    /// back to relay mode. Must be called with the roster lock held.
    ///
    /// `route_builder(direct_mode, is_active)` builds the per-DJ
    /// `stream_route`; the caller supplies it since it needs broadcast-loop
    /// state (current pattern, band sensitivity, ...) this module doesn't
    /// own.
    pub fn set_active_locked(
        inner: &mut roster::RosterInner,
        new_active_id: &str,
        route_builder: impl Fn(bool, bool) -> DjOutbound,
    ) {
        if !inner.set_active(new_active_id) {
            return;
        }

        let ids: Vec<String> = inner.connections.keys().cloned().collect();
        for id in &ids {
            let is_active = inner.is_active(id);
            if let Some(conn) = inner.get(id) {
                conn.send(DjOutbound::StatusUpdate { is_active });
            }
        }
        for id in &ids {
            let is_active = inner.is_active(id);
            let Some(conn) = inner.get(id) else { continue };
            let direct_mode = conn.direct_mode;
            conn.send(route_builder(direct_mode, is_active));
        }
    }

    /// Builds a `stream_route` message for a DJ. `route_mode` is `dual`
    /// only when the DJ both requested direct mode and is the active DJ
    /// (§4.6); every other DJ falls back to relay.
    #[allow(clippy::too_many_arguments)]
    pub fn build_stream_route(
        direct_mode: bool,
        is_active: bool,
        minecraft_host: String,
        minecraft_port: u16,
        zone: String,
        entity_count: u32,
        current_pattern: String,
        pattern_config: PatternConfigInfo,
        pattern_scripts: Vec<String>,
        band_sensitivity: [f64; 5],
        reason: &str,
    ) -> DjOutbound {
        let dual = direct_mode && is_active;
        DjOutbound::StreamRoute {
            route_mode: if dual { RouteMode::Dual } else { RouteMode::Relay },
            is_active,
            minecraft_host,
            minecraft_port,
            zone,
            entity_count,
            current_pattern,
            pattern_config,
            pattern_scripts,
            band_sensitivity,
            relay_fallback: !dual,
            reason: reason.to_string(),
        }
    }
}

impl Default for DjManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_pattern_config() -> PatternConfigInfo {
        PatternConfigInfo {
            entity_count: 32,
            zone_size: 10.0,
            beat_boost: 1.0,
            base_scale: 1.0,
            max_scale: 2.0,
        }
    }

    #[test]
    fn stream_route_is_dual_only_when_direct_mode_and_active() {
        let route = DjManager::build_stream_route(
            true,
            true,
            "localhost".into(),
            8765,
            "default".into(),
            32,
            "spectrum".into(),
            sample_pattern_config(),
            Vec::new(),
            [1.0; 5],
            "test",
        );
        let DjOutbound::StreamRoute { route_mode, relay_fallback, .. } = route else {
            panic!("expected StreamRoute");
        };
        assert_eq!(route_mode, RouteMode::Dual);
        assert!(!relay_fallback);
    }

    #[test]
    fn stream_route_falls_back_to_relay_when_direct_mode_but_not_active() {
        let route = DjManager::build_stream_route(
            true,
            false,
            "localhost".into(),
            8765,
            "default".into(),
            32,
            "spectrum".into(),
            sample_pattern_config(),
            Vec::new(),
            [1.0; 5],
            "test",
        );
        let DjOutbound::StreamRoute { route_mode, relay_fallback, .. } = route else {
            panic!("expected StreamRoute");
        };
        assert_eq!(route_mode, RouteMode::Relay);
        assert!(relay_fallback);
    }

    #[test]
    fn stream_route_falls_back_to_relay_when_active_but_not_direct_mode() {
        let route = DjManager::build_stream_route(
            false,
            true,
            "localhost".into(),
            8765,
            "default".into(),
            32,
            "spectrum".into(),
            sample_pattern_config(),
            Vec::new(),
            [1.0; 5],
            "test",
        );
        let DjOutbound::StreamRoute { route_mode, .. } = route else {
            panic!("expected StreamRoute");
        };
        assert_eq!(route_mode, RouteMode::Relay);
    }

    #[test]
    fn stabilize_bpm_prefers_double_time_candidate_closer_to_prior() {
        // Prior is 128, raw detector reads a half-time 64 — double-time
        // candidate (128) should win and barely move the blended value.
        let next = stabilize_bpm(128.0, 64.0);
        assert!((next - 128.0).abs() < 5.0);
    }

    #[test]
    fn stabilize_bpm_clamps_to_window() {
        let next = stabilize_bpm(190.0, 199.0);
        assert!(next <= BPM_MAX);
        let next = stabilize_bpm(65.0, 61.0);
        assert!(next >= BPM_MIN);
    }

    #[test]
    fn stabilize_bpm_uses_slow_alpha_on_small_jump() {
        let prior = 120.0;
        let next = stabilize_bpm(prior, 121.0);
        // alpha=0.4 on a 1 BPM jump: 0.6*120 + 0.4*121 = 120.4
        assert!((next - 120.4).abs() < 0.01);
    }

    #[test]
    fn phase_assist_fires_near_boundary_with_confidence() {
        let result = apply_phase_beat_assist(false, 0.75, 120.0, 0.95, 0.0, 10.0, 0.0);
        assert!(result.should_assist);
        assert!(result.assisted_intensity >= 0.5);
    }

    #[test]
    fn phase_assist_does_not_fire_when_beat_already_detected() {
        let result = apply_phase_beat_assist(true, 0.9, 120.0, 0.95, 0.8, 10.0, 0.0);
        assert!(!result.should_assist);
    }

    #[test]
    fn phase_assist_respects_cooldown() {
        // Beat period at 120 BPM is 0.5s; 0.3s since last assist < 60% of period.
        let result = apply_phase_beat_assist(false, 0.9, 120.0, 0.95, 0.0, 10.3, 10.0);
        assert!(!result.should_assist);
    }

    #[test]
    fn phase_assist_requires_low_confidence_rejection() {
        let result = apply_phase_beat_assist(false, 0.3, 120.0, 0.95, 0.0, 10.0, 0.0);
        assert!(!result.should_assist);
    }
}
