//! The 60 Hz broadcast loop (C11): the core per-tick pipeline that turns
//! the active DJ's audio (or a decaying fallback) into entities, fans
//! them out to the renderer and to browser observers, and runs periodic
//! housekeeping.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::json;
use tokio::time::timeout;

use crate::dj::{apply_phase_beat_assist, stabilize_bpm};
use crate::entity::{AudioFrame, AudioState};
use crate::metrics_http::Metrics;
use crate::protocol::ZoneStatus;
use crate::protocol_constants::{
    BROADCAST_ERROR_BACKOFF_MS, BROADCAST_ERROR_BACKOFF_THRESHOLD, BROADCAST_TICK_MS,
    BROWSER_SEND_TIMEOUT_MS, FALLBACK_AUDIO_DECAY, HEALTH_LOG_INTERVAL_SECS,
};
use crate::state::AppState;
use crate::utils::now_secs;

/// Runs forever, ticking at roughly [`BROADCAST_TICK_MS`]. Intended to be
/// spawned once as its own task.
pub async fn run(app: Arc<AppState>, metrics: Arc<Metrics>) {
    let mut fallback_audio = AudioFrame::default();
    let mut phase_assist_last_time = 0.0_f64;
    let mut consecutive_errors: u64 = 0;
    let mut last_health_log = Instant::now();
    let start = Instant::now();

    loop {
        let tick_start = Instant::now();

        if let Err(e) = run_tick(&app, &metrics, &mut fallback_audio, &mut phase_assist_last_time).await {
            consecutive_errors += 1;
            log::error!("[Broadcast] Tick failed: {e}");
            if consecutive_errors >= BROADCAST_ERROR_BACKOFF_THRESHOLD {
                tokio::time::sleep(Duration::from_millis(BROADCAST_ERROR_BACKOFF_MS)).await;
            }
        } else {
            consecutive_errors = 0;
        }

        if last_health_log.elapsed() >= Duration::from_secs(HEALTH_LOG_INTERVAL_SECS) {
            log_health_summary(&app, start.elapsed().as_secs());
            last_health_log = Instant::now();
        }

        let elapsed = tick_start.elapsed();
        let target = Duration::from_millis(BROADCAST_TICK_MS);
        if elapsed < target {
            tokio::time::sleep(target - elapsed).await;
        }
    }
}

async fn run_tick(
    app: &Arc<AppState>,
    metrics: &Arc<Metrics>,
    fallback_audio: &mut AudioFrame,
    phase_assist_last_time: &mut f64,
) -> Result<(), String> {
    let now = now_secs();

    // 1. Pick audio source. For an active DJ, fold the raw detected BPM
    // into that connection's own running-stabilized value so successive
    // ticks converge rather than re-deriving from scratch each time.
    let (mut frame, active_dj_id, direct_mode, mc_connected) = {
        let mut roster = app.dj_manager.roster.inner.lock();
        match roster.active_dj_id.clone() {
            Some(id) => {
                let conn = roster.get_mut(&id).ok_or("active dj vanished from roster")?;
                conn.stabilized_bpm = stabilize_bpm(conn.stabilized_bpm, conn.latest_frame.bpm);
                let mut frame = conn.latest_frame;
                frame.bpm = conn.stabilized_bpm;
                (frame, Some(id), conn.direct_mode, conn.mc_connected)
            }
            None => {
                fallback_audio.decay(FALLBACK_AUDIO_DECAY);
                (*fallback_audio, None, false, false)
            }
        }
    };

    // 2. Phase-assist: fabricate a missing beat when confidence/phase call for it.
    let assist = apply_phase_beat_assist(
        frame.beat,
        frame.tempo_confidence,
        frame.bpm,
        frame.beat_phase,
        frame.beat_intensity,
        now,
        *phase_assist_last_time,
    );
    if assist.should_assist {
        frame.beat = true;
        frame.beat_intensity = assist.assisted_intensity;
        *phase_assist_last_time = now;
    }

    // 3. Apply per-band sensitivity.
    let sensitivity = app.broadcast.read().band_sensitivity;
    for (b, s) in frame.bands.iter_mut().zip(sensitivity.iter()) {
        *b = (*b * s).clamp(0.0, 1.0);
    }

    // 4. Decide whether the server should publish to the renderer itself.
    let should_send_to_renderer = !(direct_mode && mc_connected);

    // 5. Compute entities only if needed: blackout (invariant 8) always
    // wins and yields an empty list without touching `last_entities`;
    // freeze (invariant 7) reuses the last computed frame byte-for-byte;
    // otherwise render the pattern and apply timed effects as usual.
    let any_browsers = !app.browsers.is_empty();
    let audio_state = AudioState {
        bands: frame.bands,
        amplitude: frame.peak,
        is_beat: frame.beat,
        beat_intensity: frame.beat_intensity,
        frame_counter: app.broadcast.read().frame_counter,
    };

    let entities = if should_send_to_renderer || any_browsers {
        let mut broadcast = app.broadcast.write();
        broadcast.frame_counter += 1;

        if broadcast.blackout {
            Vec::new()
        } else if broadcast.freeze {
            broadcast.last_entities.clone()
        } else {
            let pattern = crate::pattern::get_pattern(&broadcast.current_pattern_name)
                .unwrap_or_else(|| crate::pattern::get_pattern("spectrum").expect("spectrum always registered"));
            let mut entities = pattern.render(&audio_state, &broadcast.pattern_config);

            let active_effects = std::mem::take(&mut broadcast.active_effects);
            let still_running = crate::effects::apply_all(active_effects, &mut entities);
            broadcast.active_effects = still_running;
            broadcast.last_entities = entities.clone();
            entities
        }
    } else {
        Vec::new()
    };

    // 7. Fire-and-forget renderer update.
    if should_send_to_renderer {
        app.renderer
            .batch_update_fast(
                &app.config.zone,
                &entities,
                frame.bands,
                frame.peak,
                frame.peak,
                frame.bpm,
                frame.beat,
                frame.beat_intensity,
            )
            .await;
    }

    // 8. Fan out to browsers concurrently, 500 ms per-client timeout.
    if any_browsers {
        let state_frame = json!({
            "type": "state",
            "entities": entities,
            "bands": frame.bands,
            "amplitude": frame.peak,
            "is_beat": frame.beat,
            "beat_intensity": frame.beat_intensity,
            "instant_bass": frame.instant_bass,
            "instant_kick": frame.instant_kick,
            "frame": app.broadcast.read().frame_counter,
            "pattern": app.broadcast.read().current_pattern_name,
            "active_dj": active_dj_id,
            "zone_status": ZoneStatus {
                bpm_estimate: frame.bpm,
                tempo_confidence: frame.tempo_confidence,
                beat_phase: frame.beat_phase,
            },
        });

        for id in app.browsers.ids() {
            let app = Arc::clone(app);
            let payload = state_frame.clone();
            let sent = timeout(Duration::from_millis(BROWSER_SEND_TIMEOUT_MS), async move {
                app.browsers.send_to(id, payload);
            })
            .await;
            if sent.is_err() {
                app.browsers.unregister(id);
            }
        }
    }

    metrics.record_frame();
    Ok(())
}

fn log_health_summary(app: &AppState, uptime_secs: u64) {
    let roster = app.dj_manager.roster.inner.lock();
    log::info!(
        "[Broadcast] uptime={}s djs={} browsers={} pattern={} mc_connected={}",
        uptime_secs,
        roster.connections.len(),
        app.browsers.len(),
        app.broadcast.read().current_pattern_name,
        app.renderer.is_connected(),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthStore;
    use crate::state::ServerConfig;

    #[tokio::test]
    async fn run_tick_with_no_active_dj_decays_fallback_and_succeeds() {
        let app = crate::state::AppState::new(ServerConfig::default(), AuthStore::empty());
        let metrics = Arc::new(Metrics::default());
        let mut fallback = AudioFrame::default();
        fallback.peak = 1.0;
        let mut phase_assist_last_time = 0.0;

        let result = run_tick(&app, &metrics, &mut fallback, &mut phase_assist_last_time).await;
        assert!(result.is_ok());
        assert!(fallback.peak < 1.0);
    }

    #[tokio::test]
    async fn blackout_yields_empty_entities_without_touching_last_entities() {
        let app = crate::state::AppState::new(ServerConfig::default(), AuthStore::empty());
        let metrics = Arc::new(Metrics::default());
        let mut fallback = AudioFrame::default();
        let mut phase_assist_last_time = 0.0;

        app.browsers.register(tokio::sync::mpsc::unbounded_channel().0);
        app.broadcast.write().last_entities = vec![crate::entity::Entity {
            id: "e0".into(),
            x: 0.1,
            y: 0.2,
            z: 0.3,
            scale: 1.0,
            rotation: None,
            brightness: 15,
            interpolation: 0,
            glow: false,
            visible: true,
            material: None,
        }];
        app.broadcast.write().blackout = true;

        run_tick(&app, &metrics, &mut fallback, &mut phase_assist_last_time)
            .await
            .unwrap();

        assert_eq!(app.broadcast.read().last_entities.len(), 1);
    }

    #[tokio::test]
    async fn freeze_reuses_last_entities_byte_identical() {
        let app = crate::state::AppState::new(ServerConfig::default(), AuthStore::empty());
        let metrics = Arc::new(Metrics::default());
        let mut fallback = AudioFrame::default();
        let mut phase_assist_last_time = 0.0;

        app.browsers.register(tokio::sync::mpsc::unbounded_channel().0);
        let frozen = vec![crate::entity::Entity {
            id: "e0".into(),
            x: 0.42,
            y: 0.0,
            z: 0.0,
            scale: 1.0,
            rotation: None,
            brightness: 15,
            interpolation: 0,
            glow: false,
            visible: true,
            material: None,
        }];
        app.broadcast.write().last_entities = frozen.clone();
        app.broadcast.write().freeze = true;

        run_tick(&app, &metrics, &mut fallback, &mut phase_assist_last_time)
            .await
            .unwrap();

        assert_eq!(app.broadcast.read().last_entities[0].x, frozen[0].x);
    }
}
