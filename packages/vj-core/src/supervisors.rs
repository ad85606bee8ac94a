//! Background supervisors (C12): renderer reconnect, browser heartbeat,
//! and connect-code GC.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde_json::json;

use crate::dj::DjManager;
use crate::protocol::PatternConfigInfo;
use crate::protocol_constants::{
    BROWSER_HEARTBEAT_INTERVAL_SECS, BROWSER_HEARTBEAT_MAX_MISSED, CLOSE_CODE_HEARTBEAT_TIMEOUT,
    RENDERER_BACKOFF_INITIAL_SECS, RENDERER_BACKOFF_MAX_SECS, RENDERER_BACKOFF_MULTIPLIER,
    RENDERER_POLL_INTERVAL_SECS,
};
use crate::state::AppState;

/// Polls the renderer connection every [`RENDERER_POLL_INTERVAL_SECS`];
/// while disconnected, retries with exponential backoff. On every
/// connect/disconnect transition, broadcasts `minecraft_status` to
/// browsers and re-issues `stream_route` to every roster DJ (§4.9).
pub async fn run_renderer_reconnect(app: Arc<AppState>) {
    let mut backoff = RENDERER_BACKOFF_INITIAL_SECS;
    let mut was_connected = app.renderer.is_connected();

    loop {
        if app.renderer.is_connected() {
            tokio::time::sleep(Duration::from_secs(RENDERER_POLL_INTERVAL_SECS)).await;
        } else {
            match app.renderer.connect().await {
                Ok(()) => backoff = RENDERER_BACKOFF_INITIAL_SECS,
                Err(e) => {
                    log::warn!("[Renderer] Reconnect failed: {e}, retrying in {backoff:.1}s");
                    tokio::time::sleep(Duration::from_secs_f64(backoff)).await;
                    backoff = (backoff * RENDERER_BACKOFF_MULTIPLIER).min(RENDERER_BACKOFF_MAX_SECS);
                }
            }
        }

        let now_connected = app.renderer.is_connected();
        if now_connected != was_connected {
            was_connected = now_connected;
            app.browsers.broadcast(json!({"type": "minecraft_status", "connected": now_connected}));
            let reason = if now_connected { "renderer_connected" } else { "renderer_disconnected" };
            broadcast_stream_route_to_all(&app, reason);
        }
    }
}

fn broadcast_stream_route_to_all(app: &Arc<AppState>, reason: &str) {
    let (pattern_name, pattern_config, band_sensitivity) = {
        let broadcast = app.broadcast.read();
        (
            broadcast.current_pattern_name.clone(),
            PatternConfigInfo::from(&broadcast.pattern_config),
            broadcast.band_sensitivity,
        )
    };
    let roster = app.dj_manager.roster.inner.lock();
    for conn in roster.connections.values() {
        let is_active = roster.is_active(&conn.dj_id);
        conn.send(DjManager::build_stream_route(
            conn.direct_mode,
            is_active,
            app.config.minecraft_host.clone(),
            app.config.minecraft_port,
            app.config.zone.clone(),
            pattern_config.entity_count,
            pattern_name.clone(),
            pattern_config.clone(),
            Vec::new(),
            band_sensitivity,
            reason,
        ));
    }
}

/// Per-browser-connection missed-pong counters, consulted and mutated by
/// the heartbeat supervisor. Connections record a pong via
/// [`BrowserHeartbeats::record_pong`]; a disconnected browser's entry is
/// dropped by the browser socket handler on close.
#[derive(Default)]
pub struct BrowserHeartbeats {
    missed: DashMap<u64, AtomicU32>,
}

impl BrowserHeartbeats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track(&self, id: u64) {
        self.missed.insert(id, AtomicU32::new(0));
    }

    pub fn forget(&self, id: u64) {
        self.missed.remove(&id);
    }

    pub fn record_pong(&self, id: u64) {
        if let Some(counter) = self.missed.get(&id) {
            counter.store(0, Ordering::Relaxed);
        }
    }

    /// Increments the missed counter and returns `true` if this connection
    /// has now exceeded the allowed miss count and should be closed.
    fn bump_and_check(&self, id: u64) -> bool {
        match self.missed.get(&id) {
            Some(counter) => counter.fetch_add(1, Ordering::Relaxed) + 1 >= BROWSER_HEARTBEAT_MAX_MISSED,
            None => false,
        }
    }
}

/// Every [`BROWSER_HEARTBEAT_INTERVAL_SECS`], pings every browser observer
/// and closes any connection that has missed
/// [`BROWSER_HEARTBEAT_MAX_MISSED`] consecutive pongs.
pub async fn run_browser_heartbeat(app: Arc<AppState>, heartbeats: Arc<BrowserHeartbeats>) {
    loop {
        tokio::time::sleep(Duration::from_secs(BROWSER_HEARTBEAT_INTERVAL_SECS)).await;

        for id in app.browsers.ids() {
            if heartbeats.bump_and_check(id) {
                log::info!("[BrowserHeartbeat] Closing {id}: missed pong threshold");
                app.browsers.send_to(
                    id,
                    json!({"type": "close", "code": CLOSE_CODE_HEARTBEAT_TIMEOUT}),
                );
                app.browsers.unregister(id);
                heartbeats.forget(id);
            } else {
                app.browsers.send_to(id, json!({"type": "ping"}));
            }
        }
    }
}

/// Periodically garbage-collects expired/used connect codes. Listing and
/// generation also GC inline, so this loop is a backstop for codes nobody
/// lists again.
pub async fn run_connect_code_gc(app: Arc<AppState>, interval_secs: u64) {
    loop {
        tokio::time::sleep(Duration::from_secs(interval_secs)).await;
        app.connect_codes.gc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heartbeat_closes_after_max_missed_pongs() {
        let heartbeats = BrowserHeartbeats::new();
        heartbeats.track(1);
        assert!(!heartbeats.bump_and_check(1));
        assert!(heartbeats.bump_and_check(1));
    }

    #[test]
    fn record_pong_resets_missed_counter() {
        let heartbeats = BrowserHeartbeats::new();
        heartbeats.track(1);
        heartbeats.bump_and_check(1);
        heartbeats.record_pong(1);
        assert!(!heartbeats.bump_and_check(1));
    }

    #[test]
    fn untracked_connection_never_trips() {
        let heartbeats = BrowserHeartbeats::new();
        assert!(!heartbeats.bump_and_check(999));
    }

    #[tokio::test]
    async fn broadcast_stream_route_to_all_reaches_every_dj() {
        let app = AppState::new(crate::state::ServerConfig::default(), crate::auth::AuthStore::empty());
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        app.dj_manager.roster.inner.lock().insert(crate::dj::connection::DjConnection::new(
            "alice".into(),
            "Alice".into(),
            10,
            true,
            tx,
        ));

        broadcast_stream_route_to_all(&app, "renderer_connected");

        let message = rx.try_recv().expect("stream_route should have been sent");
        assert!(matches!(message, crate::protocol::DjOutbound::StreamRoute { .. }));
    }
}
