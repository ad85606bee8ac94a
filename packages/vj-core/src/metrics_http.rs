//! Metrics & health HTTP endpoints (C13).
//!
//! Grounded in `vj_server/metrics.py`, served as its own small axum
//! router (rather than the raw-socket handler the original used) on the
//! configured metrics port, matching the teacher's preference for axum
//! across every HTTP surface.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use crate::state::AppState;

/// Monotonically increasing counters the broadcast loop / control plane
/// bump as they run. Kept separate from `AppState` so metrics collection
/// never needs the roster or broadcast locks.
#[derive(Default)]
pub struct Metrics {
    pub frames_processed: AtomicU64,
    pub pattern_changes: AtomicU64,
    pub dj_connections: AtomicU64,
}

impl Metrics {
    pub fn record_frame(&self) {
        self.frames_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_pattern_change(&self) {
        self.pattern_changes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dj_connection(&self) {
        self.dj_connections.fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Clone)]
pub struct MetricsState {
    pub app: Arc<AppState>,
    pub metrics: Arc<Metrics>,
    pub started_at: Instant,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_seconds: f64,
    connected_djs: usize,
    connected_browsers: usize,
    active_pattern: String,
    active_dj: Option<String>,
    minecraft_connected: bool,
}

pub fn router(state: MetricsState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics_text))
        .with_state(state)
}

async fn health(State(state): State<MetricsState>) -> impl IntoResponse {
    let roster = state.app.dj_manager.roster.inner.lock();
    let broadcast = state.app.broadcast.read();

    Json(HealthResponse {
        status: "ok",
        uptime_seconds: state.started_at.elapsed().as_secs_f64(),
        connected_djs: roster.connections.len(),
        connected_browsers: state.app.browsers.len(),
        active_pattern: broadcast.current_pattern_name.clone(),
        active_dj: roster.active_dj_id.clone(),
        minecraft_connected: state.app.renderer.is_connected(),
    })
}

async fn metrics_text(State(state): State<MetricsState>) -> impl IntoResponse {
    let roster = state.app.dj_manager.roster.inner.lock();
    let broadcast = state.app.broadcast.read();
    let uptime = state.started_at.elapsed().as_secs_f64();
    let current_bpm = roster
        .active_dj_id
        .as_ref()
        .and_then(|id| roster.get(id))
        .map(|c| c.latest_frame.bpm)
        .unwrap_or(0.0);

    let mut out = String::new();
    out.push_str(&format!("# TYPE mcav_uptime_seconds gauge\nmcav_uptime_seconds {uptime}\n"));
    out.push_str(&format!(
        "# TYPE mcav_connected_djs gauge\nmcav_connected_djs {}\n",
        roster.connections.len()
    ));
    out.push_str(&format!(
        "# TYPE mcav_connected_browsers gauge\nmcav_connected_browsers {}\n",
        state.app.browsers.len()
    ));
    out.push_str(&format!(
        "# TYPE mcav_frames_processed_total counter\nmcav_frames_processed_total {}\n",
        state.metrics.frames_processed.load(Ordering::Relaxed)
    ));
    out.push_str(&format!(
        "# TYPE mcav_pattern_changes_total counter\nmcav_pattern_changes_total {}\n",
        state.metrics.pattern_changes.load(Ordering::Relaxed)
    ));
    out.push_str(&format!(
        "# TYPE mcav_dj_connections_total counter\nmcav_dj_connections_total {}\n",
        state.metrics.dj_connections.load(Ordering::Relaxed)
    ));
    out.push_str(&format!("# TYPE mcav_current_bpm gauge\nmcav_current_bpm {current_bpm}\n"));

    out.push_str("# TYPE mcav_active_pattern gauge\n");
    for name in crate::pattern::list_patterns() {
        let value = if name == broadcast.current_pattern_name { 1 } else { 0 };
        out.push_str(&format!("mcav_active_pattern{{pattern=\"{name}\"}} {value}\n"));
    }

    ([(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")], out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthStore;
    use crate::state::ServerConfig;

    #[tokio::test]
    async fn health_reports_zero_djs_when_empty() {
        let app = AppState::new(ServerConfig::default(), AuthStore::empty());
        let state = MetricsState {
            app,
            metrics: Arc::new(Metrics::default()),
            started_at: Instant::now(),
        };
        let response = health(State(state)).await.into_response();
        assert_eq!(response.status(), axum::http::StatusCode::OK);
    }
}
