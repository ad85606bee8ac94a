//! WebSocket entry points: DJ-facing and browser/admin-facing axum
//! routers, wired onto [`crate::state::AppState`] and
//! [`crate::supervisors::BrowserHeartbeats`] respectively.

pub mod browser_ws;
pub mod dj_ws;

use std::sync::Arc;

use axum::routing::get;
use axum::Router;

use crate::state::AppState;
use crate::supervisors::BrowserHeartbeats;

/// Router for the DJ-facing socket, mounted on its own port.
pub fn dj_router(app: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(dj_ws::upgrade))
        .with_state(app)
}

/// Router for the browser/admin socket, mounted on its own port.
pub fn browser_router(app: Arc<AppState>, heartbeats: Arc<BrowserHeartbeats>) -> Router {
    Router::new()
        .route("/", get(browser_ws::upgrade))
        .with_state(browser_ws::BrowserWsState { app, heartbeats })
}
