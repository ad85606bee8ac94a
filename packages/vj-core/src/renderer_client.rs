//! Outbound renderer ("Minecraft") WebSocket client (C9).
//!
//! Maintains a single persistent connection to the downstream renderer;
//! reconnection with exponential backoff is driven by
//! [`crate::supervisors::run_renderer_reconnect`], which also owns the
//! connect/disconnect side effects that need browser/roster access this
//! client doesn't have. `batch_update_fast`/`send_opaque` are
//! fire-and-forget; the remaining operations correlate request/response
//! pairs by an explicit request id with a 5s timeout, since matching on
//! response shape alone doesn't generalize across this client's small set
//! of request kinds.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::sync::{oneshot, Mutex as AsyncMutex};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

use crate::entity::Entity;
use crate::error::{VjError, VjResult};
use crate::protocol_constants::{
    BEAT_PARTICLE_INTENSITY_THRESHOLD, RENDERER_CONNECT_TIMEOUT_SECS, RENDERER_REQUEST_TIMEOUT_SECS,
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Tracks pending request/response correlations by request id.
#[derive(Default)]
struct Pending {
    waiters: HashMap<u64, oneshot::Sender<Value>>,
}

/// Outbound renderer connection. Cheap to clone; the actual socket lives
/// behind the inner async mutex so sends/receives serialize naturally.
pub struct RendererClient {
    url: String,
    sink: AsyncMutex<Option<WsStream>>,
    pending: Mutex<Pending>,
    next_request_id: AtomicU64,
}

impl RendererClient {
    pub fn new(host: &str, port: u16) -> Arc<Self> {
        Arc::new(Self {
            url: format!("ws://{host}:{port}"),
            sink: AsyncMutex::new(None),
            pending: Mutex::new(Pending::default()),
            next_request_id: AtomicU64::new(1),
        })
    }

    pub fn is_connected(&self) -> bool {
        // best-effort snapshot; `try_lock` avoids blocking callers that
        // only want a health-check glance.
        self.sink
            .try_lock()
            .map(|guard| guard.is_some())
            .unwrap_or(false)
    }

    /// Attempts to (re)establish the renderer connection.
    pub async fn connect(&self) -> VjResult<()> {
        let connect_future = connect_async(&self.url);
        let (stream, _response) = tokio::time::timeout(
            Duration::from_secs(RENDERER_CONNECT_TIMEOUT_SECS),
            connect_future,
        )
        .await
        .map_err(|_| VjError::Renderer("connect timed out".into()))?
        .map_err(|e| VjError::Renderer(format!("connect failed: {e}")))?;

        *self.sink.lock().await = Some(stream);
        log::info!("[Renderer] Connected to {}", self.url);
        Ok(())
    }

    /// Fire-and-forget: sends the current frame. Drops the connection
    /// (forcing a reconnect) on any write error.
    pub async fn batch_update_fast(
        &self,
        zone: &str,
        entities: &[Entity],
        bands: [f64; 5],
        amplitude: f64,
        peak: f64,
        bpm: f64,
        is_beat: bool,
        beat_intensity: f64,
    ) {
        let bands_clamped: Vec<f64> = bands.iter().map(|b| b.clamp(0.0, 1.0)).collect();
        let mut frame = json!({
            "type": "batch_update",
            "zone": zone,
            "entities": entities,
            "audio": {
                "bands": bands_clamped,
                "amplitude": amplitude.clamp(0.0, 5.0),
                "peak": peak.clamp(0.0, 5.0),
                "bpm": bpm.clamp(0.0, 300.0),
            },
        });

        if is_beat && beat_intensity > BEAT_PARTICLE_INTENSITY_THRESHOLD {
            let count = (20.0 * beat_intensity) as i64;
            let count = count.clamp(1, 100);
            frame["particles"] = json!({
                "particle": "note",
                "x": 0.5,
                "y": 0.5,
                "z": 0.5,
                "count": count,
            });
        }

        self.send_raw(frame).await;
    }

    /// Fire-and-forget: sends an opaque, uncorrelated message (no
    /// `request_id`, no waiter registered). Used for relays like voice
    /// audio where the caller must never block on a renderer response.
    pub async fn send_opaque(&self, kind: &str, params: Value) {
        self.send_raw(json!({"type": kind, "params": params})).await;
    }

    async fn send_raw(&self, value: Value) {
        let mut guard = self.sink.lock().await;
        if let Some(stream) = guard.as_mut() {
            if let Err(e) = stream.send(Message::Text(value.to_string())).await {
                log::warn!("[Renderer] Send failed, dropping connection: {e}");
                *guard = None;
            }
        }
    }

    /// Sends a request and waits (up to 5s) for a correlated response.
    pub async fn request(&self, kind: &str, params: Value) -> VjResult<Value> {
        let request_id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().waiters.insert(request_id, tx);

        let message = json!({
            "type": kind,
            "request_id": request_id,
            "params": params,
        });
        self.send_raw(message).await;

        match tokio::time::timeout(Duration::from_secs(RENDERER_REQUEST_TIMEOUT_SECS), rx).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(_)) => Err(VjError::Renderer("response channel dropped".into())),
            Err(_) => {
                self.pending.lock().waiters.remove(&request_id);
                Err(VjError::Renderer(format!("{kind} timed out")))
            }
        }
    }

    /// Dispatches an incoming message to its waiting requester, if any.
    pub fn handle_incoming(&self, value: Value) {
        if let Some(request_id) = value.get("request_id").and_then(Value::as_u64) {
            if let Some(waiter) = self.pending.lock().waiters.remove(&request_id) {
                let _ = waiter.send(value);
            }
        }
    }

    pub async fn get_zones(&self) -> VjResult<Value> {
        self.request("get_zones", json!({})).await
    }

    pub async fn set_zone_config(&self, zone: &str, config: Value) -> VjResult<Value> {
        self.request("set_zone_config", json!({"zone": zone, "config": config}))
            .await
    }

    pub async fn init_pool(&self, zone: &str, entity_count: u32) -> VjResult<Value> {
        self.request("init_pool", json!({"zone": zone, "entity_count": entity_count}))
            .await
    }

    pub async fn set_visible(&self, zone: &str, visible: bool) -> VjResult<Value> {
        self.request("set_visible", json!({"zone": zone, "visible": visible}))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn particle_count_formula_matches_spec() {
        let beat_intensity: f64 = 0.75;
        let count = (20.0 * beat_intensity) as i64;
        let count = count.clamp(1, 100);
        assert_eq!(count, 15);
    }

    #[test]
    fn disconnected_client_reports_not_connected() {
        let client = RendererClient::new("localhost", 8765);
        assert!(!client.is_connected());
    }
}
