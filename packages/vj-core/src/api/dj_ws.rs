//! DJ-facing WebSocket handler (§4.4).

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::timeout;

use crate::dj::connection::DjConnection;
use crate::dj::DjManager;
use crate::entity::AudioFrame;
use crate::error::CloseReason;
use crate::protocol::{DjInbound, DjOutbound, PatternConfigInfo};
use crate::protocol_constants::{
    AUTH_DEADLINE_SECS, CLOCK_SYNC_DEADLINE_SECS, CLOCK_SYNC_MAX_RTT_SECS, CLOCK_SYNC_MAX_SKEW_SECS,
    CLOSE_CODE_AUTH_FAILED, CLOSE_CODE_AUTH_TIMEOUT, CLOSE_CODE_DENIED, CLOSE_CODE_DUPLICATE_CONNECTION,
    CLOSE_CODE_EXPECTED_AUTH, CLOSE_CODE_INVALID_JSON,
};
use crate::sanitize::sanitize_audio_frame;
use crate::state::AppState;
use crate::utils::now_secs;

pub async fn upgrade(ws: WebSocketUpgrade, State(app): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, app))
}

async fn handle_socket(socket: WebSocket, app: Arc<AppState>) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<DjOutbound>();

    let outcome = timeout(
        Duration::from_secs(AUTH_DEADLINE_SECS),
        await_initial_auth(&mut stream, &app, tx.clone()),
    )
    .await;
    let dj_id = match outcome {
        Ok(Ok(AuthOutcome::Admitted(dj_id))) => dj_id,
        // The 10s auth deadline covers reaching admitted-or-pending, not
        // however long the operator takes to act on a pending approval.
        Ok(Ok(AuthOutcome::Pending(dj_id))) => {
            if wait_for_pending_resolution(&mut stream, &app, &dj_id).await {
                dj_id
            } else {
                send_close(&mut sink, CloseReason::new(CLOSE_CODE_DENIED, "denied by operator")).await;
                return;
            }
        }
        Ok(Err(reason)) => {
            send_close(&mut sink, reason).await;
            return;
        }
        Err(_) => {
            send_close(&mut sink, CloseReason::new(CLOSE_CODE_AUTH_TIMEOUT, "auth timeout")).await;
            return;
        }
    };

    send_auth_success_and_sync(&app, &dj_id, &mut sink, &mut stream).await;

    // Writer task: drains `rx` to the socket sink.
    let writer = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if let Ok(text) = serde_json::to_string(&message) {
                if sink.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
        }
    });

    steady_state_loop(&app, &dj_id, &mut stream).await;

    remove_and_auto_switch(&app, &dj_id);
    writer.abort();
}

/// Outcome of the initial `dj_auth`/`code_auth` exchange.
enum AuthOutcome {
    /// Admitted straight to the roster (`dj_auth`).
    Admitted(String),
    /// Validated a connect code; now awaiting operator approval.
    Pending(String),
}

/// Reads messages up to and including the first `dj_auth`/`code_auth`.
/// Returns once the DJ is either admitted outright or placed in the
/// pending queue — does not itself wait on operator approval.
async fn await_initial_auth(
    stream: &mut SplitStream<WebSocket>,
    app: &Arc<AppState>,
    tx: mpsc::UnboundedSender<DjOutbound>,
) -> Result<AuthOutcome, CloseReason> {
    loop {
        let text = match stream.next().await {
            Some(Ok(Message::Text(text))) => text,
            Some(Ok(Message::Close(_))) | None => {
                return Err(CloseReason::new(CLOSE_CODE_EXPECTED_AUTH, "closed before auth"))
            }
            Some(Ok(_)) => continue,
            Some(Err(_)) => return Err(CloseReason::new(CLOSE_CODE_INVALID_JSON, "socket error")),
        };

        let parsed: DjInbound = serde_json::from_str(&text)
            .map_err(|_| CloseReason::new(CLOSE_CODE_INVALID_JSON, "invalid JSON"))?;

        match parsed {
            DjInbound::DjAuth { dj_id, dj_key, dj_name, direct_mode } => {
                let record = app.auth.verify_dj(&dj_id, &dj_key);
                let Some(record) = record else {
                    return Err(CloseReason::new(CLOSE_CODE_AUTH_FAILED, "bad credentials"));
                };
                let priority = record.priority;

                let mut roster = app.dj_manager.roster.inner.lock();
                if roster.get(&dj_id).is_some() {
                    return Err(CloseReason::new(CLOSE_CODE_DUPLICATE_CONNECTION, "already connected"));
                }
                roster.insert(DjConnection::new(dj_id.clone(), dj_name, priority, direct_mode, tx));
                return Ok(AuthOutcome::Admitted(dj_id));
            }
            DjInbound::CodeAuth { code, dj_name, direct_mode } => {
                if !app.connect_codes.validate_and_consume(&code) {
                    return Err(CloseReason::new(CLOSE_CODE_AUTH_FAILED, "invalid or expired code"));
                }
                let dj_id = format!("dj-{}", uuid::Uuid::new_v4());
                app.dj_manager.pending.add(dj_id.clone(), dj_name, direct_mode, tx.clone());
                let _ = tx.send(DjOutbound::AuthPending {
                    message: "awaiting operator approval".into(),
                    dj_id: dj_id.clone(),
                });
                app.browsers.broadcast(serde_json::json!({"type": "dj_pending", "dj_id": dj_id}));
                return Ok(AuthOutcome::Pending(dj_id));
            }
            DjInbound::Ping {} => {
                let _ = tx.send(DjOutbound::Pong {});
            }
            _ => return Err(CloseReason::new(CLOSE_CODE_EXPECTED_AUTH, "expected auth message")),
        }
    }
}

/// While a connect-code DJ awaits operator approval, the socket stays
/// open but only answers `ping`; resolution (approve/deny) happens out of
/// band via the pending queue, so this polls rather than only checking
/// between inbound messages. Returns `true` if the DJ was approved (moved
/// into the roster), `false` if denied or disconnected.
async fn wait_for_pending_resolution(stream: &mut SplitStream<WebSocket>, app: &Arc<AppState>, dj_id: &str) -> bool {
    let mut poll = tokio::time::interval(Duration::from_millis(200));
    loop {
        tokio::select! {
            _ = poll.tick() => {
                if !app.dj_manager.pending.contains(dj_id) {
                    return app.dj_manager.roster.inner.lock().get(dj_id).is_some();
                }
            }
            message = stream.next() => {
                match message {
                    Some(Ok(Message::Close(_))) | None => {
                        app.dj_manager.pending.remove(dj_id);
                        app.browsers.broadcast(serde_json::json!({"type": "dj_denied", "dj_id": dj_id}));
                        return false;
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(_)) => return false,
                }
            }
        }
    }
}

async fn send_auth_success_and_sync(
    app: &Arc<AppState>,
    dj_id: &str,
    sink: &mut SplitSink<WebSocket, Message>,
    stream: &mut SplitStream<WebSocket>,
) {
    let (dj_name, is_active, direct_mode, pattern_name, pattern_config, band_sensitivity) = {
        let roster = app.dj_manager.roster.inner.lock();
        let broadcast = app.broadcast.read();
        let dj_name = roster.get(dj_id).map(|c| c.dj_name.clone()).unwrap_or_default();
        let direct_mode = roster.get(dj_id).map(|c| c.direct_mode).unwrap_or(false);
        (
            dj_name,
            roster.is_active(dj_id),
            direct_mode,
            broadcast.current_pattern_name.clone(),
            broadcast.pattern_config.clone(),
            broadcast.band_sensitivity,
        )
    };
    let pattern_config_info = PatternConfigInfo::from(&pattern_config);

    let success = DjOutbound::AuthSuccess {
        dj_id: dj_id.to_string(),
        dj_name,
        is_active,
        current_pattern: pattern_name.clone(),
        pattern_config: pattern_config_info.clone(),
        minecraft_host: Some(app.config.minecraft_host.clone()),
        minecraft_port: Some(app.config.minecraft_port),
        zone: Some(app.config.zone.clone()),
        entity_count: Some(pattern_config.entity_count),
    };
    if let Ok(text) = serde_json::to_string(&success) {
        let _ = sink.send(Message::Text(text)).await;
    }

    let t1 = now_secs();
    let request = DjOutbound::ClockSyncRequest { server_time: t1 };
    if let Ok(text) = serde_json::to_string(&request) {
        let _ = sink.send(Message::Text(text)).await;
    }

    let response = timeout(Duration::from_secs(CLOCK_SYNC_DEADLINE_SECS), stream.next()).await;
    if let Ok(Some(Ok(Message::Text(text)))) = response {
        if let Ok(DjInbound::ClockSyncResponse { dj_recv_time, dj_send_time }) =
            serde_json::from_str::<DjInbound>(&text)
        {
            let t4 = now_secs();
            accept_clock_sync(app, dj_id, t1, dj_recv_time, dj_send_time, t4);
        }
    }

    // §4.6(a)/§5: stream_route is emitted after auth_success and before
    // any other routing-sensitive server->DJ message.
    let route = DjManager::build_stream_route(
        direct_mode,
        is_active,
        app.config.minecraft_host.clone(),
        app.config.minecraft_port,
        app.config.zone.clone(),
        pattern_config.entity_count,
        pattern_name,
        pattern_config_info,
        Vec::new(),
        band_sensitivity,
        "auth_success",
    );
    if let Ok(text) = serde_json::to_string(&route) {
        let _ = sink.send(Message::Text(text)).await;
    }
}

/// Accepts a clock-sync sample (NTP-style 4-timestamp exchange) only when
/// all timestamps are finite and both the clock skew and measured
/// round-trip time fall within the documented bounds.
fn accept_clock_sync(app: &Arc<AppState>, dj_id: &str, t1: f64, t2: f64, t3: f64, t4: f64) {
    let all_finite = [t1, t2, t3, t4].iter().all(|v| v.is_finite());
    let skew_ok = (t2 - t1).abs() < CLOCK_SYNC_MAX_SKEW_SECS && (t3 - t4).abs() < CLOCK_SYNC_MAX_SKEW_SECS;
    let rtt = (t4 - t1) - (t3 - t2);
    let rtt_ok = (0.0..=CLOCK_SYNC_MAX_RTT_SECS).contains(&rtt);

    if !(all_finite && skew_ok && rtt_ok) {
        return;
    }

    let offset = ((t2 - t1) + (t3 - t4)) / 2.0;
    let mut roster = app.dj_manager.roster.inner.lock();
    if let Some(conn) = roster.get_mut(dj_id) {
        conn.clock_offset_secs = offset;
        conn.clock_sync_done = true;
    }
}

async fn steady_state_loop(app: &Arc<AppState>, dj_id: &str, stream: &mut SplitStream<WebSocket>) {
    while let Some(message) = stream.next().await {
        let text = match message {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => continue,
        };
        let Ok(parsed) = serde_json::from_str::<DjInbound>(&text) else {
            continue;
        };

        match parsed {
            DjInbound::DjAudioFrame { .. } => handle_audio_frame(app, dj_id, &text),
            DjInbound::DjHeartbeat { ts, mc_connected } => handle_heartbeat(app, dj_id, ts, mc_connected),
            DjInbound::VoiceAudio { .. } => {
                // Opaque fire-and-forget relay to the renderer while this DJ
                // is active; the payload itself is never inspected
                // server-side and a non-responding renderer must not stall
                // this DJ's inbound loop.
                let is_active = app.dj_manager.roster.inner.lock().is_active(dj_id);
                if is_active {
                    app.renderer.send_opaque("voice_audio", serde_json::json!({"raw": text})).await;
                }
            }
            DjInbound::GoingOffline {} => break,
            DjInbound::Ping {} => {
                if let Some(conn) = app.dj_manager.roster.inner.lock().get(dj_id) {
                    conn.send(DjOutbound::Pong {});
                }
            }
            _ => {}
        }
    }
}

fn handle_audio_frame(app: &Arc<AppState>, dj_id: &str, raw_text: &str) {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(raw_text) else {
        return;
    };
    let mut roster = app.dj_manager.roster.inner.lock();
    let Some(conn) = roster.get_mut(dj_id) else { return };
    if !conn.check_rate_limit() {
        return;
    }
    let frame: AudioFrame = sanitize_audio_frame(&value);
    conn.accept_audio_frame(frame);
}

fn handle_heartbeat(app: &Arc<AppState>, dj_id: &str, ts: f64, mc_connected: bool) {
    let now = now_secs();
    let mut roster = app.dj_manager.roster.inner.lock();
    let Some(conn) = roster.get_mut(dj_id) else { return };
    conn.mc_connected = mc_connected;

    if ts.is_finite() {
        let corrected_ts = ts - conn.clock_offset_secs;
        let rtt_ms = ((now - corrected_ts) * 1000.0).clamp(0.0, 60_000.0);
        conn.record_heartbeat_rtt(rtt_ms);
    }
    conn.send(DjOutbound::HeartbeatAck {
        server_time: now,
        echo_ts: ts,
    });
}

fn remove_and_auto_switch(app: &Arc<AppState>, dj_id: &str) {
    let mut roster = app.dj_manager.roster.inner.lock();
    let was_active = roster.remove(dj_id);
    if was_active {
        roster.auto_switch();
    }
    drop(roster);
    app.browsers.broadcast(serde_json::json!({"type": "dj_roster"}));
}

async fn send_close(sink: &mut SplitSink<WebSocket, Message>, reason: CloseReason) {
    let _ = sink
        .send(Message::Close(Some(CloseFrame {
            code: reason.code,
            reason: reason.message.into(),
        })))
        .await;
}
