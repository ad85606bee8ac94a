//! Browser/admin control plane (C10).

mod registry;

pub use registry::BrowserRegistry;

use serde_json::{json, Value};

use crate::audio_config::AudioConfig;
use crate::connect_code::ConnectCodeRegistry;
use crate::dj::DjManager;
use crate::effects::{ActiveEffect, EffectKind};
use crate::pattern::{clamp_entity_count, list_patterns};
use crate::protocol::{BrowserInboundEnvelope, DjOutbound, PatternConfigInfo};
use crate::state::AppState;

/// Renderer-forwarded message kinds passed through largely opaquely
/// (§4.10's fixed allowlist), beyond `set_zone_config` which also mirrors
/// fields into local `PatternConfig`.
const RENDERER_FORWARDED_KINDS: &[&str] = &[
    "set_zone_config",
    "set_render_mode",
    "init_pool",
    "cleanup_zone",
    "get_renderer_capabilities",
    "particle_config",
    "hologram_config",
    "glow_config",
    "brightness_config",
    "banner_config",
];

/// Handles one inbound browser control-plane message, returning zero or
/// more outbound messages: `(recipient, message)` where `recipient` of
/// `None` means "broadcast to all browser observers" and `Some(id)` means
/// "reply to the sender only".
pub async fn dispatch(
    app: &AppState,
    sender_id: u64,
    envelope: BrowserInboundEnvelope,
) -> Vec<(Option<u64>, Value)> {
    let kind = envelope.kind.as_str();
    let payload = envelope.payload;

    match kind {
        "ping" => vec![(Some(sender_id), json!({"type": "pong"}))],

        "get_state" => vec![(Some(sender_id), build_state_snapshot(app))],

        "set_pattern" => {
            let Some(name) = payload.get("pattern").and_then(Value::as_str) else {
                return vec![(Some(sender_id), error_message("set_pattern requires 'pattern'"))];
            };
            if crate::pattern::get_pattern(name).is_none() {
                return vec![(Some(sender_id), error_message(&format!("unknown pattern '{name}'")))];
            }
            {
                let mut broadcast = app.broadcast.write();
                broadcast.current_pattern_name = name.to_string();
            }
            vec![(None, json!({"type": "pattern_changed", "pattern": name}))]
        }

        "set_preset" => {
            let preset_name = payload.get("preset").and_then(Value::as_str).unwrap_or("auto").to_string();
            let config = AudioConfig::preset(&preset_name);
            {
                let mut broadcast = app.broadcast.write();
                broadcast.audio_config = config;
                broadcast.band_sensitivity = config.band_sensitivity;
            }
            for conn in app.dj_manager.roster.inner.lock().connections.values() {
                conn.send(DjOutbound::PresetSync { preset: preset_name.clone() });
            }
            vec![(None, json!({"type": "preset_changed", "preset": preset_name}))]
        }

        "set_band_sensitivity" => {
            if let Some(values) = payload.get("sensitivity").and_then(Value::as_array) {
                let mut sensitivity = [1.0_f64; 5];
                for (i, v) in values.iter().take(5).enumerate() {
                    sensitivity[i] = v.as_f64().unwrap_or(1.0).clamp(0.0, 4.0);
                }
                app.broadcast.write().band_sensitivity = sensitivity;
            }
            vec![(None, json!({"type": "config_update"}))]
        }

        "set_audio_setting" => {
            vec![(None, json!({"type": "config_update", "setting": payload.get("setting")}))]
        }

        "set_entity_count" => {
            let requested = payload.get("entity_count").and_then(Value::as_u64).unwrap_or(32) as u32;
            let clamped = clamp_entity_count(requested);
            let changed = {
                let mut broadcast = app.broadcast.write();
                let changed = broadcast.pattern_config.entity_count != clamped;
                broadcast.pattern_config.entity_count = clamped;
                changed
            };
            if changed {
                let _ = app.renderer.request("cleanup_zone", json!({"zone": app.config.zone})).await;
                let _ = app.renderer.init_pool(&app.config.zone, clamped).await;
                for conn in app.dj_manager.roster.inner.lock().connections.values() {
                    conn.send(DjOutbound::ConfigSync {
                        entity_count: clamped,
                        zone: app.config.zone.clone(),
                    });
                }
            }
            vec![(None, json!({"type": "config_update", "entity_count": clamped}))]
        }

        // Zone is fixed at bootstrap (`ServerConfig::zone`) and cannot be
        // changed at runtime; report that honestly rather than pretending
        // to apply a change that never happens.
        "set_zone" => {
            let requested = payload.get("zone").and_then(Value::as_str).unwrap_or(&app.config.zone);
            if requested != app.config.zone {
                vec![(
                    Some(sender_id),
                    error_message("zone is fixed at startup and cannot be changed at runtime"),
                )]
            } else {
                vec![(None, json!({"type": "config_update", "zone": app.config.zone}))]
            }
        }

        "set_active_dj" => {
            let Some(dj_id) = payload.get("dj_id").and_then(Value::as_str) else {
                return vec![(Some(sender_id), error_message("set_active_dj requires 'dj_id'"))];
            };
            let (pattern_name, pattern_config, band_sensitivity) = {
                let broadcast = app.broadcast.read();
                (
                    broadcast.current_pattern_name.clone(),
                    PatternConfigInfo::from(&broadcast.pattern_config),
                    broadcast.band_sensitivity,
                )
            };
            let mut roster = app.dj_manager.roster.inner.lock();
            DjManager::set_active_locked(&mut roster, dj_id, |direct_mode, is_active| {
                DjManager::build_stream_route(
                    direct_mode,
                    is_active,
                    app.config.minecraft_host.clone(),
                    app.config.minecraft_port,
                    app.config.zone.clone(),
                    pattern_config.entity_count,
                    pattern_name.clone(),
                    pattern_config.clone(),
                    Vec::new(),
                    band_sensitivity,
                    "active_dj_changed",
                )
            });
            drop(roster);
            vec![(None, json!({"type": "dj_roster"}))]
        }

        "kick_dj" => {
            if let Some(dj_id) = payload.get("dj_id").and_then(Value::as_str) {
                app.dj_manager.roster.inner.lock().remove(dj_id);
            }
            vec![(None, json!({"type": "dj_roster"}))]
        }

        "approve_dj" => {
            let Some(dj_id) = payload.get("dj_id").and_then(Value::as_str) else {
                return vec![(Some(sender_id), error_message("approve_dj requires 'dj_id'"))];
            };
            if let Some(pending) = app.dj_manager.pending.take(dj_id) {
                let conn = crate::dj::connection::DjConnection::new(
                    pending.dj_id.clone(),
                    pending.dj_name.clone(),
                    0,
                    pending.direct_mode,
                    pending.sender,
                );
                app.dj_manager.roster.inner.lock().insert(conn);
                vec![
                    (None, json!({"type": "dj_approved", "dj_id": dj_id})),
                    (None, json!({"type": "dj_roster"})),
                ]
            } else {
                vec![(Some(sender_id), error_message(&format!("no pending DJ '{dj_id}'")))]
            }
        }

        "deny_dj" => {
            if let Some(dj_id) = payload.get("dj_id").and_then(Value::as_str) {
                app.dj_manager.pending.remove(dj_id);
                return vec![(None, json!({"type": "dj_denied", "dj_id": dj_id}))];
            }
            vec![(Some(sender_id), error_message("deny_dj requires 'dj_id'"))]
        }

        "reorder_dj_queue" => {
            if let Some(order) = payload.get("order").and_then(Value::as_array) {
                let ids: Vec<String> = order
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect();
                app.dj_manager.roster.inner.lock().reorder(&ids);
            }
            vec![(None, json!({"type": "dj_roster"}))]
        }

        "generate_connect_code" => {
            let ttl = payload.get("ttl_minutes").and_then(Value::as_i64);
            let code = app.connect_codes.generate(ttl);
            vec![(
                Some(sender_id),
                json!({"type": "connect_code_generated", "code": code.code, "expires_at": code.expires_at}),
            )]
        }

        "get_connect_codes" => {
            let codes = app.connect_codes.list_valid();
            vec![(Some(sender_id), json!({"type": "connect_codes", "codes": codes}))]
        }

        "revoke_connect_code" => {
            if let Some(code) = payload.get("code").and_then(Value::as_str) {
                app.connect_codes.revoke(code);
            }
            vec![(Some(sender_id), json!({"type": "connect_codes", "codes": app.connect_codes.list_valid()}))]
        }

        "get_dj_roster" => {
            vec![(Some(sender_id), build_roster_snapshot(app))]
        }

        "get_pending_djs" => {
            let pending = app.dj_manager.pending.list();
            vec![(Some(sender_id), json!({"type": "dj_pending", "pending": pending}))]
        }

        "trigger_effect" | "blackout" | "freeze" => {
            let effect_name = if kind == "trigger_effect" {
                payload.get("effect").and_then(Value::as_str).unwrap_or("flash").to_string()
            } else {
                kind.to_string()
            };
            let intensity = payload.get("intensity").and_then(Value::as_f64).unwrap_or(1.0);
            let duration_ms = payload.get("duration_ms").and_then(Value::as_u64).unwrap_or(1000);

            match parse_effect_kind(&effect_name) {
                // Toggles (§4.8): intensity 0 clears the toggle, any other
                // intensity sets it indefinitely. Blackout additionally
                // drives the renderer's visibility state directly, since
                // that side effect can't wait for the next tick.
                Some(EffectKind::Blackout) => {
                    let turning_on = intensity != 0.0;
                    app.broadcast.write().blackout = turning_on;
                    let _ = app.renderer.set_visible(&app.config.zone, !turning_on).await;
                }
                Some(EffectKind::Freeze) => {
                    app.broadcast.write().freeze = intensity != 0.0;
                }
                Some(effect_kind) => {
                    let mut broadcast = app.broadcast.write();
                    broadcast
                        .active_effects
                        .push(ActiveEffect::trigger(effect_kind, intensity, duration_ms));
                }
                None => {}
            }
            vec![(None, json!({"type": "effect_triggered", "effect": effect_name}))]
        }

        "voice_config" | "get_voice_status" => {
            vec![(None, json!({"type": "voice_status"}))]
        }

        kind if RENDERER_FORWARDED_KINDS.contains(&kind) => {
            if kind == "set_zone_config" {
                if let Some(config) = payload.get("config") {
                    let mut broadcast = app.broadcast.write();
                    if let Some(n) = config.get("entity_count").and_then(Value::as_u64) {
                        broadcast.pattern_config.entity_count = clamp_entity_count(n as u32);
                    }
                    if let Some(n) = config.get("base_scale").and_then(Value::as_f64) {
                        broadcast.pattern_config.base_scale = n;
                    }
                    if let Some(n) = config.get("max_scale").and_then(Value::as_f64) {
                        broadcast.pattern_config.max_scale = n;
                    }
                }
            }
            let zone = payload.get("zone").and_then(Value::as_str).unwrap_or(&app.config.zone).to_string();
            let _ = app.renderer.request(kind, json!({"zone": zone, "payload": payload})).await;
            Vec::new()
        }

        _ => vec![(Some(sender_id), error_message(&format!("unknown message type '{kind}'")))],
    }
}

fn parse_effect_kind(name: &str) -> Option<EffectKind> {
    match name {
        "flash" => Some(EffectKind::Flash),
        "strobe" => Some(EffectKind::Strobe),
        "pulse" => Some(EffectKind::Pulse),
        "wave" => Some(EffectKind::Wave),
        "spiral" => Some(EffectKind::Spiral),
        "explode" => Some(EffectKind::Explode),
        "blackout" => Some(EffectKind::Blackout),
        "freeze" => Some(EffectKind::Freeze),
        _ => None,
    }
}

fn error_message(message: &str) -> Value {
    json!({"type": "error", "message": message})
}

fn build_state_snapshot(app: &AppState) -> Value {
    let broadcast = app.broadcast.read();
    let roster = app.dj_manager.roster.inner.lock();
    json!({
        "type": "vj_state",
        "patterns": list_patterns(),
        "current_pattern": broadcast.current_pattern_name,
        "entity_count": broadcast.pattern_config.entity_count,
        "zone": app.config.zone,
        "active_dj": roster.active_dj_id,
        "minecraft_connected": app.renderer.is_connected(),
        "pending_count": app.dj_manager.pending.list().len(),
    })
}

fn build_roster_snapshot(app: &AppState) -> Value {
    let roster = app.dj_manager.roster.inner.lock();
    let entries: Vec<Value> = roster
        .queue
        .iter()
        .filter_map(|id| roster.get(id))
        .map(|c| {
            json!({
                "dj_id": c.dj_id,
                "dj_name": c.dj_name,
                "priority": c.priority,
                "is_active": roster.is_active(&c.dj_id),
                "direct_mode": c.direct_mode,
                "latency_ms": c.latency_ms(),
                "fps": c.fps(),
            })
        })
        .collect();
    json!({"type": "dj_roster", "roster": entries, "active_dj": roster.active_dj_id})
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthStore;
    use crate::state::ServerConfig;

    #[tokio::test]
    async fn ping_replies_with_pong_to_sender_only() {
        let app = AppState::new(ServerConfig::default(), AuthStore::empty());
        let envelope = BrowserInboundEnvelope {
            kind: "ping".into(),
            payload: json!({}),
        };
        let replies = dispatch(&app, 7, envelope).await;
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].0, Some(7));
        assert_eq!(replies[0].1["type"], "pong");
    }

    #[tokio::test]
    async fn set_pattern_with_unknown_name_replies_error() {
        let app = AppState::new(ServerConfig::default(), AuthStore::empty());
        let envelope = BrowserInboundEnvelope {
            kind: "set_pattern".into(),
            payload: json!({"pattern": "not-a-pattern"}),
        };
        let replies = dispatch(&app, 1, envelope).await;
        assert_eq!(replies[0].1["type"], "error");
    }

    #[tokio::test]
    async fn set_pattern_with_known_name_broadcasts_to_all() {
        let app = AppState::new(ServerConfig::default(), AuthStore::empty());
        let envelope = BrowserInboundEnvelope {
            kind: "set_pattern".into(),
            payload: json!({"pattern": "radial"}),
        };
        let replies = dispatch(&app, 1, envelope).await;
        assert_eq!(replies[0].0, None);
        assert_eq!(app.broadcast.read().current_pattern_name, "radial");
    }

    #[tokio::test]
    async fn trigger_effect_inserts_active_effect() {
        let app = AppState::new(ServerConfig::default(), AuthStore::empty());
        let envelope = BrowserInboundEnvelope {
            kind: "trigger_effect".into(),
            payload: json!({"effect": "flash", "intensity": 0.5, "duration_ms": 500}),
        };
        dispatch(&app, 1, envelope).await;
        assert_eq!(app.broadcast.read().active_effects.len(), 1);
    }

    #[tokio::test]
    async fn blackout_on_sets_flag_and_does_not_touch_active_effects() {
        let app = AppState::new(ServerConfig::default(), AuthStore::empty());
        let envelope = BrowserInboundEnvelope {
            kind: "blackout".into(),
            payload: json!({"intensity": 1.0}),
        };
        dispatch(&app, 1, envelope).await;
        assert!(app.broadcast.read().blackout);
        assert!(app.broadcast.read().active_effects.is_empty());
    }

    #[tokio::test]
    async fn blackout_off_clears_flag() {
        let app = AppState::new(ServerConfig::default(), AuthStore::empty());
        app.broadcast.write().blackout = true;
        let envelope = BrowserInboundEnvelope {
            kind: "blackout".into(),
            payload: json!({"intensity": 0.0}),
        };
        dispatch(&app, 1, envelope).await;
        assert!(!app.broadcast.read().blackout);
    }

    #[tokio::test]
    async fn freeze_toggles_flag_without_active_effects_entry() {
        let app = AppState::new(ServerConfig::default(), AuthStore::empty());
        let envelope = BrowserInboundEnvelope {
            kind: "freeze".into(),
            payload: json!({"intensity": 1.0}),
        };
        dispatch(&app, 1, envelope).await;
        assert!(app.broadcast.read().freeze);
        assert!(app.broadcast.read().active_effects.is_empty());
    }

    #[tokio::test]
    async fn set_active_dj_sends_stream_route_to_every_dj() {
        let app = AppState::new(ServerConfig::default(), AuthStore::empty());
        let (tx_alice, mut rx_alice) = tokio::sync::mpsc::unbounded_channel();
        let (tx_bob, mut rx_bob) = tokio::sync::mpsc::unbounded_channel();
        {
            let mut roster = app.dj_manager.roster.inner.lock();
            roster.insert(crate::dj::connection::DjConnection::new(
                "alice".into(),
                "Alice".into(),
                10,
                true,
                tx_alice,
            ));
            roster.insert(crate::dj::connection::DjConnection::new(
                "bob".into(),
                "Bob".into(),
                5,
                false,
                tx_bob,
            ));
        }
        // alice is active from the empty-roster auto-activation; switch to bob.
        let envelope = BrowserInboundEnvelope {
            kind: "set_active_dj".into(),
            payload: json!({"dj_id": "bob"}),
        };
        dispatch(&app, 1, envelope).await;

        assert!(app.dj_manager.roster.inner.lock().is_active("bob"));

        let mut saw_route_for_alice = false;
        while let Ok(msg) = rx_alice.try_recv() {
            if matches!(msg, DjOutbound::StreamRoute { .. }) {
                saw_route_for_alice = true;
            }
        }
        let mut saw_route_for_bob = false;
        while let Ok(msg) = rx_bob.try_recv() {
            if matches!(msg, DjOutbound::StreamRoute { .. }) {
                saw_route_for_bob = true;
            }
        }
        assert!(saw_route_for_alice);
        assert!(saw_route_for_bob);
    }

    #[tokio::test]
    async fn set_preset_rebroadcasts_preset_sync_to_djs() {
        let app = AppState::new(ServerConfig::default(), AuthStore::empty());
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        app.dj_manager.roster.inner.lock().insert(crate::dj::connection::DjConnection::new(
            "alice".into(),
            "Alice".into(),
            10,
            false,
            tx,
        ));
        let envelope = BrowserInboundEnvelope {
            kind: "set_preset".into(),
            payload: json!({"preset": "edm"}),
        };
        dispatch(&app, 1, envelope).await;

        let mut saw_preset_sync = false;
        while let Ok(msg) = rx.try_recv() {
            if matches!(msg, DjOutbound::PresetSync { .. }) {
                saw_preset_sync = true;
            }
        }
        assert!(saw_preset_sync);
    }

    #[tokio::test]
    async fn set_zone_rejects_an_actual_change() {
        let app = AppState::new(ServerConfig::default(), AuthStore::empty());
        let envelope = BrowserInboundEnvelope {
            kind: "set_zone".into(),
            payload: json!({"zone": "not-the-configured-zone"}),
        };
        let replies = dispatch(&app, 1, envelope).await;
        assert_eq!(replies[0].1["type"], "error");
    }
}
