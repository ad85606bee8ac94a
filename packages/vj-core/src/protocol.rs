//! Wire protocol types.
//!
//! Field and variant names are chosen to serialize/deserialize compatibly
//! with the DJ client's own protocol structs (the literal counterpart
//! implementation this server talks to): snake_case field names, `type`-
//! tagged enums, `#[serde(rename_all = "snake_case")]` on variants so
//! `DjAudioFrame` serializes as `"dj_audio_frame"`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::entity::Entity;
use crate::pattern::PatternConfig;

/// Messages a DJ client sends to the server.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DjInbound {
    DjAuth {
        dj_id: String,
        dj_key: String,
        dj_name: String,
        #[serde(default)]
        direct_mode: bool,
    },
    CodeAuth {
        code: String,
        dj_name: String,
        #[serde(default)]
        direct_mode: bool,
    },
    ClockSyncResponse {
        dj_recv_time: f64,
        dj_send_time: f64,
    },
    DjAudioFrame {
        seq: u64,
        bands: Vec<f64>,
        peak: f64,
        #[serde(default)]
        beat: bool,
        beat_i: f64,
        bpm: f64,
        tempo_conf: f64,
        beat_phase: f64,
        #[serde(default)]
        i_bass: f64,
        #[serde(default)]
        i_kick: bool,
        #[serde(default)]
        ts: Option<f64>,
    },
    DjHeartbeat {
        ts: f64,
        #[serde(default)]
        mc_connected: bool,
    },
    VoiceAudio {
        seq: u64,
        data: String,
    },
    GoingOffline {},
    Ping {},
}

/// Messages the server sends to a DJ client.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DjOutbound {
    AuthPending {
        message: String,
        dj_id: String,
    },
    AuthSuccess {
        dj_id: String,
        dj_name: String,
        is_active: bool,
        current_pattern: String,
        pattern_config: PatternConfigInfo,
        #[serde(skip_serializing_if = "Option::is_none")]
        minecraft_host: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        minecraft_port: Option<u16>,
        #[serde(skip_serializing_if = "Option::is_none")]
        zone: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        entity_count: Option<u32>,
    },
    AuthDenied {
        message: String,
    },
    ClockSyncRequest {
        server_time: f64,
    },
    StreamRoute {
        route_mode: RouteMode,
        is_active: bool,
        minecraft_host: String,
        minecraft_port: u16,
        zone: String,
        entity_count: u32,
        current_pattern: String,
        pattern_config: PatternConfigInfo,
        pattern_scripts: Vec<String>,
        band_sensitivity: [f64; 5],
        relay_fallback: bool,
        reason: String,
    },
    HeartbeatAck {
        server_time: f64,
        echo_ts: f64,
    },
    PatternSync {
        pattern: String,
        config: PatternConfigInfo,
    },
    ConfigSync {
        entity_count: u32,
        zone: String,
    },
    PresetSync {
        preset: String,
    },
    StatusUpdate {
        is_active: bool,
    },
    BandSensitivitySync {
        sensitivity: [f64; 5],
    },
    AudioSettingSync {
        setting: String,
        value: f64,
    },
    Pong {},
}

/// Routing policy advertised to a DJ (§4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteMode {
    Relay,
    Dual,
}

/// PatternConfig as carried on the wire (mirrors the DJ client's
/// `PatternConfigInfo`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternConfigInfo {
    pub entity_count: u32,
    pub zone_size: f64,
    pub beat_boost: f64,
    pub base_scale: f64,
    pub max_scale: f64,
}

impl From<&PatternConfig> for PatternConfigInfo {
    fn from(config: &PatternConfig) -> Self {
        Self {
            entity_count: config.entity_count,
            zone_size: config.zone_size,
            beat_boost: config.beat_boost,
            base_scale: config.base_scale,
            max_scale: config.max_scale,
        }
    }
}

/// Zone health reported alongside each per-frame `state` message.
#[derive(Debug, Clone, Serialize)]
pub struct ZoneStatus {
    pub bpm_estimate: f64,
    pub tempo_confidence: f64,
    pub beat_phase: f64,
}

/// Per-frame visualization state pushed to browser observers.
#[derive(Debug, Clone, Serialize)]
pub struct StateFrame {
    pub entities: Vec<Entity>,
    pub bands: [f64; 5],
    pub amplitude: f64,
    pub is_beat: bool,
    pub beat_intensity: f64,
    pub instant_bass: f64,
    pub instant_kick: bool,
    pub frame: u64,
    pub pattern: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_dj: Option<String>,
    pub latency_ms: f64,
    pub ping_ms: f64,
    pub pipeline_latency_ms: f64,
    pub fps: f64,
    pub zone_status: ZoneStatus,
}

/// Browser/admin inbound control-plane messages. Payloads beyond `type`
/// are handled as a raw JSON object since the catalogue is wide (§4.10);
/// each handler extracts only the fields it needs.
#[derive(Debug, Clone, Deserialize)]
pub struct BrowserInboundEnvelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(flatten)]
    pub payload: Value,
}

/// Messages the server pushes to browser/admin observers outside the
/// per-frame `state` stream.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BrowserOutbound {
    Pong {},
    VjState(Value),
    DjRoster(Value),
    DjPending(Value),
    DjApproved(Value),
    DjDenied(Value),
    ConnectCodes(Value),
    ConnectCodeGenerated(Value),
    PatternChanged(Value),
    ConfigUpdate(Value),
    PresetChanged(Value),
    EffectTriggered(Value),
    MinecraftStatus(Value),
    BannerProfile(Value),
    BannerProfileSaved(Value),
    AllBannerProfiles(Value),
    BannerLogoProcessed(Value),
    VoiceStatus(Value),
    Error(Value),
}
