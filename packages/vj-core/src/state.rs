//! Shared server configuration and broadcast-loop-owned state.

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::audio_config::AudioConfig;
use crate::effects::ActiveEffect;
use crate::entity::Entity;
use crate::pattern::PatternConfig;
use crate::protocol_constants::{
    DEFAULT_BROWSER_PORT, DEFAULT_DJ_PORT, DEFAULT_HTTP_PORT, DEFAULT_METRICS_PORT,
    DEFAULT_RENDERER_HOST, DEFAULT_RENDERER_PORT,
};

/// Static server configuration, resolved from defaults, a YAML file, env
/// vars, and CLI flags (in that override order — see `vj-server`'s config
/// loader).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub dj_port: u16,
    pub browser_port: u16,
    pub http_port: u16,
    pub metrics_port: u16,
    pub minecraft_host: String,
    pub minecraft_port: u16,
    pub dj_auth_file: PathBuf,
    pub require_auth: bool,
    pub zone: String,
    pub data_dir: PathBuf,
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            dj_port: DEFAULT_DJ_PORT,
            browser_port: DEFAULT_BROWSER_PORT,
            http_port: DEFAULT_HTTP_PORT,
            metrics_port: DEFAULT_METRICS_PORT,
            minecraft_host: DEFAULT_RENDERER_HOST.to_string(),
            minecraft_port: DEFAULT_RENDERER_PORT,
            dj_auth_file: PathBuf::from("configs/dj_auth.json"),
            require_auth: true,
            zone: "default".to_string(),
            data_dir: PathBuf::from("data/audioviz"),
            log_level: "info".to_string(),
        }
    }
}

impl ServerConfig {
    /// Applies the documented env-var overrides (1:1 with the original's
    /// `ServerConfig.from_env`), leaving unset vars at their current value.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("MINECRAFT_HOST") {
            self.minecraft_host = v;
        }
        if let Ok(v) = std::env::var("MINECRAFT_PORT").and_then(|v| v.parse().map_err(|_| std::env::VarError::NotPresent)) {
            self.minecraft_port = v;
        }
        if let Ok(v) = std::env::var("VJ_SERVER_PORT").and_then(|v| v.parse().map_err(|_| std::env::VarError::NotPresent)) {
            self.dj_port = v;
        }
        if let Ok(v) = std::env::var("PREVIEW_PORT").and_then(|v| v.parse().map_err(|_| std::env::VarError::NotPresent)) {
            self.browser_port = v;
        }
        if let Ok(v) = std::env::var("HTTP_PORT").and_then(|v| v.parse().map_err(|_| std::env::VarError::NotPresent)) {
            self.http_port = v;
        }
        if let Ok(v) = std::env::var("DJ_AUTH_FILE") {
            self.dj_auth_file = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("VJ_METRICS_PORT").and_then(|v| v.parse().map_err(|_| std::env::VarError::NotPresent)) {
            self.metrics_port = v;
        }
        if let Ok(v) = std::env::var("VJ_DATA_DIR") {
            self.data_dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("VJ_LOG_LEVEL") {
            self.log_level = v;
        }
    }
}

/// State owned by the 60 Hz broadcast loop (§5): current pattern, its
/// config, active effects, band sensitivity, and the last frame's entities
/// (reused when nothing changed, e.g. for late-joining browser observers).
pub struct BroadcastState {
    pub current_pattern_name: String,
    pub pattern_config: PatternConfig,
    pub active_effects: Vec<ActiveEffect>,
    pub band_sensitivity: [f64; 5],
    pub last_entities: Vec<Entity>,
    pub audio_config: AudioConfig,
    pub frame_counter: u64,
    /// Toggle effects (C8): while set, the tick pipeline skips pattern
    /// rendering entirely (§4.11 steps 5-6). `blackout` dominates `freeze`.
    pub blackout: bool,
    pub freeze: bool,
}

impl Default for BroadcastState {
    fn default() -> Self {
        Self {
            current_pattern_name: "spectrum".to_string(),
            pattern_config: PatternConfig::default(),
            active_effects: Vec::new(),
            band_sensitivity: [1.0; 5],
            last_entities: Vec::new(),
            audio_config: AudioConfig::default(),
            frame_counter: 0,
            blackout: false,
            freeze: false,
        }
    }
}

/// Shared application state handed to every socket handler and background
/// task. Each field is independently lockable; §5 only requires that the
/// roster (map+queue+active id) and the broadcast state move as their own
/// units, which `DjRoster`/`BroadcastState` already encapsulate.
pub struct AppState {
    pub config: ServerConfig,
    pub broadcast: RwLock<BroadcastState>,
    pub dj_manager: crate::dj::DjManager,
    pub connect_codes: crate::connect_code::ConnectCodeRegistry,
    pub auth: crate::auth::AuthStore,
    pub renderer: Arc<crate::renderer_client::RendererClient>,
    pub browsers: crate::browser::BrowserRegistry,
}

impl AppState {
    pub fn new(config: ServerConfig, auth: crate::auth::AuthStore) -> Arc<Self> {
        let renderer = crate::renderer_client::RendererClient::new(
            &config.minecraft_host,
            config.minecraft_port,
        );
        Arc::new(Self {
            config,
            broadcast: RwLock::new(BroadcastState::default()),
            dj_manager: crate::dj::DjManager::new(),
            connect_codes: crate::connect_code::ConnectCodeRegistry::new(),
            auth,
            renderer,
            browsers: crate::browser::BrowserRegistry::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_documented_ports() {
        let config = ServerConfig::default();
        assert_eq!(config.dj_port, 9000);
        assert_eq!(config.browser_port, 8766);
        assert_eq!(config.http_port, 8080);
        assert_eq!(config.minecraft_port, 8765);
    }

    #[test]
    fn app_state_starts_with_spectrum_pattern() {
        let state = AppState::new(ServerConfig::default(), crate::auth::AuthStore::empty());
        assert_eq!(state.broadcast.read().current_pattern_name, "spectrum");
    }
}
