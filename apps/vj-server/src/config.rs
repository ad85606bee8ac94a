//! Configuration loading: YAML file, then environment overrides.

use std::path::Path;

use anyhow::{Context, Result};
use vj_core::ServerConfig;

/// Loads `vj-core`'s [`ServerConfig`] from an optional YAML file, then
/// applies the documented `VJ_*`/`MINECRAFT_*`/`PREVIEW_PORT`/`HTTP_PORT`
/// environment overrides on top.
pub fn load(path: Option<&Path>) -> Result<ServerConfig> {
    let mut config = if let Some(path) = path {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        serde_yaml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?
    } else {
        ServerConfig::default()
    };

    config.apply_env_overrides();
    Ok(config)
}
