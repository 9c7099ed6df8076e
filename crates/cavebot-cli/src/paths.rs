//! Configuration file path resolution.
//!
//! Priority for the config file:
//! 1. `CAVEBOT_CONFIG` (explicit override, a file path)
//! 2. `$XDG_CONFIG_HOME/cavebot/config.json` (via the platform config dir)
//! 3. `~/.cavebot/config.json` (home directory fallback)
//! 4. `./cavebot.json` (last resort, current directory)

use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use cavebot_core::config::AgentConfig;

/// Resolve the default config file path with priority fallback.
pub fn default_config_path() -> PathBuf {
    // 1. Explicit override (ignore empty)
    if let Ok(path) = env::var("CAVEBOT_CONFIG") {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }

    // 2. Platform config directory
    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("cavebot").join("config.json");
    }

    // 3. Home directory fallback
    if let Some(home) = dirs::home_dir() {
        return home.join(".cavebot").join("config.json");
    }

    // 4. Last resort: current directory
    PathBuf::from("cavebot.json")
}

/// Load and validate the agent configuration.
///
/// `explicit` (from `--config`) wins over the resolution chain.
pub fn load_config(explicit: Option<&Path>) -> Result<AgentConfig> {
    let path = explicit
        .map(Path::to_path_buf)
        .unwrap_or_else(default_config_path);

    let json = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read config file {:?}", path))?;

    let cfg = AgentConfig::from_json(&json)
        .with_context(|| format!("failed to parse config file {:?}", path))?;

    Ok(cfg)
}
