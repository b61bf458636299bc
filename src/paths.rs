//! Centralized path resolution for beehive
//!
//! # Environment Variables
//!
//! - `BEEHIVE_CONFIG_PATH` - Override the configuration root (`<env>.yml` files)
//! - `BEEHIVE_TOKEN_PATH` - Override the token directory
//! - `BEEHIVE_ENV` - Default environment for `-e`
//!
//! # Path Resolution Priority
//!
//! For config_dir():
//! 1. `BEEHIVE_CONFIG_PATH` environment variable
//! 2. `XDG_CONFIG_HOME/beehive` (if set)
//! 3. `~/.config/beehive`
//!
//! For token_dir():
//! 1. `BEEHIVE_TOKEN_PATH` environment variable
//! 2. `XDG_STATE_HOME/beehive/tokens` (if set)
//! 3. `~/.local/state/beehive/tokens`

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Environment variable for the configuration root override
pub const ENV_CONFIG_PATH: &str = "BEEHIVE_CONFIG_PATH";

/// Environment variable for the token directory override
pub const ENV_TOKEN_PATH: &str = "BEEHIVE_TOKEN_PATH";

/// Environment variable providing the default environment
pub const ENV_DEFAULT_ENV: &str = "BEEHIVE_ENV";

/// Environment variable providing the secret decryption key
pub const ENV_KEY: &str = "BEEHIVE_KEY";

/// Environment used when neither `-e` nor `BEEHIVE_ENV` is given
pub const DEFAULT_ENV: &str = "default";

const APP_DIR: &str = "beehive";

/// Get the configuration root
pub fn config_dir() -> Result<PathBuf> {
    if let Some(path) = env_path(ENV_CONFIG_PATH) {
        log::debug!("Using config dir from {}: {}", ENV_CONFIG_PATH, path.display());
        return Ok(path);
    }

    if let Some(xdg_config) = env_path("XDG_CONFIG_HOME") {
        let path = xdg_config.join(APP_DIR);
        log::debug!("Using XDG_CONFIG_HOME: {}", path.display());
        return Ok(path);
    }

    let home = dirs::home_dir().context("Could not determine home directory")?;
    let path = home.join(".config").join(APP_DIR);
    log::debug!("Using default config dir: {}", path.display());
    Ok(path)
}

/// Get the token directory
pub fn token_dir() -> Result<PathBuf> {
    if let Some(path) = env_path(ENV_TOKEN_PATH) {
        log::debug!("Using token dir from {}: {}", ENV_TOKEN_PATH, path.display());
        return Ok(path);
    }

    if let Some(xdg_state) = env_path("XDG_STATE_HOME") {
        let path = xdg_state.join(APP_DIR).join("tokens");
        log::debug!("Using XDG_STATE_HOME: {}", path.display());
        return Ok(path);
    }

    let home = dirs::home_dir().context("Could not determine home directory")?;
    let path = home.join(".local").join("state").join(APP_DIR).join("tokens");
    log::debug!("Using default token dir: {}", path.display());
    Ok(path)
}

/// Directory holding customizer specs
pub fn customize_dir(config_root: &Path) -> PathBuf {
    config_root.join("customize")
}

/// Default environment name: `BEEHIVE_ENV` or `default`
pub fn default_env() -> String {
    std::env::var(ENV_DEFAULT_ENV)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_ENV.to_string())
}

/// Expand ~ and environment variables in a path string.
///
/// # Examples
///
/// ```ignore
/// let nodes = paths::expand("~/inventory/nodes.txt");
/// let out = paths::expand("$HOME/node-check.json");
/// ```
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}

fn env_path(key: &str) -> Option<PathBuf> {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(|v| expand(&v))
}

// ============================================================================
// Tests
// ============================================================================
