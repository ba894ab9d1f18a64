//! Configuration loading from file system
//!
//! Handles reading `~/.scripthost/config.json` and the environment override.

use std::path::{Path, PathBuf};

use tracing::{info, instrument, warn};

use super::defaults::{DEFAULT_CONFIG_PATH, STANDALONE_ENV};
use super::types::Config;
use crate::error::{HostError, Result};

/// Load configuration from ~/.scripthost/config.json
///
/// Returns defaults (plus environment overrides) if the file is missing or
/// cannot be parsed.
#[instrument(name = "load_config")]
pub fn load_config() -> Config {
    let config_path = PathBuf::from(shellexpand::tilde(DEFAULT_CONFIG_PATH).as_ref());

    let mut config = if !config_path.exists() {
        info!(path = %config_path.display(), "Config file not found, using defaults");
        Config::default()
    } else {
        match load_config_from(&config_path) {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %e, "Failed to load config, using defaults");
                Config::default()
            }
        }
    };

    apply_env_overrides(&mut config, std::env::var(STANDALONE_ENV).ok().as_deref());
    config
}

/// Strict variant for callers that name a config file explicitly
pub fn load_config_from(path: &Path) -> Result<Config> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| HostError::Config(format!("cannot read {}: {}", path.display(), e)))?;

    let config: Config = serde_json::from_str(&raw).map_err(|e| {
        let hint = if e.to_string().contains("missing field `path`") {
            " (hint: \"script\" needs a \"path\", e.g. {\"script\": {\"path\": \"~/extract.py\"}})"
        } else {
            ""
        };
        HostError::Config(format!("invalid {}: {}{}", path.display(), e, hint))
    })?;

    info!(path = %path.display(), standalone = config.is_standalone(), "Loaded config");
    Ok(config)
}

/// Apply `SCRIPT_HOST_STANDALONE`; the raw value is passed in for testability
pub fn apply_env_overrides(config: &mut Config, standalone: Option<&str>) {
    let Some(raw) = standalone else {
        return;
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => config.standalone = Some(true),
        "0" | "false" | "no" => config.standalone = Some(false),
        other => warn!(value = other, var = STANDALONE_ENV, "Ignoring unrecognised override"),
    }
}
