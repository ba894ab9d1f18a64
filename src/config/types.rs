//! Configuration type definitions
//!
//! This module contains all the struct definitions for configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::defaults::*;
use crate::worker::ScriptSpec;

fn expand(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).as_ref())
}

// ============================================
// SCRIPT
// ============================================

/// The background script to run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptConfig {
    /// Path to the script; `~` is expanded
    pub path: String,
    /// Interpreter override (default: inferred from the extension)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interpreter: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
}

impl ScriptConfig {
    pub fn to_spec(&self) -> ScriptSpec {
        let mut spec = ScriptSpec::new(expand(&self.path)).with_args(self.args.iter().cloned());
        if let Some(interpreter) = &self.interpreter {
            spec = spec.with_interpreter(interpreter.clone());
        }
        spec
    }
}

// ============================================
// HOST
// ============================================

/// Embedding host reachable over a Unix socket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostConfig {
    pub socket: String,
}

impl HostConfig {
    pub fn socket_path(&self) -> PathBuf {
        expand(&self.socket)
    }
}

// ============================================
// LOGGING
// ============================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogConfig {
    /// Directory for the JSONL log (default: ~/.scripthost/logs)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<String>,
    /// EnvFilter directive (default: "info"); RUST_LOG wins when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
}

impl LogConfig {
    pub fn log_dir(&self) -> PathBuf {
        expand(self.dir.as_deref().unwrap_or(DEFAULT_LOG_DIR))
    }

    pub fn log_file(&self) -> PathBuf {
        self.log_dir().join(DEFAULT_LOG_FILE)
    }

    pub fn filter(&self) -> &str {
        self.filter.as_deref().unwrap_or(DEFAULT_LOG_FILTER)
    }
}

// ============================================
// MAIN CONFIG
// ============================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script: Option<ScriptConfig>,
    /// Run without a host (default: true unless a host socket is configured)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub standalone: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<HostConfig>,
    /// Locale passed to prompt factories (default: "en")
    #[serde(default = "default_locale")]
    pub locale: String,
    /// Outbound host queue depth (default: 100)
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    /// SIGTERM to SIGKILL grace period in ms (default: 250)
    #[serde(default = "default_term_grace_ms")]
    pub term_grace_ms: u64,
    #[serde(default)]
    pub log: LogConfig,
}

fn default_locale() -> String {
    DEFAULT_LOCALE.to_string()
}
fn default_channel_capacity() -> usize {
    DEFAULT_CHANNEL_CAPACITY
}
fn default_term_grace_ms() -> u64 {
    DEFAULT_TERM_GRACE_MS
}

impl Default for Config {
    fn default() -> Self {
        Config {
            script: None,
            standalone: None,
            host: None,
            locale: default_locale(),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            term_grace_ms: DEFAULT_TERM_GRACE_MS,
            log: LogConfig::default(),
        }
    }
}

impl Config {
    pub fn is_standalone(&self) -> bool {
        self.standalone.unwrap_or(self.host.is_none())
    }

    /// Host socket, only when running embedded
    pub fn host_socket(&self) -> Option<PathBuf> {
        if self.is_standalone() {
            return None;
        }
        self.host.as_ref().map(HostConfig::socket_path)
    }

    pub fn term_grace(&self) -> Duration {
        Duration::from_millis(self.term_grace_ms)
    }

    /// Zero would make every host envelope a transport error
    pub fn get_channel_capacity(&self) -> usize {
        self.channel_capacity.max(1)
    }
}
