//! Configuration module - session settings
//!
//! This module provides functionality for:
//! - Loading configuration from ~/.scripthost/config.json
//! - Default values for all settings
//! - Type definitions for config structures
//!
//! # Module Structure
//!
//! - `defaults` - All default constant values
//! - `types` - Configuration struct definitions (Config, ScriptConfig, etc.)
//! - `loader` - File system loading, parsing and environment overrides

pub(crate) mod defaults;
mod loader;
mod types;

pub use defaults::{DEFAULT_CONFIG_PATH, STANDALONE_ENV};

pub use types::{Config, HostConfig, LogConfig, ScriptConfig};

pub use loader::{apply_env_overrides, load_config, load_config_from};

#[cfg(test)]
pub use defaults::{DEFAULT_CHANNEL_CAPACITY, DEFAULT_LOCALE, DEFAULT_TERM_GRACE_MS};

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
