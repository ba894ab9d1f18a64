//! Default configuration values
//!
//! All constants used throughout the config module are defined here.

/// Where `load_config()` looks for the user's config file
pub const DEFAULT_CONFIG_PATH: &str = "~/.scripthost/config.json";

/// Log directory and file name
pub const DEFAULT_LOG_DIR: &str = "~/.scripthost/logs";
pub const DEFAULT_LOG_FILE: &str = "script-host.jsonl";

/// EnvFilter directive used when neither RUST_LOG nor the config sets one
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Locale handed to prompt factories
pub const DEFAULT_LOCALE: &str = "en";

/// Outbound host queue depth before envelopes are refused
pub const DEFAULT_CHANNEL_CAPACITY: usize = 100;

/// Grace period between SIGTERM and SIGKILL for script processes
pub const DEFAULT_TERM_GRACE_MS: u64 = 250;

/// Environment override for the standalone flag ("1"/"0", "true"/"false")
pub const STANDALONE_ENV: &str = "SCRIPT_HOST_STANDALONE";
