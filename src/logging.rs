//! Structured JSONL logging to a file plus human-readable stderr output.
//!
//! - **JSONL to file** (~/.scripthost/logs/script-host.jsonl) - one JSON
//!   object per line, for tooling
//! - **Compact to stderr** - for the person at the terminal
//!
//! # Usage
//!
//! ```rust,ignore
//! use script_host::{config::LogConfig, logging};
//!
//! // MUST keep the guard alive for the duration of the program
//! let _guard = logging::init(&LogConfig::default());
//! tracing::info!(session_id = %id, "Session started");
//! ```
//!
//! # JSONL Output Format
//!
//! ```json
//! {"timestamp":"2026-01-05T10:30:45.123Z","level":"INFO","target":"script_host::assembly","fields":{"message":"Prompt installed","ticket":1,"tag":"consent"}}
//! ```

use std::fs::{self, File, OpenOptions};
use std::path::PathBuf;

use time::format_description::well_known::Rfc3339;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LogConfig;

/// Guard that must be kept alive for the duration of the program.
/// Dropping this guard flushes and closes the log file.
pub struct LoggingGuard {
    _file_guard: Option<WorkerGuard>,
    path: Option<PathBuf>,
}

impl LoggingGuard {
    /// The JSONL file, if one could be opened
    pub fn log_path(&self) -> Option<&PathBuf> {
        self.path.as_ref()
    }
}

/// Install the global subscriber. Safe to call once per process.
///
/// RUST_LOG takes precedence over `config.filter`. If the log file cannot be
/// opened only the stderr layer is installed.
pub fn init(config: &LogConfig) -> LoggingGuard {
    let log_path = config.log_file();
    let file = open_log_file(&log_path);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.filter()));

    let (json_layer, file_guard) = match file {
        Some(file) => {
            // Non-blocking so a slow disk never stalls the foreground loop
            let (writer, guard) = tracing_appender::non_blocking(file);
            let layer = fmt::layer()
                .json()
                .with_writer(writer)
                .with_timer(fmt::time::UtcTime::new(Rfc3339))
                .with_target(true)
                .with_level(true)
                .with_thread_names(true)
                .with_file(false)
                .with_line_number(false)
                .with_current_span(true)
                .with_span_events(FmtSpan::NONE);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let pretty_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_level(true)
        .compact();

    let installed = tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(pretty_layer)
        .try_init();

    if let Err(e) = installed {
        eprintln!("[LOGGING] Subscriber already installed: {}", e);
    }

    let path = file_guard.as_ref().map(|_| log_path.clone());
    tracing::info!(
        event_type = "app_lifecycle",
        action = "started",
        log_path = ?path,
        "Logging initialized"
    );

    LoggingGuard {
        _file_guard: file_guard,
        path,
    }
}

fn open_log_file(path: &PathBuf) -> Option<File> {
    if let Some(dir) = path.parent() {
        if let Err(e) = fs::create_dir_all(dir) {
            eprintln!("[LOGGING] Failed to create log directory {}: {}", dir.display(), e);
            return None;
        }
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| eprintln!("[LOGGING] Failed to open {}: {}", path.display(), e))
        .ok()
}
