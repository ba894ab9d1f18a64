use thiserror::Error;
use tracing::{error, warn};

/// Coarse classification used when deciding how a failure ends a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bridge send/receive failures - fatal, no reconnect
    Transport,
    /// Unmatched command, orphan payload, overlapping prompts
    ProtocolViolation,
    /// Background execution context could not start or died
    Worker,
    /// Bad configuration or local IO outside the protocol
    Config,
}

/// Domain-specific errors for the script host
#[derive(Error, Debug)]
pub enum HostError {
    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("Host handshake failed: {0}")]
    HandshakeFailed(String),

    #[error("Bridge has been disposed")]
    BridgeDisposed,

    #[error("Bridge already has a message handler")]
    HandlerAlreadyRegistered,

    #[error("No prompt factory claims command '{tag}'")]
    UnmatchedCommand { tag: String },

    #[error("Payload '{tag}' arrived with no outstanding command")]
    OrphanPayload { tag: String },

    #[error("Command '{tag}' dispatched while another prompt is outstanding")]
    PromptOutstanding { tag: String },

    #[error("Prompt '{prompt}' cannot be answered with a '{payload}' payload")]
    PayloadMismatch { prompt: String, payload: String },

    #[error("Failed to start script: {0}")]
    WorkerSpawn(String),

    #[error("Script failed: {message}")]
    WorkerFailed {
        message: String,
        stderr: Option<String>,
    },

    #[error("Failed to parse protocol message: {0}")]
    Protocol(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl HostError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Transport(_)
            | Self::HandshakeFailed(_)
            | Self::BridgeDisposed
            | Self::HandlerAlreadyRegistered => ErrorKind::Transport,
            Self::UnmatchedCommand { .. }
            | Self::OrphanPayload { .. }
            | Self::PromptOutstanding { .. }
            | Self::PayloadMismatch { .. }
            | Self::Protocol(_) => ErrorKind::ProtocolViolation,
            Self::WorkerSpawn(_) | Self::WorkerFailed { .. } => ErrorKind::Worker,
            Self::Config(_) | Self::Io(_) => ErrorKind::Config,
        }
    }

    /// True for errors that must tear the whole session down
    pub fn is_fatal(&self) -> bool {
        !matches!(self.kind(), ErrorKind::Config)
    }
}

pub type Result<T> = std::result::Result<T, HostError>;

/// Extension trait for silent error logging with caller location tracking.
/// Use when the operation is recoverable and nobody upstream needs to know.
///
/// # Examples
///
/// ```ignore
/// use script_host::error::ResultExt;
///
/// // Resize notices are best-effort
/// bridge.notify_resize(height).warn_on_err();
/// ```
pub trait ResultExt<T> {
    /// Log error with caller location and return None. Use for recoverable failures.
    fn log_err(self) -> Option<T>;
    /// Log as warning with caller location and return None. Use for expected failures.
    fn warn_on_err(self) -> Option<T>;
}

impl<T, E: std::fmt::Debug> ResultExt<T> for std::result::Result<T, E> {
    #[track_caller]
    fn log_err(self) -> Option<T> {
        match self {
            Ok(value) => Some(value),
            Err(error) => {
                let caller = std::panic::Location::caller();
                error!(
                    error = ?error,
                    file = caller.file(),
                    line = caller.line(),
                    "Operation failed"
                );
                None
            }
        }
    }

    #[track_caller]
    fn warn_on_err(self) -> Option<T> {
        match self {
            Ok(value) => Some(value),
            Err(error) => {
                let caller = std::panic::Location::caller();
                warn!(
                    error = ?error,
                    file = caller.file(),
                    line = caller.line(),
                    "Operation had warning"
                );
                None
            }
        }
    }
}
