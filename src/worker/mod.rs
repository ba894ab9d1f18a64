//! Background execution contexts.
//!
//! A worker runs the script independently of the foreground loop and talks to
//! it only through messages: commands come out through the event sink,
//! payloads go in through `post()`. There is no shared mutable state.
//!
//! - [`ProcessWorker`]: the script is a child process speaking JSONL on stdio
//! - [`ThreadWorker`]: the script is a Rust closure on its own thread

mod process;
mod stderr_buffer;
mod thread;

use std::sync::Arc;

use crate::error::Result;
use crate::protocol::{Command, Payload};

pub use process::{interpreter_for, ProcessHandle, ProcessWorker, ScriptSpec};
pub use stderr_buffer::{spawn_stderr_reader, StderrBuffer, StderrCapture};
pub use thread::{ScriptContext, ScriptFn, ThreadWorker};

/// Everything a worker reports to the foreground loop
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerEvent {
    /// The script needs an answer (or is notifying the host)
    Command(Command),
    /// The script finished on its own
    Exited { code: i32 },
    /// The script crashed or could not be driven any further
    Failed {
        message: String,
        stderr: Option<String>,
    },
}

/// Callback the worker uses to emit events; may be called from any thread
pub type WorkerSink = Arc<dyn Fn(WorkerEvent) + Send + Sync>;

/// Owned background execution context
pub trait Worker: Send {
    /// Load and begin running the script
    fn start(&mut self, sink: WorkerSink) -> Result<()>;

    /// Resume the script with the answer to its outstanding command
    fn post(&mut self, payload: Payload) -> Result<()>;

    /// Forcibly end the script. Safe at any time, including before `start`.
    /// A suspended script is abandoned: never resumed, never handed an error.
    fn terminate(&mut self);

    /// Human-readable label for logs
    fn describe(&self) -> String;
}
