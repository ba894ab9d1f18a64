//! In-process worker: the script is a Rust closure on a dedicated thread.
//!
//! `ScriptContext::prompt` is the only suspension point. When the worker is
//! terminated while the script waits there, the thread is unwound with a
//! private marker payload, so no code after the `prompt` call ever runs.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use async_channel::{Receiver, Sender};
use serde_json::Value;
use tracing::{debug, error, info, trace, warn, Level};

use super::{Worker, WorkerEvent, WorkerSink};
use crate::error::{HostError, Result};
use crate::protocol::{Command, Payload};

/// Script body run by a [`ThreadWorker`]
pub type ScriptFn = Box<dyn FnOnce(&mut ScriptContext) + Send + 'static>;

/// Unwind payload marking an abandoned continuation
struct Abandoned;

/// The script's view of the host
pub struct ScriptContext {
    name: String,
    sink: WorkerSink,
    answers: Receiver<Payload>,
    abandoned: Arc<AtomicBool>,
    exit_code: i32,
}

impl ScriptContext {
    /// Emit a command and block until its payload arrives
    pub fn prompt(&mut self, command: impl Into<Command>) -> Payload {
        let command = command.into();
        if self.abandoned.load(Ordering::SeqCst) {
            abandon();
        }
        trace!(script = %self.name, tag = command.tag(), "Script suspended on prompt");
        (self.sink)(WorkerEvent::Command(command));

        match self.answers.recv_blocking() {
            Ok(payload) => payload,
            Err(_) => abandon(),
        }
    }

    /// Hand a JSON document to the host
    pub fn donate(&mut self, key: impl Into<String>, json: impl Into<String>) {
        self.prompt(Command::donate(key, json));
    }

    pub fn event(&mut self, name: impl Into<String>, data: Value) {
        self.prompt(crate::protocol::SystemCommand::Event {
            name: name.into(),
            data,
        });
    }

    /// Declare the exit code; the worker reports it once the script returns
    pub fn exit(&mut self, code: i32, info: impl Into<String>) {
        self.prompt(Command::exit(code, info));
        self.exit_code = code;
    }

    pub fn log(&self, level: Level, message: &str) {
        let script = self.name.as_str();
        if level == Level::ERROR {
            error!(target: "script", script, "{}", message);
        } else if level == Level::WARN {
            warn!(target: "script", script, "{}", message);
        } else if level == Level::INFO {
            info!(target: "script", script, "{}", message);
        } else if level == Level::DEBUG {
            debug!(target: "script", script, "{}", message);
        } else {
            trace!(target: "script", script, "{}", message);
        }
    }

    pub fn is_abandoned(&self) -> bool {
        self.abandoned.load(Ordering::SeqCst)
    }
}

fn abandon() -> ! {
    panic::resume_unwind(Box::new(Abandoned))
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "script panicked".to_string()
    }
}

/// Worker running an in-process script closure
pub struct ThreadWorker {
    name: String,
    script: Option<ScriptFn>,
    answers: Option<Sender<Payload>>,
    abandoned: Arc<AtomicBool>,
}

impl ThreadWorker {
    pub fn new<F>(name: impl Into<String>, script: F) -> Self
    where
        F: FnOnce(&mut ScriptContext) + Send + 'static,
    {
        Self {
            name: name.into(),
            script: Some(Box::new(script)),
            answers: None,
            abandoned: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl Worker for ThreadWorker {
    fn start(&mut self, sink: WorkerSink) -> Result<()> {
        if self.abandoned.load(Ordering::SeqCst) {
            return Err(HostError::WorkerSpawn("worker was terminated".to_string()));
        }
        let script = self
            .script
            .take()
            .ok_or_else(|| HostError::WorkerSpawn("worker already started".to_string()))?;

        let (tx, rx) = async_channel::unbounded();
        let abandoned = self.abandoned.clone();
        let mut ctx = ScriptContext {
            name: self.name.clone(),
            sink: sink.clone(),
            answers: rx,
            abandoned: abandoned.clone(),
            exit_code: 0,
        };

        thread::Builder::new()
            .name(format!("script:{}", self.name))
            .spawn(move || {
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                    script(&mut ctx);
                    ctx.exit_code
                }));
                let abandoned = abandoned.load(Ordering::SeqCst);
                match outcome {
                    Ok(_) | Err(_) if abandoned => {
                        debug!(script = %ctx.name, "Script thread unwound after termination");
                    }
                    Ok(code) => sink(WorkerEvent::Exited { code }),
                    Err(panic) if panic.is::<Abandoned>() => {
                        debug!(script = %ctx.name, "Script abandoned");
                    }
                    Err(panic) => {
                        let message = panic_message(panic.as_ref());
                        error!(script = %ctx.name, message = %message, "Script panicked");
                        sink(WorkerEvent::Failed {
                            message,
                            stderr: None,
                        });
                    }
                }
            })
            .map_err(|e| HostError::WorkerSpawn(format!("script thread: {e}")))?;

        info!(script = %self.name, "Script thread started");
        self.answers = Some(tx);
        Ok(())
    }

    fn post(&mut self, payload: Payload) -> Result<()> {
        let answers = self.answers.as_ref().ok_or_else(|| HostError::WorkerFailed {
            message: "script is not running".to_string(),
            stderr: None,
        })?;
        answers.try_send(payload).map_err(|_| HostError::WorkerFailed {
            message: "script is no longer waiting for answers".to_string(),
            stderr: None,
        })
    }

    fn terminate(&mut self) {
        if self.abandoned.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!(script = %self.name, "Abandoning script thread");
        self.script = None;
        // Closing the channel unwinds a script blocked in prompt()
        if let Some(answers) = self.answers.take() {
            answers.close();
        }
    }

    fn describe(&self) -> String {
        format!("thread:{}", self.name)
    }
}
