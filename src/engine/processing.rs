//! Processing engine: owns the worker and the outstanding command.
//!
//! Exactly one command may be outstanding. A payload with nothing
//! outstanding is a protocol violation, as is a second command before the
//! first was answered.

use tracing::{debug, info, warn};

use crate::error::{HostError, Result};
use crate::protocol::{Command, Payload, SystemCommand};
use crate::worker::{Worker, WorkerSink};

/// Where a worker command has to go next
#[derive(Debug, Clone, PartialEq)]
pub enum Route {
    /// Prompt or extension command for the visualization engine
    Render(Command),
    /// System command for the embedding host, answered with `void`
    Host(Command),
}

#[derive(Debug, Clone, PartialEq)]
struct Outstanding {
    tag: String,
    system: bool,
}

pub struct ProcessingEngine {
    worker: Box<dyn Worker>,
    outstanding: Option<Outstanding>,
    declared_exit: Option<(i32, String)>,
    started: bool,
    terminated: bool,
}

impl ProcessingEngine {
    pub fn new(worker: Box<dyn Worker>) -> Self {
        Self {
            worker,
            outstanding: None,
            declared_exit: None,
            started: false,
            terminated: false,
        }
    }

    /// Load and run the script; its events arrive through `sink`
    pub fn start(&mut self, sink: WorkerSink) -> Result<()> {
        if self.started {
            return Ok(());
        }
        self.started = true;
        info!(worker = %self.worker.describe(), "Starting background script");
        self.worker.start(sink)
    }

    /// Register a command from the worker and decide where it goes
    pub fn on_command(&mut self, command: Command) -> Result<Route> {
        if let Some(outstanding) = &self.outstanding {
            warn!(
                outstanding = %outstanding.tag,
                tag = command.tag(),
                "Script sent a command before its previous one was answered"
            );
            return Err(HostError::PromptOutstanding {
                tag: command.tag().to_string(),
            });
        }

        if let Command::System(SystemCommand::Exit { code, info }) = &command {
            self.declared_exit = Some((*code, info.clone()));
        }

        self.outstanding = Some(Outstanding {
            tag: command.tag().to_string(),
            system: command.is_system(),
        });
        debug!(tag = command.tag(), "Command outstanding");

        Ok(if command.is_system() {
            Route::Host(command)
        } else {
            Route::Render(command)
        })
    }

    /// Resume the script with the answer to its outstanding command
    pub fn deliver(&mut self, payload: Payload) -> Result<()> {
        let Some(outstanding) = self.outstanding.take() else {
            return Err(HostError::OrphanPayload {
                tag: payload.tag().to_string(),
            });
        };
        debug!(
            command = %outstanding.tag,
            system = outstanding.system,
            payload = payload.tag(),
            "Resuming script"
        );
        self.worker.post(payload)
    }

    pub fn outstanding_tag(&self) -> Option<&str> {
        self.outstanding.as_ref().map(|o| o.tag.as_str())
    }

    /// Exit code and info the script declared through `exit`, if any
    pub fn declared_exit(&self) -> Option<&(i32, String)> {
        self.declared_exit.as_ref()
    }

    /// Abandon any outstanding command and stop the worker. Idempotent.
    pub fn terminate(&mut self) {
        if self.terminated {
            return;
        }
        self.terminated = true;
        if let Some(outstanding) = self.outstanding.take() {
            debug!(tag = %outstanding.tag, "Abandoning outstanding command");
        }
        self.worker.terminate();
        info!(worker = %self.worker.describe(), "Processing engine terminated");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::WorkerEvent;
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// Records what the engine asks of its worker
    #[derive(Default, Clone)]
    struct Recorder {
        posted: Arc<Mutex<Vec<Payload>>>,
        terminations: Arc<Mutex<u32>>,
    }

    impl Worker for Recorder {
        fn start(&mut self, _sink: WorkerSink) -> Result<()> {
            Ok(())
        }

        fn post(&mut self, payload: Payload) -> Result<()> {
            self.posted.lock().push(payload);
            Ok(())
        }

        fn terminate(&mut self) {
            *self.terminations.lock() += 1;
        }

        fn describe(&self) -> String {
            "recorder".to_string()
        }
    }

    fn engine() -> (ProcessingEngine, Recorder) {
        let recorder = Recorder::default();
        let mut engine = ProcessingEngine::new(Box::new(recorder.clone()));
        let sink: WorkerSink = Arc::new(|_: WorkerEvent| {});
        engine.start(sink).unwrap();
        (engine, recorder)
    }

    #[test]
    fn test_prompt_commands_render_and_system_commands_go_to_host() {
        let (mut engine, _) = engine();
        assert_eq!(
            engine.on_command(Command::consent("ok?")).unwrap(),
            Route::Render(Command::consent("ok?"))
        );
        engine.deliver(Payload::boolean(true)).unwrap();

        assert_eq!(
            engine.on_command(Command::donate("posts", "[]")).unwrap(),
            Route::Host(Command::donate("posts", "[]"))
        );
        engine.deliver(Payload::void()).unwrap();

        assert!(matches!(
            engine.on_command(Command::extension("custom")).unwrap(),
            Route::Render(_)
        ));
    }

    #[test]
    fn test_payload_reaches_worker_exactly_once() {
        let (mut engine, recorder) = engine();
        engine.on_command(Command::consent("Do you agree?")).unwrap();
        assert_eq!(engine.outstanding_tag(), Some("consent"));

        engine.deliver(Payload::boolean(true)).unwrap();
        assert_eq!(*recorder.posted.lock(), vec![Payload::boolean(true)]);
        assert_eq!(engine.outstanding_tag(), None);
    }

    #[test]
    fn test_orphan_payload_is_a_violation() {
        let (mut engine, recorder) = engine();
        let err = engine.deliver(Payload::string("late")).unwrap_err();
        assert!(matches!(err, HostError::OrphanPayload { ref tag } if tag == "string"));
        assert!(recorder.posted.lock().is_empty());
    }

    #[test]
    fn test_overlapping_commands_are_a_violation() {
        let (mut engine, _) = engine();
        engine.on_command(Command::consent("one")).unwrap();
        let err = engine.on_command(Command::consent("two")).unwrap_err();
        assert!(matches!(err, HostError::PromptOutstanding { .. }));
    }

    #[test]
    fn test_exit_is_recorded() {
        let (mut engine, _) = engine();
        engine.on_command(Command::exit(3, "no files")).unwrap();
        assert_eq!(engine.declared_exit(), Some(&(3, "no files".to_string())));
    }

    #[test]
    fn test_terminate_is_idempotent() {
        let (mut engine, recorder) = engine();
        engine.on_command(Command::consent("x")).unwrap();
        engine.terminate();
        engine.terminate();
        assert_eq!(*recorder.terminations.lock(), 1);
        assert_eq!(engine.outstanding_tag(), None);
    }
}
