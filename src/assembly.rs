//! Assembly - composition root and lifecycle owner
//!
//! One assembly wires one bridge, one worker and the two engines together.
//! All engine state lives on a dedicated foreground loop thread; every input
//! (worker events, bridge traffic, prompt resolutions, subscriptions,
//! shutdown) reaches it as a [`LoopEvent`] through a single queue, so the
//! engines never run in parallel with each other.
//!
//! # Lifecycle
//!
//! 1. `start()` creates the bridge and spawns the loop. The worker is started
//!    only once the bridge reports ready (immediately for loopback, after the
//!    `init` handshake for a host).
//! 2. `terminate()` runs two phases:
//!    - phase 1, synchronous: stop accepting subscriptions, silence existing
//!      subscribers and disconnect the resize observer
//!    - phase 2, on the loop's next turn: terminate both engines, the worker
//!      and the bridge
//! 3. `wait()` joins the loop and yields the [`SessionOutcome`].

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use async_channel::{Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, error, info, info_span, trace, warn};
use uuid::Uuid;

use crate::bridge::{Bridge, BridgeEvent, BridgeHandler, HostBridge, HostTransport, LoopbackBridge};
use crate::config::Config;
use crate::engine::{
    ProcessingEngine, Route, Subscriber, SubscriptionId, VisualizationEngine,
};
use crate::error::{ErrorKind, HostError, Result};
use crate::prompts::{FactoryContext, PromptRegistry, RenderState};
use crate::protocol::{BridgeMessage, HostEnvelope, Payload};
use crate::resize::ResizeObserver;
use crate::worker::{Worker, WorkerEvent, WorkerSink};

/// Reserved for the resize observer; user subscriptions start above it
const OBSERVER_SUBSCRIPTION: SubscriptionId = SubscriptionId(0);

/// How a session ended
#[derive(Debug)]
pub enum SessionOutcome {
    /// `terminate()` was called
    Terminated,
    /// The script exited cleanly; `info` is what it declared through `exit`
    Finished { code: i32, info: String },
    /// Transport error, protocol violation or worker failure
    Failed(HostError),
}

impl SessionOutcome {
    pub fn is_success(&self) -> bool {
        match self {
            Self::Terminated => true,
            Self::Finished { code, .. } => *code == 0,
            Self::Failed(_) => false,
        }
    }

    /// Process exit status for the binary
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Terminated => 0,
            Self::Finished { code, .. } => *code,
            Self::Failed(e) => match e.kind() {
                ErrorKind::Config => 2,
                ErrorKind::Transport => 3,
                ErrorKind::ProtocolViolation => 4,
                ErrorKind::Worker => 5,
            },
        }
    }
}

/// Which bridge variant the assembly builds at `start()`
pub enum BridgeMode {
    Loopback,
    Host(HostTransport),
}

enum LoopEvent {
    BridgeReady,
    Bridge(BridgeEvent),
    Worker(WorkerEvent),
    Resolve { ticket: u64, payload: Payload },
    Subscribe(SubscriptionId, Subscriber),
    Unsubscribe(SubscriptionId),
    ReportHeight(u32),
    Fatal(HostError),
    Shutdown,
}

/// Inputs consumed by `start()`
struct Parts {
    worker: Box<dyn Worker>,
    mode: BridgeMode,
    registry: PromptRegistry,
    ctx: FactoryContext,
    channel_capacity: usize,
}

/// State shared between the caller's threads and the loop
struct Shared {
    /// Cleared by phase 1; gates subscriptions and subscriber callbacks
    accepting: AtomicBool,
    observer: Mutex<Option<Arc<ResizeObserver>>>,
    host_log: Mutex<Vec<BridgeMessage>>,
}

pub struct AssemblyBuilder {
    worker: Box<dyn Worker>,
    mode: BridgeMode,
    registry: PromptRegistry,
    ctx: FactoryContext,
    channel_capacity: usize,
}

impl AssemblyBuilder {
    /// Use the loopback bridge (the default)
    pub fn standalone(mut self) -> Self {
        self.mode = BridgeMode::Loopback;
        self
    }

    pub fn host(mut self, transport: HostTransport) -> Self {
        self.mode = BridgeMode::Host(transport);
        self
    }

    pub fn registry(mut self, registry: PromptRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn locale(mut self, locale: impl Into<String>) -> Self {
        self.ctx = FactoryContext::new(locale);
        self
    }

    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }

    /// Take locale and queue depth from `config`; the bridge is chosen separately
    pub fn configure(self, config: &Config) -> Self {
        self.locale(config.locale.clone())
            .channel_capacity(config.get_channel_capacity())
    }

    pub fn build(self) -> Assembly {
        let (events_tx, events_rx) = async_channel::unbounded();
        Assembly {
            session_id: Uuid::new_v4(),
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
            parts: Mutex::new(Some(Parts {
                worker: self.worker,
                mode: self.mode,
                registry: self.registry,
                ctx: self.ctx,
                channel_capacity: self.channel_capacity,
            })),
            shared: Arc::new(Shared {
                accepting: AtomicBool::new(true),
                observer: Mutex::new(None),
                host_log: Mutex::new(Vec::new()),
            }),
            started: AtomicBool::new(false),
            terminated: AtomicBool::new(false),
            next_subscription: AtomicU64::new(OBSERVER_SUBSCRIPTION.0 + 1),
            loop_thread: Mutex::new(None),
        }
    }
}

/// Composition root for one session
pub struct Assembly {
    session_id: Uuid,
    events_tx: Sender<LoopEvent>,
    events_rx: Mutex<Option<Receiver<LoopEvent>>>,
    parts: Mutex<Option<Parts>>,
    shared: Arc<Shared>,
    started: AtomicBool,
    terminated: AtomicBool,
    next_subscription: AtomicU64,
    loop_thread: Mutex<Option<JoinHandle<SessionOutcome>>>,
}

impl Assembly {
    pub fn builder(worker: impl Worker + 'static) -> AssemblyBuilder {
        Self::builder_boxed(Box::new(worker))
    }

    pub fn builder_boxed(worker: Box<dyn Worker>) -> AssemblyBuilder {
        AssemblyBuilder {
            worker,
            mode: BridgeMode::Loopback,
            registry: PromptRegistry::standard(),
            ctx: FactoryContext::default(),
            channel_capacity: crate::config::defaults::DEFAULT_CHANNEL_CAPACITY,
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Create the bridge and the foreground loop, then run the script once
    /// the bridge is ready. Calling it again is a no-op.
    pub fn start(&self) -> Result<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            debug!(session_id = %self.session_id, "Assembly already started");
            return Ok(());
        }
        if self.terminated.load(Ordering::SeqCst) {
            return Err(HostError::WorkerSpawn("session was terminated".to_string()));
        }
        let (parts, events_rx) = match (self.parts.lock().take(), self.events_rx.lock().take()) {
            (Some(parts), Some(rx)) => (parts, rx),
            _ => return Err(HostError::WorkerSpawn("session parts missing".to_string())),
        };

        let span = info_span!("session", session_id = %self.session_id);
        let _enter = span.enter();

        let bridge = self.connect_bridge(parts.mode, parts.channel_capacity)?;
        info!(bridge = bridge.name(), worker = %parts.worker.describe(), "Assembly starting");

        let observer = ResizeObserver::new(bridge.clone());
        *self.shared.observer.lock() = Some(observer.clone());

        let resolver_tx = self.events_tx.clone();
        let mut visualization = VisualizationEngine::new(
            parts.registry,
            parts.ctx,
            Arc::new(move |ticket, payload| {
                let _ = resolver_tx.try_send(LoopEvent::Resolve { ticket, payload });
            }),
        );
        visualization.subscribe(
            OBSERVER_SUBSCRIPTION,
            Box::new(move |state| observer.observe(state)),
        );

        let event_loop = EventLoop {
            events_tx: self.events_tx.clone(),
            shared: self.shared.clone(),
            bridge,
            visualization,
            processing: ProcessingEngine::new(parts.worker),
        };

        let loop_span = span.clone();
        let handle = thread::Builder::new()
            .name("assembly-loop".to_string())
            .spawn(move || {
                let _enter = loop_span.enter();
                event_loop.run(events_rx)
            })
            .map_err(|e| HostError::WorkerSpawn(format!("foreground loop: {e}")))?;
        *self.loop_thread.lock() = Some(handle);
        Ok(())
    }

    fn connect_bridge(&self, mode: BridgeMode, capacity: usize) -> Result<Arc<dyn Bridge>> {
        match mode {
            BridgeMode::Loopback => {
                let bridge = Arc::new(LoopbackBridge::new());
                bridge.on_message(forward_bridge_events(self.events_tx.clone()))?;
                // No handshake: ready at once
                let _ = self.events_tx.try_send(LoopEvent::BridgeReady);
                Ok(bridge)
            }
            BridgeMode::Host(transport) => {
                let ready_tx = self.events_tx.clone();
                let bridge = HostBridge::connect(transport, capacity, move |result| {
                    let event = match result {
                        Ok(_) => LoopEvent::BridgeReady,
                        Err(e) => LoopEvent::Fatal(e),
                    };
                    let _ = ready_tx.try_send(event);
                });
                bridge.on_message(forward_bridge_events(self.events_tx.clone()))?;
                Ok(bridge)
            }
        }
    }

    /// Two-phase shutdown. Safe to call repeatedly and from any thread,
    /// including from inside a subscriber.
    pub fn terminate(&self) {
        if self.terminated.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(session_id = %self.session_id, "Terminating session");

        // Phase 1: detach listeners synchronously
        self.shared.accepting.store(false, Ordering::SeqCst);
        if let Some(observer) = self.shared.observer.lock().as_ref() {
            observer.disconnect();
        }

        // Phase 2: release contexts on the loop's next turn
        if let Some(mut parts) = self.parts.lock().take() {
            // never started
            parts.worker.terminate();
        }
        let _ = self.events_tx.try_send(LoopEvent::Shutdown);
    }

    /// Block until the session ends. The outcome is handed out once; later
    /// calls return `Terminated`.
    pub fn wait(&self) -> SessionOutcome {
        let handle = self.loop_thread.lock().take();
        match handle {
            Some(handle) => handle.join().unwrap_or_else(|_| {
                error!(session_id = %self.session_id, "Foreground loop panicked");
                SessionOutcome::Failed(HostError::Transport(
                    "foreground loop panicked".to_string(),
                ))
            }),
            None => SessionOutcome::Terminated,
        }
    }

    pub fn is_running(&self) -> bool {
        self.loop_thread
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Register a rendering surface. Called on the loop thread with the full
    /// state after every change. Returns `None` once shutdown has begun.
    pub fn subscribe<F>(&self, mut subscriber: F) -> Option<SubscriptionId>
    where
        F: FnMut(&RenderState) + Send + 'static,
    {
        if !self.shared.accepting.load(Ordering::SeqCst) {
            debug!(session_id = %self.session_id, "Rejecting subscription during shutdown");
            return None;
        }
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::SeqCst));
        let shared = self.shared.clone();
        let gated: Subscriber = Box::new(move |state| {
            if shared.accepting.load(Ordering::SeqCst) {
                subscriber(state);
            }
        });
        self.events_tx
            .try_send(LoopEvent::Subscribe(id, gated))
            .ok()
            .map(|_| id)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        let _ = self.events_tx.try_send(LoopEvent::Unsubscribe(id));
    }

    /// Height measured by a surface that knows better than the estimate
    pub fn report_height(&self, height: u32) {
        if self.shared.accepting.load(Ordering::SeqCst) {
            let _ = self.events_tx.try_send(LoopEvent::ReportHeight(height));
        }
    }

    /// Envelopes received from the bridge (loopback echoes or host traffic)
    pub fn host_messages(&self) -> Vec<BridgeMessage> {
        self.shared.host_log.lock().clone()
    }
}

impl Drop for Assembly {
    fn drop(&mut self) {
        self.terminate();
    }
}

fn forward_bridge_events(tx: Sender<LoopEvent>) -> BridgeHandler {
    Box::new(move |event| {
        let _ = tx.try_send(LoopEvent::Bridge(event));
    })
}

/// Everything owned by the foreground loop thread
struct EventLoop {
    events_tx: Sender<LoopEvent>,
    shared: Arc<Shared>,
    bridge: Arc<dyn Bridge>,
    visualization: VisualizationEngine,
    processing: ProcessingEngine,
}

impl EventLoop {
    fn run(mut self, events: Receiver<LoopEvent>) -> SessionOutcome {
        debug!("Foreground loop started");
        let outcome = loop {
            let Ok(event) = events.recv_blocking() else {
                break SessionOutcome::Terminated;
            };
            if !self.shared.accepting.load(Ordering::SeqCst)
                && !matches!(event, LoopEvent::Shutdown)
            {
                trace!("Dropping event after shutdown began");
                continue;
            }
            match self.handle(event) {
                Ok(None) => {}
                Ok(Some(outcome)) => break outcome,
                Err(e) => {
                    error!(error = %e, kind = ?e.kind(), "Session failed");
                    break SessionOutcome::Failed(e);
                }
            }
        };

        self.teardown();
        events.close();
        info!(outcome = ?outcome, "Session ended");
        outcome
    }

    fn handle(&mut self, event: LoopEvent) -> Result<Option<SessionOutcome>> {
        match event {
            LoopEvent::BridgeReady => {
                info!(bridge = self.bridge.name(), "Bridge ready, starting script");
                let tx = self.events_tx.clone();
                let sink: WorkerSink = Arc::new(move |event| {
                    let _ = tx.try_send(LoopEvent::Worker(event));
                });
                self.processing.start(sink)?;
            }
            LoopEvent::Worker(WorkerEvent::Command(command)) => {
                match self.processing.on_command(command)? {
                    Route::Render(command) => {
                        self.visualization.render(&command)?;
                    }
                    Route::Host(command) => {
                        debug!(tag = command.tag(), bridge = self.bridge.name(), "Forwarding to host");
                        self.bridge.send(BridgeMessage::command(command))?;
                        self.processing.deliver(Payload::void())?;
                    }
                }
            }
            LoopEvent::Worker(WorkerEvent::Exited { code }) => {
                let info = self
                    .processing
                    .declared_exit()
                    .map(|(_, info)| info.clone())
                    .unwrap_or_default();
                info!(code, "Script finished");
                return Ok(Some(SessionOutcome::Finished { code, info }));
            }
            LoopEvent::Worker(WorkerEvent::Failed { message, stderr }) => {
                return Err(HostError::WorkerFailed { message, stderr });
            }
            LoopEvent::Resolve { ticket, payload } => {
                if let Some(payload) = self.visualization.accept_resolution(ticket, payload)? {
                    self.processing.deliver(payload)?;
                    self.visualization.complete_turn();
                }
            }
            LoopEvent::Bridge(BridgeEvent::Message(message)) => self.on_bridge_message(message)?,
            LoopEvent::Bridge(BridgeEvent::Closed) => {
                return Err(HostError::Transport("host closed the connection".to_string()));
            }
            LoopEvent::Bridge(BridgeEvent::Failed(reason)) => {
                return Err(HostError::Transport(reason));
            }
            LoopEvent::Subscribe(id, subscriber) => self.visualization.subscribe(id, subscriber),
            LoopEvent::Unsubscribe(id) => {
                self.visualization.unsubscribe(id);
            }
            LoopEvent::ReportHeight(height) => {
                if let Some(observer) = self.shared.observer.lock().as_ref() {
                    observer.report(height);
                }
            }
            LoopEvent::Fatal(e) => return Err(e),
            LoopEvent::Shutdown => return Ok(Some(SessionOutcome::Terminated)),
        }
        Ok(None)
    }

    fn on_bridge_message(&mut self, message: BridgeMessage) -> Result<()> {
        let payload = match &message {
            BridgeMessage::Notice(_) => {
                trace!(kind = message.kind(), "Ignoring echoed notice");
                return Ok(());
            }
            BridgeMessage::Envelope(HostEnvelope::Init { .. }) => {
                debug!("Ignoring repeated init");
                return Ok(());
            }
            BridgeMessage::Envelope(HostEnvelope::Command { .. }) => None,
            BridgeMessage::Envelope(HostEnvelope::Payload { payload }) => Some(payload.clone()),
        };
        info!(kind = message.kind(), bridge = self.bridge.name(), "Host message");
        self.shared.host_log.lock().push(message);

        let Some(payload) = payload else {
            return Ok(());
        };
        // A host payload answers the prompt on screen, as an operator would.
        // Its shape is checked when the resolution comes back to the loop.
        let pending = self
            .visualization
            .state()
            .prompt
            .clone()
            .filter(|prompt| !prompt.is_resolved());
        match pending {
            Some(prompt) => {
                prompt.resolve(payload);
                Ok(())
            }
            None if self.processing.outstanding_tag().is_none() => {
                warn!(payload = payload.tag(), "Host payload with no command outstanding");
                self.processing.deliver(payload)
            }
            None => {
                // The prompt was already answered; its resolution is queued
                warn!(
                    payload = payload.tag(),
                    outstanding = ?self.processing.outstanding_tag(),
                    "Host payload for a prompt that was already resolved"
                );
                Err(HostError::OrphanPayload {
                    tag: payload.tag().to_string(),
                })
            }
        }
    }

    fn teardown(&mut self) {
        self.shared.accepting.store(false, Ordering::SeqCst);
        if let Some(observer) = self.shared.observer.lock().as_ref() {
            observer.disconnect();
        }
        self.visualization.terminate();
        self.processing.terminate();
        self.bridge.dispose();
        debug!("Session resources released");
    }
}

#[cfg(test)]
#[path = "assembly_tests.rs"]
mod tests;
