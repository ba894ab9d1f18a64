//! Visualization engine: owns the render state and the prompt turn.
//!
//! Per turn the phase moves `Idle -> Awaiting -> Resolved -> Idle`. A command
//! is only accepted from `Idle` (or `Resolved`, which first settles to `Idle`),
//! so at most one prompt is ever pending.

use std::sync::Arc;

use tracing::{debug, info, trace, warn};

use crate::error::{HostError, Result};
use crate::prompts::{FactoryContext, PromptHandle, PromptRegistry, RenderState};
use crate::protocol::{log_preview, Command, Payload};

/// Receives the full render state after every change
pub type Subscriber = Box<dyn FnMut(&RenderState) + Send>;

/// Forwards a resolution (ticket, payload) to the owning loop
pub type Resolver = Arc<dyn Fn(u64, Payload) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptPhase {
    Idle,
    Awaiting { ticket: u64, tag: String },
    Resolved { ticket: u64 },
}

pub struct VisualizationEngine {
    registry: PromptRegistry,
    ctx: FactoryContext,
    resolver: Resolver,
    state: RenderState,
    phase: PromptPhase,
    next_ticket: u64,
    subscribers: Vec<(SubscriptionId, Subscriber)>,
    terminated: bool,
}

impl VisualizationEngine {
    pub fn new(registry: PromptRegistry, ctx: FactoryContext, resolver: Resolver) -> Self {
        Self {
            registry,
            ctx,
            resolver,
            state: RenderState::default(),
            phase: PromptPhase::Idle,
            next_ticket: 1,
            subscribers: Vec::new(),
            terminated: false,
        }
    }

    pub fn state(&self) -> &RenderState {
        &self.state
    }

    pub fn phase(&self) -> &PromptPhase {
        &self.phase
    }

    /// Install the prompt for `command`, replacing whatever was on screen.
    ///
    /// Fails without touching the render state when a prompt is still
    /// outstanding or when no factory claims the command.
    pub fn render(&mut self, command: &Command) -> Result<u64> {
        if self.terminated {
            return Err(HostError::Transport(
                "visualization engine is terminated".to_string(),
            ));
        }
        if let PromptPhase::Awaiting { .. } = self.phase {
            return Err(HostError::PromptOutstanding {
                tag: command.tag().to_string(),
            });
        }
        self.phase = PromptPhase::Idle;

        let (factory, elements) =
            self.registry
                .dispatch(command, &self.ctx)
                .ok_or_else(|| HostError::UnmatchedCommand {
                    tag: command.tag().to_string(),
                })?;

        let ticket = self.next_ticket;
        self.next_ticket += 1;
        let handle = PromptHandle::new(ticket, command.tag(), self.resolver.clone());

        info!(ticket, tag = command.tag(), factory, "Prompt installed");
        self.state = RenderState {
            elements,
            prompt: Some(handle.clone()),
        };
        self.phase = PromptPhase::Awaiting {
            ticket,
            tag: command.tag().to_string(),
        };
        self.notify();

        if self.state.is_passive() {
            debug!(ticket, tag = command.tag(), "Passive page, acknowledging");
            handle.resolve(Payload::void());
        }
        Ok(ticket)
    }

    /// Accept a resolution coming back from a [`PromptHandle`].
    ///
    /// Returns the payload to forward, or `None` for a stale ticket. A payload
    /// the rendered prompt never offered is a protocol violation and leaves
    /// the prompt pending.
    pub fn accept_resolution(&mut self, ticket: u64, payload: Payload) -> Result<Option<Payload>> {
        match &self.phase {
            PromptPhase::Awaiting { ticket: current, tag } if *current == ticket => {
                if !self.state.accepts(&payload) {
                    warn!(ticket, tag = %tag, payload = payload.tag(), "Resolution does not fit the prompt");
                    return Err(HostError::PayloadMismatch {
                        prompt: tag.clone(),
                        payload: payload.tag().to_string(),
                    });
                }
                debug!(ticket, tag = %tag, payload = payload.tag(), "Prompt resolved");
                self.phase = PromptPhase::Resolved { ticket };
                self.state.prompt = None;
                self.notify();
                Ok(Some(payload))
            }
            phase => {
                warn!(ticket, phase = ?phase, "Ignoring resolution for a prompt that is not pending");
                Ok(None)
            }
        }
    }

    /// Close the turn once the payload has been handed on
    pub fn complete_turn(&mut self) {
        if let PromptPhase::Resolved { ticket } = self.phase {
            trace!(ticket, "Prompt turn complete");
            self.phase = PromptPhase::Idle;
        }
    }

    /// A late subscriber immediately sees what is already on screen
    pub fn subscribe(&mut self, id: SubscriptionId, mut subscriber: Subscriber) {
        if self.terminated {
            debug!(id = id.0, "Dropping subscription on terminated engine");
            return;
        }
        if !self.state.elements.is_empty() {
            subscriber(&self.state);
        }
        self.subscribers.push((id, subscriber));
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sid, _)| *sid != id);
        before != self.subscribers.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Drop subscribers and the pending prompt. Idempotent.
    pub fn terminate(&mut self) {
        if self.terminated {
            return;
        }
        self.terminated = true;
        self.subscribers.clear();
        self.state.prompt = None;
        self.phase = PromptPhase::Idle;
        debug!("Visualization engine terminated");
    }

    fn notify(&mut self) {
        if tracing::enabled!(tracing::Level::TRACE) {
            if let Ok(json) = serde_json::to_string(&self.state.elements) {
                let (preview, len) = log_preview(&json);
                trace!(len, elements = preview, "Render state changed");
            }
        }
        for (_, subscriber) in self.subscribers.iter_mut() {
            subscriber(&self.state);
        }
    }
}
