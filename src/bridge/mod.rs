//! Bridge - transport abstraction towards the embedding host.
//!
//! Two implementations share one contract:
//! - [`LoopbackBridge`]: same-process echo used when there is no host
//!   (standalone mode, tests). Delivery order equals send order.
//! - [`HostBridge`]: JSONL over a byte stream to the embedding host, gated by
//!   an `init` handshake, with best-effort resize notices.
//!
//! Nothing downstream of the bridge may depend on which variant is active.

mod host;
mod loopback;

use std::collections::VecDeque;

use parking_lot::Mutex;
use tracing::debug;

use crate::error::{HostError, Result};
use crate::protocol::BridgeMessage;

pub use host::{HostBridge, HostTransport};
pub use loopback::LoopbackBridge;

/// Inbound traffic delivered to the registered handler
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeEvent {
    Message(BridgeMessage),
    /// The other side closed the transport
    Closed,
    /// Transport failure; the session must end
    Failed(String),
}

/// Handler invoked once per inbound event, in arrival order
pub type BridgeHandler = Box<dyn FnMut(BridgeEvent) + Send>;

/// Uniform send/receive surface over the host channel
pub trait Bridge: Send + Sync {
    /// Queue a message for the other side. Never blocks; errors are terminal.
    fn send(&self, message: BridgeMessage) -> Result<()>;

    /// Best-effort size notice, not part of the request/response protocol
    fn notify_resize(&self, height: u32) -> Result<()> {
        self.send(BridgeMessage::resize(height))
    }

    /// Register the single inbound handler. A second registration is an error.
    fn on_message(&self, handler: BridgeHandler) -> Result<()>;

    /// Release transport resources. Idempotent.
    fn dispose(&self);

    /// Variant name for logs
    fn name(&self) -> &'static str;
}

/// Single-handler slot that buffers events until a handler registers
#[derive(Default)]
pub(crate) struct HandlerSlot {
    inner: Mutex<SlotState>,
}

#[derive(Default)]
struct SlotState {
    handler: Option<BridgeHandler>,
    backlog: VecDeque<BridgeEvent>,
    closed: bool,
}

impl HandlerSlot {
    pub(crate) fn register(&self, mut handler: BridgeHandler) -> Result<()> {
        let mut state = self.inner.lock();
        if state.closed {
            return Err(HostError::BridgeDisposed);
        }
        if state.handler.is_some() {
            return Err(HostError::HandlerAlreadyRegistered);
        }
        // Flush under the lock so buffered events stay ahead of new ones
        while let Some(event) = state.backlog.pop_front() {
            handler(event);
        }
        state.handler = Some(handler);
        Ok(())
    }

    pub(crate) fn deliver(&self, event: BridgeEvent) {
        let mut state = self.inner.lock();
        if state.closed {
            debug!(event = ?event, "Dropping bridge event after dispose");
            return;
        }
        match state.handler.as_mut() {
            Some(handler) => handler(event),
            None => state.backlog.push_back(event),
        }
    }

    pub(crate) fn close(&self) {
        let mut state = self.inner.lock();
        state.closed = true;
        state.handler = None;
        state.backlog.clear();
    }
}
