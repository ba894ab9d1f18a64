use std::sync::atomic::{AtomicBool, Ordering};

use tracing::debug;

use super::{Bridge, BridgeEvent, BridgeHandler, HandlerSlot};
use crate::error::{HostError, Result};
use crate::protocol::BridgeMessage;

/// Same-process bridge: every sent message is echoed to the local handler.
///
/// Used when no embedding host exists. Delivery is synchronous, so the order
/// seen by the handler is exactly the send order.
#[derive(Default)]
pub struct LoopbackBridge {
    slot: HandlerSlot,
    disposed: AtomicBool,
}

impl LoopbackBridge {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Bridge for LoopbackBridge {
    fn send(&self, message: BridgeMessage) -> Result<()> {
        if self.disposed.load(Ordering::SeqCst) {
            return Err(HostError::BridgeDisposed);
        }
        debug!(kind = message.kind(), "Loopback bridge echo");
        self.slot.deliver(BridgeEvent::Message(message));
        Ok(())
    }

    fn on_message(&self, handler: BridgeHandler) -> Result<()> {
        self.slot.register(handler)
    }

    fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!("Loopback bridge disposed");
        self.slot.close();
    }

    fn name(&self) -> &'static str {
        "loopback"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Command;
    use std::sync::mpsc;

    #[test]
    fn test_echo_preserves_send_order() {
        let bridge = LoopbackBridge::new();
        let (tx, rx) = mpsc::channel();
        bridge
            .on_message(Box::new(move |event| tx.send(event).unwrap()))
            .unwrap();

        bridge
            .send(BridgeMessage::command(Command::donate("a", "{}")))
            .unwrap();
        bridge.notify_resize(40).unwrap();
        bridge
            .send(BridgeMessage::command(Command::exit(0, "done")))
            .unwrap();

        let kinds: Vec<String> = rx
            .try_iter()
            .map(|event| match event {
                BridgeEvent::Message(msg) => msg.kind().to_string(),
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(kinds, vec!["donate", "resize", "exit"]);
    }

    #[test]
    fn test_send_after_dispose_fails() {
        let bridge = LoopbackBridge::new();
        bridge.dispose();
        bridge.dispose();
        assert!(matches!(
            bridge.send(BridgeMessage::resize(1)),
            Err(HostError::BridgeDisposed)
        ));
    }
}
