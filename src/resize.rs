//! Relays content height changes to the host as resize notices.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use crate::bridge::Bridge;
use crate::error::ResultExt;
use crate::prompts::RenderState;

/// Sends `{action:"resize"}` through the bridge whenever the height changes.
///
/// Delivery is best-effort; failures are logged and otherwise ignored.
pub struct ResizeObserver {
    bridge: Arc<dyn Bridge>,
    last: Mutex<Option<u32>>,
    connected: AtomicBool,
}

impl ResizeObserver {
    pub fn new(bridge: Arc<dyn Bridge>) -> Arc<Self> {
        Arc::new(Self {
            bridge,
            last: Mutex::new(None),
            connected: AtomicBool::new(true),
        })
    }

    /// Render-state hook
    pub fn observe(&self, state: &RenderState) {
        self.report(state.content_height());
    }

    /// Height measured by the surface itself
    pub fn report(&self, height: u32) {
        if !self.is_connected() {
            return;
        }
        let mut last = self.last.lock();
        if *last == Some(height) {
            return;
        }
        *last = Some(height);
        trace!(height, bridge = self.bridge.name(), "Content height changed");
        self.bridge.notify_resize(height).warn_on_err();
    }

    /// Stop relaying. Synchronous, idempotent.
    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn last_height(&self) -> Option<u32> {
        *self.last.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::{BridgeEvent, LoopbackBridge};
    use crate::prompts::Element;
    use crate::protocol::BridgeMessage;

    fn observed() -> (Arc<ResizeObserver>, Arc<Mutex<Vec<BridgeMessage>>>) {
        let bridge = Arc::new(LoopbackBridge::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        bridge
            .on_message(Box::new(move |event| {
                if let BridgeEvent::Message(message) = event {
                    sink.lock().push(message);
                }
            }))
            .unwrap();
        (ResizeObserver::new(bridge), seen)
    }

    #[test]
    fn test_only_changes_are_sent() {
        let (observer, seen) = observed();
        let state = RenderState {
            elements: vec![Element::header("Hi"), Element::text("there")],
            prompt: None,
        };
        observer.observe(&state);
        observer.observe(&state);
        observer.report(10);

        assert_eq!(
            *seen.lock(),
            vec![BridgeMessage::resize(3), BridgeMessage::resize(10)]
        );
        assert_eq!(observer.last_height(), Some(10));
    }

    #[test]
    fn test_disconnected_observer_is_silent() {
        let (observer, seen) = observed();
        observer.disconnect();
        observer.disconnect();
        observer.report(42);
        assert!(seen.lock().is_empty());
        assert!(!observer.is_connected());
    }

    #[test]
    fn test_failed_notice_does_not_panic() {
        let bridge = Arc::new(LoopbackBridge::new());
        bridge.dispose();
        let observer = ResizeObserver::new(bridge);
        observer.report(5);
        assert_eq!(observer.last_height(), Some(5));
    }
}
