//! Bridge to an embedding host over a line-oriented byte stream.
//!
//! # Handshake
//!
//! 1. `connect()` spawns a reader and a writer thread and returns immediately
//! 2. The reader waits for the host's `{"type":"init"}` line
//! 3. Only then is the bridge marked ready and the continuation invoked
//! 4. Until ready, `send()` refuses protocol messages
//!
//! Resize notices are queued with `try_send` and dropped when the queue is
//! full; protocol envelopes on a full queue are a transport error.

use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use async_channel::{Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use super::{Bridge, BridgeEvent, BridgeHandler, HandlerSlot};
use crate::error::{HostError, Result};
use crate::protocol::{write_line, BridgeMessage, JsonlReader};

type Closer = Box<dyn FnOnce() + Send>;

/// Byte stream to the host plus an optional hook that unblocks the reader
pub struct HostTransport {
    reader: Box<dyn Read + Send>,
    writer: Box<dyn Write + Send>,
    closer: Option<Closer>,
}

impl HostTransport {
    pub fn new(reader: impl Read + Send + 'static, writer: impl Write + Send + 'static) -> Self {
        Self {
            reader: Box::new(reader),
            writer: Box::new(writer),
            closer: None,
        }
    }

    /// Run `closer` when the bridge is disposed (e.g. shut a socket down)
    pub fn with_closer(mut self, closer: impl FnOnce() + Send + 'static) -> Self {
        self.closer = Some(Box::new(closer));
        self
    }

    /// Use this process's stdin/stdout, for hosts that spawn us directly
    pub fn stdio() -> Self {
        Self::new(std::io::stdin(), std::io::stdout())
    }

    #[cfg(unix)]
    pub fn unix(stream: std::os::unix::net::UnixStream) -> std::io::Result<Self> {
        let reader = stream.try_clone()?;
        let closer = stream.try_clone()?;
        Ok(Self::new(reader, stream).with_closer(move || {
            let _ = closer.shutdown(std::net::Shutdown::Both);
        }))
    }
}

/// Bridge to the embedding host
pub struct HostBridge {
    outbound: Sender<BridgeMessage>,
    slot: Arc<HandlerSlot>,
    ready: Arc<AtomicBool>,
    disposed: Arc<AtomicBool>,
}

impl HostBridge {
    /// Start the transport threads and wait (asynchronously) for the host.
    ///
    /// `on_ready` is invoked exactly once from the reader thread: with the
    /// bridge once `init` arrives, or with an error if the transport fails or
    /// closes first. It is never invoked after `dispose()`.
    pub fn connect<F>(transport: HostTransport, capacity: usize, on_ready: F) -> Arc<HostBridge>
    where
        F: FnOnce(Result<Arc<HostBridge>>) + Send + 'static,
    {
        let (tx, rx) = async_channel::bounded(capacity.max(1));
        let bridge = Arc::new(HostBridge {
            outbound: tx,
            slot: Arc::new(HandlerSlot::default()),
            ready: Arc::new(AtomicBool::new(false)),
            disposed: Arc::new(AtomicBool::new(false)),
        });

        let HostTransport {
            reader,
            writer,
            closer,
        } = transport;

        spawn_writer(rx, writer, closer, bridge.slot.clone(), bridge.disposed.clone());
        spawn_reader(reader, bridge.clone(), on_ready);

        bridge
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    fn enqueue(&self, message: BridgeMessage) -> Result<()> {
        match self.outbound.try_send(message) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(message)) if message.is_notice() => {
                debug!(kind = message.kind(), "Host queue full, dropping notice");
                Ok(())
            }
            Err(TrySendError::Full(message)) => Err(HostError::Transport(format!(
                "host is not draining the outbound queue (dropped '{}')",
                message.kind()
            ))),
            Err(TrySendError::Closed(_)) => {
                Err(HostError::Transport("host writer has stopped".to_string()))
            }
        }
    }
}

impl Bridge for HostBridge {
    fn send(&self, message: BridgeMessage) -> Result<()> {
        if self.disposed.load(Ordering::SeqCst) {
            return Err(HostError::BridgeDisposed);
        }
        if !self.is_ready() {
            return Err(HostError::HandshakeFailed(
                "message sent before host signalled readiness".to_string(),
            ));
        }
        self.enqueue(message)
    }

    fn notify_resize(&self, height: u32) -> Result<()> {
        // Before the handshake resize notices are simply not needed yet
        if !self.is_ready() || self.disposed.load(Ordering::SeqCst) {
            return Ok(());
        }
        self.enqueue(BridgeMessage::resize(height))
    }

    fn on_message(&self, handler: BridgeHandler) -> Result<()> {
        self.slot.register(handler)
    }

    fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Host bridge disposed");
        self.slot.close();
        // Writer drains what is queued, then runs the closer
        self.outbound.close();
    }

    fn name(&self) -> &'static str {
        "host"
    }
}

fn spawn_writer(
    rx: Receiver<BridgeMessage>,
    mut writer: Box<dyn Write + Send>,
    closer: Option<Closer>,
    slot: Arc<HandlerSlot>,
    disposed: Arc<AtomicBool>,
) {
    thread::spawn(move || {
        debug!("Host writer thread started");
        while let Ok(message) = rx.recv_blocking() {
            if let Err(e) = write_line(&mut writer, &message) {
                error!(error = %e, kind = message.kind(), "Failed to write to host");
                if !disposed.load(Ordering::SeqCst) {
                    slot.deliver(BridgeEvent::Failed(format!("write to host failed: {e}")));
                }
                break;
            }
        }
        rx.close();
        if let Some(closer) = closer {
            closer();
        }
        debug!("Host writer thread exiting");
    });
}

fn spawn_reader<F>(reader: Box<dyn Read + Send>, bridge: Arc<HostBridge>, on_ready: F)
where
    F: FnOnce(Result<Arc<HostBridge>>) + Send + 'static,
{
    thread::spawn(move || {
        debug!("Host reader thread started, waiting for init");
        let mut reader = JsonlReader::new(reader);
        let mut on_ready = Some(on_ready);

        let end = loop {
            match reader.next_message_graceful::<BridgeMessage>() {
                Ok(Some(message)) if message.is_init() => {
                    if bridge.ready.swap(true, Ordering::SeqCst) {
                        debug!("Ignoring repeated init from host");
                        continue;
                    }
                    info!("Host signalled readiness");
                    if let Some(cb) = on_ready.take() {
                        if !bridge.disposed.load(Ordering::SeqCst) {
                            cb(Ok(bridge.clone()));
                        }
                    }
                }
                Ok(Some(message)) if !bridge.is_ready() => {
                    warn!(kind = message.kind(), "Ignoring host message before init");
                }
                Ok(Some(message)) => bridge.slot.deliver(BridgeEvent::Message(message)),
                Ok(None) => break None,
                Err(e) => break Some(e.to_string()),
            }
        };

        if bridge.disposed.load(Ordering::SeqCst) {
            debug!("Host reader thread exiting after dispose");
            return;
        }

        match on_ready.take() {
            // Never became ready: the handshake itself failed
            Some(cb) => {
                let reason = end.unwrap_or_else(|| "host closed before init".to_string());
                warn!(reason = %reason, "Host handshake failed");
                cb(Err(HostError::HandshakeFailed(reason)));
            }
            None => {
                let event = match end {
                    Some(reason) => {
                        error!(reason = %reason, "Host transport failed");
                        BridgeEvent::Failed(reason)
                    }
                    None => {
                        info!("Host closed the transport");
                        BridgeEvent::Closed
                    }
                };
                bridge.slot.deliver(event);
            }
        }
    });
}
