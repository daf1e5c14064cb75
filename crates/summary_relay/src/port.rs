//! Long-lived bidirectional named channel between a UI surface and the background host.
//!
//! Frames are `serde_json::Value`s, delivered in send order. Either end may
//! disconnect at any time; the other end observes it after draining frames
//! that were already sent. Dropping an end disconnects it.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use relay_logging::{relay_debug, relay_warn};
use serde_json::Value;
use summary_core::Envelope;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Identity of the context that opened a port.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SenderInfo {
    pub id: Option<String>,
}

impl SenderInfo {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: Some(id.into()) }
    }

    pub fn anonymous() -> Self {
        Self { id: None }
    }

    pub fn display_id(&self) -> &str {
        self.id.as_deref().unwrap_or("undefined")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PortError {
    #[error("port is disconnected")]
    Disconnected,
}

#[derive(Debug)]
pub struct Port {
    name: Arc<str>,
    sender: SenderInfo,
    tx: mpsc::UnboundedSender<Value>,
    rx: mpsc::UnboundedReceiver<Value>,
    closed: CancellationToken,
}

impl Port {
    /// Creates both ends of a channel: `(ui_end, background_end)`.
    pub fn pair(name: impl Into<String>, sender: SenderInfo) -> (Port, Port) {
        let name: Arc<str> = Arc::from(name.into());
        let closed = CancellationToken::new();
        let (to_background, from_ui) = mpsc::unbounded_channel();
        let (to_ui, from_background) = mpsc::unbounded_channel();

        let ui = Port {
            name: name.clone(),
            sender: sender.clone(),
            tx: to_background,
            rx: from_background,
            closed: closed.clone(),
        };
        let background = Port {
            name,
            sender,
            tx: to_ui,
            rx: from_ui,
            closed,
        };
        (ui, background)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sender(&self) -> &SenderInfo {
        &self.sender
    }

    pub fn send(&self, envelope: &Envelope) -> Result<(), PortError> {
        self.send_value(envelope.to_value())
    }

    pub fn send_value(&self, frame: Value) -> Result<(), PortError> {
        if self.closed.is_cancelled() {
            return Err(PortError::Disconnected);
        }
        self.tx.send(frame).map_err(|_| PortError::Disconnected)
    }

    /// Next frame from the other end, or `None` once disconnected and drained.
    pub async fn recv(&mut self) -> Option<Value> {
        tokio::select! {
            biased;
            frame = self.rx.recv() => frame,
            _ = self.closed.cancelled() => self.rx.try_recv().ok(),
        }
    }

    /// Idempotent; safe to call from either end at any time.
    pub fn disconnect(&self) {
        if !self.closed.is_cancelled() {
            relay_debug!("port={} disconnect", self.name);
            self.closed.cancel();
        }
    }

    pub fn is_connected(&self) -> bool {
        !self.closed.is_cancelled()
    }

    /// Resolves once either end has disconnected.
    pub async fn disconnected(&self) {
        self.closed.cancelled().await;
    }
}

impl Drop for Port {
    fn drop(&mut self) {
        self.closed.cancel();
    }
}

/// Opens ports against a background host.
pub trait PortConnector: Send + Sync {
    fn connect(&self, name: &str, sender: SenderInfo) -> Port;
}

/// Background end of a job's port.
///
/// Enforces that nothing follows a terminal `RESPONSE` or `ERROR` envelope.
#[derive(Debug)]
pub struct JobPort {
    port: Port,
    terminated: AtomicBool,
}

impl JobPort {
    pub fn new(port: Port) -> Self {
        Self {
            port,
            terminated: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        self.port.name()
    }

    pub fn sender(&self) -> &SenderInfo {
        self.port.sender()
    }

    /// Sends an envelope; returns whether it was handed to the channel.
    pub fn emit(&self, envelope: Envelope) -> bool {
        if self.terminated.load(Ordering::Acquire) {
            relay_warn!(
                "port={} dropping {} envelope after terminal envelope",
                self.name(),
                envelope.kind()
            );
            return false;
        }
        if envelope.is_terminal() {
            self.terminated.store(true, Ordering::Release);
        }
        match self.port.send(&envelope) {
            Ok(()) => true,
            Err(err) => {
                relay_debug!(
                    "port={} {} envelope not delivered: {}",
                    self.name(),
                    envelope.kind(),
                    err
                );
                false
            }
        }
    }

    pub fn disconnect(&self) {
        self.port.disconnect();
    }

    pub fn is_connected(&self) -> bool {
        self.port.is_connected()
    }

    pub async fn disconnected(&self) {
        self.port.disconnected().await;
    }
}
