//! Runtime side of a client subscription: drives the pure `update` loop against real ports.
//!
//! The driver task owns the `SubscriptionState` and the open port. Callers see
//! the state through a `watch` channel of `SubscriptionView`s.
use std::sync::Arc;

use relay_logging::{relay_debug, relay_warn};
use serde_json::Value;
use summary_core::{update, Effect, Envelope, JobKey, Msg, SubscriptionState, SubscriptionView};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{Port, PortConnector, SenderInfo};

/// Opens subscriptions against one background host on behalf of one sender.
#[derive(Clone)]
pub struct Subscriber {
    connector: Arc<dyn PortConnector>,
    sender: SenderInfo,
}

impl Subscriber {
    pub fn new(connector: Arc<dyn PortConnector>, sender: SenderInfo) -> Self {
        Self { connector, sender }
    }

    /// Starts a subscription for `key`. Must be called within a Tokio runtime.
    pub fn subscribe(&self, key: JobKey, request: Envelope) -> SubscriptionHandle {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (view_tx, view_rx) = watch::channel(SubscriptionView::default());
        let dispose = CancellationToken::new();

        // The receiver is still alive, so this cannot fail.
        let _ = commands_tx.send(Msg::Subscribe { key, request });

        let driver = Driver {
            connector: self.connector.clone(),
            sender: self.sender.clone(),
            state: SubscriptionState::new(),
            port: None,
            view_tx,
        };
        let task = tokio::spawn(driver.run(commands_rx, dispose.clone()));

        SubscriptionHandle {
            commands: commands_tx,
            view: view_rx,
            dispose,
            task,
        }
    }
}

pub struct SubscriptionHandle {
    commands: mpsc::UnboundedSender<Msg>,
    view: watch::Receiver<SubscriptionView>,
    dispose: CancellationToken,
    task: JoinHandle<SubscriptionView>,
}

impl SubscriptionHandle {
    /// A receiver that wakes on every published view.
    pub fn updates(&self) -> watch::Receiver<SubscriptionView> {
        self.view.clone()
    }

    /// Switches the subscription to a new key; a zero toggle resets it.
    ///
    /// Returns `false` once the subscription has been disposed.
    pub fn resubscribe(&self, key: JobKey, request: Envelope) -> bool {
        self.commands.send(Msg::Subscribe { key, request }).is_ok()
    }

    /// Closes the open port, if any, and stops the driver.
    pub fn dispose(&self) {
        self.dispose.cancel();
    }

    /// Token that disposes this subscription when cancelled, usable after `join` took the handle.
    pub fn dispose_token(&self) -> CancellationToken {
        self.dispose.clone()
    }

    /// Waits until the current job reaches a terminal state and returns the final view.
    pub async fn join(self) -> SubscriptionView {
        let SubscriptionHandle {
            commands,
            view,
            task,
            ..
        } = self;
        drop(commands);
        match task.await {
            Ok(view) => view,
            Err(err) => {
                relay_warn!("subscription driver stopped abnormally: {}", err);
                let last = view.borrow().clone();
                last
            }
        }
    }
}

struct Driver {
    connector: Arc<dyn PortConnector>,
    sender: SenderInfo,
    state: SubscriptionState,
    port: Option<(u64, Port)>,
    view_tx: watch::Sender<SubscriptionView>,
}

impl Driver {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Msg>,
        dispose: CancellationToken,
    ) -> SubscriptionView {
        let mut commands_open = true;
        loop {
            if !commands_open && self.state.active_toggle().is_none() {
                break;
            }

            let msg = tokio::select! {
                biased;
                _ = dispose.cancelled() => {
                    self.step(Msg::Dispose);
                    break;
                }
                command = commands.recv(), if commands_open => match command {
                    Some(msg) => msg,
                    None => {
                        commands_open = false;
                        continue;
                    }
                },
                (toggled, frame) = next_frame(&mut self.port) => match frame {
                    Some(frame) => Msg::Frame { toggled, frame },
                    None => {
                        self.port = None;
                        Msg::PortClosed { toggled }
                    }
                },
            };
            self.step(msg);
        }

        if let Some((_, port)) = self.port.take() {
            port.disconnect();
        }
        self.state.view()
    }

    fn step(&mut self, msg: Msg) {
        let (state, effects) = update(std::mem::take(&mut self.state), msg);
        self.state = state;
        for effect in effects {
            self.execute(effect);
        }
        let view = self.state.view();
        if self.state.consume_dirty() {
            self.view_tx.send_replace(view);
        }
    }

    fn execute(&mut self, effect: Effect) {
        match effect {
            Effect::OpenPort { name, toggled } => {
                if let Some((_, stale)) = self.port.take() {
                    stale.disconnect();
                }
                relay_debug!("subscription opening port={} toggled={}", name, toggled);
                let port = self.connector.connect(&name, self.sender.clone());
                self.port = Some((toggled, port));
            }
            Effect::SendRequest { toggled, envelope } => match &self.port {
                Some((open, port)) if *open == toggled => {
                    if let Err(err) = port.send(&envelope) {
                        relay_warn!("port={} request not sent: {}", port.name(), err);
                    }
                }
                _ => relay_debug!("dropping request for closed toggle {}", toggled),
            },
            Effect::ClosePort { toggled } => {
                if matches!(&self.port, Some((open, _)) if *open == toggled) {
                    if let Some((_, port)) = self.port.take() {
                        port.disconnect();
                    }
                }
            }
        }
    }
}

/// Next frame of the open port, tagged with its toggle. Pends forever without a port.
async fn next_frame(port: &mut Option<(u64, Port)>) -> (u64, Option<Value>) {
    match port {
        Some((toggled, port)) => (*toggled, port.recv().await),
        None => std::future::pending().await,
    }
}
