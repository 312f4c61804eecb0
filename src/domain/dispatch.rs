//! Event dispatch
//!
//! Drivers publish through a [`Dispatcher`] bound to their session. The
//! dispatcher forwards to an injected [`EventSink`], so the core never knows
//! how the host actually receives notifications.

use crate::domain::error::HubError;
use crate::domain::models::{Envelope, InputEvent, Notification};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, trace};

/// Destination for every envelope the core produces.
pub trait EventSink: Send + Sync {
    fn publish(&self, envelope: Envelope);
}

impl<F> EventSink for F
where
    F: Fn(Envelope) + Send + Sync,
{
    fn publish(&self, envelope: Envelope) {
        self(envelope)
    }
}

/// Sink backed by an unbounded tokio channel.
pub struct ChannelSink {
    sender: mpsc::UnboundedSender<Envelope>,
}

impl ChannelSink {
    pub fn new(sender: mpsc::UnboundedSender<Envelope>) -> Self {
        Self { sender }
    }

    /// Create a sink together with the receiving end.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Envelope>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl EventSink for ChannelSink {
    fn publish(&self, envelope: Envelope) {
        // Receiver gone means the host is shutting down
        let _ = self.sender.send(envelope);
    }
}

type FaultHook = Arc<dyn Fn() + Send + Sync>;

/// Session-scoped publishing handle given to a driver.
#[derive(Clone)]
pub struct Dispatcher {
    session_id: Arc<str>,
    sink: Arc<dyn EventSink>,
    on_fault: Option<FaultHook>,
}

impl Dispatcher {
    pub fn new(session_id: &str, sink: Arc<dyn EventSink>) -> Self {
        Self {
            session_id: Arc::from(session_id),
            sink,
            on_fault: None,
        }
    }

    /// Run `hook` once a faulted driver has fully shut down.
    pub fn with_fault_hook(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_fault = Some(Arc::new(hook));
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn event(&self, event: InputEvent) {
        trace!("[{}] input {:?}", self.session_id, event);
        self.publish(Notification::Input(event));
    }

    pub fn lifecycle(&self, notification: Notification) {
        self.publish(notification);
    }

    /// Log `err` and publish it as an `Error` notification.
    pub fn report_error(&self, err: &HubError) {
        error!("[{}] {}", self.session_id, err.detail());
        self.publish(Notification::Error {
            message: err.to_string(),
            detail: err.detail(),
        });
    }

    /// Called by a driver that reported a fault, after its link is closed
    /// and `Disconnected` is out.
    pub fn fault_finished(&self) {
        if let Some(hook) = &self.on_fault {
            hook();
        }
    }

    fn publish(&self, notification: Notification) {
        self.sink.publish(Envelope {
            session_id: self.session_id.to_string(),
            notification,
        });
    }
}
