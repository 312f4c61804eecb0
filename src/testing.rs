//! Test support shared by the unit tests.

use crate::domain::dispatch::EventSink;
use crate::domain::models::{Envelope, Notification};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

const WAIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Sink that keeps every envelope and lets tests wait for conditions.
#[derive(Default)]
pub struct RecordingSink {
    envelopes: Mutex<Vec<Envelope>>,
    changed: Condvar,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn envelopes(&self) -> Vec<Envelope> {
        self.envelopes.lock().unwrap().clone()
    }

    pub fn notifications(&self, session_id: &str) -> Vec<Notification> {
        self.envelopes()
            .into_iter()
            .filter(|e| e.session_id == session_id)
            .map(|e| e.notification)
            .collect()
    }

    /// Short tags for the session's notifications, in publish order.
    pub fn kinds(&self, session_id: &str) -> Vec<&'static str> {
        self.notifications(session_id).iter().map(kind).collect()
    }

    pub fn lifecycle_kinds(&self, session_id: &str) -> Vec<&'static str> {
        self.kinds(session_id)
            .into_iter()
            .filter(|k| *k != "input")
            .collect()
    }

    /// Block until `done` holds for the recorded envelopes, or time out.
    pub fn wait_for(&self, done: impl Fn(&[Envelope]) -> bool) -> bool {
        let deadline = Instant::now() + WAIT_TIMEOUT;
        let mut envelopes = self.envelopes.lock().unwrap();
        while !done(&envelopes) {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            envelopes = self.changed.wait_timeout(envelopes, deadline - now).unwrap().0;
        }
        true
    }

    /// Wait until the session has published `count` notifications of `tag`.
    pub fn wait_for_kind(&self, session_id: &str, tag: &str, count: usize) -> bool {
        self.wait_for(|envelopes| {
            envelopes
                .iter()
                .filter(|e| e.session_id == session_id && kind(&e.notification) == tag)
                .count()
                >= count
        })
    }
}

impl EventSink for RecordingSink {
    fn publish(&self, envelope: Envelope) {
        self.envelopes.lock().unwrap().push(envelope);
        self.changed.notify_all();
    }
}

/// Poll `done` until it holds, or time out.
pub fn wait_until(done: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + WAIT_TIMEOUT;
    while !done() {
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    true
}

pub fn kind(notification: &Notification) -> &'static str {
    match notification {
        Notification::Input(_) => "input",
        Notification::Connecting { .. } => "connecting",
        Notification::Connected { .. } => "connected",
        Notification::Disconnected { .. } => "disconnected",
        Notification::Error { .. } => "error",
        Notification::State(_) => "state",
        Notification::Config(_) => "config",
    }
}
