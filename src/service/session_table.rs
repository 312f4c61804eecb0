//! Session Table
//!
//! Maps session ids to the driver serving them. It is the only shared
//! mutable state in the core; every operation takes the lock once and never
//! holds it across driver calls.

use crate::domain::driver::Driver;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Distinguishes successive drivers registered under one session.
pub type DriverId = u64;

#[derive(Clone)]
pub struct SessionEntry {
    pub id: DriverId,
    pub driver: Arc<dyn Driver>,
}

#[derive(Default)]
pub struct SessionTable {
    sessions: Mutex<HashMap<String, SessionEntry>>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<String, SessionEntry>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, session_id: &str) -> Option<SessionEntry> {
        self.sessions().get(session_id).cloned()
    }

    /// Register a driver for an empty session. An occupied session is left
    /// untouched and the entry is handed back.
    pub fn register(&self, session_id: &str, entry: SessionEntry) -> Result<(), SessionEntry> {
        let mut sessions = self.sessions();
        if sessions.contains_key(session_id) {
            return Err(entry);
        }
        sessions.insert(session_id.to_string(), entry);
        Ok(())
    }

    pub fn take(&self, session_id: &str) -> Option<SessionEntry> {
        self.sessions().remove(session_id)
    }

    /// Remove the session only if it still holds driver `id`.
    pub fn take_if(&self, session_id: &str, id: DriverId) -> Option<SessionEntry> {
        let mut sessions = self.sessions();
        match sessions.get(session_id) {
            Some(entry) if entry.id == id => sessions.remove(session_id),
            _ => None,
        }
    }

    pub fn session_ids(&self) -> Vec<String> {
        self.sessions().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.sessions().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions().is_empty()
    }
}
