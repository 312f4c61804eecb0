//! Connection Orchestrator
//!
//! Implements connect / disconnect / feature / query for sessions.
//!
//! ## Responsibilities
//!
//! 1. **Validation**: reject empty fields and a missing or disabled adapter
//! 2. **Replacement**: a session never has two drivers alive, even briefly;
//!    the previous one is stopped (and joined) before the next is announced
//! 3. **Registration before start**: a disconnect right after connect
//!    always finds the new driver
//! 4. **Uniform error path**: every failure is logged, published once as
//!    `Error`, and followed by a forced disconnect

use crate::domain::dispatch::{Dispatcher, EventSink};
use crate::domain::driver::Driver;
use crate::domain::error::HubError;
use crate::domain::models::{ConfigReport, Envelope, Feature, Notification, StateReport};
use crate::infrastructure::adapter::{AdapterCheck, AdapterState};
use crate::infrastructure::drivers::{DeviceDriver, DriverOptions};
use crate::infrastructure::transport::Connector;
use crate::service::registry::DriverRegistry;
use crate::service::session_table::{DriverId, SessionEntry, SessionTable};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tracing::{debug, info};

pub struct Orchestrator {
    table: Arc<SessionTable>,
    registry: Arc<DriverRegistry>,
    adapter: Arc<dyn AdapterCheck>,
    connector: Arc<dyn Connector>,
    sink: Arc<dyn EventSink>,
    version: String,
    analog_threshold: i32,
    // Serializes operations issued from several threads
    gate: Mutex<()>,
    next_id: AtomicU64,
}

impl Orchestrator {
    pub fn new(
        registry: Arc<DriverRegistry>,
        adapter: Arc<dyn AdapterCheck>,
        connector: Arc<dyn Connector>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            table: Arc::new(SessionTable::new()),
            registry,
            adapter,
            connector,
            sink,
            version: env!("CARGO_PKG_VERSION").to_string(),
            analog_threshold: DriverOptions::default().analog_threshold,
            gate: Mutex::new(()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_analog_threshold(mut self, threshold: i32) -> Self {
        self.analog_threshold = threshold;
        self
    }

    pub fn table(&self) -> &SessionTable {
        &self.table
    }

    pub fn registry(&self) -> &DriverRegistry {
        &self.registry
    }

    fn gate(&self) -> MutexGuard<'_, ()> {
        self.gate.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn dispatcher(&self, session_id: &str) -> Dispatcher {
        Dispatcher::new(session_id, self.sink.clone())
    }

    /// Connect `session_id` to `address` using `driver_name`. Failures are
    /// published as an `Error` for the session, never returned.
    pub fn connect(&self, session_id: &str, address: &str, driver_name: &str, notify: bool) {
        let _gate = self.gate();
        if let Err(e) = self.try_connect(session_id, address, driver_name, notify) {
            self.fail(session_id, &e);
        }
    }

    fn try_connect(
        &self,
        session_id: &str,
        address: &str,
        driver_name: &str,
        notify: bool,
    ) -> Result<(), HubError> {
        if session_id.trim().is_empty() {
            return Err(HubError::InternalViolation("no session id specified".to_string()));
        }
        if driver_name.trim().is_empty() {
            return Err(HubError::InvalidRequest("no driver specified".to_string()));
        }
        // Users can reach this before ever picking a device
        if address.trim().is_empty() {
            return Err(HubError::NoDeviceSelected);
        }

        match self.adapter.state() {
            AdapterState::Missing => return Err(HubError::AdapterUnavailable),
            AdapterState::Disabled => return Err(HubError::AdapterDisabled),
            AdapterState::Enabled => {}
        }

        if let Some(current) = self.table.get(session_id) {
            let driver = &current.driver;
            if driver.is_running()
                && driver.device_address() == address
                && driver.driver_name() == driver_name.trim().to_lowercase()
            {
                debug!("[{}] already connected to {}", session_id, address);
                return Ok(());
            }
            info!(
                "[{}] replacing {} ({}) with {} ({})",
                session_id,
                driver.device_address(),
                driver.driver_name(),
                address,
                driver_name
            );
            self.disconnect_locked(session_id);
        }

        let dispatcher = self.dispatcher(session_id);
        dispatcher.lifecycle(Notification::Connecting {
            address: address.to_string(),
        });

        let descriptor = self.registry.resolve(driver_name)?;
        let driver = Arc::new(DeviceDriver::new(
            descriptor.name,
            descriptor.create_protocol(),
            address,
            self.connector.clone(),
            DriverOptions {
                announce: notify,
                analog_threshold: self.analog_threshold,
            },
        )?);

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.table
            .register(
                session_id,
                SessionEntry {
                    id,
                    driver: driver.clone(),
                },
            )
            .map_err(|_| {
                HubError::InternalViolation(format!("session {} already has a driver", session_id))
            })?;

        let reaper = reaper(Arc::downgrade(&self.table), session_id.to_string(), id);
        driver.start(dispatcher.with_fault_hook(reaper))
    }

    /// Stop and forget the session's driver. No entry is not an error.
    pub fn disconnect(&self, session_id: &str) {
        let _gate = self.gate();
        self.disconnect_locked(session_id);
    }

    fn disconnect_locked(&self, session_id: &str) {
        // Removal happens first so a failing stop cannot leave it registered
        let Some(entry) = self.table.take(session_id) else {
            return;
        };
        let address = entry.driver.device_address().to_string();
        info!("[{}] disconnecting from {}", session_id, address);

        if let Err(e) = entry.driver.stop() {
            self.fail(session_id, &HubError::Transport { address, source: e });
        }
    }

    /// Uniform error path: log, publish, force disconnect.
    fn fail(&self, session_id: &str, err: &HubError) {
        self.dispatcher(session_id).report_error(err);
        self.disconnect_locked(session_id);
    }

    /// Forward a feature change to the session's driver. Missing sessions
    /// and drivers without extended features ignore it.
    pub fn apply_feature(&self, session_id: &str, feature: Feature) {
        let _gate = self.gate();
        if session_id.trim().is_empty() {
            self.fail(
                session_id,
                &HubError::InternalViolation("no session id specified".to_string()),
            );
            return;
        }

        let Some(entry) = self.table.get(session_id) else {
            debug!("[{}] no driver for {:?}", session_id, feature);
            return;
        };
        let Some(features) = entry.driver.features() else {
            debug!(
                "[{}] {} has no extended features, ignoring {:?}",
                session_id,
                entry.driver.driver_name(),
                feature
            );
            return;
        };

        if let Err(e) = features.set_feature(feature) {
            let err = HubError::Transport {
                address: entry.driver.device_address().to_string(),
                source: e,
            };
            self.fail(session_id, &err);
        }
    }

    pub fn query_state(&self, session_id: &str) -> StateReport {
        match self.table.get(session_id) {
            Some(entry) => StateReport {
                connected: true,
                device_address: Some(entry.driver.device_address().to_string()),
                display_name: Some(entry.driver.device_name()),
                driver_name: Some(entry.driver.driver_name().to_string()),
            },
            None => StateReport::default(),
        }
    }

    pub fn query_config(&self) -> ConfigReport {
        ConfigReport {
            version: self.version.clone(),
            driver_names: self.registry.driver_names(),
            driver_display_names: self.registry.driver_display_names(),
        }
    }

    /// Publish a `State` notification for the session.
    pub fn publish_state(&self, session_id: &str) {
        self.publish(session_id, Notification::State(self.query_state(session_id)));
    }

    /// Publish a `Config` notification for the session.
    pub fn publish_config(&self, session_id: &str) {
        self.publish(session_id, Notification::Config(self.query_config()));
    }

    fn publish(&self, session_id: &str, notification: Notification) {
        self.sink.publish(Envelope {
            session_id: session_id.to_string(),
            notification,
        });
    }

    /// Disconnect every session.
    pub fn shutdown(&self) {
        let _gate = self.gate();
        for session_id in self.table.session_ids() {
            self.disconnect_locked(&session_id);
        }
    }
}

/// Cleanup run on a driver thread once a faulted driver is fully down. Only
/// removes the entry if it still belongs to that driver.
fn reaper(table: Weak<SessionTable>, session_id: String, id: DriverId) -> impl Fn() + Send + Sync {
    move || {
        let Some(table) = table.upgrade() else {
            return;
        };
        if table.take_if(&session_id, id).is_some() {
            debug!("[{}] removed faulted driver #{}", session_id, id);
        }
    }
}
