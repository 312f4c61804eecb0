//! Driver runtime
//!
//! [`DeviceDriver`] is the one [`Driver`] implementation. It runs a blocking
//! read loop on its own thread, owns the device link, and hands every chunk
//! to a vendor [`Protocol`] decoder.
//!
//! ```text
//! Created ──start()──▶ Connecting ──link up──▶ Connected
//!    │                     │                      │
//!    └──stop()─────────────┴──error / stop()──────┴──▶ Terminated
//! ```
//!
//! Every exit path closes the link, clears `running` and publishes
//! `Disconnected`. Failures not caused by `stop()` are reported once as an
//! `Error` first, and [`Dispatcher::fault_finished`] runs last, once the
//! driver is fully down.

use crate::domain::analog::AnalogEmulator;
use crate::domain::dispatch::Dispatcher;
use crate::domain::driver::{Driver, FeatureControl, Protocol};
use crate::domain::error::{DriverError, HubError, TransportError};
use crate::domain::models::{DriverState, Feature, InputEvent, Notification};
use crate::infrastructure::transport::{Connector, Link, ShutdownHandle};
use std::io::{ErrorKind, Read, Write};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use tracing::{debug, info};

const READ_BUFFER_SIZE: usize = 1024;

#[derive(Debug, Clone, Copy)]
pub struct DriverOptions {
    /// Log user-facing status lines at info instead of debug
    pub announce: bool,
    pub analog_threshold: i32,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            announce: true,
            analog_threshold: 64,
        }
    }
}

fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Default)]
struct LinkSlot {
    shutdown: Option<ShutdownHandle>,
    writer: Option<Box<dyn Write + Send>>,
}

/// State shared between the driver handle and its thread.
struct Shared {
    protocol: Mutex<Box<dyn Protocol>>,
    state: Mutex<DriverState>,
    running: AtomicBool,
    stop_requested: AtomicBool,
    display_name: Mutex<Option<String>>,
    link: Mutex<LinkSlot>,
}

impl Shared {
    fn set_state(&self, state: DriverState) {
        *lock(&self.state) = state;
    }

    fn stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }

    fn close_link(&self) {
        let mut slot = lock(&self.link);
        slot.writer = None;
        if let Some(shutdown) = slot.shutdown.take() {
            shutdown.shutdown();
        }
    }

    fn terminate(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.set_state(DriverState::Terminated);
    }
}

pub struct DeviceDriver {
    driver_name: &'static str,
    address: String,
    connector: Arc<dyn Connector>,
    options: DriverOptions,
    has_features: bool,
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl DeviceDriver {
    pub fn new(
        driver_name: &'static str,
        protocol: Box<dyn Protocol>,
        address: &str,
        connector: Arc<dyn Connector>,
        options: DriverOptions,
    ) -> Result<Self, HubError> {
        connector
            .check_address(address)
            .map_err(|e| HubError::DriverConstruction {
                driver: driver_name.to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            driver_name,
            address: address.to_string(),
            connector,
            options,
            has_features: protocol.supports_features(),
            shared: Arc::new(Shared {
                protocol: Mutex::new(protocol),
                state: Mutex::new(DriverState::Created),
                running: AtomicBool::new(false),
                stop_requested: AtomicBool::new(false),
                display_name: Mutex::new(None),
                link: Mutex::new(LinkSlot::default()),
            }),
            worker: Mutex::new(None),
        })
    }
}

impl Driver for DeviceDriver {
    fn start(&self, dispatcher: Dispatcher) -> Result<(), HubError> {
        let mut worker = lock(&self.worker);
        if worker.is_some() || *lock(&self.shared.state) != DriverState::Created {
            return Err(HubError::DriverConstruction {
                driver: self.driver_name.to_string(),
                reason: "driver was already started".to_string(),
            });
        }

        self.shared.set_state(DriverState::Connecting);
        self.shared.running.store(true, Ordering::SeqCst);

        let run = DriverThread {
            driver_name: self.driver_name,
            address: self.address.clone(),
            connector: self.connector.clone(),
            options: self.options,
            shared: self.shared.clone(),
            dispatcher,
        };
        let handle = thread::Builder::new()
            .name(format!("{}-{}", self.driver_name, self.address))
            .spawn(move || run.run())
            .map_err(|e| {
                self.shared.terminate();
                HubError::DriverConstruction {
                    driver: self.driver_name.to_string(),
                    reason: format!("could not spawn driver thread: {}", e),
                }
            })?;
        *worker = Some(handle);
        Ok(())
    }

    fn stop(&self) -> Result<(), DriverError> {
        self.shared.stop_requested.store(true, Ordering::SeqCst);
        self.shared.close_link();

        let handle = lock(&self.worker).take();
        match handle {
            // Joining our own thread would deadlock; it is already on its way out
            Some(handle) if handle.thread().id() == thread::current().id() => Ok(()),
            Some(handle) => handle.join().map_err(|_| {
                self.shared.terminate();
                DriverError::Panicked
            }),
            None => {
                self.shared.terminate();
                Ok(())
            }
        }
    }

    fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    fn state(&self) -> DriverState {
        *lock(&self.shared.state)
    }

    fn device_address(&self) -> &str {
        &self.address
    }

    fn device_name(&self) -> String {
        lock(&self.shared.display_name)
            .clone()
            .unwrap_or_else(|| self.address.clone())
    }

    fn driver_name(&self) -> &str {
        self.driver_name
    }

    fn features(&self) -> Option<&dyn FeatureControl> {
        self.has_features.then_some(self as &dyn FeatureControl)
    }
}

impl FeatureControl for DeviceDriver {
    fn set_feature(&self, feature: Feature) -> Result<(), DriverError> {
        let Some(report) = lock(&self.shared.protocol).apply_feature(feature) else {
            debug!("{} ignores {:?}", self.driver_name, feature);
            return Ok(());
        };

        let mut slot = lock(&self.shared.link);
        match slot.writer.as_mut() {
            Some(writer) => {
                writer.write_all(&report)?;
                writer.flush()?;
            }
            // Protocol keeps the state; the handshake sends it once linked
            None => debug!("{:?} deferred until {} is linked", feature, self.address),
        }
        Ok(())
    }
}

/// Everything the driver thread owns.
struct DriverThread {
    driver_name: &'static str,
    address: String,
    connector: Arc<dyn Connector>,
    options: DriverOptions,
    shared: Arc<Shared>,
    dispatcher: Dispatcher,
}

impl DriverThread {
    fn run(self) {
        let mut emulator = AnalogEmulator::new(self.options.analog_threshold);

        let result = panic::catch_unwind(AssertUnwindSafe(|| self.session(&mut emulator)))
            .unwrap_or(Err(DriverError::Panicked));

        let faulted = match result {
            Ok(()) => false,
            Err(e) if self.shared.stop_requested() => {
                debug!("{} stopped with pending error: {}", self.address, e);
                false
            }
            Err(e) => {
                self.dispatcher.report_error(&HubError::Transport {
                    address: self.address.clone(),
                    source: e,
                });
                true
            }
        };

        let mut released = Vec::new();
        emulator.release_all(&mut released);
        for event in released {
            self.dispatcher.event(event);
        }

        self.shared.close_link();
        self.shared.terminate();
        self.status(&format!("Disconnected from {}", self.address));
        self.dispatcher.lifecycle(Notification::Disconnected {
            address: self.address.clone(),
        });

        if faulted {
            self.dispatcher.fault_finished();
        }
    }

    fn session(&self, emulator: &mut AnalogEmulator) -> Result<(), DriverError> {
        self.status(&format!(
            "Connecting to {} using {}",
            self.address, self.driver_name
        ));
        let Link {
            mut reader,
            mut writer,
            shutdown,
            remote_name,
        } = self.connector.connect(&self.address)?;

        let handshake = lock(&self.shared.protocol).handshake();
        for report in &handshake {
            writer.write_all(report)?;
        }
        writer.flush()?;

        {
            let mut slot = lock(&self.shared.link);
            if self.shared.stop_requested() {
                shutdown.shutdown();
                return Ok(());
            }
            slot.shutdown = Some(shutdown);
            slot.writer = Some(writer);
        }

        if let Some(name) = remote_name {
            *lock(&self.shared.display_name) = Some(name);
        }
        self.shared.set_state(DriverState::Connected);
        self.status(&format!("Connected to {}", self.address));
        self.dispatcher.lifecycle(Notification::Connected {
            address: self.address.clone(),
        });

        let mut buf = [0u8; READ_BUFFER_SIZE];
        let mut events: Vec<InputEvent> = Vec::new();
        let mut emulated: Vec<InputEvent> = Vec::new();
        loop {
            let n = match reader.read(&mut buf) {
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };
            if n == 0 {
                if self.shared.stop_requested() {
                    return Ok(());
                }
                return Err(TransportError::Closed.into());
            }

            events.clear();
            emulated.clear();
            lock(&self.shared.protocol).decode(&buf[..n], &mut events)?;
            for event in &events {
                emulator.process(event, &mut emulated);
            }
            for event in events.drain(..).chain(emulated.drain(..)) {
                self.dispatcher.event(event);
            }
        }
    }

    fn status(&self, message: &str) {
        if self.options.announce {
            info!("[{}] {}", self.dispatcher.session_id(), message);
        } else {
            debug!("[{}] {}", self.dispatcher.session_id(), message);
        }
    }
}

impl Drop for DeviceDriver {
    fn drop(&mut self) {
        if lock(&self.worker).is_some() {
            debug!("{} driver for {} dropped, stopping", self.driver_name, self.address);
            let _ = self.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::error::DecodeError;
    use crate::domain::models::{keycodes, KeyAction};
    use crate::infrastructure::drivers::zeemote::Zeemote;
    use crate::infrastructure::transport::{MemoryConnector, MemoryDevice};
    use crate::testing::RecordingSink;
    use std::sync::atomic::AtomicUsize;

    struct Panicky;

    impl Protocol for Panicky {
        fn decode(&mut self, _: &[u8], _: &mut Vec<InputEvent>) -> Result<(), DecodeError> {
            panic!("decoder bug");
        }
    }

    struct Fixture {
        driver: DeviceDriver,
        device: MemoryDevice,
        sink: Arc<RecordingSink>,
        faults: Arc<AtomicUsize>,
    }

    impl Fixture {
        fn start(&self) {
            let faults = self.faults.clone();
            let dispatcher = Dispatcher::new("s1", self.sink.clone()).with_fault_hook(move || {
                faults.fetch_add(1, Ordering::SeqCst);
            });
            self.driver.start(dispatcher).unwrap();
        }
    }

    fn fixture(protocol: Box<dyn Protocol>) -> Fixture {
        let connector = Arc::new(MemoryConnector::new());
        let device = connector.add_device("AA:BB", Some("Test Pad"));
        let driver = DeviceDriver::new(
            "zeemote",
            protocol,
            "AA:BB",
            connector,
            DriverOptions::default(),
        )
        .unwrap();
        Fixture {
            driver,
            device,
            sink: RecordingSink::new(),
            faults: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn zeemote() -> Fixture {
        fixture(Box::new(Zeemote::new()))
    }

    fn keys(sink: &RecordingSink) -> Vec<(i32, KeyAction, bool)> {
        sink.notifications("s1")
            .into_iter()
            .filter_map(|n| match n {
                Notification::Input(InputEvent::Key {
                    key,
                    action,
                    emulated,
                    ..
                }) => Some((key, action, emulated)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_lifecycle_and_name() {
        let f = zeemote();
        assert_eq!(f.driver.state(), DriverState::Created);
        assert_eq!(f.driver.device_name(), "AA:BB");

        f.start();
        assert!(f.driver.is_running());
        assert!(f.sink.wait_for_kind("s1", "connected", 1));
        assert_eq!(f.driver.state(), DriverState::Connected);
        assert_eq!(f.driver.device_name(), "Test Pad");

        f.driver.stop().unwrap();
        assert!(!f.driver.is_running());
        assert_eq!(f.driver.state(), DriverState::Terminated);
        assert_eq!(f.sink.lifecycle_kinds("s1"), vec!["connected", "disconnected"]);
        assert_eq!(f.faults.load(Ordering::SeqCst), 0);
        assert!(!f.device.is_linked());
    }

    #[test]
    fn test_start_twice_fails() {
        let f = zeemote();
        f.start();
        let second = f.driver.start(Dispatcher::new("s1", f.sink.clone()));
        assert!(matches!(second, Err(HubError::DriverConstruction { .. })));
        f.driver.stop().unwrap();
    }

    #[test]
    fn test_stop_without_start() {
        let f = zeemote();
        f.driver.stop().unwrap();
        assert_eq!(f.driver.state(), DriverState::Terminated);
        assert!(f.sink.envelopes().is_empty());
    }

    #[test]
    fn test_invalid_address_rejected_at_construction() {
        let connector = Arc::new(MemoryConnector::new());
        let result = DeviceDriver::new(
            "zeemote",
            Box::new(Zeemote::new()),
            "",
            connector,
            DriverOptions::default(),
        );
        assert!(matches!(result, Err(HubError::DriverConstruction { .. })));
    }

    #[test]
    fn test_device_hang_up_is_a_fault() {
        let f = zeemote();
        f.start();
        assert!(f.sink.wait_for_kind("s1", "connected", 1));

        assert!(f.device.hang_up());
        assert!(f.sink.wait_for_kind("s1", "disconnected", 1));
        assert_eq!(
            f.sink.lifecycle_kinds("s1"),
            vec!["connected", "error", "disconnected"]
        );
        assert!(!f.driver.is_running());

        // Joins, so the hook has run
        f.driver.stop().unwrap();
        assert_eq!(f.faults.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_decode_error_is_a_fault() {
        let f = zeemote();
        f.start();
        assert!(f.sink.wait_for_kind("s1", "connected", 1));

        assert!(f.device.send(&[2, 0x55, 0x07]));
        assert!(f.sink.wait_for_kind("s1", "disconnected", 1));
        match &f.sink.notifications("s1")[1] {
            Notification::Error { detail, .. } => assert!(detail.contains("0x55"), "{}", detail),
            other => panic!("expected error, got {:?}", other),
        }
        f.driver.stop().unwrap();
        assert_eq!(f.faults.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_panicking_decoder_is_reported() {
        let f = fixture(Box::new(Panicky));
        f.start();
        assert!(f.sink.wait_for_kind("s1", "connected", 1));

        assert!(f.device.send(&[1]));
        assert!(f.sink.wait_for_kind("s1", "disconnected", 1));
        let errors: Vec<_> = f
            .sink
            .notifications("s1")
            .into_iter()
            .filter(|n| matches!(n, Notification::Error { .. }))
            .collect();
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn test_stick_emulates_dpad_and_releases_on_stop() {
        let f = zeemote();
        f.start();
        assert!(f.sink.wait_for_kind("s1", "connected", 1));

        assert!(f.device.send(&[5, 0xA1, 0x08, 0, 0x7F, 0]));
        assert!(f.sink.wait_for_kind("s1", "input", 2));
        f.driver.stop().unwrap();

        assert_eq!(
            keys(&f.sink),
            vec![
                (keycodes::DPAD_RIGHT, KeyAction::Down, true),
                (keycodes::DPAD_RIGHT, KeyAction::Up, true),
            ]
        );
        assert_eq!(f.faults.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_unreachable_device() {
        let f = zeemote();
        f.device.set_refuse(true);
        f.start();

        assert!(f.sink.wait_for_kind("s1", "disconnected", 1));
        assert_eq!(f.sink.lifecycle_kinds("s1"), vec!["error", "disconnected"]);
        assert_eq!(f.device.connect_count(), 0);
    }
}
