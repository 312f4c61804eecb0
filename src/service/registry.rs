//! Driver Registry
//!
//! Catalog of driver kinds. Base drivers are always listed; HID drivers are
//! appended only when the host has HID support. Support is checked once per
//! registry and trusted for its lifetime, so a newly installed HID stack is
//! only picked up after a restart.

use crate::domain::driver::Protocol;
use crate::domain::error::HubError;
use crate::infrastructure::drivers::data_dump::{self, DataDump};
use crate::infrastructure::drivers::hid_keyboard::{self, HidKeyboard};
use crate::infrastructure::drivers::icade::{self, ICade};
use crate::infrastructure::drivers::serial_pad::{self, SerialPad};
use crate::infrastructure::drivers::wiimote::{self, Wiimote};
use crate::infrastructure::drivers::zeemote::{self, Zeemote};
use std::path::PathBuf;
use std::sync::OnceLock;
use tracing::info;

pub type ProtocolFactory = fn() -> Box<dyn Protocol>;

#[derive(Debug, Clone, Copy)]
pub struct DriverDescriptor {
    /// Canonical lowercase name
    pub name: &'static str,
    pub display_name: &'static str,
    pub requires_hid: bool,
    factory: ProtocolFactory,
}

impl DriverDescriptor {
    pub const fn new(
        name: &'static str,
        display_name: &'static str,
        requires_hid: bool,
        factory: ProtocolFactory,
    ) -> Self {
        Self {
            name,
            display_name,
            requires_hid,
            factory,
        }
    }

    pub fn create_protocol(&self) -> Box<dyn Protocol> {
        (self.factory)()
    }
}

fn zeemote_protocol() -> Box<dyn Protocol> {
    Box::new(Zeemote::new())
}

fn serial_pad_protocol() -> Box<dyn Protocol> {
    Box::new(SerialPad::standard())
}

fn icade_serial_protocol() -> Box<dyn Protocol> {
    Box::new(ICade::serial())
}

fn icade_hid_protocol() -> Box<dyn Protocol> {
    Box::new(ICade::hid())
}

fn data_dump_protocol() -> Box<dyn Protocol> {
    Box::new(DataDump::new())
}

fn wiimote_protocol() -> Box<dyn Protocol> {
    Box::new(Wiimote::new())
}

fn hid_keyboard_protocol() -> Box<dyn Protocol> {
    Box::new(HidKeyboard::new())
}

/// Built-in drivers in listing order.
pub const BUILTIN_DRIVERS: &[DriverDescriptor] = &[
    DriverDescriptor::new(
        zeemote::DRIVER_NAME,
        zeemote::DISPLAY_NAME,
        false,
        zeemote_protocol,
    ),
    DriverDescriptor::new(
        serial_pad::BGP100_DRIVER_NAME,
        serial_pad::BGP100_DISPLAY_NAME,
        false,
        serial_pad_protocol,
    ),
    DriverDescriptor::new(
        serial_pad::PHONEJOY_DRIVER_NAME,
        serial_pad::PHONEJOY_DISPLAY_NAME,
        false,
        serial_pad_protocol,
    ),
    DriverDescriptor::new(
        icade::ICONTROLPAD_DRIVER_NAME,
        icade::ICONTROLPAD_DISPLAY_NAME,
        false,
        icade_serial_protocol,
    ),
    DriverDescriptor::new(
        serial_pad::GAMESTOP_DRIVER_NAME,
        serial_pad::GAMESTOP_DISPLAY_NAME,
        false,
        serial_pad_protocol,
    ),
    DriverDescriptor::new(
        data_dump::DRIVER_NAME,
        data_dump::DISPLAY_NAME,
        false,
        data_dump_protocol,
    ),
    DriverDescriptor::new(
        wiimote::DRIVER_NAME,
        wiimote::DISPLAY_NAME,
        true,
        wiimote_protocol,
    ),
    DriverDescriptor::new(
        hid_keyboard::DRIVER_NAME,
        hid_keyboard::DISPLAY_NAME,
        true,
        hid_keyboard_protocol,
    ),
    DriverDescriptor::new(
        icade::DRIVER_NAME,
        icade::DISPLAY_NAME,
        true,
        icade_hid_protocol,
    ),
    DriverDescriptor::new(
        hid_keyboard::IPEGA_DRIVER_NAME,
        hid_keyboard::IPEGA_DISPLAY_NAME,
        true,
        hid_keyboard_protocol,
    ),
];

type HidCheck = Box<dyn Fn() -> bool + Send + Sync>;

pub struct DriverRegistry {
    descriptors: Vec<DriverDescriptor>,
    check: HidCheck,
    hid_support: OnceLock<bool>,
}

impl DriverRegistry {
    pub fn new(
        descriptors: Vec<DriverDescriptor>,
        check: impl Fn() -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            descriptors,
            check: Box::new(check),
            hid_support: OnceLock::new(),
        }
    }

    pub fn builtin(check: impl Fn() -> bool + Send + Sync + 'static) -> Self {
        Self::new(BUILTIN_DRIVERS.to_vec(), check)
    }

    /// HID support is present when any of `paths` exists.
    pub fn with_hid_check_paths(paths: Vec<PathBuf>) -> Self {
        Self::builtin(move || paths.iter().any(|path| path.exists()))
    }

    pub fn has_hid_support(&self) -> bool {
        *self.hid_support.get_or_init(|| {
            let supported = (self.check)();
            info!("HID driver support: {}", supported);
            supported
        })
    }

    /// Base drivers in declaration order, then HID drivers if supported.
    pub fn available(&self) -> impl Iterator<Item = &DriverDescriptor> {
        let hid = self.has_hid_support();
        let base = self.descriptors.iter().filter(|d| !d.requires_hid);
        let extended = self
            .descriptors
            .iter()
            .filter(move |d| hid && d.requires_hid);
        base.chain(extended)
    }

    pub fn driver_names(&self) -> Vec<String> {
        self.available().map(|d| d.name.to_string()).collect()
    }

    pub fn driver_display_names(&self) -> Vec<String> {
        self.available().map(|d| d.display_name.to_string()).collect()
    }

    /// Case-insensitive lookup among the available drivers.
    pub fn resolve(&self, name: &str) -> Result<&DriverDescriptor, HubError> {
        let wanted = name.trim().to_lowercase();
        self.available()
            .find(|d| d.name == wanted)
            .ok_or_else(|| HubError::UnknownDriver(name.to_string()))
    }

    /// First base driver, used when nothing was ever selected.
    pub fn default_driver_name(&self) -> Option<&'static str> {
        self.descriptors
            .iter()
            .find(|d| !d.requires_hid)
            .map(|d| d.name)
    }
}
