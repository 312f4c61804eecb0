//! Device drivers
//!
//! [`runtime::DeviceDriver`] is the thread-owning driver; the remaining
//! modules are the protocol decoders it can run.

pub mod data_dump;
pub mod hid_keyboard;
pub mod icade;
pub mod runtime;
pub mod serial_pad;
pub mod wiimote;
pub mod zeemote;

pub use runtime::{DeviceDriver, DriverOptions};
