//! Device links
//!
//! A driver opens its device through a [`Connector`] and gets back a
//! [`Link`]: a blocking reader, a writer for output reports, and a
//! [`ShutdownHandle`] that unblocks the reader from another thread.
//!
//! ## Modules
//!
//! - [`memory`] - in-process devices fed by the host, used for simulation and tests
//! - [`replay`] - plays back captured report files

use crate::domain::error::TransportError;
use std::fmt;
use std::io::{Read, Write};
use std::sync::Arc;

pub mod memory;
pub mod replay;

pub use memory::{MemoryConnector, MemoryDevice};
pub use replay::ReplayConnector;

/// Closes a link so that a blocked read returns promptly.
#[derive(Clone)]
pub struct ShutdownHandle(Arc<dyn Fn() + Send + Sync>);

impl ShutdownHandle {
    pub fn new(close: impl Fn() + Send + Sync + 'static) -> Self {
        Self(Arc::new(close))
    }

    /// Idempotent.
    pub fn shutdown(&self) {
        (self.0)()
    }
}

impl fmt::Debug for ShutdownHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ShutdownHandle")
    }
}

/// An open connection to one device.
pub struct Link {
    pub reader: Box<dyn Read + Send>,
    pub writer: Box<dyn Write + Send>,
    pub shutdown: ShutdownHandle,
    /// Name the device reported while connecting, if any
    pub remote_name: Option<String>,
}

pub trait Connector: Send + Sync {
    /// Cheap syntactic check run before a driver is created.
    fn check_address(&self, address: &str) -> Result<(), TransportError> {
        validate_address(address)
    }

    /// Open a link. May block while the device answers.
    fn connect(&self, address: &str) -> Result<Link, TransportError>;
}

const MAX_ADDRESS_LEN: usize = 64;

/// Rejects addresses that cannot name a device: empty, overly long, or
/// containing whitespace or control characters.
pub fn validate_address(address: &str) -> Result<(), TransportError> {
    let valid = !address.is_empty()
        && address.len() <= MAX_ADDRESS_LEN
        && !address
            .chars()
            .any(|c| c.is_whitespace() || c.is_control());
    if valid {
        Ok(())
    } else {
        Err(TransportError::InvalidAddress(address.to_string()))
    }
}
