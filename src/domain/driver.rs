//! Driver contract
//!
//! A [`Driver`] owns one device connection for one session. Byte-level
//! decoding is delegated to a [`Protocol`], so vendor decoders stay small and
//! the thread/transport handling lives in one place.

use crate::domain::dispatch::Dispatcher;
use crate::domain::error::{DecodeError, DriverError, HubError};
use crate::domain::models::{DriverState, Feature, InputEvent};

pub trait Driver: Send + Sync {
    /// Begin the driver's own execution unit. Returns once it is spawned.
    fn start(&self, dispatcher: Dispatcher) -> Result<(), HubError>;

    /// Request termination and release the transport.
    fn stop(&self) -> Result<(), DriverError>;

    fn is_running(&self) -> bool;

    fn state(&self) -> DriverState;

    fn device_address(&self) -> &str;

    /// Best effort; equals the address until the link reports a name.
    fn device_name(&self) -> String;

    /// Canonical lowercase name.
    fn driver_name(&self) -> &str;

    /// Extended capabilities, if this driver has any.
    fn features(&self) -> Option<&dyn FeatureControl> {
        None
    }
}

/// Optional extended contract for capability-richer devices.
pub trait FeatureControl {
    /// Unsupported features are ignored without error.
    fn set_feature(&self, feature: Feature) -> Result<(), DriverError>;
}

/// Vendor-specific decoder plugged into the generic driver runtime.
pub trait Protocol: Send {
    /// Output reports sent once the link is up.
    fn handshake(&mut self) -> Vec<Vec<u8>> {
        Vec::new()
    }

    /// Decode one chunk read from the link.
    fn decode(&mut self, chunk: &[u8], events: &mut Vec<InputEvent>) -> Result<(), DecodeError>;

    fn supports_features(&self) -> bool {
        false
    }

    /// Update feature state, returning the output report to send, if any.
    fn apply_feature(&mut self, _feature: Feature) -> Option<Vec<u8>> {
        None
    }
}
