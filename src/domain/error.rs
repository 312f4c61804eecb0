//! Error types for the session core.
//!
//! `HubError` covers every failure the orchestrator can report. Each variant
//! maps to one `ErrorKind` so hosts can tell request mistakes apart from
//! adapter or transport trouble.

use std::io;

use thiserror::Error;

/// Coarse classification of a `HubError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidRequest,
    AdapterUnavailable,
    AdapterDisabled,
    UnknownDriver,
    DriverConstructionFailure,
    TransportFailure,
    InternalViolation,
}

#[derive(Error, Debug)]
pub enum HubError {
    /// A required request field was missing or empty
    #[error("Invalid call, {0}")]
    InvalidRequest(String),

    /// Connect was issued before the user picked a device
    #[error("no device selected")]
    NoDeviceSelected,

    #[error("Bluetooth adapter not available on this system")]
    AdapterUnavailable,

    #[error("Bluetooth is turned off")]
    AdapterDisabled,

    #[error("Unknown driver: {0}")]
    UnknownDriver(String),

    #[error("Failed to create driver {driver}: {reason}")]
    DriverConstruction { driver: String, reason: String },

    #[error("Connection to {address} failed: {source}")]
    Transport {
        address: String,
        #[source]
        source: DriverError,
    },

    /// Caller broke the command contract
    #[error("Invalid call, {0}, this is an API violation")]
    InternalViolation(String),
}

impl HubError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidRequest(_) | Self::NoDeviceSelected => ErrorKind::InvalidRequest,
            Self::AdapterUnavailable => ErrorKind::AdapterUnavailable,
            Self::AdapterDisabled => ErrorKind::AdapterDisabled,
            Self::UnknownDriver(_) => ErrorKind::UnknownDriver,
            Self::DriverConstruction { .. } => ErrorKind::DriverConstructionFailure,
            Self::Transport { .. } => ErrorKind::TransportFailure,
            Self::InternalViolation(_) => ErrorKind::InternalViolation,
        }
    }

    /// Diagnostic text: kind, message and the chain of sources. Causes the
    /// message already spells out are not repeated.
    pub fn detail(&self) -> String {
        let mut detail = format!("{:?}: {}", self.kind(), self);
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            let text = cause.to_string();
            if !detail.contains(&text) {
                detail.push_str("\n  caused by: ");
                detail.push_str(&text);
            }
            source = cause.source();
        }
        detail
    }
}

/// Failures raised by a device link.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("device {0} is not reachable")]
    Unreachable(String),

    #[error("invalid device address {0:?}")]
    InvalidAddress(String),

    #[error("connection closed by device")]
    Closed,

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// A report the protocol decoder could not make sense of.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("report too short: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("unexpected report header {0:#04x}")]
    BadHeader(u8),
}

/// Errors raised while a driver runs or stops.
#[derive(Error, Debug)]
pub enum DriverError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("decode failed: {0}")]
    Decode(#[from] DecodeError),

    #[error("driver thread panicked")]
    Panicked,
}

impl From<io::Error> for DriverError {
    fn from(err: io::Error) -> Self {
        Self::Transport(TransportError::Io(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_device_message() {
        let err = HubError::NoDeviceSelected;
        assert_eq!(err.to_string(), "no device selected");
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
    }

    #[test]
    fn test_detail_does_not_repeat_sources() {
        let err = HubError::Transport {
            address: "AA:BB".to_string(),
            source: DriverError::Transport(TransportError::Closed),
        };
        assert_eq!(
            err.detail(),
            "TransportFailure: Connection to AA:BB failed: connection closed by device"
        );

        let err = HubError::Transport {
            address: "AA:BB".to_string(),
            source: DriverError::Decode(DecodeError::BadHeader(0x55)),
        };
        let detail = err.detail();
        assert_eq!(detail.matches("unexpected report header 0x55").count(), 1);
        assert!(!detail.contains("caused by"));
    }
}
