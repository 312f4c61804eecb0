use crate::domain::driver::Protocol;
use crate::domain::error::DecodeError;
use crate::domain::models::InputEvent;
use tracing::info;

pub const DRIVER_NAME: &str = "dump";
pub const DISPLAY_NAME: &str = "Data dump (debug)";

/// Logs every chunk as hex and emits nothing. Used to reverse engineer new pads.
#[derive(Default)]
pub struct DataDump {
    total: usize,
}

impl DataDump {
    pub fn new() -> Self {
        Self::default()
    }
}

pub fn hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

impl Protocol for DataDump {
    fn decode(&mut self, chunk: &[u8], _events: &mut Vec<InputEvent>) -> Result<(), DecodeError> {
        self.total += chunk.len();
        info!("dump [{} bytes, {} total]: {}", chunk.len(), self.total, hex(chunk));
        Ok(())
    }
}
