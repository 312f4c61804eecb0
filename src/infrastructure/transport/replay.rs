//! Capture playback
//!
//! A capture is a file of length-prefixed reports (`u16` little-endian
//! length, then that many bytes) named after the device address with `:`
//! replaced by `-`, e.g. `00-11-22-33-44-55.bin`. An optional sibling
//! `.name` file holds the device name. After the last report the link stays
//! open and idle until it is shut down, like a device nobody touches.

use super::memory::{pipe, Chunk};
use super::{validate_address, Connector, Link, ShutdownHandle};
use crate::domain::error::TransportError;
use std::fs;
use std::io::{self, ErrorKind};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info};

pub struct ReplayConnector {
    dir: PathBuf,
}

impl ReplayConnector {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn capture_stem(address: &str) -> String {
        address.replace(':', "-")
    }

    fn capture_path(&self, address: &str) -> PathBuf {
        self.dir.join(format!("{}.bin", Self::capture_stem(address)))
    }
}

/// Split a capture into its reports.
pub fn parse_capture(bytes: &[u8]) -> io::Result<Vec<Vec<u8>>> {
    let mut reports = Vec::new();
    let mut rest = bytes;
    while !rest.is_empty() {
        if rest.len() < 2 {
            return Err(io::Error::new(ErrorKind::InvalidData, "truncated length prefix"));
        }
        let len = u16::from_le_bytes([rest[0], rest[1]]) as usize;
        rest = &rest[2..];
        if rest.len() < len {
            return Err(io::Error::new(
                ErrorKind::InvalidData,
                format!("report declares {} bytes, {} left", len, rest.len()),
            ));
        }
        reports.push(rest[..len].to_vec());
        rest = &rest[len..];
    }
    Ok(reports)
}

/// Inverse of [`parse_capture`], for writing captures.
pub fn encode_capture<'a>(reports: impl IntoIterator<Item = &'a [u8]>) -> Vec<u8> {
    let mut out = Vec::new();
    for report in reports {
        out.extend_from_slice(&(report.len() as u16).to_le_bytes());
        out.extend_from_slice(report);
    }
    out
}

impl Connector for ReplayConnector {
    fn check_address(&self, address: &str) -> Result<(), TransportError> {
        validate_address(address)?;
        if address.contains(['/', '\\']) || address.contains("..") {
            return Err(TransportError::InvalidAddress(address.to_string()));
        }
        Ok(())
    }

    fn connect(&self, address: &str) -> Result<Link, TransportError> {
        let path = self.capture_path(address);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No capture at {}", path.display());
                return Err(TransportError::Unreachable(address.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        let reports = parse_capture(&bytes)?;
        let remote_name = fs::read_to_string(path.with_extension("name"))
            .ok()
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty());

        info!(
            "Replaying {} reports for {} from {}",
            reports.len(),
            address,
            path.display()
        );

        let (reader, feed) = pipe();
        for report in reports {
            let _ = feed.send(Chunk::Data(report));
        }

        // Holding the sender keeps the reader blocked once the capture is drained
        let feed = Arc::new(Mutex::new(Some(feed)));
        let shutdown = ShutdownHandle::new(move || {
            if let Some(feed) = feed.lock().unwrap_or_else(PoisonError::into_inner).take() {
                let _ = feed.send(Chunk::Close);
            }
        });

        Ok(Link {
            reader: Box::new(reader),
            writer: Box::new(io::sink()),
            shutdown,
            remote_name,
        })
    }
}
