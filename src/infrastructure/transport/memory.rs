//! In-memory transport
//!
//! Each registered [`MemoryDevice`] behaves like a remote controller: the
//! host pushes reports into it, injects faults, or hangs up, and can inspect
//! the output reports a driver wrote.

use super::{validate_address, Connector, Link, ShutdownHandle};
use crate::domain::error::TransportError;
use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

pub(crate) enum Chunk {
    Data(Vec<u8>),
    Fault(io::ErrorKind),
    Close,
}

/// Blocking reader over a channel of chunks. Closing yields EOF.
pub(crate) struct PipeReader {
    rx: mpsc::Receiver<Chunk>,
    pending: Vec<u8>,
    eof: bool,
}

pub(crate) fn pipe() -> (PipeReader, mpsc::Sender<Chunk>) {
    let (tx, rx) = mpsc::channel();
    (
        PipeReader {
            rx,
            pending: Vec::new(),
            eof: false,
        },
        tx,
    )
}

impl Read for PipeReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pending.is_empty() {
            if self.eof {
                return Ok(0);
            }
            match self.rx.recv() {
                Ok(Chunk::Data(data)) => self.pending = data,
                Ok(Chunk::Fault(kind)) => {
                    return Err(io::Error::new(kind, "injected transport fault"));
                }
                Ok(Chunk::Close) | Err(_) => {
                    self.eof = true;
                    return Ok(0);
                }
            }
        }
        let n = buf.len().min(self.pending.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.drain(..n);
        Ok(n)
    }
}

struct PipeWriter {
    written: Arc<Mutex<Vec<Vec<u8>>>>,
    closed: Arc<AtomicBool>,
    broken: Arc<AtomicBool>,
}

impl Write for PipeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "link closed"));
        }
        if self.broken.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "output channel down"));
        }
        self.written
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(buf.to_vec());
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

struct ActiveLink {
    feed: mpsc::Sender<Chunk>,
    closed: Arc<AtomicBool>,
}

struct DeviceInner {
    name: Option<String>,
    link: Mutex<Option<ActiveLink>>,
    written: Arc<Mutex<Vec<Vec<u8>>>>,
    connects: AtomicUsize,
    refuse: AtomicBool,
    output_broken: Arc<AtomicBool>,
}

/// Host-side handle to a simulated device.
#[derive(Clone)]
pub struct MemoryDevice {
    inner: Arc<DeviceInner>,
}

impl MemoryDevice {
    fn new(name: Option<String>) -> Self {
        Self {
            inner: Arc::new(DeviceInner {
                name,
                link: Mutex::new(None),
                written: Arc::new(Mutex::new(Vec::new())),
                connects: AtomicUsize::new(0),
                refuse: AtomicBool::new(false),
                output_broken: Arc::new(AtomicBool::new(false)),
            }),
        }
    }

    fn feed(&self, chunk: Chunk) -> bool {
        let link = self.inner.link.lock().unwrap_or_else(PoisonError::into_inner);
        match link.as_ref() {
            Some(active) if !active.closed.load(Ordering::SeqCst) => {
                active.feed.send(chunk).is_ok()
            }
            _ => false,
        }
    }

    /// Deliver one report. Returns false if no driver is linked.
    pub fn send(&self, report: &[u8]) -> bool {
        self.feed(Chunk::Data(report.to_vec()))
    }

    /// Make the driver's next read fail.
    pub fn fail(&self, kind: io::ErrorKind) -> bool {
        self.feed(Chunk::Fault(kind))
    }

    /// Close the link from the device side.
    pub fn hang_up(&self) -> bool {
        self.feed(Chunk::Close)
    }

    /// Refuse future connection attempts.
    pub fn set_refuse(&self, refuse: bool) {
        self.inner.refuse.store(refuse, Ordering::SeqCst);
    }

    /// Make every write to the device fail while reads keep working.
    pub fn break_output(&self) {
        self.inner.output_broken.store(true, Ordering::SeqCst);
    }

    pub fn is_linked(&self) -> bool {
        let link = self.inner.link.lock().unwrap_or_else(PoisonError::into_inner);
        link.as_ref()
            .is_some_and(|active| !active.closed.load(Ordering::SeqCst))
    }

    pub fn connect_count(&self) -> usize {
        self.inner.connects.load(Ordering::SeqCst)
    }

    /// Output reports written by drivers, oldest first.
    pub fn written(&self) -> Vec<Vec<u8>> {
        self.inner
            .written
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn open(&self, address: &str) -> Result<Link, TransportError> {
        if self.inner.refuse.load(Ordering::SeqCst) {
            return Err(TransportError::Unreachable(address.to_string()));
        }

        let (reader, feed) = pipe();
        let closed = Arc::new(AtomicBool::new(false));
        let shutdown = {
            let feed = feed.clone();
            let closed = closed.clone();
            ShutdownHandle::new(move || {
                if !closed.swap(true, Ordering::SeqCst) {
                    let _ = feed.send(Chunk::Close);
                }
            })
        };

        *self.inner.link.lock().unwrap_or_else(PoisonError::into_inner) = Some(ActiveLink {
            feed,
            closed: closed.clone(),
        });
        self.inner.connects.fetch_add(1, Ordering::SeqCst);

        Ok(Link {
            reader: Box::new(reader),
            writer: Box::new(PipeWriter {
                written: self.inner.written.clone(),
                closed,
                broken: self.inner.output_broken.clone(),
            }),
            shutdown,
            remote_name: self.inner.name.clone(),
        })
    }
}

/// Connector over a set of simulated devices keyed by address.
#[derive(Default)]
pub struct MemoryConnector {
    devices: Mutex<HashMap<String, MemoryDevice>>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a device; `name` is what it reports once linked.
    pub fn add_device(&self, address: &str, name: Option<&str>) -> MemoryDevice {
        let device = MemoryDevice::new(name.map(str::to_string));
        self.devices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(address.to_string(), device.clone());
        device
    }

    pub fn device(&self, address: &str) -> Option<MemoryDevice> {
        self.devices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(address)
            .cloned()
    }
}

impl Connector for MemoryConnector {
    fn check_address(&self, address: &str) -> Result<(), TransportError> {
        validate_address(address)
    }

    fn connect(&self, address: &str) -> Result<Link, TransportError> {
        let device = self
            .device(address)
            .ok_or_else(|| TransportError::Unreachable(address.to_string()))?;
        debug!("Opening in-memory link to {}", address);
        device.open(address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_reports_flow_and_writes_recorded() {
        let connector = MemoryConnector::new();
        let device = connector.add_device("AA:BB", Some("Pad"));
        assert!(!device.send(&[1]));

        let mut link = connector.connect("AA:BB").unwrap();
        assert_eq!(link.remote_name.as_deref(), Some("Pad"));
        assert!(device.send(&[1, 2, 3]));

        let mut buf = [0u8; 2];
        assert_eq!(link.reader.read(&mut buf).unwrap(), 2);
        assert_eq!(buf, [1, 2]);
        assert_eq!(link.reader.read(&mut buf).unwrap(), 1);
        assert_eq!(buf[0], 3);

        link.writer.write_all(&[0x11, 0x10]).unwrap();
        assert_eq!(device.written(), vec![vec![0x11, 0x10]]);

        device.break_output();
        let err = link.writer.write_all(&[0x12]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
        assert!(device.send(&[4]));
        assert_eq!(link.reader.read(&mut buf).unwrap(), 1);
    }

    #[test]
    fn test_shutdown_unblocks_reader() {
        let connector = MemoryConnector::new();
        let device = connector.add_device("AA:BB", None);
        let link = connector.connect("AA:BB").unwrap();
        let shutdown = link.shutdown.clone();
        let mut reader = link.reader;

        let reading = thread::spawn(move || {
            let mut buf = [0u8; 8];
            reader.read(&mut buf).unwrap()
        });
        thread::sleep(Duration::from_millis(20));
        shutdown.shutdown();

        assert_eq!(reading.join().unwrap(), 0);
        assert!(!device.is_linked());
        assert!(!device.send(&[1]));
    }

    #[test]
    fn test_fault_and_refuse() {
        let connector = MemoryConnector::new();
        let device = connector.add_device("AA:BB", None);
        let mut link = connector.connect("AA:BB").unwrap();
        device.fail(io::ErrorKind::ConnectionReset);
        let mut buf = [0u8; 8];
        let err = link.reader.read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionReset);

        device.set_refuse(true);
        assert!(matches!(
            connector.connect("AA:BB"),
            Err(TransportError::Unreachable(_))
        ));
        assert!(matches!(
            connector.connect("CC:DD"),
            Err(TransportError::Unreachable(_))
        ));
    }
}
