//! JSON-lines command server
//!
//! Every line a client writes is parsed as a [`Command`] and queued for the
//! command processor. Every notification the core publishes is written to
//! all connected clients as one JSON line.

use super::socket_name;
use crate::domain::models::Envelope;
use crate::service::commands::Command;
use anyhow::Result;
use interprocess::local_socket::{traits::ListenerExt, ListenerOptions, Stream as LocalStream};
use interprocess::TryClone;
use std::io::{self, BufRead, BufReader, Write};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, error, info, warn};

/// Lines a client may fall behind by before it is dropped.
const SUBSCRIBER_BACKLOG: usize = 256;

/// Clients that receive notifications. Each has its own writer thread fed
/// through a bounded queue, so a client that stops reading only loses its
/// own stream.
#[derive(Clone, Default)]
pub struct Subscribers {
    inner: Arc<Mutex<Vec<mpsc::Sender<Arc<str>>>>>,
}

impl Subscribers {
    pub fn add(&self, writer: Box<dyn Write + Send>) -> io::Result<()> {
        self.add_with_backlog(writer, SUBSCRIBER_BACKLOG)
    }

    fn add_with_backlog(&self, mut writer: Box<dyn Write + Send>, backlog: usize) -> io::Result<()> {
        let (line_tx, mut line_rx) = mpsc::channel::<Arc<str>>(backlog);
        thread::Builder::new()
            .name("subscriber".to_string())
            .spawn(move || {
                while let Some(line) = line_rx.blocking_recv() {
                    if let Err(e) = writer
                        .write_all(line.as_bytes())
                        .and_then(|_| writer.flush())
                    {
                        debug!("Subscriber write failed: {}", e);
                        break;
                    }
                }
            })?;
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(line_tx);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Queue `envelope` for every subscriber without waiting on any of them.
    /// Subscribers that are gone or too far behind are dropped.
    pub fn broadcast(&self, envelope: &Envelope) -> Result<()> {
        let line: Arc<str> = Arc::from(serde_json::to_string(envelope)? + "\n");
        let mut subscribers = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|subscriber| match subscriber.try_send(line.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!("Dropping subscriber that stopped reading");
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!("Dropping disconnected subscriber");
                false
            }
        });
        Ok(())
    }
}

/// Bind the socket and start the listener and broadcaster threads.
pub fn start(
    name: &str,
    commands: mpsc::UnboundedSender<Command>,
    mut notifications: mpsc::UnboundedReceiver<Envelope>,
) -> Result<Subscribers> {
    let listener = ListenerOptions::new().name(socket_name(name)?).create_sync()?;
    info!("Listening for commands on {}", name);

    let subscribers = Subscribers::default();

    let broadcast_to = subscribers.clone();
    thread::Builder::new()
        .name("broadcaster".to_string())
        .spawn(move || {
            while let Some(envelope) = notifications.blocking_recv() {
                if let Err(e) = broadcast_to.broadcast(&envelope) {
                    error!("Failed to encode notification: {}", e);
                }
            }
            debug!("Notification channel closed");
        })?;

    let accept_into = subscribers.clone();
    thread::Builder::new()
        .name("listener".to_string())
        .spawn(move || {
            for conn in listener.incoming().filter_map(|x| x.ok()) {
                info!("Client connected");
                if let Err(e) = accept(conn, &accept_into, commands.clone()) {
                    error!("Connection error: {}", e);
                }
            }
        })?;

    Ok(subscribers)
}

fn accept(
    stream: LocalStream,
    subscribers: &Subscribers,
    commands: mpsc::UnboundedSender<Command>,
) -> Result<()> {
    // Subscribe before reading so a query's reply cannot be missed
    subscribers.add(Box::new(stream.try_clone()?))?;
    thread::Builder::new()
        .name("client".to_string())
        .spawn(move || {
            let reader = BufReader::new(stream);
            if let Err(e) = read_commands(reader, &commands) {
                error!("Read error: {}", e);
            }
            info!("Client disconnected");
        })?;
    Ok(())
}

/// Forward each parsable line as a command until EOF. Returns the number of
/// commands queued.
pub fn read_commands(
    reader: impl BufRead,
    commands: &mpsc::UnboundedSender<Command>,
) -> Result<usize> {
    let mut queued = 0;
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Command>(&line) {
            Ok(command) => {
                debug!("Received command: {:?}", command);
                if commands.send(command).is_err() {
                    warn!("Command processor is gone, closing client");
                    break;
                }
                queued += 1;
            }
            Err(e) => warn!("Ignoring malformed command {:?}: {}", line.trim(), e),
        }
    }
    Ok(queued)
}
