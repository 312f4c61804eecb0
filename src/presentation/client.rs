//! One-shot client for a running daemon.

use super::socket_name;
use crate::domain::models::{Envelope, Notification};
use crate::service::commands::Command;
use anyhow::{Context, Result};
use interprocess::local_socket::{traits::Stream, Stream as LocalStream};
use std::io::{BufRead, BufReader, Write};
use tracing::{debug, info};

/// Whether `envelope` answers `command`. Only queries expect an answer.
pub fn is_reply(command: &Command, envelope: &Envelope) -> bool {
    if envelope.session_id != command.session_id() {
        return false;
    }
    matches!(
        (command, &envelope.notification),
        (Command::QueryState { .. }, Notification::State(_))
            | (Command::QueryConfig { .. }, Notification::Config(_))
    )
}

fn expects_reply(command: &Command) -> bool {
    matches!(
        command,
        Command::QueryState { .. } | Command::QueryConfig { .. }
    )
}

/// Send `command` to the daemon listening on `name`. For queries, wait for
/// and return the matching report.
pub fn send(name: &str, command: &Command) -> Result<Option<Envelope>> {
    let mut stream = LocalStream::connect(socket_name(name)?)
        .with_context(|| format!("Daemon is not listening on {}", name))?;
    info!("Connected to daemon");

    let json = serde_json::to_string(command)? + "\n";
    stream.write_all(json.as_bytes())?;
    stream.flush()?;

    if !expects_reply(command) {
        return Ok(None);
    }
    wait_for_reply(BufReader::new(stream), command).map(Some)
}

fn wait_for_reply(reader: impl BufRead, command: &Command) -> Result<Envelope> {
    for line in reader.lines() {
        let line = line?;
        match serde_json::from_str::<Envelope>(&line) {
            Ok(envelope) if is_reply(command, &envelope) => return Ok(envelope),
            Ok(_) => {}
            Err(e) => debug!("Skipping unreadable line: {}", e),
        }
    }
    anyhow::bail!("Daemon closed the connection before replying")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::StateReport;
    use std::io::Cursor;

    fn state(session_id: &str, connected: bool) -> String {
        serde_json::to_string(&Envelope {
            session_id: session_id.to_string(),
            notification: Notification::State(StateReport {
                connected,
                ..Default::default()
            }),
        })
        .unwrap()
    }

    #[test]
    fn test_reply_matches_session_and_kind() {
        let command = Command::QueryState {
            session_id: "s1".to_string(),
        };
        let input = format!(
            "{}\ngarbage\n{}\n{}\n",
            state("other", true),
            r#"{"session_id":"s1","kind":"connecting","address":"AA:BB"}"#,
            state("s1", true)
        );

        let reply = wait_for_reply(Cursor::new(input), &command).unwrap();
        assert_eq!(reply.session_id, "s1");
        assert!(matches!(
            reply.notification,
            Notification::State(StateReport { connected: true, .. })
        ));
    }

    #[test]
    fn test_eof_without_reply() {
        let command = Command::QueryConfig {
            session_id: "default".to_string(),
        };
        assert!(wait_for_reply(Cursor::new(state("default", false)), &command).is_err());
        assert!(expects_reply(&command));
        assert!(!expects_reply(&Command::Disconnect {
            session_id: "default".to_string()
        }));
    }
}
