//! Command processing
//!
//! Hosts talk to the core through [`Command`] values. A single
//! [`CommandProcessor`] task runs them one at a time, in arrival order, each
//! to completion before the next is taken.

use crate::domain::models::{Feature, DEFAULT_SESSION};
use crate::domain::settings::Preferences;
use crate::service::orchestrator::Orchestrator;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

fn default_session() -> String {
    DEFAULT_SESSION.to_string()
}

fn default_notify() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    Connect {
        #[serde(default = "default_session")]
        session_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        address: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        driver: Option<String>,
        /// Set by senders that rely on the remembered selection; missing
        /// fields are filled either way
        #[serde(default)]
        use_fallback_selection: bool,
        #[serde(default = "default_notify")]
        notify: bool,
    },
    Disconnect {
        #[serde(default = "default_session")]
        session_id: String,
    },
    ApplyFeature {
        #[serde(default = "default_session")]
        session_id: String,
        feature: Feature,
    },
    QueryState {
        #[serde(default = "default_session")]
        session_id: String,
    },
    QueryConfig {
        #[serde(default = "default_session")]
        session_id: String,
    },
}

impl Command {
    pub fn session_id(&self) -> &str {
        match self {
            Self::Connect { session_id, .. }
            | Self::Disconnect { session_id }
            | Self::ApplyFeature { session_id, .. }
            | Self::QueryState { session_id }
            | Self::QueryConfig { session_id } => session_id,
        }
    }
}

pub struct CommandProcessor {
    orchestrator: Arc<Orchestrator>,
    preferences: Arc<dyn Preferences>,
}

impl CommandProcessor {
    pub fn new(orchestrator: Arc<Orchestrator>, preferences: Arc<dyn Preferences>) -> Self {
        Self {
            orchestrator,
            preferences,
        }
    }

    /// Run one command to completion. Blocks while a previous driver of the
    /// session is being stopped.
    pub fn execute(&self, command: Command) {
        debug!("Executing {:?}", command);
        match command {
            Command::Connect {
                session_id,
                address,
                driver,
                use_fallback_selection,
                notify,
            } => self.connect(&session_id, address, driver, use_fallback_selection, notify),
            Command::Disconnect { session_id } => self.orchestrator.disconnect(&session_id),
            Command::ApplyFeature {
                session_id,
                feature,
            } => self.orchestrator.apply_feature(&session_id, feature),
            Command::QueryState { session_id } => self.orchestrator.publish_state(&session_id),
            Command::QueryConfig { session_id } => self.orchestrator.publish_config(&session_id),
        }
    }

    fn connect(
        &self,
        session_id: &str,
        address: Option<String>,
        driver: Option<String>,
        use_fallback: bool,
        notify: bool,
    ) {
        let explicit = address.is_some() && driver.is_some();
        if !explicit && !use_fallback {
            warn!(
                "[{}] connect without address or driver, using the remembered selection; \
                 senders should set use_fallback_selection",
                session_id
            );
        }
        let address = address
            .or_else(|| self.preferences.selected_address())
            .unwrap_or_default();
        let driver = driver
            .or_else(|| self.preferences.selected_driver())
            .unwrap_or_default();
        self.orchestrator.connect(session_id, &address, &driver, notify);

        // Only selections that made it into the table are worth keeping
        if explicit {
            let state = self.orchestrator.query_state(session_id);
            if state.device_address.as_deref() == Some(address.as_str()) {
                self.preferences.remember(&address, &driver);
            }
        }
    }

    /// Start the processing task. Dropping every sender ends it.
    pub fn spawn(self) -> (mpsc::UnboundedSender<Command>, JoinHandle<()>) {
        let (command_tx, mut command_rx) = mpsc::unbounded_channel::<Command>();
        let processor = Arc::new(self);

        let handle = tokio::spawn(async move {
            while let Some(command) = command_rx.recv().await {
                let processor = processor.clone();
                if let Err(e) = tokio::task::spawn_blocking(move || processor.execute(command)).await
                {
                    error!("Command processing failed: {}", e);
                }
            }
            debug!("Command channel closed");
        });

        (command_tx, handle)
    }
}
