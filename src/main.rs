use anyhow::Context;
use controller_hub::domain::dispatch::ChannelSink;
use controller_hub::domain::settings::SettingsService;
use controller_hub::infrastructure::adapter::{AdapterCheck, AdapterState, StaticAdapter, SysfsAdapter};
use controller_hub::infrastructure::logging::init_logger;
use controller_hub::infrastructure::transport::ReplayConnector;
use controller_hub::presentation::{client, server};
use controller_hub::service::commands::{Command, CommandProcessor};
use controller_hub::service::orchestrator::Orchestrator;
use controller_hub::service::registry::DriverRegistry;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let settings_service = SettingsService::new()?;

    if let Some(pos) = args.iter().position(|arg| arg == "--send") {
        let json = args.get(pos + 1).context("--send needs a JSON command")?;
        let command: Command = serde_json::from_str(json).context("Invalid command")?;
        let socket = settings_service.get().socket_name.clone();
        let reply =
            tokio::task::spawn_blocking(move || client::send(&socket, &command)).await??;
        if let Some(envelope) = reply {
            println!("{}", serde_json::to_string_pretty(&envelope)?);
        }
        return Ok(());
    }

    let _log_guard = init_logger(&settings_service.get().log_settings)
        .map_err(|e| eprintln!("Failed to initialize logging: {}", e))
        .ok();

    info!("Starting controller hub {}", env!("CARGO_PKG_VERSION"));

    let settings = settings_service.get().clone();
    let registry = DriverRegistry::with_hid_check_paths(
        settings.hid_check_paths.iter().map(PathBuf::from).collect(),
    );
    let adapter: Arc<dyn AdapterCheck> = if settings.assume_adapter_enabled {
        Arc::new(StaticAdapter(AdapterState::Enabled))
    } else {
        Arc::new(SysfsAdapter::default())
    };
    let connector = Arc::new(ReplayConnector::new(&settings.capture_dir));

    let (sink, notifications) = ChannelSink::channel();
    let orchestrator = Arc::new(
        Orchestrator::new(Arc::new(registry), adapter, connector, Arc::new(sink))
            .with_analog_threshold(settings.analog_threshold),
    );

    let preferences = Arc::new(Mutex::new(settings_service));
    let processor = CommandProcessor::new(orchestrator.clone(), preferences);
    let (commands, processor_task) = processor.spawn();

    server::start(&settings.socket_name, commands, notifications)?;

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");

    processor_task.abort();
    let shutdown = orchestrator.clone();
    if let Err(e) = tokio::task::spawn_blocking(move || shutdown.shutdown()).await {
        warn!("Shutdown did not finish cleanly: {}", e);
    }
    Ok(())
}
