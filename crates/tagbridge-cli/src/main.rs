//! tagbridge: card reader and barcode scanner bridge for browser observers.

mod config;

use anyhow::{Context, Result};
use clap::Parser;
use config::{Args, BridgeConfig};
use std::sync::Arc;
use tagbridge_core::Source;
use tagbridge_core::constants::COMMAND_CHANNEL_CAPACITY;
use tagbridge_hardware::AdapterManager;
use tagbridge_hub::{Hub, Router, WsServer};
use tagbridge_storage::{AliasStore, StoreConfig};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.log_level.as_deref())?;

    let config = args.into_config();
    config.validate().context("invalid configuration")?;

    run(config).await
}

/// Install the global subscriber.
///
/// An explicit level wins over `RUST_LOG`; with neither, `info` is used.
fn init_logging(level: Option<&str>) -> Result<()> {
    let filter = match level {
        Some(level) => EnvFilter::try_new(level).context("invalid log filter")?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install logger: {}", e))
}

async fn run(config: BridgeConfig) -> Result<()> {
    info!(version = tagbridge_core::VERSION, "Starting tagbridge");

    let store = open_store(&config.store)?;

    let hub = Arc::new(Hub::new(store.clone(), config.observer_queue_capacity));
    let router = Router::new(hub.clone(), store.clone());
    let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
    let server = WsServer::bind(config.server.clone(), hub, command_tx)
        .await
        .context("failed to start observer server")?;

    let mut manager = AdapterManager::new(config.adapters.clone());
    register_backends(&mut manager);
    let stats = manager.stats();
    info!(
        card = stats.card_registered,
        scanner = stats.scanner_registered,
        "Device backends registered"
    );
    let mut adapters = manager.start(store.clone());
    let events = adapters
        .take_events()
        .context("adapter events already taken")?;

    let shutdown = CancellationToken::new();
    let router_task = tokio::spawn(router.run(events, command_rx, shutdown.clone()));
    let server_task = tokio::spawn(server.run(shutdown.clone()));

    wait_for_signal().await;
    info!("Shutdown requested");
    shutdown.cancel();

    adapters.shutdown().await?;
    server_task
        .await
        .context("observer server task failed")??;
    router_task.await.context("router task failed")?;

    info!("tagbridge stopped");
    Ok(())
}

fn open_store(config: &StoreConfig) -> Result<Arc<AliasStore>> {
    let store = AliasStore::open(config.clone())
        .with_context(|| format!("failed to open {}", config.path.display()))?;
    Ok(Arc::new(store))
}

/// Hand the compiled-in device backends to the manager.
fn register_backends(manager: &mut AdapterManager) {
    #[cfg(feature = "hardware-pcsc")]
    {
        use tagbridge_hardware::devices::AnyCardService;
        use tagbridge_hardware::pcsc_service::PcscCardService;

        if manager.is_enabled(Source::Card) {
            match PcscCardService::start() {
                Ok(service) => manager.register_card_service(AnyCardService::Pcsc(service)),
                Err(e) => warn!(error = %e, "PC/SC unavailable, card reader disabled"),
            }
        }
    }
    #[cfg(not(feature = "hardware-pcsc"))]
    {
        if manager.is_enabled(Source::Card) {
            warn!("Built without the hardware-pcsc feature, card reader disabled");
        }
    }

    #[cfg(feature = "hardware-serial")]
    {
        use tagbridge_hardware::devices::AnySerialBackend;
        use tagbridge_hardware::system_serial::SystemSerial;

        if manager.is_enabled(Source::Scanner) {
            manager.register_serial_backend(AnySerialBackend::System(SystemSerial::new()));
        }
    }
    #[cfg(not(feature = "hardware-serial"))]
    {
        if manager.is_enabled(Source::Scanner) {
            warn!("Built without the hardware-serial feature, scanner disabled");
        }
    }
}

async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::Mutex;
    use tracing::Dispatch;

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_open_store_logs_load_once() {
        let dir = tempfile::tempdir().unwrap();
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();

        let store = tracing::dispatcher::with_default(&Dispatch::new(subscriber), || {
            open_store(&StoreConfig::new(dir.path().join("aliases.json")))
        })
        .unwrap();

        let output = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        assert_eq!(output.matches("Alias table loaded").count(), 1);
        assert!(store.is_empty());
    }

    #[test]
    fn test_open_store_reports_path_on_failure() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"").unwrap();

        let error = open_store(&StoreConfig::new(blocker.join("aliases.json"))).unwrap_err();

        assert!(format!("{:#}", error).contains("blocker"));
    }
}
